//! Concurrent access: one lock domain per document, shared by its nodes.

use std::thread;

use xml_doc::{AccessMode, Document, Node};

#[test]
fn handles_cross_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Document>();
    assert_send_sync::<Node>();
}

#[test]
fn readers_never_observe_a_torn_write() {
    let doc = Document::parse(
        "<root><value>0</value></root>",
        AccessMode::Mutable,
    )
    .unwrap();

    let writer = {
        let doc = doc.clone();
        thread::spawn(move || {
            let value = doc.root_element().child("value").unwrap().unwrap();
            for i in 1..=100u32 {
                value.set_text(&i.to_string()).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let doc = doc.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let value = doc.root_element().child("value").unwrap().unwrap();
                    // set_text removes and re-adds under one lock, so the
                    // text is always a complete number, never absent.
                    let text = value.text().unwrap().unwrap();
                    let parsed: u32 = text.parse().unwrap();
                    assert!(parsed <= 100);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(
        doc.root_element()
            .child("value")
            .unwrap()
            .unwrap()
            .text()
            .unwrap()
            .as_deref(),
        Some("100")
    );
}

#[test]
fn concurrent_queries_share_the_document() {
    let doc = Document::parse(
        "<root><item/><item/><item/></root>",
        AccessMode::Immutable,
    )
    .unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let doc = doc.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    assert_eq!(doc.evaluate_to_elements("//item").unwrap().len(), 3);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn concurrent_attribute_writes_all_land() {
    let doc = Document::parse("<root/>", AccessMode::Mutable).unwrap();
    let writers: Vec<_> = (0..4)
        .map(|id: u32| {
            let doc = doc.clone();
            thread::spawn(move || {
                let root = doc.root_element();
                root.set_attribute(&format!("w{id}"), &id.to_string()).unwrap();
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    assert_eq!(doc.root_element().attribute_names().unwrap().len(), 4);
}
