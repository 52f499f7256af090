//! Integration tests for document parsing, copying, and queries.

use std::collections::BTreeMap;

use xml_doc::{AccessMode, Document, Output, XmlError};

const PLANT_CATALOG: &str = r#"<CATALOG>
  <PLANT><COMMON>Marigold</COMMON><ZONE>Annual</ZONE><PRICE>$2.45</PRICE></PLANT>
  <PLANT><COMMON>Bloodroot</COMMON><ZONE>4</ZONE><PRICE>$2.44</PRICE></PLANT>
  <PLANT><COMMON>Zinnia</COMMON><ZONE>Annual</ZONE><PRICE>$4.28</PRICE></PLANT>
  <PLANT><COMMON>Snowdrop</COMMON><ZONE>7</ZONE><PRICE>$6.59</PRICE></PLANT>
  <PLANT><COMMON>Cosmos</COMMON><ZONE>Annual</ZONE><PRICE>$2.03</PRICE></PLANT>
</CATALOG>"#;

const REQUIRED_QUESTIONS: &str = r#"<RequiredQuestions>
  <Question MinLength="4" MaxLength="128">How do you like your burger?
    <display lang="en" default="true">How do you like your burger?</display>
  </Question>
  <Question MinLength="4" MaxLength="128">What is your mother's maiden name?
    <display lang="en" default="true">What is your mother's maiden name?</display>
  </Question>
</RequiredQuestions>"#;

fn catalog() -> Document {
    Document::parse(PLANT_CATALOG, AccessMode::Immutable).unwrap()
}

fn questions() -> Document {
    Document::parse(REQUIRED_QUESTIONS, AccessMode::Immutable).unwrap()
}

#[test]
fn parse_rejects_malformed_input() {
    assert!(Document::parse("<a><b></a>", AccessMode::Mutable).is_err());
}

#[test]
fn root_element_name() {
    assert_eq!(
        questions().root_element().name().unwrap(),
        "RequiredQuestions"
    );
}

#[test]
fn query_finds_questions_in_document_order() {
    let doc = questions();
    let results = doc.evaluate_to_elements("//Question").unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(
        results[0].text().unwrap().as_deref(),
        Some("How do you like your burger?")
    );
    assert_eq!(
        results[0].attribute("MaxLength").unwrap().as_deref(),
        Some("128")
    );
    assert_eq!(
        results[0].attribute("MinLength").unwrap().as_deref(),
        Some("4")
    );
    assert_eq!(
        results[1].text().unwrap().as_deref(),
        Some("What is your mother's maiden name?")
    );
}

#[test]
fn query_finds_nested_display_elements() {
    let doc = questions();
    let results = doc.evaluate_to_elements("//Question/display").unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(
        results[0].text().unwrap().as_deref(),
        Some("How do you like your burger?")
    );
    assert_eq!(
        results[1].text().unwrap().as_deref(),
        Some("What is your mother's maiden name?")
    );
    assert_eq!(results[0].attribute_names().unwrap().len(), 2);
}

#[test]
fn query_to_single_element_returns_first_match() {
    let doc = questions();
    let first = doc.evaluate_to_element("//Question/display").unwrap();
    assert_eq!(
        first.unwrap().text().unwrap().as_deref(),
        Some("How do you like your burger?")
    );
    assert!(doc.evaluate_to_element("//NoSuchElement").unwrap().is_none());
}

#[test]
fn query_results_are_owned_by_the_document() {
    let doc = questions();
    let results = doc.evaluate_to_elements("//Question").unwrap();
    assert!(results[0].document().is_some());
    assert_eq!(
        results[0].parent().unwrap().unwrap().name().unwrap(),
        "RequiredQuestions"
    );
}

#[test]
fn query_results_are_correct_around_mixed_content() {
    // Elements between text runs still resolve to the right nodes.
    let doc = Document::parse("<a>x<![CDATA[y]]><b/>tail<b/></a>", AccessMode::Mutable).unwrap();
    let results = doc.evaluate_to_elements("//b").unwrap();
    assert_eq!(results.len(), 2);
    for b in &results {
        assert_eq!(b.name().unwrap(), "b");
    }
}

#[test]
fn positional_binding_filters_by_value() {
    let doc = catalog();
    let results = doc
        .evaluate_to_elements_with("//PLANT[ZONE[text()=$0]]", &["Annual"])
        .unwrap();
    assert_eq!(results.len(), 3);
    for plant in &results {
        assert_eq!(
            plant.child("ZONE").unwrap().unwrap().text().unwrap().as_deref(),
            Some("Annual")
        );
    }
}

#[test]
fn unused_positional_binding_is_an_error() {
    let doc = catalog();
    let result =
        doc.evaluate_to_elements_with("//PLANT[ZONE[text()=$0]]", &["Annual", "Extra Value"]);
    match result {
        Err(XmlError::UnusedBinding(key)) => assert_eq!(key, "1"),
        other => panic!("expected unused binding error, got {other:?}"),
    }
}

#[test]
fn named_binding_filters_by_value() {
    let doc = catalog();
    let mut values = BTreeMap::new();
    values.insert("zone".to_string(), "Annual".to_string());
    let results = doc
        .evaluate_to_elements_named("//PLANT[ZONE[text()=$zone]]", &values)
        .unwrap();
    assert_eq!(results.len(), 3);
}

#[test]
fn unused_named_binding_is_an_error() {
    let doc = catalog();
    let mut values = BTreeMap::new();
    values.insert("zone".to_string(), "Annual".to_string());
    values.insert("stale".to_string(), "unused".to_string());
    let result = doc.evaluate_to_elements_named("//PLANT[ZONE[text()=$zone]]", &values);
    assert!(matches!(
        result,
        Err(XmlError::UnusedBinding(key)) if key == "stale"
    ));
}

#[test]
fn binding_values_are_not_spliced_into_the_expression() {
    // A value that would change the query if concatenated must only ever
    // compare as an ordinary string.
    let doc = catalog();
    let results = doc
        .evaluate_to_elements_with("//PLANT[ZONE[text()=$0]]", &["\"] | //PLANT | x[\""])
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn empty_expression_is_an_argument_error() {
    let doc = catalog();
    assert!(matches!(
        doc.evaluate_to_elements(""),
        Err(XmlError::Argument(_))
    ));
}

#[test]
fn malformed_expression_is_an_engine_error() {
    let doc = catalog();
    assert!(matches!(
        doc.evaluate_to_elements("//PLANT["),
        Err(XmlError::Engine(_))
    ));
}

#[test]
fn queries_work_on_immutable_documents() {
    // Query evaluation is a read; the access mode only gates mutation.
    let doc = catalog();
    assert_eq!(doc.access_mode(), AccessMode::Immutable);
    assert_eq!(doc.evaluate_to_elements("//PLANT").unwrap().len(), 5);
}

#[test]
fn copy_is_always_mutable() {
    let doc = catalog();
    let copy = doc.copy().unwrap();
    assert_eq!(copy.access_mode(), AccessMode::Mutable);
    copy.root_element().set_attribute("edited", "yes").unwrap();
    // The source is untouched by edits to the copy.
    assert!(doc.root_element().attribute("edited").unwrap().is_none());
}

#[test]
fn copies_preserve_cdata_whitespace() {
    let doc = Document::parse("<a><![CDATA[  keep  ]]></a>", AccessMode::Immutable).unwrap();
    let copy = doc.copy().unwrap();
    assert_eq!(
        copy.root_element().text().unwrap().as_deref(),
        Some("  keep  ")
    );
}

#[test]
fn new_document_has_named_root_and_is_mutable() {
    let doc = Document::new("RequiredQuestions").unwrap();
    assert_eq!(doc.access_mode(), AccessMode::Mutable);
    assert_eq!(doc.root_element().name().unwrap(), "RequiredQuestions");
    assert_eq!(
        doc.serialize(Output::Compact).unwrap(),
        "<RequiredQuestions/>"
    );
}

#[test]
fn new_document_rejects_invalid_root_name() {
    assert!(matches!(
        Document::new("not a name"),
        Err(XmlError::Argument(_))
    ));
}

#[test]
fn compact_serialization_round_trips() {
    let doc = Document::parse("<a><b x=\"1\">t</b></a>", AccessMode::Mutable).unwrap();
    assert_eq!(
        doc.serialize(Output::Compact).unwrap(),
        "<a><b x=\"1\">t</b></a>"
    );
}

#[test]
fn write_to_emits_serialized_bytes() {
    let doc = Document::parse("<a/>", AccessMode::Mutable).unwrap();
    let mut out = Vec::new();
    doc.write_to(&mut out, Output::Compact).unwrap();
    assert_eq!(out, b"<a/>");
}

#[test]
fn document_handles_share_one_tree() {
    let doc = Document::parse("<a/>", AccessMode::Mutable).unwrap();
    let other = doc.clone();
    doc.root_element().set_attribute("x", "1").unwrap();
    assert_eq!(
        other.root_element().attribute("x").unwrap().as_deref(),
        Some("1")
    );
}

#[test]
fn debug_formatting_is_available() {
    let doc = Document::parse("<a/>", AccessMode::Mutable).unwrap();
    assert!(format!("{doc:?}").contains("Document"));
    assert!(format!("{:?}", doc.root_element()).contains("Node"));
}
