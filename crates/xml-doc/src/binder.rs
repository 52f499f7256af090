//! Parameter binding for query expressions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use xml_engine::VariableResolver;

use crate::error::{Result, XmlError};

/// Binds caller-supplied values to `$variable` references so untrusted
/// values are never spliced into the expression text.
///
/// Built per query call and discarded after evaluation. Every key starts
/// out unused; resolving a key marks it used. A key still unused after
/// evaluation is almost always a caller bug (an off-by-one positional
/// value, a stale named binding), so [`ParamBinder::ensure_all_used`]
/// turns it into an error instead of ignoring it.
pub(crate) struct ParamBinder {
    params: BTreeMap<String, String>,
    used: Mutex<BTreeSet<String>>,
}

impl ParamBinder {
    /// Positional values: keys are `"0"`, `"1"`, … in the order given.
    pub(crate) fn positional<S: AsRef<str>>(values: &[S]) -> Self {
        let params = values
            .iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value.as_ref().to_string()))
            .collect();
        Self {
            params,
            used: Mutex::new(BTreeSet::new()),
        }
    }

    /// Explicitly named values.
    pub(crate) fn named(values: &BTreeMap<String, String>) -> Self {
        Self {
            params: values.clone(),
            used: Mutex::new(BTreeSet::new()),
        }
    }

    /// Fail if any supplied key was never resolved during evaluation. The
    /// reported key is the first unused one in sorted order.
    pub(crate) fn ensure_all_used(&self) -> Result<()> {
        let used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        match self.params.keys().find(|key| !used.contains(*key)) {
            Some(key) => Err(XmlError::UnusedBinding(key.clone())),
            None => Ok(()),
        }
    }
}

impl VariableResolver for ParamBinder {
    fn resolve(&self, local_name: &str) -> Option<String> {
        let value = self.params.get(local_name)?;
        self.used
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(local_name.to_string());
        Some(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_keys_are_stringified_indices() {
        let binder = ParamBinder::positional(&["a", "b"]);
        assert_eq!(binder.resolve("0"), Some("a".to_string()));
        assert_eq!(binder.resolve("1"), Some("b".to_string()));
        assert_eq!(binder.resolve("2"), None);
    }

    #[test]
    fn resolving_marks_used() {
        let binder = ParamBinder::positional(&["a", "b"]);
        binder.resolve("0");
        binder.resolve("1");
        assert!(binder.ensure_all_used().is_ok());
    }

    #[test]
    fn unused_key_is_reported_deterministically() {
        let binder = ParamBinder::positional(&["a", "b", "c"]);
        binder.resolve("0");
        match binder.ensure_all_used() {
            Err(XmlError::UnusedBinding(key)) => assert_eq!(key, "1"),
            other => panic!("expected unused binding error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_lookup_is_not_marked_used() {
        let mut params = BTreeMap::new();
        params.insert("zone".to_string(), "Annual".to_string());
        let binder = ParamBinder::named(&params);
        assert_eq!(binder.resolve("other"), None);
        assert!(matches!(
            binder.ensure_all_used(),
            Err(XmlError::UnusedBinding(key)) if key == "zone"
        ));
    }
}
