//! Document access mode

/// Whether a document accepts mutations.
///
/// Fixed at construction: the mode of a document never changes, but an
/// element's owner reference can (via detach and attach), so mutating
/// operations re-check the mode through the current owner on every call.
/// [`Document::copy`](crate::Document::copy) always yields a mutable copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Elements owned by the document may be mutated.
    Mutable,
    /// Every mutating operation on an owned element fails without any
    /// partial change.
    Immutable,
}
