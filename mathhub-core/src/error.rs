/// Errors produced by the `mathhub-core` crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// An entry carried a type tag outside its kind's defined values.
    #[error("entry {index} of '{field}' has an undefined type")]
    UndefinedKind { field: &'static str, index: usize },

    /// A list query asked for a range that ends before it begins.
    #[error("invalid query range {begin}..={end}")]
    InvalidQueryRange { begin: i64, end: i64 },

    /// A quest with the same code is already stored.
    #[error("duplicated question number '{0}'")]
    DuplicateCode(String),
}
