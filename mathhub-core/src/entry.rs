//! Stored question, question-variable and answer entries.
//!
//! Every entry carries a type tag that decides how it is treated when a
//! quest is served or graded. Tags are parsed into closed enums; a tag that
//! is missing or not recognised becomes the explicit `Undefined` variant so
//! that the data is kept and the ingestion path can reject it.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const TAG_TEXT: &str = "TEXT";
const TAG_LATEX: &str = "LATEX";
const TAG_FUNCTION: &str = "FUNCTION";
const TAG_FUNCTION_LEGACY: &str = "FUNC";
const TAG_UNDEFINED: &str = "UNDEF";

/// Reads a type tag leniently: anything that is not a string yields `None`.
fn read_tag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(tag)) => Ok(Some(tag)),
        _ => Ok(None),
    }
}

/// Kind of a [`QuestionEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QuestionKind {
    /// Plain text.
    Text,
    /// LaTeX markup.
    Latex,
    /// Unrecognised tag.
    #[default]
    Undefined,
}

impl QuestionKind {
    /// Parses a stored tag; unknown tags map to [`QuestionKind::Undefined`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            TAG_TEXT => Self::Text,
            TAG_LATEX => Self::Latex,
            _ => Self::Undefined,
        }
    }

    /// The tag written to storage and to responses.
    #[must_use]
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::Text => TAG_TEXT,
            Self::Latex => TAG_LATEX,
            Self::Undefined => TAG_UNDEFINED,
        }
    }
}

/// Kind of a [`QuestionVariableEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QuestionVariableKind {
    /// Literal value.
    Text,
    /// Source of a zero-argument function producing the value at serve time.
    Function,
    /// Unrecognised tag.
    #[default]
    Undefined,
}

impl QuestionVariableKind {
    /// Parses a stored tag; unknown tags map to [`QuestionVariableKind::Undefined`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            TAG_TEXT => Self::Text,
            TAG_FUNCTION | TAG_FUNCTION_LEGACY => Self::Function,
            _ => Self::Undefined,
        }
    }

    /// The tag written to storage and to responses.
    #[must_use]
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::Text => TAG_TEXT,
            Self::Function => TAG_FUNCTION,
            Self::Undefined => TAG_UNDEFINED,
        }
    }
}

/// Kind of an [`AnswerEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnswerKind {
    /// Literal expected answer.
    Text,
    /// LaTeX markup, never executed.
    Latex,
    /// Source of a function computing the expected answer from the
    /// resolved question variables.
    Function,
    /// Unrecognised tag.
    #[default]
    Undefined,
}

impl AnswerKind {
    /// Parses a stored tag; unknown tags map to [`AnswerKind::Undefined`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            TAG_TEXT => Self::Text,
            TAG_LATEX => Self::Latex,
            TAG_FUNCTION | TAG_FUNCTION_LEGACY => Self::Function,
            _ => Self::Undefined,
        }
    }

    /// The tag written to storage and to responses.
    #[must_use]
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::Text => TAG_TEXT,
            Self::Latex => TAG_LATEX,
            Self::Function => TAG_FUNCTION,
            Self::Undefined => TAG_UNDEFINED,
        }
    }
}

macro_rules! tagged_kind_serde {
    ($($kind:ty),+) => {$(
        impl Serialize for $kind {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_tag())
            }
        }

        impl<'de> Deserialize<'de> for $kind {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Ok(read_tag(deserializer)?.map_or(Self::Undefined, |tag| Self::from_tag(&tag)))
            }
        }

        impl fmt::Display for $kind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_tag())
            }
        }
    )+};
}

tagged_kind_serde!(QuestionKind, QuestionVariableKind, AnswerKind);

/// One block of a quest's question body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEntry {
    #[serde(rename = "type", default)]
    kind: QuestionKind,
    #[serde(default)]
    content: String,
}

impl QuestionEntry {
    /// Creates an entry from an already-parsed kind.
    pub fn new(kind: QuestionKind, content: impl Into<String>) -> Self {
        Self { kind, content: content.into() }
    }

    /// Creates an entry from a raw stored tag.
    pub fn from_tag(tag: &str, content: impl Into<String>) -> Self {
        Self::new(QuestionKind::from_tag(tag), content)
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// A named variable substituted into a question body.
///
/// `sign` is the token the rendered body references; `content` is either
/// the literal value or the source of a zero-argument function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionVariableEntry {
    #[serde(rename = "type", default)]
    kind: QuestionVariableKind,
    #[serde(default)]
    sign: String,
    #[serde(default)]
    content: String,
}

impl QuestionVariableEntry {
    /// Creates an entry from an already-parsed kind.
    pub fn new(kind: QuestionVariableKind, sign: impl Into<String>, content: impl Into<String>) -> Self {
        Self { kind, sign: sign.into(), content: content.into() }
    }

    /// Creates an entry from a raw stored tag.
    pub fn from_tag(tag: &str, sign: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(QuestionVariableKind::from_tag(tag), sign, content)
    }

    #[must_use]
    pub fn kind(&self) -> QuestionVariableKind {
        self.kind
    }

    #[must_use]
    pub fn sign(&self) -> &str {
        &self.sign
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// One expected answer slot of a quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntry {
    #[serde(rename = "type", default)]
    kind: AnswerKind,
    #[serde(default)]
    content: String,
}

impl AnswerEntry {
    /// Creates an entry from an already-parsed kind.
    pub fn new(kind: AnswerKind, content: impl Into<String>) -> Self {
        Self { kind, content: content.into() }
    }

    /// Creates an entry from a raw stored tag.
    pub fn from_tag(tag: &str, content: impl Into<String>) -> Self {
        Self::new(AnswerKind::from_tag(tag), content)
    }

    #[must_use]
    pub fn kind(&self) -> AnswerKind {
        self.kind
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tags_parse_to_undefined() {
        assert_eq!(QuestionKind::from_tag("HTML"), QuestionKind::Undefined);
        assert_eq!(QuestionVariableKind::from_tag("LATEX"), QuestionVariableKind::Undefined);
        assert_eq!(AnswerKind::from_tag("text"), AnswerKind::Undefined, "tags are case-sensitive");
    }

    #[test]
    fn legacy_function_tag_is_accepted() {
        assert_eq!(QuestionVariableKind::from_tag("FUNC"), QuestionVariableKind::Function);
        assert_eq!(AnswerKind::from_tag("FUNC"), AnswerKind::Function);
        assert_eq!(AnswerKind::Function.as_tag(), "FUNCTION", "writes use the current tag");
    }

    #[test]
    fn entry_with_missing_or_non_string_type_is_kept_as_undefined() {
        let missing: AnswerEntry = match serde_json::from_str(r#"{"content":"42"}"#) {
            Ok(e) => e,
            Err(e) => panic!("deserialize failed: {e}"),
        };
        assert_eq!(missing.kind(), AnswerKind::Undefined);
        assert_eq!(missing.content(), "42", "content must survive an unknown tag");

        let numeric: QuestionEntry = match serde_json::from_str(r#"{"type":7,"content":"x"}"#) {
            Ok(e) => e,
            Err(e) => panic!("deserialize failed: {e}"),
        };
        assert_eq!(numeric.kind(), QuestionKind::Undefined);

        let null: QuestionVariableEntry =
            match serde_json::from_str(r#"{"type":null,"sign":"a","content":"1"}"#) {
                Ok(e) => e,
                Err(e) => panic!("deserialize failed: {e}"),
            };
        assert_eq!(null.kind(), QuestionVariableKind::Undefined);
    }

    #[test]
    fn variable_entry_serializes_with_type_field() {
        let entry = QuestionVariableEntry::new(QuestionVariableKind::Function, "x", "() => 1");
        let json = match serde_json::to_value(&entry) {
            Ok(v) => v,
            Err(e) => panic!("serialize failed: {e}"),
        };
        assert_eq!(json["type"], "FUNCTION");
        assert_eq!(json["sign"], "x");
        assert_eq!(json["content"], "() => 1");
    }
}
