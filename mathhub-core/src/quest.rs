//! Quest records, list queries and the shapes served to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{
    AnswerEntry, AnswerKind, QuestionEntry, QuestionKind, QuestionVariableEntry, QuestionVariableKind,
};
use crate::error::CoreError;
use crate::id::{QuestId, UserId};
use crate::value::SandboxValue;

/// Publication state of a stored quest. Only published quests are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    Draft,
    #[default]
    Published,
}

/// A quest as held by the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestRecord {
    #[serde(default)]
    pub id: QuestId,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub question: Vec<QuestionEntry>,
    #[serde(default)]
    pub question_var: Vec<QuestionVariableEntry>,
    #[serde(default)]
    pub answer: Vec<AnswerEntry>,
    #[serde(default)]
    pub status: QuestStatus,
    pub publisher_id: UserId,
    #[serde(default)]
    pub publisher_name: String,
    #[serde(default = "Utc::now")]
    pub publish_time: DateTime<Utc>,
}

impl QuestRecord {
    /// Whether the quest may be served to readers.
    #[must_use]
    pub fn is_servable(&self) -> bool {
        self.status == QuestStatus::Published
    }

    /// The row shape returned by quest listings.
    #[must_use]
    pub fn summary(&self) -> QuestSummary {
        QuestSummary {
            id: self.id,
            title: self.title.clone(),
            publish_time: self.publish_time,
            publisher_name: self.publisher_name.clone(),
        }
    }
}

/// One row of a quest listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestSummary {
    pub id: QuestId,
    pub title: String,
    pub publish_time: DateTime<Utc>,
    pub publisher_name: String,
}

/// A question variable after its function, if any, has been evaluated.
///
/// Lives for a single request and is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedQuestionVariable {
    #[serde(rename = "type")]
    pub kind: QuestionVariableKind,
    pub sign: String,
    pub content: SandboxValue,
}

/// The question payload served to a reader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestContent {
    pub code: String,
    pub title: String,
    pub question: Vec<QuestionEntry>,
    pub question_var: Vec<ResolvedQuestionVariable>,
}

/// A quest submitted for publication.
#[derive(Debug, Clone, Deserialize)]
pub struct NewQuest {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub question: Vec<QuestionEntry>,
    #[serde(default)]
    pub question_var: Vec<QuestionVariableEntry>,
    #[serde(default)]
    pub answer: Vec<AnswerEntry>,
}

impl NewQuest {
    /// Rejects any entry whose type tag was not recognised.
    ///
    /// Undefined kinds are tolerated when reading legacy rows but must never
    /// enter storage through this path.
    ///
    /// # Errors
    /// Returns [`CoreError::UndefinedKind`] naming the first offending entry.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(index) = self.question.iter().position(|e| e.kind() == QuestionKind::Undefined) {
            return Err(CoreError::UndefinedKind { field: "question", index });
        }
        if let Some(index) =
            self.question_var.iter().position(|e| e.kind() == QuestionVariableKind::Undefined)
        {
            return Err(CoreError::UndefinedKind { field: "question_var", index });
        }
        if let Some(index) = self.answer.iter().position(|e| e.kind() == AnswerKind::Undefined) {
            return Err(CoreError::UndefinedKind { field: "answer", index });
        }
        Ok(())
    }

    /// Turns a validated submission into a published record.
    ///
    /// # Errors
    /// Returns [`CoreError::UndefinedKind`] if validation fails.
    pub fn into_record(
        self,
        publisher_id: UserId,
        publisher_name: impl Into<String>,
    ) -> Result<QuestRecord, CoreError> {
        self.validate()?;
        Ok(QuestRecord {
            id: QuestId::new(),
            code: self.code,
            title: self.title,
            question: self.question,
            question_var: self.question_var,
            answer: self.answer,
            status: QuestStatus::Published,
            publisher_id,
            publisher_name: publisher_name.into(),
            publish_time: Utc::now(),
        })
    }
}

/// Inclusive index range requested by a quest listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRange {
    pub begin: i64,
    pub end: i64,
}

impl QueryRange {
    /// Converts the range into `(limit, offset)`.
    ///
    /// The limit is at least one row and the offset never negative.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidQueryRange`] when `end < begin`.
    pub fn window(self) -> Result<(usize, usize), CoreError> {
        if self.end < self.begin {
            return Err(CoreError::InvalidQueryRange { begin: self.begin, end: self.end });
        }
        let limit = self.end.saturating_sub(self.begin).saturating_add(1).max(1);
        let offset = self.begin.max(0);
        Ok((
            usize::try_from(limit).unwrap_or(usize::MAX),
            usize::try_from(offset).unwrap_or(usize::MAX),
        ))
    }
}
