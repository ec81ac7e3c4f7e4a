//! Sample quests demonstrating the schema.
//!
//! `A01` generates its operands with functions and checks the answer with a
//! function; `A02` is fully static; `A03` is an unpublished draft.

use chrono::{Duration, Utc};

use crate::entry::{
    AnswerEntry, AnswerKind, QuestionEntry, QuestionKind, QuestionVariableEntry, QuestionVariableKind,
};
use crate::id::{QuestId, UserId};
use crate::quest::{QuestRecord, QuestStatus};

/// Returns the three sample quests, oldest first.
#[must_use]
pub fn sample_quests() -> Vec<QuestRecord> {
    let now = Utc::now();

    let sum = QuestRecord {
        id: QuestId::new(),
        code: "A01".to_owned(),
        title: "Scaled sum".to_owned(),
        question: vec![
            QuestionEntry::new(QuestionKind::Text, "Compute ten times the sum of"),
            QuestionEntry::new(QuestionKind::Latex, "\\(x + y\\)"),
        ],
        question_var: vec![
            QuestionVariableEntry::new(QuestionVariableKind::Function, "x", "() => 2 + 3"),
            QuestionVariableEntry::new(QuestionVariableKind::Text, "y", "4"),
        ],
        answer: vec![AnswerEntry::new(AnswerKind::Function, "(x, y) => (x + Number(y)) * 10")],
        status: QuestStatus::Published,
        publisher_id: UserId::new("author-1"),
        publisher_name: "Ms. Lin".to_owned(),
        publish_time: now - Duration::days(2),
    };

    let root = QuestRecord {
        id: QuestId::new(),
        code: "A02".to_owned(),
        title: "Square root".to_owned(),
        question: vec![QuestionEntry::new(QuestionKind::Latex, "\\sqrt{144}")],
        question_var: vec![],
        answer: vec![AnswerEntry::new(AnswerKind::Text, "12")],
        status: QuestStatus::Published,
        publisher_id: UserId::new("author-1"),
        publisher_name: "Ms. Lin".to_owned(),
        publish_time: now - Duration::days(1),
    };

    let draft = QuestRecord {
        id: QuestId::new(),
        code: "A03".to_owned(),
        title: "Unfinished".to_owned(),
        question: vec![QuestionEntry::new(QuestionKind::Text, "TBD")],
        question_var: vec![],
        answer: vec![],
        status: QuestStatus::Draft,
        publisher_id: UserId::new("author-2"),
        publisher_name: "Mr. Chen".to_owned(),
        publish_time: now,
    };

    vec![sum, root, draft]
}
