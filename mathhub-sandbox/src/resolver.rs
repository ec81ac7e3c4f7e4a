//! Resolution of dynamic quest fields.
//!
//! FUNCTION entries are evaluated inside the request's sandbox, each in a
//! context of its own; every other kind passes through as its literal
//! content. Entries resolve strictly in stored order and the first failure
//! aborts the batch, so a partially resolved list never escapes.

use mathhub_core::{
    AnswerEntry, AnswerKind, QuestionVariableEntry, QuestionVariableKind, ResolvedQuestionVariable,
    SandboxValue, SourceDigest,
};

use crate::error::{EntryField, ResolveError, SandboxError};
use crate::handle::Sandbox;

/// Evaluate question variables. FUNCTION entries are called with no
/// arguments; TEXT and unrecognised kinds become their content string.
///
/// # Errors
/// Returns a [`ResolveError`] naming the first entry that failed.
pub async fn resolve_variables(
    sandbox: &mut Sandbox,
    entries: &[QuestionVariableEntry],
) -> Result<Vec<ResolvedQuestionVariable>, ResolveError> {
    let mut resolved = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let content = match entry.kind() {
            QuestionVariableKind::Function => {
                call_entry(sandbox, EntryField::QuestionVariable, index, entry.content(), &[]).await?
            }
            QuestionVariableKind::Text | QuestionVariableKind::Undefined => {
                SandboxValue::String(entry.content().to_owned())
            }
        };
        resolved.push(ResolvedQuestionVariable {
            kind: entry.kind(),
            sign: entry.sign().to_owned(),
            content,
        });
    }
    Ok(resolved)
}

/// Compute the expected answers. FUNCTION entries receive the variable
/// values as positional arguments; TEXT, LATEX and unrecognised kinds
/// become their content string.
///
/// # Errors
/// Returns a [`ResolveError`] naming the first entry that failed.
pub async fn resolve_answers(
    sandbox: &mut Sandbox,
    entries: &[AnswerEntry],
    variables: &[SandboxValue],
) -> Result<Vec<SandboxValue>, ResolveError> {
    let mut resolved = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let value = match entry.kind() {
            AnswerKind::Function => {
                call_entry(sandbox, EntryField::Answer, index, entry.content(), variables).await?
            }
            AnswerKind::Text | AnswerKind::Latex | AnswerKind::Undefined => {
                SandboxValue::String(entry.content().to_owned())
            }
        };
        resolved.push(value);
    }
    Ok(resolved)
}

/// The values of resolved variables, in stored order.
#[must_use]
pub fn variable_values(resolved: &[ResolvedQuestionVariable]) -> Vec<SandboxValue> {
    resolved.iter().map(|v| v.content.clone()).collect()
}

async fn call_entry(
    sandbox: &mut Sandbox,
    field: EntryField,
    index: usize,
    source: &str,
    args: &[SandboxValue],
) -> Result<SandboxValue, ResolveError> {
    let digest = SourceDigest::of(source);
    run_in_fresh_context(sandbox, source, args).await.map_err(|e| {
        tracing::info!(
            sandbox = %sandbox.id(),
            %field,
            index,
            source = %digest.short(),
            kind = e.kind(),
            error = %e,
            "entry failed to resolve"
        );
        ResolveError::new(field, index, e)
    })
}

async fn run_in_fresh_context(
    sandbox: &mut Sandbox,
    source: &str,
    args: &[SandboxValue],
) -> Result<SandboxValue, SandboxError> {
    let context = sandbox.create_context().await?;
    sandbox.compile_and_run(context, source, args).await
}
