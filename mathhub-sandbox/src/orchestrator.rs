//! Request-level orchestration on top of a [`SandboxBackend`].
//!
//! Every request gets one sandbox of its own, never pooled, and the
//! sandbox is disposed on every exit path before the response is built.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use mathhub_core::{AnswerEntry, QuestContent, QuestRecord, QuestionVariableEntry, SandboxValue};

use crate::backend::SandboxBackend;
use crate::config::SandboxLimits;
use crate::error::{EvaluationError, ResolveError, SandboxError};
use crate::grading::{grade, GradeOutcome};
use crate::handle::Sandbox;
use crate::resolver;

/// Set of sandboxes that have been created and not yet released.
#[derive(Debug, Clone, Default)]
pub struct SandboxRegistry {
    active: Arc<Mutex<BTreeSet<Uuid>>>,
}

impl SandboxRegistry {
    pub(crate) fn insert(&self, id: Uuid) {
        self.lock().insert(id);
    }

    pub(crate) fn release(&self, id: Uuid) -> bool {
        self.lock().remove(&id)
    }

    /// Whether `id` is still active.
    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.lock().contains(&id)
    }

    /// Number of active sandboxes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<Uuid>> {
        // The set stays consistent even if a holder panicked.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves quest content and grades submissions, one sandbox per call.
///
/// All operations are safe to call concurrently.
pub struct QuestEvaluator<B: SandboxBackend> {
    backend: B,
    limits: SandboxLimits,
    registry: SandboxRegistry,
}

impl<B: SandboxBackend> QuestEvaluator<B> {
    /// Create an evaluator that allocates sandboxes from `backend`.
    #[must_use]
    pub fn new(backend: B, limits: SandboxLimits) -> Self {
        Self { backend, limits, registry: SandboxRegistry::default() }
    }

    /// The backend sandboxes are allocated from.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Limits applied to every sandbox.
    #[must_use]
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Allocate a sandbox and register it as active.
    ///
    /// # Errors
    /// Propagates errors from the underlying [`SandboxBackend::spawn`].
    pub async fn create_sandbox(&self) -> Result<Sandbox, SandboxError> {
        Sandbox::create(&self.backend, self.limits.clone(), self.registry.clone()).await
    }

    /// Build the question payload for `record`, with FUNCTION variables
    /// replaced by their values.
    ///
    /// # Errors
    /// Returns [`EvaluationError::Sandbox`] if no sandbox can be allocated,
    /// or [`EvaluationError::Resolve`] if a variable fails to resolve.
    pub async fn resolve_quest(&self, record: &QuestRecord) -> Result<QuestContent, EvaluationError> {
        let mut sandbox = self.create_sandbox().await?;
        let resolved = resolver::resolve_variables(&mut sandbox, &record.question_var).await;
        self.release(sandbox).await;

        let question_var = resolved?;
        tracing::info!(quest = %record.id, code = %record.code, variables = question_var.len(), "quest resolved");
        Ok(QuestContent {
            code: record.code.clone(),
            title: record.title.clone(),
            question: record.question.clone(),
            question_var,
        })
    }

    /// Grade `submitted` against the quest's answers.
    ///
    /// With `supplied_variables`, those values feed the answer functions;
    /// otherwise the stored variables are resolved first in the same sandbox.
    /// Grading happens after the sandbox is disposed.
    ///
    /// # Errors
    /// Returns [`EvaluationError::Sandbox`] if no sandbox can be allocated,
    /// or [`EvaluationError::Resolve`] if a variable or answer fails.
    pub async fn grade_submission(
        &self,
        variables: &[QuestionVariableEntry],
        answers: &[AnswerEntry],
        supplied_variables: Option<Vec<SandboxValue>>,
        submitted: &[SandboxValue],
    ) -> Result<GradeOutcome, EvaluationError> {
        let mut sandbox = self.create_sandbox().await?;
        let expected = expected_answers(&mut sandbox, variables, answers, supplied_variables).await;
        self.release(sandbox).await;

        let outcome = GradeOutcome::from_verdict(grade(&expected?, submitted));
        tracing::info!(correct = outcome.is_correct, answers = submitted.len(), "submission graded");
        Ok(outcome)
    }

    /// Number of sandboxes currently alive.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    async fn release(&self, mut sandbox: Sandbox) {
        if let Err(e) = sandbox.dispose().await {
            tracing::warn!(sandbox = %sandbox.id(), error = %e, "dispose failed");
        }
    }
}

async fn expected_answers(
    sandbox: &mut Sandbox,
    variables: &[QuestionVariableEntry],
    answers: &[AnswerEntry],
    supplied_variables: Option<Vec<SandboxValue>>,
) -> Result<Vec<SandboxValue>, ResolveError> {
    let values = match supplied_variables {
        Some(values) => values,
        None => resolver::variable_values(&resolver::resolve_variables(sandbox, variables).await?),
    };
    resolver::resolve_answers(sandbox, answers, &values).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use mathhub_core::samples::sample_quests;
    use mathhub_core::{AnswerKind, QuestionVariableKind};

    use super::*;
    use crate::backend::SandboxRuntime;
    use crate::InlineBackend;

    struct AlwaysFailBackend;

    #[async_trait]
    impl SandboxBackend for AlwaysFailBackend {
        async fn spawn(&self, _limits: &SandboxLimits) -> Result<Box<dyn SandboxRuntime>, SandboxError> {
            Err(SandboxError::exhausted("mock always fails"))
        }

        fn name(&self) -> &'static str {
            "always-fail"
        }
    }

    fn evaluator() -> QuestEvaluator<InlineBackend> {
        QuestEvaluator::new(InlineBackend::new(), SandboxLimits::default())
    }

    fn scaled_sum() -> (Vec<QuestionVariableEntry>, Vec<AnswerEntry>) {
        (
            vec![QuestionVariableEntry::new(QuestionVariableKind::Function, "x", "() => 2 + 3")],
            vec![AnswerEntry::new(AnswerKind::Function, "(x) => x * 10")],
        )
    }

    #[tokio::test]
    async fn active_count_starts_at_zero() {
        let evaluator = QuestEvaluator::new(AlwaysFailBackend, SandboxLimits::default());
        assert_eq!(evaluator.active_count(), 0, "new evaluator must have zero active sandboxes");
    }

    #[tokio::test]
    async fn spawn_failure_propagates() {
        let evaluator = QuestEvaluator::new(AlwaysFailBackend, SandboxLimits::default());
        let record = sample_quests().remove(0);
        let result = evaluator.resolve_quest(&record).await;
        assert!(
            matches!(result, Err(EvaluationError::Sandbox(SandboxError::ResourceExhausted { .. }))),
            "resolve_quest must propagate ResourceExhausted"
        );
    }

    #[tokio::test]
    async fn correct_answer_grades_true() {
        let evaluator = evaluator();
        let (vars, answers) = scaled_sum();
        let outcome = evaluator.grade_submission(&vars, &answers, None, &["50".into()]).await;
        assert_eq!(outcome.ok(), Some(GradeOutcome::from_verdict(true)));
        assert_eq!(evaluator.active_count(), 0);
    }

    #[tokio::test]
    async fn wrong_answer_grades_false() {
        let evaluator = evaluator();
        let (vars, answers) = scaled_sum();
        let outcome = evaluator.grade_submission(&vars, &answers, None, &["51".into()]).await;
        assert_eq!(outcome.ok(), Some(GradeOutcome::from_verdict(false)));
    }

    #[tokio::test]
    async fn supplied_variables_override_stored_ones() {
        let evaluator = evaluator();
        let (vars, answers) = scaled_sum();
        let outcome = evaluator
            .grade_submission(&vars, &answers, Some(vec![SandboxValue::from(7)]), &["70".into()])
            .await;
        assert_eq!(outcome.ok(), Some(GradeOutcome::from_verdict(true)));
    }

    #[tokio::test]
    async fn runaway_variable_times_out_and_is_disposed() {
        let limits = SandboxLimits::default().with_timeout(Duration::from_millis(300));
        let evaluator = QuestEvaluator::new(InlineBackend::new(), limits);
        let vars = vec![QuestionVariableEntry::new(
            QuestionVariableKind::Function,
            "x",
            "() => { while (true) {} }",
        )];
        let started = std::time::Instant::now();
        let result = evaluator.grade_submission(&vars, &[], None, &[]).await;
        match result {
            Err(e) => assert_eq!(e.sandbox_error().kind(), "ExecutionTimeout"),
            Ok(outcome) => panic!("expected timeout, got {outcome:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5), "timeout must bound wall time");
        assert_eq!(evaluator.active_count(), 0, "a timed-out sandbox must still be released");
    }

    #[tokio::test]
    async fn resolve_quest_replaces_function_variables() {
        let evaluator = evaluator();
        let record = sample_quests().remove(0);
        let content = match evaluator.resolve_quest(&record).await {
            Ok(c) => c,
            Err(e) => panic!("resolve_quest failed: {e}"),
        };
        assert_eq!(content.code, "A01");
        assert_eq!(content.question_var[0].content, SandboxValue::from(5));
        assert_eq!(content.question_var[1].content, SandboxValue::from("4"));
        assert_eq!(evaluator.active_count(), 0);
    }

    #[test]
    fn registry_tracks_membership() {
        let registry = SandboxRegistry::default();
        let id = Uuid::new_v4();
        registry.insert(id);
        assert!(registry.contains(id));
        assert!(registry.release(id));
        assert!(!registry.release(id), "second release must report absence");
        assert!(registry.is_empty());
    }
}
