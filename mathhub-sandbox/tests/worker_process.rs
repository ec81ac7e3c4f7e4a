//! Integration tests: quest evaluation through real `mathhub-worker`
//! processes.

#![cfg(unix)]

use std::time::{Duration, Instant};

use mathhub_core::{AnswerEntry, AnswerKind, QuestionVariableEntry, QuestionVariableKind, SandboxValue};
use mathhub_sandbox::{
    GradeOutcome, ProcessBackend, QuestEvaluator, Sandbox, SandboxError, SandboxLimits, SandboxRegistry,
    SandboxState,
};

fn backend() -> ProcessBackend {
    ProcessBackend::new(env!("CARGO_BIN_EXE_mathhub-worker"))
}

async fn sandbox(limits: SandboxLimits) -> Sandbox {
    match Sandbox::create(&backend(), limits, SandboxRegistry::default()).await {
        Ok(s) => s,
        Err(e) => panic!("worker failed to start: {e}"),
    }
}

fn scaled_sum() -> (Vec<QuestionVariableEntry>, Vec<AnswerEntry>) {
    (
        vec![QuestionVariableEntry::new(QuestionVariableKind::Function, "x", "() => 2 + 3")],
        vec![AnswerEntry::new(AnswerKind::Function, "(x) => x * 10")],
    )
}

#[tokio::test]
async fn correct_submission_is_graded_true() {
    let evaluator = QuestEvaluator::new(backend(), SandboxLimits::default());
    let (vars, answers) = scaled_sum();
    let outcome = evaluator.grade_submission(&vars, &answers, None, &["50".into()]).await;
    assert_eq!(outcome.ok(), Some(GradeOutcome::from_verdict(true)));
    assert_eq!(evaluator.active_count(), 0);
}

#[tokio::test]
async fn wrong_submission_is_graded_false() {
    let evaluator = QuestEvaluator::new(backend(), SandboxLimits::default());
    let (vars, answers) = scaled_sum();
    let outcome = evaluator.grade_submission(&vars, &answers, None, &["51".into()]).await;
    assert_eq!(outcome.ok(), Some(GradeOutcome::from_verdict(false)));
}

#[tokio::test]
async fn infinite_loop_times_out_within_bounded_wall_time() {
    let limits = SandboxLimits::default().with_timeout(Duration::from_millis(500));
    let evaluator = QuestEvaluator::new(backend(), limits);
    let vars = vec![QuestionVariableEntry::new(
        QuestionVariableKind::Function,
        "x",
        "() => { while (true) {} }",
    )];
    let started = Instant::now();
    let result = evaluator.grade_submission(&vars, &[], None, &[]).await;
    match result {
        Err(e) => assert_eq!(e.sandbox_error().kind(), "ExecutionTimeout"),
        Ok(outcome) => panic!("expected timeout, got {outcome:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(5), "worker must be killed promptly");
    assert_eq!(evaluator.active_count(), 0);
}

#[tokio::test]
async fn run_after_dispose_is_rejected() {
    let mut sandbox = sandbox(SandboxLimits::default()).await;
    let ctx = match sandbox.create_context().await {
        Ok(c) => c,
        Err(e) => panic!("create_context failed: {e}"),
    };
    assert!(sandbox.dispose().await.is_ok());
    let result = sandbox.compile_and_run(ctx, "() => 1", &[]).await;
    assert!(matches!(result, Err(SandboxError::Disposed(_))), "got {result:?}");
    assert!(matches!(sandbox.dispose().await, Err(SandboxError::Disposed(_))));
}

#[tokio::test]
async fn contexts_are_isolated_within_a_worker() {
    let mut sandbox = sandbox(SandboxLimits::default()).await;
    let (first, second) = match (sandbox.create_context().await, sandbox.create_context().await) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => panic!("create_context failed: {e}"),
    };
    let set = sandbox.compile_and_run(first, "() => { globalThis.g = 1; return g; }", &[]).await;
    assert_eq!(set.ok(), Some(SandboxValue::from(1)));
    let read = sandbox.compile_and_run(second, "() => typeof g", &[]).await;
    assert_eq!(read.ok(), Some(SandboxValue::from("undefined")));
    assert!(sandbox.dispose().await.is_ok());
}

#[tokio::test]
async fn host_capabilities_are_absent() {
    let mut sandbox = sandbox(SandboxLimits::default()).await;
    let ctx = match sandbox.create_context().await {
        Ok(c) => c,
        Err(e) => panic!("create_context failed: {e}"),
    };
    let globals = "() => [typeof require, typeof process, typeof fetch, typeof Deno, typeof setTimeout].join()";
    let result = sandbox.compile_and_run(ctx, globals, &[]).await;
    assert_eq!(
        result.ok(),
        Some(SandboxValue::from("undefined,undefined,undefined,undefined,undefined"))
    );
    assert!(sandbox.dispose().await.is_ok());
}

#[tokio::test]
async fn special_numbers_cross_the_pipe_exactly() {
    let mut sandbox = sandbox(SandboxLimits::default()).await;
    let ctx = match sandbox.create_context().await {
        Ok(c) => c,
        Err(e) => panic!("create_context failed: {e}"),
    };
    let args = [SandboxValue::Number(-0.0), SandboxValue::Number(f64::NAN), SandboxValue::Number(f64::INFINITY)];
    let result = sandbox
        .compile_and_run(ctx, "(z, n, i) => [Object.is(z, -0), Number.isNaN(n), i === Infinity, z, n]", &args)
        .await;
    match result {
        Ok(SandboxValue::Array(items)) => {
            assert_eq!(&items[..3], &[true.into(), true.into(), true.into()]);
            assert!(matches!(items[3], SandboxValue::Number(z) if z == 0.0 && z.is_sign_negative()));
            assert!(matches!(items[4], SandboxValue::Number(n) if n.is_nan()));
        }
        other => panic!("expected an array, got {other:?}"),
    }
    assert!(sandbox.dispose().await.is_ok());
}

#[tokio::test]
async fn deeply_nested_source_is_user_error_and_worker_survives() {
    let mut sandbox = sandbox(SandboxLimits::default()).await;
    let ctx = match sandbox.create_context().await {
        Ok(c) => c,
        Err(e) => panic!("create_context failed: {e}"),
    };
    let nested = format!("() => {}1{}", "[".repeat(8000), "]".repeat(8000));
    let result = sandbox.compile_and_run(ctx, &nested, &[]).await;
    assert!(matches!(result, Err(SandboxError::UserCode { .. })), "got {result:?}");
    assert_eq!(sandbox.state(), SandboxState::Live);

    let result = sandbox.compile_and_run(ctx, "() => 6 * 7", &[]).await;
    assert_eq!(result.ok(), Some(SandboxValue::from(42)));
    assert!(sandbox.dispose().await.is_ok());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn memory_ceiling_kills_only_the_worker() {
    let limits = SandboxLimits::default()
        .with_memory_limit_mib(64)
        .with_timeout(Duration::from_secs(20));
    let mut sandbox = sandbox(limits).await;
    let ctx = match sandbox.create_context().await {
        Ok(c) => c,
        Err(e) => panic!("create_context failed: {e}"),
    };
    let hog = "() => { const keep = []; for (;;) { keep.push('x'.repeat(1 << 20) + keep.length); } }";
    let result = sandbox.compile_and_run(ctx, hog, &[]).await;
    assert!(
        matches!(
            result,
            Err(SandboxError::ResourceExhausted { .. } | SandboxError::ExecutionTimeout { .. })
        ),
        "got {result:?}"
    );
    assert_eq!(sandbox.state(), SandboxState::Tainted);
    assert!(sandbox.dispose().await.is_ok());
}
