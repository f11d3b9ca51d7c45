// tests/scenarios.rs

mod common;
use crate::common::{init_tracing, with_timeout, TestResult};

use std::time::Duration;

use dagrun::{
    Backoff, CancelReason, SchedulerConfig, TaskError, TaskOptions, TaskScheduler, TaskStatus,
};
use dagrun_test_utils::{
    counted, fail_times, never_resolves, succeed_after, CallCounter, ConcurrencyProbe,
};
use tokio::time::Instant;

fn config(max_concurrent: usize) -> SchedulerConfig {
    SchedulerConfig::default().with_max_concurrent(max_concurrent)
}

#[tokio::test(start_paused = true)]
async fn higher_priority_runs_first_with_one_slot() -> TestResult {
    init_tracing();

    let probe = ConcurrencyProbe::new();
    let sched = TaskScheduler::new(config(1));
    sched.add_task(
        "A",
        probe.work("A", Duration::from_millis(10), 1u32),
        TaskOptions::new().priority(1),
    )?;
    sched.add_task(
        "B",
        probe.work("B", Duration::from_millis(10), 2u32),
        TaskOptions::new().priority(5),
    )?;

    let report = with_timeout(sched.run()).await?;

    assert_eq!(probe.order(), vec!["B", "A"]);
    assert_eq!(probe.peak(), 1);
    assert!(report.all_succeeded());
    assert_eq!(report.result("A"), Some(&1));
    assert_eq!(report.result("B"), Some(&2));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn equal_priority_keeps_insertion_order() -> TestResult {
    init_tracing();

    let probe = ConcurrencyProbe::new();
    let sched = TaskScheduler::new(config(1));
    for name in ["first", "second", "third"] {
        sched.add_task(
            name,
            probe.work(name, Duration::from_millis(5), ()),
            TaskOptions::new(),
        )?;
    }

    with_timeout(sched.run()).await?;
    assert_eq!(probe.order(), vec!["first", "second", "third"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_and_cancel_dependent() -> TestResult {
    init_tracing();

    let b_calls = CallCounter::new();
    let a_calls = CallCounter::new();
    let sched = TaskScheduler::new(config(4));
    sched.add_task(
        "A",
        counted(&a_calls, "a"),
        TaskOptions::new().after("B"),
    )?;
    sched.add_task(
        "B",
        fail_times(usize::MAX, &b_calls, "b"),
        TaskOptions::new().max_attempts(3),
    )?;

    let report = with_timeout(sched.run()).await?;

    let b = report.get("B").ok_or("missing B")?;
    assert_eq!(b.status, TaskStatus::Failed);
    assert_eq!(b.attempts, 3);
    assert_eq!(b_calls.get(), 3);
    assert!(matches!(b.error(), Some(TaskError::Failed { message }) if message.contains("planned failure 3")));

    let a = report.get("A").ok_or("missing A")?;
    assert_eq!(a.status, TaskStatus::Cancelled);
    assert_eq!(a.attempts, 0);
    assert_eq!(
        a.error().and_then(TaskError::cancel_reason),
        Some(&CancelReason::AncestorFailed {
            ancestor: "B".to_string()
        })
    );
    assert_eq!(a_calls.get(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retry_succeeds_after_backoff() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let sched = TaskScheduler::new(
        config(2).with_backoff(Backoff::Fixed(Duration::from_millis(100))),
    );
    sched.add_task(
        "flaky",
        fail_times(2, &calls, 7u8),
        TaskOptions::new().max_attempts(5),
    )?;

    let started = Instant::now();
    let report = with_timeout(sched.run()).await?;

    assert_eq!(report.result("flaky"), Some(&7));
    assert_eq!(report.get("flaky").map(|r| r.attempts), Some(3));
    assert_eq!(calls.get(), 3);
    assert!(started.elapsed() >= Duration::from_millis(200));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_slow_work() -> TestResult {
    init_tracing();

    let sched = TaskScheduler::new(config(1));
    sched.add_task(
        "slow",
        succeed_after(Duration::from_millis(500), ()),
        TaskOptions::new().timeout(Duration::from_millis(50)),
    )?;

    let started = Instant::now();
    let report = with_timeout(sched.run()).await?;
    let elapsed = started.elapsed();

    let slow = report.get("slow").ok_or("missing slow")?;
    assert_eq!(slow.status, TaskStatus::Failed);
    assert_eq!(
        slow.error(),
        Some(&TaskError::Timeout {
            after: Duration::from_millis(50)
        })
    );
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn never_resolving_work_times_out_on_every_attempt() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let sched: TaskScheduler<()> = TaskScheduler::new(config(1).with_timeout(Duration::from_millis(20)));
    sched.add_task("stuck", never_resolves(&calls), TaskOptions::new().max_attempts(2))?;

    let report = with_timeout(sched.run()).await?;
    let stuck = report.get("stuck").ok_or("missing stuck")?;
    assert_eq!(stuck.attempts, 2);
    assert_eq!(calls.get(), 2);
    assert!(stuck.error().is_some_and(TaskError::is_timeout));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_before_run_skips_work() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let other = CallCounter::new();
    let sched = TaskScheduler::new(config(2));
    sched.add_task("pending", counted(&calls, 1u8), TaskOptions::new())?;
    sched.add_task("independent", counted(&other, 2u8), TaskOptions::new())?;

    assert!(sched.cancel("pending"));
    assert!(!sched.cancel("does-not-exist"));

    let report = with_timeout(sched.run()).await?;
    assert_eq!(report.status("pending"), Some(TaskStatus::Cancelled));
    assert_eq!(
        report.get("pending").and_then(|r| r.error()).and_then(TaskError::cancel_reason),
        Some(&CancelReason::Explicit)
    );
    assert_eq!(calls.get(), 0);
    assert_eq!(report.result("independent"), Some(&2));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_during_run_cascades_to_dependents() -> TestResult {
    init_tracing();

    let victim_calls = CallCounter::new();
    let leaf_calls = CallCounter::new();
    let sched = TaskScheduler::new(config(2));
    sched
        .add_task("gate", succeed_after(Duration::from_millis(100), 0u8), TaskOptions::new())?
        .add_task("victim", counted(&victim_calls, 1u8), TaskOptions::new().after("gate"))?
        .add_task("leaf", counted(&leaf_calls, 2u8), TaskOptions::new().after("victim"))?;

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            sched.get_status("gate").map(|s| s.status),
            Some(TaskStatus::Running)
        );
        assert!(!sched.cancel("gate"), "running tasks cannot be cancelled");
        sched.cancel("victim")
    };

    let (report, cancelled) = with_timeout(async { tokio::join!(sched.run(), canceller) }).await;
    let report = report?;

    assert!(cancelled);
    assert_eq!(report.status("gate"), Some(TaskStatus::Succeeded));
    assert_eq!(report.status("victim"), Some(TaskStatus::Cancelled));
    assert_eq!(report.status("leaf"), Some(TaskStatus::Cancelled));
    assert_eq!(
        report.get("leaf").and_then(|r| r.error()).and_then(TaskError::cancel_reason),
        Some(&CancelReason::AncestorCancelled {
            ancestor: "victim".to_string()
        })
    );
    assert_eq!(victim_calls.get() + leaf_calls.get(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelling_last_pending_task_ends_the_run() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let sched: TaskScheduler<u8> = TaskScheduler::new(
        config(1).with_backoff(Backoff::Fixed(Duration::from_secs(3600))),
    );
    sched.add_task(
        "flaky",
        fail_times(usize::MAX, &calls, 0),
        TaskOptions::new().max_attempts(10),
    )?;
    let control = sched.control();

    let canceller = async move {
        // The first attempt fails at once; the task then waits out its backoff.
        tokio::time::sleep(Duration::from_millis(10)).await;
        control.cancel("flaky")
    };

    let (report, cancelled) = with_timeout(async { tokio::join!(sched.run(), canceller) }).await;
    let report = report?;

    assert!(cancelled);
    assert_eq!(report.status("flaky"), Some(TaskStatus::Cancelled));
    assert_eq!(report.get("flaky").map(|r| r.attempts), Some(1));
    assert_eq!(calls.get(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrency_cap_is_respected() -> TestResult {
    init_tracing();

    let probe = ConcurrencyProbe::new();
    let sched = TaskScheduler::new(config(3));
    for i in 0..10 {
        let name = format!("t{i}");
        sched.add_task(
            name.clone(),
            probe.work(&name, Duration::from_millis(20), i),
            TaskOptions::new(),
        )?;
    }

    let report = with_timeout(sched.run()).await?;

    assert_eq!(probe.peak(), 3);
    assert_eq!(probe.current(), 0);
    assert_eq!(report.len(), 10);
    assert!(report.all_succeeded());
    assert_eq!(report.count(TaskStatus::Succeeded), 10);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn diamond_runs_dependencies_before_dependents() -> TestResult {
    init_tracing();

    let probe = ConcurrencyProbe::new();
    let sched = TaskScheduler::new(config(4));
    sched
        .add_task("join", probe.work("join", Duration::from_millis(5), 4), TaskOptions::new().depends_on(["left", "right"]))?
        .add_task("left", probe.work("left", Duration::from_millis(30), 2), TaskOptions::new().after("root"))?
        .add_task("right", probe.work("right", Duration::from_millis(10), 3), TaskOptions::new().after("root"))?
        .add_task("root", probe.work("root", Duration::from_millis(5), 1), TaskOptions::new())?;

    let report = with_timeout(sched.run()).await?;

    let order = probe.order();
    assert_eq!(order.first().map(String::as_str), Some("root"));
    assert_eq!(order.last().map(String::as_str), Some("join"));
    assert_eq!(probe.peak(), 2);
    assert!(report.all_succeeded());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn second_run_returns_same_report_without_rerunning() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let sched = TaskScheduler::new(config(1));
    sched.add_task("once", counted(&calls, 9u16), TaskOptions::new())?;

    let first = with_timeout(sched.run()).await?;
    let second = with_timeout(sched.run()).await?;

    assert_eq!(first, second);
    assert_eq!(calls.get(), 1);
    assert_eq!(
        sched.get_status("once").map(|s| (s.status, s.attempts, s.result)),
        Some((TaskStatus::Succeeded, 1, Some(9)))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn work_items_observe_cancellation_token_on_timeout() -> TestResult {
    init_tracing();

    let observed = dagrun::CancellationToken::new();
    let seen = observed.clone();
    let sched = TaskScheduler::new(config(1));
    sched.add_task(
        "cooperative",
        move |token: dagrun::CancellationToken| {
            let seen = seen.clone();
            async move {
                token.cancelled().await;
                seen.cancel();
                Ok(())
            }
        },
        TaskOptions::new().timeout(Duration::from_millis(30)),
    )?;

    let report = with_timeout(sched.run()).await?;
    assert_eq!(report.status("cooperative"), Some(TaskStatus::Failed));
    with_timeout(observed.cancelled()).await;
    Ok(())
}

#[tokio::test]
async fn empty_scheduler_finishes_immediately() -> TestResult {
    let sched: TaskScheduler<()> = TaskScheduler::default();
    let report = with_timeout(sched.run()).await?;
    assert!(report.is_empty());
    Ok(())
}
