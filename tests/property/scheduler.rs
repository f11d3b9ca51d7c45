use std::collections::{BTreeSet, HashMap, HashSet};
use std::num::NonZeroUsize;

use proptest::prelude::*;

use dagrun::dag::{work_fn, Scheduler, TaskSpec, TaskStatus};
use dagrun::errors::TaskError;
use dagrun::RetryPolicy;

/// One generated task: dependencies, priority, max_attempts.
#[derive(Debug, Clone)]
struct GenTask {
    deps: BTreeSet<usize>,
    priority: i32,
    max_attempts: u32,
}

// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<GenTask>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<usize>(), 0..4),
                -3i32..=3,
                1u32..=3,
            ),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (potential, priority, max_attempts))| GenTask {
                    deps: if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    },
                    priority,
                    max_attempts,
                })
                .collect()
        })
    })
}

fn name(i: usize) -> String {
    format!("task_{i}")
}

fn build(tasks: &[GenTask], max_concurrent: usize) -> Scheduler<usize> {
    let mut scheduler = Scheduler::new(
        NonZeroUsize::new(max_concurrent).expect("max_concurrent >= 1"),
        RetryPolicy::default(),
    );
    // Register in reverse so dependencies are usually added after dependents.
    for (i, t) in tasks.iter().enumerate().rev() {
        scheduler
            .add_task(TaskSpec {
                id: name(i),
                work: work_fn(|_| async { Ok(0) }),
                priority: t.priority,
                dependencies: t.deps.iter().map(|d| name(*d)).collect(),
                max_attempts: t.max_attempts,
                timeout: None,
            })
            .expect("generated ids are unique");
    }
    scheduler
}

proptest! {
    #[test]
    fn manual_scheduler_always_terminates_within_bounds(
        tasks in dag_strategy(12),
        max_concurrent in 1usize..=4,
        // Number of failing attempts per task before it succeeds.
        failures in proptest::collection::vec(0u32..=4, 12),
        pick in any::<u64>(),
    ) {
        let mut scheduler = build(&tasks, max_concurrent);
        let step = scheduler.start().expect("generated graphs are valid");

        // (task, attempt) pairs currently "executing".
        let mut executing: Vec<(String, u32)> = step
            .newly_scheduled
            .iter()
            .map(|a| (a.task.clone(), a.attempt))
            .collect();
        let mut executions: HashMap<String, u32> = HashMap::new();
        let mut succeeded: HashSet<String> = HashSet::new();
        let mut seed = pick;
        let mut steps = 0usize;

        prop_assert!(executing.len() <= max_concurrent);

        while !executing.is_empty() {
            steps += 1;
            prop_assert!(steps < 10_000, "scheduler did not terminate");

            // Complete an arbitrary in-flight attempt.
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let (task, attempt) = executing.remove((seed >> 33) as usize % executing.len());
            let idx: usize = task["task_".len()..].parse().expect("generated name");

            // Dependencies must have succeeded before the task ran.
            for dep in &tasks[idx].deps {
                prop_assert!(succeeded.contains(&name(*dep)), "{task} ran before {}", name(*dep));
            }
            *executions.entry(task.clone()).or_default() += 1;

            let outcome = if attempt <= failures[idx] {
                Err(TaskError::Failed { message: format!("fail {attempt}") })
            } else {
                Ok(idx)
            };
            if outcome.is_ok() {
                succeeded.insert(task.clone());
            }

            let step = scheduler
                .step_completion(&task, attempt, outcome)
                .expect("no invariant violations");
            executing.extend(step.newly_scheduled.iter().map(|a| (a.task.clone(), a.attempt)));

            prop_assert!(executing.len() <= max_concurrent);
            prop_assert_eq!(scheduler.running_count(), executing.len());
        }

        prop_assert!(scheduler.is_finished());
        let report = scheduler.report().expect("finished run has a report");
        prop_assert_eq!(report.len(), tasks.len());

        for (i, t) in tasks.iter().enumerate() {
            let r = report.get(&name(i)).expect("every task reported");
            prop_assert!(r.status.is_terminal());
            prop_assert!(r.attempts <= t.max_attempts);
            prop_assert_eq!(r.attempts, executions.get(&name(i)).copied().unwrap_or(0));

            match r.status {
                TaskStatus::Succeeded => prop_assert_eq!(r.success(), Some(&i)),
                TaskStatus::Failed => prop_assert_eq!(r.attempts, t.max_attempts),
                TaskStatus::Cancelled => {
                    prop_assert_eq!(r.attempts, 0);
                    // Some dependency did not succeed.
                    prop_assert!(t.deps.iter().any(|d| !succeeded.contains(&name(*d))));
                }
                other => prop_assert!(false, "non-terminal status {other}"),
            }
        }
    }

    #[test]
    fn plan_respects_dependencies(tasks in dag_strategy(15)) {
        let scheduler = build(&tasks, 1);
        let plan = scheduler.graph().topological_order().expect("acyclic");
        prop_assert_eq!(plan.len(), tasks.len());

        let position: HashMap<&str, usize> =
            plan.iter().enumerate().map(|(p, id)| (id.as_str(), p)).collect();
        for (i, t) in tasks.iter().enumerate() {
            for dep in &t.deps {
                prop_assert!(position[name(*dep).as_str()] < position[name(i).as_str()]);
            }
        }
    }

    #[test]
    fn cancelling_a_pending_task_cancels_exactly_its_descendants(
        tasks in dag_strategy(12),
        target in any::<prop::sample::Index>(),
    ) {
        let mut scheduler = build(&tasks, 1);
        let target = target.index(tasks.len());

        // Transitive dependents of `target`, computed independently.
        let mut expected: BTreeSet<usize> = BTreeSet::new();
        for (i, t) in tasks.iter().enumerate() {
            if t.deps.iter().any(|d| *d == target || expected.contains(d)) {
                expected.insert(i);
            }
        }

        let (cancelled, step) = scheduler.step_cancel(&name(target)).expect("cancel succeeds");
        prop_assert!(cancelled);
        prop_assert_eq!(step.newly_cancelled.first(), Some(&name(target)));

        let got: BTreeSet<String> = step.newly_cancelled[1..].iter().cloned().collect();
        let want: BTreeSet<String> = expected.iter().map(|i| name(*i)).collect();
        prop_assert_eq!(got, want);
    }
}
