// src/dag/state_manager.rs

//! Graph-aware state transitions: releasing dependents when a task succeeds
//! and cascading cancellation when one fails or is cancelled.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::store::ResultStore;
use crate::dag::task_info::TaskStatus;
use crate::errors::{CancelReason, Result, TaskError};
use crate::types::TaskId;

/// Borrows the immutable graph and the mutable store for one step.
pub struct StateManager<'a, T> {
    graph: &'a TaskGraph,
    store: &'a mut ResultStore<T>,
}

impl<'a, T> StateManager<'a, T> {
    pub fn new(graph: &'a TaskGraph, store: &'a mut ResultStore<T>) -> Self {
        Self { graph, store }
    }

    /// Pending -> Ready.
    pub fn mark_ready(&mut self, task: &str) -> Result<()> {
        self.store.transition(task, TaskStatus::Ready)?;
        Ok(())
    }

    /// Count one more satisfied dependency for every direct dependent of
    /// `succeeded`, marking those with none left `Ready`.
    ///
    /// `unmet` holds the number of not-yet-succeeded dependencies per task.
    /// Returns the tasks that became ready, in insertion order.
    pub fn release_dependents(
        &mut self,
        succeeded: &str,
        unmet: &mut HashMap<TaskId, usize>,
    ) -> Result<Vec<TaskId>> {
        let mut ready = Vec::new();

        for dependent in self.graph.dependents_of(succeeded) {
            let Some(remaining) = unmet.get_mut(&dependent) else {
                warn!(task = %dependent, "dependent missing from dependency counters");
                continue;
            };
            *remaining = remaining.saturating_sub(1);

            if *remaining == 0 && self.store.status_of(&dependent) == Some(TaskStatus::Pending) {
                self.mark_ready(&dependent)?;
                debug!(task = %dependent, after = %succeeded, "dependencies satisfied; marking Ready");
                ready.push(dependent);
            }
        }

        Ok(ready)
    }

    /// Breadth-first walk over the reverse-dependency index from `root`,
    /// cancelling every dependent that is not yet terminal.
    ///
    /// `root` itself is not touched; the caller has already moved it to
    /// Failed or Cancelled. Returns the newly cancelled tasks in visit order.
    pub fn cancel_dependents(&mut self, root: &str, reason: CancelReason) -> Result<Vec<TaskId>> {
        let mut queue: VecDeque<TaskId> = self.graph.dependents_of(root).into();
        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut cancelled = Vec::new();

        while let Some(name) = queue.pop_front() {
            if !visited.insert(name.clone()) {
                continue;
            }

            match self.store.status_of(&name) {
                Some(TaskStatus::Pending) | Some(TaskStatus::Ready) => {
                    self.store.record_error(
                        &name,
                        TaskStatus::Cancelled,
                        TaskError::Cancelled {
                            reason: reason.clone(),
                        },
                    )?;
                    debug!(task = %name, ancestor = %root, %reason, "cascading cancellation");
                    cancelled.push(name.clone());
                    queue.extend(self.graph.dependents_of(&name));
                }
                Some(TaskStatus::Running) => {
                    // Cannot happen while dependencies gate admission.
                    warn!(task = %name, ancestor = %root, "dependent already running; not cancelling");
                }
                Some(_) | None => {
                    // Already terminal: its own dependents were handled then.
                }
            }
        }

        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (TaskGraph, ResultStore<()>) {
        // a <- b, a <- c, (b, c) <- d, e independent
        let mut graph = TaskGraph::new();
        let mut store = ResultStore::new();
        for (id, deps) in [
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a"]),
            ("d", vec!["b", "c"]),
            ("e", vec![]),
        ] {
            let deps: Vec<TaskId> = deps.into_iter().map(String::from).collect();
            graph.add_task(id, 0, &deps).unwrap();
            store.insert(id).unwrap();
        }
        (graph, store)
    }

    #[test]
    fn cascade_reaches_every_transitive_dependent_once() {
        let (graph, mut store) = diamond();
        store
            .record_error(
                "a",
                TaskStatus::Cancelled,
                TaskError::Cancelled {
                    reason: CancelReason::Explicit,
                },
            )
            .unwrap();

        let mut mgr = StateManager::new(&graph, &mut store);
        let cancelled = mgr
            .cancel_dependents(
                "a",
                CancelReason::AncestorCancelled {
                    ancestor: "a".into(),
                },
            )
            .unwrap();

        assert_eq!(cancelled, vec!["b", "c", "d"]);
        assert_eq!(store.status_of("e"), Some(TaskStatus::Pending));
        assert_eq!(store.unfinished_count(), 1);
        let err = store.snapshot("d").unwrap().error.unwrap();
        assert_eq!(
            err.cancel_reason(),
            Some(&CancelReason::AncestorCancelled {
                ancestor: "a".into()
            })
        );
    }

    #[test]
    fn dependents_wait_for_all_dependencies() {
        let (graph, mut store) = diamond();
        let mut unmet: HashMap<TaskId, usize> = graph
            .tasks()
            .map(|t| (t.to_string(), graph.dependency_count(t)))
            .collect();

        store.transition("a", TaskStatus::Ready).unwrap();
        store.begin_attempt("a", 1).unwrap();
        store.record_success("a", ()).unwrap();

        let released = StateManager::new(&graph, &mut store)
            .release_dependents("a", &mut unmet)
            .unwrap();
        assert_eq!(released, vec!["b", "c"]);
        assert_eq!(unmet["d"], 2);

        store.begin_attempt("b", 1).unwrap();
        store.record_success("b", ()).unwrap();

        let released = StateManager::new(&graph, &mut store)
            .release_dependents("b", &mut unmet)
            .unwrap();
        assert!(released.is_empty());
        assert_eq!(unmet["d"], 1);
        assert_eq!(store.status_of("d"), Some(TaskStatus::Pending));
    }
}
