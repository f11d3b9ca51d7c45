// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction::{Incoming, Outgoing};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::errors::{DagrunError, Result};
use crate::types::TaskId;

/// Node weight: the bits of a task the graph needs for ordering.
#[derive(Debug, Clone)]
struct TaskNode {
    id: TaskId,
    priority: i32,
}

/// Dependency graph keyed by task id.
///
/// Edges point from a dependency to its dependent, so outgoing neighbours
/// form the reverse-dependency index used for readiness and cascades.
/// Node indices follow insertion order, which is the priority tie-breaker.
///
/// Dependencies may be declared before the task they name is added; such
/// edges are parked in `unresolved` and wired up when the task appears.
/// Anything still parked when the graph is validated is a missing
/// dependency.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    graph: DiGraph<TaskNode, ()>,
    index: HashMap<TaskId, NodeIndex>,
    /// Missing dependency id -> dependents waiting for it (insertion order).
    unresolved: HashMap<TaskId, Vec<NodeIndex>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and its declared dependencies.
    pub fn add_task(&mut self, id: &str, priority: i32, dependencies: &[TaskId]) -> Result<()> {
        if self.index.contains_key(id) {
            return Err(DagrunError::DuplicateId(id.to_string()));
        }

        let node = self.graph.add_node(TaskNode {
            id: id.to_string(),
            priority,
        });
        self.index.insert(id.to_string(), node);

        for dep in dependencies {
            match self.index.get(dep) {
                // `update_edge` collapses duplicate entries in `dependencies`.
                Some(&dep_node) => {
                    self.graph.update_edge(dep_node, node, ());
                }
                None => {
                    let waiting = self.unresolved.entry(dep.clone()).or_default();
                    if !waiting.contains(&node) {
                        waiting.push(node);
                    }
                }
            }
        }

        if let Some(waiting) = self.unresolved.remove(id) {
            for dependent in waiting {
                self.graph.update_edge(node, dependent, ());
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All task ids in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|n| self.graph[n].id.as_str())
    }

    /// Insertion position of a task, used to break priority ties.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).map(|n| n.index())
    }

    pub fn priority_of(&self, id: &str) -> Option<i32> {
        self.index.get(id).map(|&n| self.graph[n].priority)
    }

    /// Immediate dependencies of a task that are present in the graph,
    /// in insertion order.
    pub fn dependencies_of(&self, id: &str) -> Vec<TaskId> {
        self.neighbours(id, Incoming)
    }

    /// Immediate dependents of a task, in insertion order.
    pub fn dependents_of(&self, id: &str) -> Vec<TaskId> {
        self.neighbours(id, Outgoing)
    }

    /// Number of resolved dependencies, i.e. the in-degree.
    pub fn dependency_count(&self, id: &str) -> usize {
        self.index
            .get(id)
            .map(|&n| self.graph.neighbors_directed(n, Incoming).count())
            .unwrap_or(0)
    }

    fn neighbours(&self, id: &str, dir: petgraph::Direction) -> Vec<TaskId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(node, dir).collect();
        nodes.sort_unstable();
        nodes.into_iter().map(|n| self.graph[n].id.clone()).collect()
    }

    /// Structural validation run once before anything executes:
    /// every referenced dependency must exist and the graph must be acyclic.
    pub fn validate(&self) -> Result<()> {
        self.check_dependencies_exist()?;
        self.check_acyclic()
    }

    /// Report the missing dependency referenced by the earliest-added task.
    fn check_dependencies_exist(&self) -> Result<()> {
        let missing = self
            .unresolved
            .iter()
            .flat_map(|(dep, waiting)| waiting.iter().map(move |&n| (n, dep)))
            .min_by(|(a_node, a_dep), (b_node, b_dep)| {
                a_node.cmp(b_node).then_with(|| a_dep.cmp(b_dep))
            });

        match missing {
            Some((node, dep)) => Err(DagrunError::MissingDependency {
                task: self.graph[node].id.clone(),
                dependency: dep.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Depth-first three-colour walk along "depends on" edges, O(V + E).
    ///
    /// On failure the error carries one concrete cycle, starting and ending
    /// at the same task, e.g. `A -> B -> A` for "A depends on B depends on A".
    pub fn check_acyclic(&self) -> Result<()> {
        let mut color = vec![Color::White; self.graph.node_count()];

        for start in self.graph.node_indices() {
            if color[start.index()] != Color::White {
                continue;
            }

            // Explicit stack of (node, its dependencies, next position).
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();
            color[start.index()] = Color::Gray;
            stack.push((start, self.sorted_dependencies(start), 0));

            while let Some((node, deps, pos)) = stack.last_mut() {
                if *pos == deps.len() {
                    color[node.index()] = Color::Black;
                    stack.pop();
                    continue;
                }

                let next = deps[*pos];
                *pos += 1;

                match color[next.index()] {
                    Color::White => {
                        color[next.index()] = Color::Gray;
                        let next_deps = self.sorted_dependencies(next);
                        stack.push((next, next_deps, 0));
                    }
                    Color::Gray => {
                        let from = stack
                            .iter()
                            .position(|(n, _, _)| *n == next)
                            .unwrap_or(0);
                        let mut cycle: Vec<TaskId> = stack[from..]
                            .iter()
                            .map(|(n, _, _)| self.graph[*n].id.clone())
                            .collect();
                        cycle.push(self.graph[next].id.clone());
                        return Err(DagrunError::Cycle(cycle));
                    }
                    Color::Black => {}
                }
            }
        }

        Ok(())
    }

    fn sorted_dependencies(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self.graph.neighbors_directed(node, Incoming).collect();
        deps.sort_unstable();
        deps
    }

    /// Deterministic execution plan: Kahn's algorithm where, among tasks whose
    /// dependencies are all placed, higher priority goes first and ties keep
    /// insertion order.
    ///
    /// Validates the graph first.
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        self.validate()?;

        let mut remaining: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Incoming).count())
            .collect();

        let mut ready: BinaryHeap<(i32, Reverse<NodeIndex>)> = self
            .graph
            .node_indices()
            .filter(|n| remaining[n.index()] == 0)
            .map(|n| (self.graph[n].priority, Reverse(n)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some((_, Reverse(node))) = ready.pop() {
            order.push(self.graph[node].id.clone());
            for dependent in self.graph.neighbors_directed(node, Outgoing) {
                let slot = &mut remaining[dependent.index()];
                *slot -= 1;
                if *slot == 0 {
                    ready.push((self.graph[dependent].priority, Reverse(dependent)));
                }
            }
        }

        Ok(order)
    }
}
