//! Upload ordering dependencies.
//!
//! Design:
//! - `producers`: dependent key -> keys it waits for
//! - `dependents`: producer key -> keys waiting for it
//! - Invariant: both maps describe the same edge set, and the graph is acyclic
//!
//! Per run, every producer present in the batch gets a `watch` gate. The gate
//! moves to `Completed` when the producer's transfer succeeds and to `Failed`
//! on every other exit path (including panics), so a dependent never waits on
//! a producer that has already given up.

use super::{BatchError, Candidate, UploadError};
use crate::config::DependencyRule;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    producers: HashMap<String, BTreeSet<String>>,
    dependents: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: &[DependencyRule]) -> Result<Self, BatchError> {
        let mut graph = Self::new();
        for rule in rules {
            graph.add_dependency(&rule.producer, &rule.dependent)?;
        }
        Ok(graph)
    }

    /// `dependent` is uploaded only after `producer` completed its transfer.
    ///
    /// Rejects self-edges and edges that would close a cycle.
    pub fn add_dependency(&mut self, producer: &str, dependent: &str) -> Result<(), BatchError> {
        if producer == dependent {
            return Err(BatchError::InvalidDependency(format!(
                "{} cannot depend on itself",
                producer
            )));
        }

        if self.reaches(dependent, producer) {
            return Err(BatchError::InvalidDependency(format!(
                "{} -> {} would create a cycle",
                producer, dependent
            )));
        }

        self.producers
            .entry(dependent.to_string())
            .or_default()
            .insert(producer.to_string());
        self.dependents
            .entry(producer.to_string())
            .or_default()
            .insert(dependent.to_string());
        Ok(())
    }

    pub fn producers_of(&self, dependent: &str) -> impl Iterator<Item = &str> {
        self.producers
            .get(dependent)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn dependents_of(&self, producer: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(producer)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Number of edges
    pub fn len(&self) -> usize {
        self.producers.values().map(BTreeSet::len).sum()
    }

    /// Whether `to` is reachable from `from` following producer -> dependent edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();

        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            stack.extend(self.dependents_of(node));
        }
        false
    }

    /// Build the per-candidate gates for one run, in candidate order.
    ///
    /// Edges whose producer is not part of the batch are dropped: nothing
    /// could ever signal them.
    pub(crate) fn wire(&self, candidates: &[Candidate]) -> Vec<TaskGates> {
        let present: HashSet<&str> = candidates.iter().map(Candidate::key).collect();

        let mut senders: HashMap<&str, watch::Sender<GateState>> = HashMap::new();
        for candidate in candidates {
            let has_dependents = self
                .dependents_of(candidate.key())
                .any(|d| present.contains(d));
            if has_dependents {
                let (tx, _) = watch::channel(GateState::Pending);
                senders.insert(candidate.key(), tx);
            }
        }

        let mut waits: Vec<Vec<GateWait>> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mut task_waits = Vec::new();
            for producer in self.producers_of(candidate.key()) {
                match senders.get(producer) {
                    Some(tx) => task_waits.push(GateWait {
                        producer: producer.to_string(),
                        rx: tx.subscribe(),
                    }),
                    None => tracing::warn!(
                        producer = %producer,
                        dependent = %candidate.key(),
                        "Dependency producer not in batch, ignoring edge"
                    ),
                }
            }
            waits.push(task_waits);
        }

        candidates
            .iter()
            .zip(waits)
            .map(|(candidate, waits)| TaskGates {
                signal: senders.remove(candidate.key()).map(GateSignal::new),
                waits,
            })
            .collect()
    }
}

/// Producer progress as seen by dependents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Completed,
    Failed,
}

/// Sending side of a producer's gate.
///
/// Dropping it without calling [`GateSignal::complete`] marks the gate failed.
#[derive(Debug)]
pub struct GateSignal {
    tx: watch::Sender<GateState>,
}

impl GateSignal {
    fn new(tx: watch::Sender<GateState>) -> Self {
        Self { tx }
    }

    pub fn complete(self) {
        self.tx.send_replace(GateState::Completed);
    }
}

impl Drop for GateSignal {
    fn drop(&mut self) {
        self.tx.send_if_modified(|state| {
            if *state == GateState::Pending {
                *state = GateState::Failed;
                true
            } else {
                false
            }
        });
    }
}

#[derive(Debug)]
pub struct GateWait {
    producer: String,
    rx: watch::Receiver<GateState>,
}

/// Gates owned by a single worker
#[derive(Debug, Default)]
pub struct TaskGates {
    pub(crate) signal: Option<GateSignal>,
    pub(crate) waits: Vec<GateWait>,
}

impl TaskGates {
    /// Block until every producer of `key` completed.
    ///
    /// Fails as soon as one producer fails, or when `timeout` elapses.
    pub(crate) async fn wait_for_producers(
        &mut self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<(), UploadError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        for wait in &mut self.waits {
            tracing::debug!(producer = %wait.producer, "Waiting for dependency");

            let settled = wait.rx.wait_for(|state| *state != GateState::Pending);
            let state = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, settled).await {
                    Ok(result) => result.map(|s| *s).unwrap_or(GateState::Failed),
                    Err(_) => {
                        return Err(UploadError::DependencyFailed {
                            key: key.to_string(),
                            reason: format!("timed out waiting for {}", wait.producer),
                        })
                    }
                },
                None => settled.await.map(|s| *s).unwrap_or(GateState::Failed),
            };

            if state != GateState::Completed {
                return Err(UploadError::DependencyFailed {
                    key: key.to_string(),
                    reason: format!("{} was not uploaded", wait.producer),
                });
            }
        }
        Ok(())
    }

    /// Signal dependents that this worker's transfer completed.
    pub(crate) fn complete(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(keys: &[&str]) -> Vec<Candidate> {
        keys.iter()
            .map(|k| Candidate::new(format!("/src/{}", k), *k, 1))
            .collect()
    }

    #[test]
    fn test_add_dependency_tracks_both_directions() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("c", "b").unwrap();

        let producers: Vec<&str> = graph.producers_of("b").collect();
        assert_eq!(producers, vec!["a", "c"]);
        assert_eq!(graph.dependents_of("a").collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_rejects_self_dependency() {
        let mut graph = DependencyGraph::new();
        assert!(matches!(
            graph.add_dependency("a", "a"),
            Err(BatchError::InvalidDependency(_))
        ));
    }

    #[test]
    fn test_rejects_cycles() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("b", "c").unwrap();
        assert!(graph.add_dependency("c", "a").is_err());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_wire_skips_absent_producer() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("missing.bin", "b.bin").unwrap();

        let gates = graph.wire(&candidates(&["a.bin", "b.bin"]));
        assert!(gates.iter().all(|g| g.signal.is_none() && g.waits.is_empty()));
    }

    #[tokio::test]
    async fn test_dependent_proceeds_after_completion() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a.bin", "b.bin").unwrap();

        let mut gates = graph.wire(&candidates(&["a.bin", "b.bin"]));
        let mut dependent = gates.pop().unwrap();
        let mut producer = gates.pop().unwrap();

        assert!(producer.signal.is_some());
        assert_eq!(dependent.waits.len(), 1);

        producer.complete();
        dependent.wait_for_producers("b.bin", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_producer_fails_dependent() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a.bin", "b.bin").unwrap();

        let mut gates = graph.wire(&candidates(&["a.bin", "b.bin"]));
        let mut dependent = gates.pop().unwrap();
        drop(gates);

        let err = dependent
            .wait_for_producers("b.bin", None)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::DependencyFailed { .. }));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a.bin", "b.bin").unwrap();

        let mut gates = graph.wire(&candidates(&["a.bin", "b.bin"]));
        let mut dependent = gates.pop().unwrap();
        let _producer = gates.pop().unwrap();

        let err = dependent
            .wait_for_producers("b.bin", Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
