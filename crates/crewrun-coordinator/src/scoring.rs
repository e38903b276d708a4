//! Scoring engine - ranks idle workers for a task.
//!
//! The score is the sum of three terms:
//! 1. a role-match bonus that dominates everything else,
//! 2. a bounded historical term from success rate and specialty score,
//! 3. a small context bonus for prior experience with the task type.
//!
//! Workers whose role is not preferred for the task still receive a valid
//! (lower) score so the dispatcher can fall back to any idle worker.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crewrun_core::worker::SPECIALTY_MAX;
use crewrun_core::{Task, Worker, WorkerId};

use crate::error::CoordinatorError;
use crate::memory::WorkerContext;

/// Largest success rate a worker can report (percent).
const SUCCESS_RATE_MAX: f64 = 100.0;

/// Tunable weights of the scoring function.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    /// Bonus for the best-fit preferred role.
    pub role_match_bonus: f64,

    /// Fraction of the bonus lost per position down the preferred-role list.
    pub rank_decay: f64,

    /// Multiplier on the success rate (0..=100).
    pub success_weight: f64,

    /// Multiplier on the specialty score (0..=100).
    pub specialty_weight: f64,

    /// Flat bonus for prior experience with the task type.
    pub context_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            role_match_bonus: 1000.0,
            rank_decay: 0.05,
            success_weight: 3.0,
            specialty_weight: 2.0,
            context_bonus: 25.0,
        }
    }
}

/// Longest preferred-role list the decay has to stay dominant for.
const MAX_ROLE_RANK: usize = 3;

impl ScoringWeights {
    /// Largest value the non-role terms can reach together.
    pub fn max_secondary(&self) -> f64 {
        SUCCESS_RATE_MAX * self.success_weight
            + SPECIALTY_MAX * self.specialty_weight
            + self.context_bonus
    }

    /// Smallest role bonus a matching worker can receive.
    pub fn min_role_bonus(&self) -> f64 {
        self.role_bonus_at(MAX_ROLE_RANK - 1)
    }

    fn role_bonus_at(&self, rank: usize) -> f64 {
        self.role_match_bonus * (1.0 - self.rank_decay * rank as f64).max(0.0)
    }

    /// Reject weights under which a role mismatch could outrank a match.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        let weights = [
            self.role_match_bonus,
            self.rank_decay,
            self.success_weight,
            self.specialty_weight,
            self.context_bonus,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CoordinatorError::InvalidConfig(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        if self.min_role_bonus() <= self.max_secondary() {
            return Err(CoordinatorError::InvalidConfig(format!(
                "role match bonus ({}) must exceed the secondary terms ({})",
                self.min_role_bonus(),
                self.max_secondary()
            )));
        }
        Ok(())
    }
}

/// Score of one worker for one task, with its components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    pub value: f64,
    pub role_match: f64,
    pub history: f64,
    pub context: f64,
}

/// A scored candidate.
#[derive(Debug, Clone)]
pub struct ScoredWorker {
    pub worker: Worker,
    pub score: Score,
}

impl ScoredWorker {
    pub fn role_matched(&self) -> bool {
        self.score.role_match > 0.0
    }
}

/// Score a worker for a task. Pure and deterministic.
pub fn score(
    weights: &ScoringWeights,
    worker: &Worker,
    task: &Task,
    context: Option<&WorkerContext>,
) -> Score {
    let role_match = task
        .task_type
        .role_rank(worker.role)
        .map(|rank| weights.role_bonus_at(rank))
        .unwrap_or(0.0);

    let perf = &worker.performance;
    let history = perf.success_rate.clamp(0.0, SUCCESS_RATE_MAX) * weights.success_weight
        + perf.specialty_score.clamp(0.0, SPECIALTY_MAX) * weights.specialty_weight;

    let context = match context {
        Some(ctx) if ctx.has_experience_with(task.task_type) => weights.context_bonus,
        _ => 0.0,
    };

    Score {
        value: role_match + history + context,
        role_match,
        history,
        context,
    }
}

/// Order candidates best first: highest score, then lowest load, then
/// earliest registration.
fn compare(a: &ScoredWorker, b: &ScoredWorker) -> Ordering {
    b.score
        .value
        .total_cmp(&a.score.value)
        .then_with(|| a.worker.load().cmp(&b.worker.load()))
        .then_with(|| a.worker.seq.cmp(&b.worker.seq))
}

/// Score and rank every candidate for a task.
pub fn rank(
    weights: &ScoringWeights,
    candidates: Vec<Worker>,
    task: &Task,
    contexts: &HashMap<WorkerId, WorkerContext>,
) -> Vec<ScoredWorker> {
    let mut scored: Vec<ScoredWorker> = candidates
        .into_iter()
        .map(|worker| {
            let score = score(weights, &worker, task, contexts.get(&worker.id));
            ScoredWorker { worker, score }
        })
        .collect();
    scored.sort_by(compare);
    scored
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crewrun_core::{Role, TaskType};

    fn worker(role: Role, seq: u64) -> Worker {
        Worker::new(role, role.default_capabilities(), seq)
    }

    #[test]
    fn test_default_weights_are_valid() {
        ScoringWeights::default().validate().unwrap();
    }

    #[test]
    fn test_non_dominant_weights_are_rejected() {
        let weights = ScoringWeights {
            role_match_bonus: 100.0,
            ..ScoringWeights::default()
        };
        assert!(matches!(
            weights.validate(),
            Err(CoordinatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_score_is_deterministic() {
        let weights = ScoringWeights::default();
        let mut w = worker(Role::Backend, 1);
        w.performance.record(true, 120, true);
        let task = Task::new(TaskType::Database, "schema");
        let first = score(&weights, &w, &task, None);
        for _ in 0..100 {
            assert_eq!(score(&weights, &w, &task, None), first);
        }
    }

    #[test]
    fn test_role_match_dominates_any_bounded_performance() {
        let weights = ScoringWeights::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut experienced = WorkerContext::default();
        for task_type in TaskType::ALL {
            experienced.record_experience(task_type);
        }

        for task_type in TaskType::ALL {
            let task = Task::new(task_type, "probe");
            for (rank, role) in task_type.preferred_roles().iter().enumerate() {
                let outsider = Role::ALL
                    .into_iter()
                    .find(|r| task_type.role_rank(*r).is_none())
                    .unwrap();
                for _ in 0..50 {
                    let mut matched = worker(*role, 1);
                    matched.performance.success_rate = 0.0;
                    matched.performance.specialty_score = 0.0;

                    let mut other = worker(outsider, 2);
                    other.performance.success_rate = rng.gen_range(0.0..=100.0);
                    other.performance.specialty_score = rng.gen_range(0.0..=100.0);

                    let a = score(&weights, &matched, &task, None);
                    let b = score(&weights, &other, &task, Some(&experienced));
                    assert!(
                        a.value > b.value,
                        "{task_type}: {role} at rank {rank} lost to {outsider}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_fallback_scores_every_worker() {
        let weights = ScoringWeights::default();
        let task = Task::new(TaskType::General, "anything");
        let ranked = rank(
            &weights,
            vec![worker(Role::Frontend, 1), worker(Role::Devops, 2)],
            &task,
            &HashMap::new(),
        );
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|s| !s.role_matched()));
        assert!(ranked.iter().all(|s| s.score.value.is_finite()));
    }

    #[test]
    fn test_ties_go_to_first_registered() {
        let weights = ScoringWeights::default();
        let task = Task::new(TaskType::Backend, "endpoint");
        let ranked = rank(
            &weights,
            vec![worker(Role::Backend, 7), worker(Role::Backend, 3)],
            &task,
            &HashMap::new(),
        );
        assert_eq!(ranked[0].worker.seq, 3);
        assert_eq!(ranked[0].score, ranked[1].score);
    }

    #[test]
    fn test_context_bonus_breaks_ties() {
        let weights = ScoringWeights::default();
        let task = Task::new(TaskType::Frontend, "form");
        let first = worker(Role::Frontend, 1);
        let second = worker(Role::Frontend, 2);

        let mut ctx = WorkerContext::default();
        ctx.record_experience(TaskType::Frontend);
        let contexts: HashMap<_, _> = [(second.id.clone(), ctx)].into_iter().collect();

        let ranked = rank(&weights, vec![first, second], &task, &contexts);
        assert_eq!(ranked[0].worker.seq, 2);
        assert_eq!(ranked[0].score.context, weights.context_bonus);
    }

    #[test]
    fn test_preferred_order_is_respected() {
        let weights = ScoringWeights::default();
        let task = Task::new(TaskType::Architecture, "design");
        let ranked = rank(
            &weights,
            vec![worker(Role::Backend, 1), worker(Role::Architect, 2)],
            &task,
            &HashMap::new(),
        );
        assert_eq!(ranked[0].worker.role, Role::Architect);
    }
}
