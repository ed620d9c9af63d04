//! Fan-out across all record types and global result budgeting.
//!
//! Each of the seven record types is searched concurrently with its own
//! limit, then the lists are merged:
//!
//! - every non-topic type asks for `ceil(limit / 7)` results, topics for a
//!   fixed [`BudgetPolicy::topic_fetch_ceiling`];
//! - duplicate `(type, id)` pairs keep their first occurrence;
//! - at most [`BudgetPolicy::topic_result_cap`] topics are kept, and the
//!   remaining `limit − topics` slots go to the best non-topic results;
//! - output is topics first, then the rest, each in descending score order.
//!
//! A caller-supplied deadline future bounds the fan-out; when it fires, the
//! types that already finished are merged and the rest are dropped.

use std::collections::HashSet;
use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;

use crate::models::{RecordType, SearchFilters, SearchResult};
use crate::orchestrator::{SearchContext, TypeDiagnostics, TypeQuery};
use crate::strategy::{SearchStrategy, StrategySet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetPolicy {
    pub topic_fetch_ceiling: usize,
    pub topic_result_cap: usize,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            topic_fetch_ceiling: 60,
            topic_result_cap: 40,
        }
    }
}

/// Limit and strategy for one record type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypePlan {
    pub record_type: RecordType,
    pub limit: usize,
    pub strategy: SearchStrategy,
}

pub fn per_type_limit(limit: usize) -> usize {
    limit.div_ceil(RecordType::ALL.len()).max(1)
}

pub fn search_plan(limit: usize, strategies: &StrategySet, policy: &BudgetPolicy) -> Vec<TypePlan> {
    let each = per_type_limit(limit);
    RecordType::ALL
        .iter()
        .map(|&record_type| TypePlan {
            record_type,
            limit: if record_type == RecordType::Topic {
                policy.topic_fetch_ceiling
            } else {
                each
            },
            strategy: strategies.for_type(record_type),
        })
        .collect()
}

/// Merges per-type result lists under the global budget.
pub fn merge_results(
    lists: Vec<Vec<SearchResult>>,
    limit: usize,
    policy: &BudgetPolicy,
) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut all: Vec<SearchResult> = lists
        .into_iter()
        .flatten()
        .filter(|r| seen.insert((r.record_type(), r.id.clone())))
        .collect();

    all.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let (mut merged, others): (Vec<_>, Vec<_>) = all
        .into_iter()
        .partition(|r| r.record_type() == RecordType::Topic);
    merged.truncate(policy.topic_result_cap);
    let remaining = limit.saturating_sub(merged.len());
    merged.extend(others.into_iter().take(remaining));
    merged
}

#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    pub results: Vec<SearchResult>,
    /// Diagnostics of the types that finished, in [`RecordType::ALL`] order.
    pub per_type: Vec<TypeDiagnostics>,
    pub timed_out: bool,
}

/// Inputs of one fan-out.
#[derive(Debug, Clone, Copy)]
pub struct FanOut<'a> {
    pub query: &'a str,
    pub limit: usize,
    pub filters: &'a SearchFilters,
    pub plan: &'a [TypePlan],
    pub use_cache: bool,
    /// See [`TypeQuery::lexical_fallback`].
    pub lexical_fallback: bool,
    pub policy: &'a BudgetPolicy,
}

/// Runs every planned type concurrently and merges what finishes before
/// `deadline` resolves.
pub async fn search_all<D>(ctx: &SearchContext, req: FanOut<'_>, deadline: D) -> AggregateOutcome
where
    D: Future<Output = ()>,
{
    let FanOut {
        query,
        limit,
        filters,
        plan,
        use_cache,
        lexical_fallback,
        policy,
    } = req;

    let mut pending: FuturesUnordered<_> = plan
        .iter()
        .map(|p| async move {
            ctx.search_type(&TypeQuery {
                record_type: p.record_type,
                query,
                limit: p.limit,
                filters,
                strategy: p.strategy,
                use_cache,
                lexical_fallback,
            })
            .await
        })
        .collect();

    let deadline = deadline.fuse();
    futures::pin_mut!(deadline);

    let mut finished = Vec::with_capacity(plan.len());
    let mut timed_out = false;
    while !pending.is_empty() {
        futures::select! {
            outcome = pending.select_next_some() => finished.push(outcome),
            () = deadline => {
                timed_out = true;
                break;
            }
        }
    }
    drop(pending);

    if timed_out {
        tracing::warn!(
            finished = finished.len(),
            total = plan.len(),
            "search deadline reached, returning partial results"
        );
    }

    finished.sort_by_key(|o| o.diagnostics.record_type);
    let mut per_type = Vec::with_capacity(finished.len());
    let mut lists = Vec::with_capacity(finished.len());
    for outcome in finished {
        lists.push(outcome.results);
        per_type.push(outcome.diagnostics);
    }

    AggregateOutcome {
        results: merge_results(lists, limit, policy),
        per_type,
        timed_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, ResultPayload, TopicSummary};

    fn topic(id: &str, score: f64) -> SearchResult {
        SearchResult {
            id: id.into(),
            score,
            similarity: 0.0,
            matched_terms: vec![],
            payload: ResultPayload::Topic(TopicSummary {
                topic_id: id.into(),
                ..Default::default()
            }),
        }
    }

    fn entity(id: &str, score: f64) -> SearchResult {
        SearchResult {
            id: id.into(),
            score,
            similarity: 0.0,
            matched_terms: vec![],
            payload: ResultPayload::Entity(Entity {
                id: id.into(),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_per_type_limit() {
        assert_eq!(per_type_limit(10), 2);
        assert_eq!(per_type_limit(7), 1);
        assert_eq!(per_type_limit(1), 1);
        assert_eq!(per_type_limit(0), 1);
        assert_eq!(per_type_limit(50), 8);
    }

    #[test]
    fn test_plan_gives_topics_fixed_ceiling() {
        let plan = search_plan(10, &StrategySet::default(), &BudgetPolicy::default());
        assert_eq!(plan.len(), 7);
        for p in &plan {
            let expected = if p.record_type == RecordType::Topic { 60 } else { 2 };
            assert_eq!(p.limit, expected);
        }
        let startup = plan
            .iter()
            .find(|p| p.record_type == RecordType::Startup)
            .unwrap();
        assert_eq!(startup.strategy, SearchStrategy::vector_only());
    }

    #[test]
    fn test_topics_capped_and_others_fill_remaining() {
        let topics: Vec<_> = (0..50).map(|i| topic(&format!("t{i}"), 0.9)).collect();
        let entities: Vec<_> = (0..5).map(|i| entity(&format!("e{i}"), 0.95)).collect();
        let merged = merge_results(vec![entities, topics], 10, &BudgetPolicy::default());
        let topic_count = merged
            .iter()
            .filter(|r| r.record_type() == RecordType::Topic)
            .count();
        assert_eq!(topic_count, 40);
        assert!(merged.len() - topic_count <= 10);
    }

    #[test]
    fn test_topics_come_first_then_others() {
        let merged = merge_results(
            vec![
                vec![entity("e1", 0.99), entity("e2", 0.5)],
                vec![topic("t1", 0.2)],
            ],
            5,
            &BudgetPolicy::default(),
        );
        let ids: Vec<_> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "e1", "e2"]);
    }

    #[test]
    fn test_duplicate_topics_keep_first() {
        let merged = merge_results(
            vec![vec![topic("t1", 0.8), topic("t1", 0.3)]],
            10,
            &BudgetPolicy::default(),
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].score, 0.8);
    }

    #[test]
    fn test_same_id_different_types_both_kept() {
        let merged = merge_results(
            vec![vec![entity("x", 0.5)], vec![topic("x", 0.5)]],
            10,
            &BudgetPolicy::default(),
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_others_limited_by_remaining_budget() {
        let entities: Vec<_> = (0..8).map(|i| entity(&format!("e{i}"), 1.0 - i as f64 * 0.1)).collect();
        let merged = merge_results(
            vec![entities, vec![topic("t1", 0.1), topic("t2", 0.1)]],
            5,
            &BudgetPolicy::default(),
        );
        let ids: Vec<_> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "e0", "e1", "e2"]);
    }
}
