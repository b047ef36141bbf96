//! Per-phase wall-clock budgets: a base plus bounded extras, capped at a phase maximum.

use std::time::Duration;

use seek_config::{GraphTimeouts, RerankTimeouts, SearchTimeouts};

const LARGE_LIMIT: u32 = 50;
const LONG_QUERY_WORDS: usize = 10;

pub fn search_budget(
	cfg: &SearchTimeouts,
	sources: usize,
	limit: u32,
	hybrid: bool,
	query_words: usize,
) -> Duration {
	let mut ms = cfg.base_ms;

	ms = ms.saturating_add(cfg.per_extra_source_ms.saturating_mul(extra(sources)));

	if limit > LARGE_LIMIT {
		ms = ms.saturating_add(cfg.large_limit_ms);
	}
	if hybrid {
		ms = ms.saturating_add(cfg.hybrid_ms);
	}
	if query_words > LONG_QUERY_WORDS {
		ms = ms.saturating_add(cfg.long_query_ms);
	}

	Duration::from_millis(ms.min(cfg.max_ms))
}

pub fn graph_budget(cfg: &GraphTimeouts, candidates: usize, semantic: bool) -> Duration {
	let mut ms = cfg.base_ms.saturating_add(cfg.per_candidate_ms.saturating_mul(candidates as u64));

	if semantic {
		ms = ms.saturating_add(cfg.semantic_ms);
	}

	Duration::from_millis(ms.min(cfg.max_ms))
}

pub fn rerank_budget(cfg: &RerankTimeouts, candidates: usize, with_graph: bool) -> Duration {
	let mut ms = cfg.base_ms.saturating_add(cfg.per_candidate_ms.saturating_mul(candidates as u64));

	if with_graph {
		ms = ms.saturating_add(cfg.graph_ms);
	}

	Duration::from_millis(ms.min(cfg.max_ms))
}

fn extra(sources: usize) -> u64 {
	sources.saturating_sub(1) as u64
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_small_query_gets_the_base() {
		let cfg = SearchTimeouts::default();

		assert_eq!(search_budget(&cfg, 1, 10, false, 2), Duration::from_millis(cfg.base_ms));
	}

	#[test]
	fn complexity_adds_bounded_extras() {
		let cfg = SearchTimeouts::default();
		let budget = search_budget(&cfg, 3, 100, true, 12);
		let expected = cfg.base_ms
			+ 2 * cfg.per_extra_source_ms
			+ cfg.large_limit_ms
			+ cfg.hybrid_ms
			+ cfg.long_query_ms;

		assert_eq!(budget, Duration::from_millis(expected.min(cfg.max_ms)));
	}

	#[test]
	fn budgets_are_capped() {
		let search = SearchTimeouts::default();
		let graph = GraphTimeouts::default();
		let rerank = RerankTimeouts::default();

		assert_eq!(search_budget(&search, 500, 1_000, true, 50).as_millis() as u64, search.max_ms);
		assert_eq!(graph_budget(&graph, 10_000, true).as_millis() as u64, graph.max_ms);
		assert_eq!(rerank_budget(&rerank, 10_000, true).as_millis() as u64, rerank.max_ms);
	}

	#[test]
	fn graph_presence_extends_rerank_budget() {
		let cfg = RerankTimeouts::default();

		assert!(rerank_budget(&cfg, 10, true) > rerank_budget(&cfg, 10, false));
	}
}
