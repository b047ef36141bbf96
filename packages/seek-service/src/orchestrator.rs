//! Multi-source search: fan-out, merge, weighting, dedup, then optional graph and rerank.

use std::{collections::HashSet, sync::Arc, time::Instant};

use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
	Error, RegisteredSource, Result, SeekService, VectorIndex, cache,
	graph::{DocumentGraph, DocumentNode},
	models::{
		GraphSummary, RankedCandidate, RelatedDocument, SearchCandidate, SearchConfig,
		SearchResult, SourceReport, SourceStatus,
	},
	scoring,
	sources::{self, DataSource, QueryParams},
	timeouts,
};
use seek_config::SourceType;
use seek_domain::text;

struct VectorQuery {
	index: Arc<dyn VectorIndex>,
	collection: String,
	vector: Arc<Vec<f32>>,
}

#[derive(Clone)]
struct SourceOutcome {
	candidates: Vec<SearchCandidate>,
	error: Option<String>,
	elapsed_ms: f64,
	timed_out: bool,
}

impl SeekService {
	pub async fn search(&self, query: &str, request: &SearchConfig) -> Result<SearchResult> {
		let started = Instant::now();
		let limit = self.validate_request(query, request)?;
		let optimized = self.optimizer.optimize(query);
		let cache_key = match cache::build_search_cache_key(&optimized, request) {
			Ok(key) => Some(key),
			Err(err) => {
				tracing::warn!(error = %err, "Search cache key unavailable.");

				None
			},
		};

		if let Some(key) = cache_key.as_deref()
			&& let Some(cached) = self.cache.get(key)
		{
			self.metrics.record_query(elapsed_ms(started), true);

			tracing::debug!(query = %optimized.normalized, "Search cache hit.");

			return Ok(cached);
		}

		let selected = self.resolve_sources(request)?;
		let budget = timeouts::search_budget(
			&self.cfg.search.timeouts,
			selected.len(),
			limit,
			request.hybrid_search,
			optimized.normalized.split_whitespace().count(),
		);
		let deadline = tokio::time::Instant::now() + budget;
		let mut degradations = Vec::new();
		let query_vector = if request.hybrid_search {
			self.embed_query(&selected, &optimized.search_text, deadline, &mut degradations).await
		} else {
			None
		};
		let outcomes = self
			.fan_out(&selected, &optimized.search_text, query_vector, deadline)
			.await
			.ok_or_else(|| Error::Timeout {
				phase: "Search".to_string(),
				budget_ms: budget.as_millis() as u64,
			})?;
		let mut reports = Vec::with_capacity(selected.len());
		let mut pool = Vec::new();

		for (entry, outcome) in selected.iter().zip(outcomes) {
			let source_id = entry.cfg.source_id.as_str();
			let status = match (&outcome.error, outcome.timed_out) {
				(_, true) => SourceStatus::TimedOut,
				(Some(_), false) => SourceStatus::Failed,
				(None, false) => SourceStatus::Ok,
			};

			if let Some(message) = outcome.error.as_deref() {
				tracing::warn!(
					source_id,
					elapsed_ms = outcome.elapsed_ms,
					error = %message,
					"Source failed."
				);
			}

			self.metrics.record_source(source_id, status);

			reports.push(SourceReport {
				source_id: source_id.to_string(),
				status,
				candidates: outcome.candidates.len(),
				elapsed_ms: outcome.elapsed_ms,
				error: outcome.error,
			});

			let weight = request
				.source_weights
				.get(source_id)
				.copied()
				.unwrap_or_else(|| entry.cfg.effective_weight());

			pool.extend(outcome.candidates.into_iter().map(|mut candidate| {
				candidate.score = scoring::unit((f64::from(candidate.score) * weight) as f32);

				candidate
			}));
		}

		pool.sort_by(|a, b| scoring::cmp_f32_desc(a.score, b.score));

		let mut candidates = dedup(pool, self.cfg.search.dedup_prefix_chars as usize);
		let total_results = candidates.len();

		candidates.truncate(limit as usize);

		let graph = if request.build_graph {
			let build = self.build_graph(&candidates, request.include_semantic).await;

			degradations.extend(build.degradations);

			Some(build.graph)
		} else {
			None
		};
		let mut ranked = if request.rerank {
			let outcome = self
				.rerank(&candidates, query, &request.context, graph.as_ref(), limit as usize)
				.await;

			degradations.extend(outcome.degradations);

			outcome.candidates
		} else {
			candidates.into_iter().map(RankedCandidate::plain).collect()
		};

		if let Some(graph) = graph.as_ref() {
			let max_related = self.cfg.rerank.max_related_per_result as usize;

			for item in &mut ranked {
				if let Some(node) = graph.get(&item.candidate.id) {
					item.graph = Some(GraphSummary {
						document_type: node.document_type,
						importance_score: node.importance_score,
						relationship_count: node.relations.len(),
					});
					item.related_documents = related_documents(graph, node, max_related);
				}
			}
		}

		let search_time_ms = elapsed_ms(started);
		let result = SearchResult {
			candidates: ranked,
			total_results,
			search_time_ms,
			sources_searched: selected.iter().map(|entry| entry.cfg.source_id.clone()).collect(),
			source_reports: reports,
			degradations,
		};

		if let Some(key) = cache_key
			&& result.source_reports.iter().all(|report| report.status == SourceStatus::Ok)
		{
			self.cache.insert(key, result.clone());
		}

		self.metrics.record_query(search_time_ms, false);

		tracing::info!(
			sources = result.sources_searched.len(),
			candidates = result.candidates.len(),
			total_results,
			elapsed_ms = search_time_ms,
			"Search completed."
		);

		Ok(result)
	}

	/// Returns the effective limit.
	fn validate_request(&self, query: &str, request: &SearchConfig) -> Result<u32> {
		if query.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let limit = request.limit.unwrap_or(self.cfg.search.default_limit);

		if limit == 0 || limit > self.cfg.search.max_limit {
			return Err(Error::InvalidRequest {
				message: format!("limit must be in the range 1-{}.", self.cfg.search.max_limit),
			});
		}

		for (source_id, weight) in &request.source_weights {
			if !weight.is_finite() || *weight < 0.0 {
				return Err(Error::InvalidRequest {
					message: format!("source_weights.{source_id} must be a finite number >= 0."),
				});
			}
		}

		Ok(limit)
	}

	/// Selection order, else the configured defaults, else every registered source; then enabled
	/// and type-filtered, without duplicates.
	fn resolve_sources(&self, request: &SearchConfig) -> Result<Vec<&RegisteredSource>> {
		let requested: Vec<&str> = if !request.selected_sources.is_empty() {
			request.selected_sources.iter().map(|id| id.trim()).collect()
		} else if !self.cfg.search.default_sources.is_empty() {
			self.cfg.search.default_sources.iter().map(String::as_str).collect()
		} else {
			self.sources.iter().map(|entry| entry.cfg.source_id.as_str()).collect()
		};
		let mut seen = HashSet::new();
		let mut selected = Vec::new();

		for source_id in requested {
			let Some(entry) = self.sources.iter().find(|entry| entry.cfg.source_id == source_id)
			else {
				tracing::warn!(source_id, "Ignoring unknown source.");

				continue;
			};

			if !entry.cfg.enabled {
				continue;
			}
			if let Some(filter) = request.source_type_filter.as_ref()
				&& !filter.contains(&entry.source.source_type())
			{
				continue;
			}
			if !seen.insert(source_id) {
				continue;
			}

			selected.push(entry);
		}

		if selected.is_empty() {
			return Err(Error::NoSourcesResolved {
				message: "no enabled source matches the selection and type filter.".to_string(),
			});
		}

		Ok(selected)
	}

	/// Embeds the query once for every hybrid-capable source. Failures become degradations.
	async fn embed_query(
		&self,
		selected: &[&RegisteredSource],
		text: &str,
		deadline: tokio::time::Instant,
		degradations: &mut Vec<String>,
	) -> Option<Arc<Vec<f32>>> {
		if !selected.iter().any(|entry| hybrid_collection(entry).is_some()) {
			return None;
		}

		let unavailable = |message: String| {
			let err = Error::EmbeddingUnavailable { message };

			tracing::warn!(error = %err, "Hybrid search fell back to keyword results.");

			err.to_string()
		};
		let (Some(embedding), Some(_)) =
			(self.providers.embedding.as_ref(), self.providers.vector_index.as_ref())
		else {
			degradations.push(unavailable(
				"hybrid search needs an embedding provider and a vector index".to_string(),
			));

			return None;
		};
		let texts = vec![text.to_string()];

		match tokio::time::timeout_at(deadline, embedding.embed_batch(&texts)).await {
			Ok(Ok(mut vectors)) if vectors.len() == 1 => vectors.pop().map(Arc::new),
			Ok(Ok(vectors)) => {
				degradations
					.push(unavailable(format!("expected 1 query vector, got {}", vectors.len())));

				None
			},
			Ok(Err(err)) => {
				degradations.push(unavailable(err.to_string()));

				None
			},
			Err(_) => {
				degradations.push(unavailable("query embedding timed out".to_string()));

				None
			},
		}
	}

	/// Queries every selected source concurrently. Outcomes follow selection order. `None` when the
	/// deadline passed before any source finished.
	async fn fan_out(
		&self,
		selected: &[&RegisteredSource],
		text: &str,
		query_vector: Option<Arc<Vec<f32>>>,
		deadline: tokio::time::Instant,
	) -> Option<Vec<SourceOutcome>> {
		let semaphore =
			Arc::new(Semaphore::new(self.cfg.search.max_concurrent_sources.max(1) as usize));
		let text: Arc<str> = Arc::from(text);
		let mut tasks = JoinSet::new();

		for (idx, entry) in selected.iter().enumerate() {
			let source = entry.source.clone();
			let semaphore = semaphore.clone();
			let text = text.clone();
			let fetch = entry.cfg.max_results;
			let timeout = std::time::Duration::from_secs(entry.cfg.timeout_seconds);
			let vector = match (
				query_vector.as_ref(),
				self.providers.vector_index.as_ref(),
				hybrid_collection(entry),
			) {
				(Some(vector), Some(index), Some(collection)) => Some(VectorQuery {
					index: index.clone(),
					collection: collection.to_string(),
					vector: vector.clone(),
				}),
				_ => None,
			};

			tasks.spawn(async move {
				let Ok(_permit) = semaphore.acquire_owned().await else {
					let outcome = SourceOutcome {
						candidates: Vec::new(),
						error: Some("Source scheduling failed.".to_string()),
						elapsed_ms: 0.0,
						timed_out: false,
					};

					return (idx, outcome);
				};
				let started = Instant::now();
				let query = query_source(source.as_ref(), &text, fetch, vector);
				let result = tokio::time::timeout(timeout, query).await;
				let elapsed_ms = elapsed_ms(started);
				let outcome = match result {
					Ok(Ok(candidates)) =>
						SourceOutcome { candidates, error: None, elapsed_ms, timed_out: false },
					Ok(Err(err)) => SourceOutcome {
						candidates: Vec::new(),
						error: Some(err.to_string()),
						elapsed_ms,
						timed_out: false,
					},
					Err(_) => SourceOutcome {
						candidates: Vec::new(),
						error: Some(format!("Timed out after {} s.", timeout.as_secs())),
						elapsed_ms,
						timed_out: true,
					},
				};

				(idx, outcome)
			});
		}

		let mut outcomes: Vec<Option<SourceOutcome>> = vec![None; selected.len()];
		let mut deadline_hit = false;

		loop {
			match tokio::time::timeout_at(deadline, tasks.join_next()).await {
				Ok(Some(Ok((idx, outcome)))) => outcomes[idx] = Some(outcome),
				Ok(Some(Err(err))) => tracing::warn!(error = %err, "Source task failed."),
				Ok(None) => break,
				Err(_) => {
					deadline_hit = true;

					tasks.abort_all();

					break;
				},
			}
		}

		if deadline_hit && outcomes.iter().all(Option::is_none) {
			return None;
		}

		Some(
			outcomes
				.into_iter()
				.map(|outcome| {
					outcome.unwrap_or_else(|| SourceOutcome {
						candidates: Vec::new(),
						error: Some(if deadline_hit {
							"Search deadline passed before the source answered.".to_string()
						} else {
							"Source task failed.".to_string()
						}),
						elapsed_ms: 0.0,
						timed_out: deadline_hit,
					})
				})
				.collect(),
		)
	}
}

async fn query_source(
	source: &dyn DataSource,
	text: &str,
	fetch: u32,
	vector: Option<VectorQuery>,
) -> Result<Vec<SearchCandidate>> {
	let mut candidates = source.query(text, QueryParams { limit: fetch, offset: 0 }).await?;

	if let Some(VectorQuery { index, collection, vector }) = vector {
		match index.search(&collection, &vector, fetch, 0).await {
			Ok(hits) => {
				let source_id = source.source_id();
				let source_type = source.source_type();
				let extra = hits
					.into_iter()
					.map(|hit| sources::vector_candidate(source_id, source_type, hit));

				merge_max(&mut candidates, extra);
			},
			Err(err) => {
				tracing::warn!(
					source_id = source.source_id(),
					error = %err,
					"Vector search failed; keeping keyword results."
				);
			},
		}
	}

	Ok(candidates)
}

fn hybrid_collection(entry: &RegisteredSource) -> Option<&str> {
	let source_type: SourceType = entry.source.source_type();

	if !source_type.supports_hybrid() {
		return None;
	}

	entry.cfg.collection.as_deref()
}

/// Adds `extra` to `candidates`, keeping the higher score when an id is already present.
fn merge_max(
	candidates: &mut Vec<SearchCandidate>,
	extra: impl IntoIterator<Item = SearchCandidate>,
) {
	for candidate in extra {
		match candidates.iter_mut().find(|existing| existing.id == candidate.id) {
			Some(existing) =>
				if candidate.score > existing.score {
					existing.score = candidate.score;
				},
			None => candidates.push(candidate),
		}
	}
}

/// Keeps the first candidate per id and per content-prefix hash. Input must already be sorted
/// best first. Empty content is never treated as a duplicate.
fn dedup(candidates: Vec<SearchCandidate>, prefix_chars: usize) -> Vec<SearchCandidate> {
	let mut ids = HashSet::new();
	let mut hashes = HashSet::new();

	candidates
		.into_iter()
		.filter(|candidate| {
			if !ids.insert(candidate.id.clone()) {
				return false;
			}

			let content = candidate.content.trim();

			if content.is_empty() {
				return true;
			}

			let prefix = text::prefix_chars(content, prefix_chars);

			hashes.insert(*blake3::hash(prefix.as_bytes()).as_bytes())
		})
		.collect()
}

/// Strongest relations first, ties in build order.
fn related_documents(
	graph: &DocumentGraph,
	node: &DocumentNode,
	max_related: usize,
) -> Vec<RelatedDocument> {
	let mut relations: Vec<_> = node.relations.iter().collect();

	relations.sort_by(|a, b| scoring::cmp_f32_desc(a.strength, b.strength));

	relations
		.into_iter()
		.take(max_related)
		.map(|relation| RelatedDocument {
			doc_id: relation.target_doc_id.clone(),
			title: graph
				.get(&relation.target_doc_id)
				.map(|target| target.candidate.title.clone())
				.unwrap_or_default(),
			relation_type: relation.relation_type,
			strength: relation.strength,
			evidence: relation.evidence.clone(),
		})
		.collect()
}

fn elapsed_ms(started: Instant) -> f64 {
	started.elapsed().as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use super::*;

	fn candidate(id: &str, content: &str, score: f32) -> SearchCandidate {
		SearchCandidate {
			id: id.to_string(),
			title: id.to_string(),
			content: content.to_string(),
			source_id: "wiki".to_string(),
			source_type: SourceType::Wiki,
			score,
			metadata: BTreeMap::new(),
			snippet: None,
		}
	}

	#[test]
	fn dedup_keeps_the_first_of_equal_prefixes() {
		let shared = "x".repeat(250);
		let kept = dedup(
			vec![
				candidate("a", &format!("{shared} tail one"), 0.9),
				candidate("b", &format!("{shared} tail two"), 0.8),
				candidate("c", "", 0.7),
				candidate("d", "", 0.6),
				candidate("a", "other", 0.5),
			],
			200,
		);
		let ids: Vec<&str> = kept.iter().map(|candidate| candidate.id.as_str()).collect();

		assert_eq!(ids, vec!["a", "c", "d"]);
	}

	#[test]
	fn merge_keeps_the_higher_score() {
		let mut candidates = vec![candidate("a", "one", 0.4)];

		merge_max(&mut candidates, vec![candidate("a", "one", 0.9), candidate("b", "two", 0.2)]);

		assert_eq!(candidates.len(), 2);
		assert_eq!(candidates[0].score, 0.9);
		assert_eq!(candidates[1].id, "b");
	}
}
