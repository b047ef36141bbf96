use std::{
	collections::{BTreeMap, HashMap, VecDeque},
	sync::{
		Mutex, RwLock,
		atomic::{AtomicU64, Ordering},
	},
	time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
	Error, Result,
	models::{SearchConfig, SearchResult, SourceStatus},
};
use seek_config::{SearchCache, SearchOptimizer};
use seek_domain::text;

const SEARCH_CACHE_SCHEMA_VERSION: i32 = 1;
const LOW_HIT_RATE: f64 = 0.2;
const UNRELIABLE_SOURCE_RATE: f64 = 0.2;
const ABBREVIATIONS: &[(&str, &str)] = &[
	("k8s", "kubernetes"),
	("db", "database"),
	("auth", "authentication"),
	("config", "configuration"),
	("docs", "documentation"),
	("repo", "repository"),
	("js", "javascript"),
	("ts", "typescript"),
	("py", "python"),
	("env", "environment"),
	("ci", "continuous integration"),
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimizedQuery {
	pub original: String,
	pub normalized: String,
	pub expansions: Vec<String>,
	/// Text handed to sources.
	pub search_text: String,
}

#[derive(Clone, Debug)]
pub struct QueryOptimizer {
	expand: bool,
}
impl QueryOptimizer {
	pub fn new(cfg: &SearchOptimizer) -> Self {
		Self { expand: cfg.expand_queries }
	}

	pub fn optimize(&self, query: &str) -> OptimizedQuery {
		let collapsed = text::normalize_whitespace(query);
		let normalized =
			collapsed.trim_matches(|ch: char| ch.is_ascii_punctuation()).trim().to_string();
		let mut expansions: Vec<String> = Vec::new();

		if self.expand {
			for word in text::words(&normalized) {
				let Some((_, expansion)) = ABBREVIATIONS.iter().find(|(short, _)| *short == word)
				else {
					continue;
				};

				if text::contains_term(&normalized, expansion)
					|| expansions.iter().any(|seen| seen == expansion)
				{
					continue;
				}

				expansions.push(expansion.to_string());
			}
		}

		let search_text = if expansions.is_empty() {
			normalized.clone()
		} else {
			format!("{normalized} {}", expansions.join(" "))
		};

		OptimizedQuery { original: query.to_string(), normalized, expansions, search_text }
	}
}

pub fn hash_cache_key(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn build_search_cache_key(query: &OptimizedQuery, request: &SearchConfig) -> Result<String> {
	let request = serde_json::to_value(request).map_err(|err| Error::Storage {
		message: format!("Failed to encode search config: {err}"),
	})?;
	let payload = serde_json::json!({
		"kind": "search_result",
		"schema_version": SEARCH_CACHE_SCHEMA_VERSION,
		"query": query.normalized,
		"request": request,
	});

	hash_cache_key(&payload)
}

struct CacheEntry {
	inserted_at: Instant,
	value: SearchResult,
}

/// TTL-bounded search result cache. Lookups take the read lock; inserts and evictions take the
/// write lock.
pub struct QueryCache {
	enabled: bool,
	ttl: Duration,
	max_entries: usize,
	entries: RwLock<HashMap<String, CacheEntry>>,
	evictions: AtomicU64,
}
impl QueryCache {
	pub fn new(cfg: &SearchCache) -> Self {
		Self {
			enabled: cfg.enabled,
			ttl: Duration::from_secs(cfg.ttl_seconds),
			max_entries: cfg.max_entries as usize,
			entries: RwLock::new(HashMap::new()),
			evictions: AtomicU64::new(0),
		}
	}

	pub fn get(&self, key: &str) -> Option<SearchResult> {
		self.get_at(key, Instant::now())
	}

	pub fn get_at(&self, key: &str, now: Instant) -> Option<SearchResult> {
		if !self.enabled {
			return None;
		}

		let entries = self.entries.read().unwrap_or_else(|err| err.into_inner());
		let entry = entries.get(key)?;

		if self.is_expired(entry, now) {
			return None;
		}

		Some(entry.value.clone())
	}

	pub fn insert(&self, key: String, value: SearchResult) {
		self.insert_at(key, value, Instant::now());
	}

	pub fn insert_at(&self, key: String, value: SearchResult, now: Instant) {
		if !self.enabled || self.max_entries == 0 {
			return;
		}

		let mut entries = self.entries.write().unwrap_or_else(|err| err.into_inner());

		entries.retain(|_, entry| !self.is_expired(entry, now));

		while entries.len() >= self.max_entries && !entries.contains_key(&key) {
			let Some(oldest) = entries
				.iter()
				.min_by_key(|(_, entry)| entry.inserted_at)
				.map(|(key, _)| key.clone())
			else {
				break;
			};

			entries.remove(&oldest);
			self.evictions.fetch_add(1, Ordering::Relaxed);
		}

		entries.insert(key, CacheEntry { inserted_at: now, value });
	}

	/// Drops expired entries and returns how many were removed.
	pub fn purge_expired(&self) -> usize {
		let now = Instant::now();
		let mut entries = self.entries.write().unwrap_or_else(|err| err.into_inner());
		let before = entries.len();

		entries.retain(|_, entry| !self.is_expired(entry, now));

		before - entries.len()
	}

	pub fn len(&self) -> usize {
		self.entries.read().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Entries removed to make room, not counting TTL expiry.
	pub fn evictions(&self) -> u64 {
		self.evictions.load(Ordering::Relaxed)
	}

	fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
		now.saturating_duration_since(entry.inserted_at) >= self.ttl
	}
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PerformanceStats {
	pub total_queries: u64,
	pub cache_hits: u64,
	pub cache_misses: u64,
	pub cache_hit_rate: f64,
	pub avg_ms: f64,
	pub p50_ms: f64,
	pub p95_ms: f64,
	pub p99_ms: f64,
	pub slow_queries: u64,
	pub cache_evictions: u64,
	pub source_failure_rates: BTreeMap<String, f64>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
	LowCacheHitRate,
	SlowQueries,
	UnreliableSource,
	CachePressure,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Recommendation {
	pub kind: RecommendationKind,
	pub message: String,
}

#[derive(Default)]
struct SourceCounters {
	attempts: u64,
	failures: u64,
	timeouts: u64,
}

#[derive(Default)]
struct MetricsState {
	latencies: VecDeque<f64>,
	total_queries: u64,
	cache_hits: u64,
	cache_misses: u64,
	slow_queries: u64,
	sources: BTreeMap<String, SourceCounters>,
}

pub struct SearchMetrics {
	window: usize,
	slow_query_ms: f64,
	state: Mutex<MetricsState>,
}
impl SearchMetrics {
	pub fn new(cfg: &SearchOptimizer) -> Self {
		Self {
			window: cfg.latency_window.max(1) as usize,
			slow_query_ms: cfg.slow_query_ms,
			state: Mutex::new(MetricsState::default()),
		}
	}

	pub fn record_query(&self, latency_ms: f64, cache_hit: bool) {
		let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		state.total_queries += 1;

		if cache_hit {
			state.cache_hits += 1;
		} else {
			state.cache_misses += 1;
		}
		if latency_ms > self.slow_query_ms {
			state.slow_queries += 1;
		}

		state.latencies.push_back(latency_ms);

		while state.latencies.len() > self.window {
			state.latencies.pop_front();
		}
	}

	pub fn record_source(&self, source_id: &str, status: SourceStatus) {
		let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
		let counters = state.sources.entry(source_id.to_string()).or_default();

		counters.attempts += 1;

		match status {
			SourceStatus::Ok => {},
			SourceStatus::Failed => counters.failures += 1,
			SourceStatus::TimedOut => counters.timeouts += 1,
		}
	}

	pub fn stats(&self, cache_evictions: u64) -> PerformanceStats {
		let state = self.state.lock().unwrap_or_else(|err| err.into_inner());
		let mut latencies: Vec<f64> = state.latencies.iter().copied().collect();

		latencies.sort_by(|a, b| a.total_cmp(b));

		let avg_ms = if latencies.is_empty() {
			0.0
		} else {
			latencies.iter().sum::<f64>() / latencies.len() as f64
		};
		let lookups = state.cache_hits + state.cache_misses;
		let cache_hit_rate =
			if lookups == 0 { 0.0 } else { state.cache_hits as f64 / lookups as f64 };
		let source_failure_rates = state
			.sources
			.iter()
			.filter(|(_, counters)| counters.attempts > 0)
			.map(|(id, counters)| {
				let failed = counters.failures + counters.timeouts;

				(id.clone(), failed as f64 / counters.attempts as f64)
			})
			.collect();

		PerformanceStats {
			total_queries: state.total_queries,
			cache_hits: state.cache_hits,
			cache_misses: state.cache_misses,
			cache_hit_rate,
			avg_ms,
			p50_ms: percentile(&latencies, 0.50),
			p95_ms: percentile(&latencies, 0.95),
			p99_ms: percentile(&latencies, 0.99),
			slow_queries: state.slow_queries,
			cache_evictions,
			source_failure_rates,
		}
	}
}

/// Tuning hints derived from collected stats. Silent until enough queries have been seen.
pub fn recommend(
	stats: &PerformanceStats,
	optimizer: &SearchOptimizer,
	cache: &SearchCache,
) -> Vec<Recommendation> {
	let mut out = Vec::new();

	if stats.total_queries < u64::from(optimizer.min_queries_for_recommendations) {
		return out;
	}

	if cache.enabled && stats.cache_hit_rate < LOW_HIT_RATE {
		out.push(Recommendation {
			kind: RecommendationKind::LowCacheHitRate,
			message: format!(
				"Cache hit rate is {:.1}%. Consider a longer search.cache.ttl_seconds.",
				stats.cache_hit_rate * 100.0
			),
		});
	}
	if stats.p95_ms > optimizer.slow_query_ms {
		out.push(Recommendation {
			kind: RecommendationKind::SlowQueries,
			message: format!(
				"p95 latency is {:.0} ms, above {:.0} ms. Consider fewer sources per query.",
				stats.p95_ms, optimizer.slow_query_ms
			),
		});
	}

	for (source_id, rate) in &stats.source_failure_rates {
		if *rate > UNRELIABLE_SOURCE_RATE {
			out.push(Recommendation {
				kind: RecommendationKind::UnreliableSource,
				message: format!(
					"Source {source_id} fails {:.1}% of requests. Check its health.",
					rate * 100.0
				),
			});
		}
	}

	if cache.enabled && stats.cache_evictions > u64::from(cache.max_entries / 2) {
		out.push(Recommendation {
			kind: RecommendationKind::CachePressure,
			message: format!(
				"{} cache entries were evicted. Consider raising search.cache.max_entries.",
				stats.cache_evictions
			),
		});
	}

	out
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
	if sorted.is_empty() {
		return 0.0;
	}

	let pos = p * (sorted.len() - 1) as f64;
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;

	if lower == upper {
		return sorted[lower];
	}

	let weight = pos - lower as f64;

	sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

#[cfg(test)]
mod tests {
	use super::*;

	fn result(marker: &str) -> SearchResult {
		SearchResult {
			candidates: Vec::new(),
			total_results: 0,
			search_time_ms: 1.5,
			sources_searched: vec![marker.to_string()],
			source_reports: Vec::new(),
			degradations: Vec::new(),
		}
	}

	fn cache(ttl_seconds: u64, max_entries: u32) -> QueryCache {
		QueryCache::new(&SearchCache { enabled: true, ttl_seconds, max_entries })
	}

	#[test]
	fn optimizer_normalizes_and_expands() {
		let optimizer = QueryOptimizer::new(&SearchOptimizer::default());
		let query = optimizer.optimize("  Deploy K8s   Config?! ");

		assert_eq!(query.normalized, "deploy k8s config");
		assert_eq!(query.expansions, vec!["kubernetes", "configuration"]);
		assert_eq!(query.search_text, "deploy k8s config kubernetes configuration");
	}

	#[test]
	fn optimizer_skips_expansions_already_present() {
		let optimizer = QueryOptimizer::new(&SearchOptimizer::default());
		let query = optimizer.optimize("db database tuning");

		assert!(query.expansions.is_empty());
		assert_eq!(query.search_text, "db database tuning");
	}

	#[test]
	fn disabled_expansion_keeps_normalized_text() {
		let optimizer =
			QueryOptimizer::new(&SearchOptimizer { expand_queries: false, ..Default::default() });

		assert_eq!(optimizer.optimize("K8s docs").search_text, "k8s docs");
	}

	#[test]
	fn cache_key_tracks_query_and_request() {
		let optimizer = QueryOptimizer::new(&SearchOptimizer::default());
		let request = SearchConfig::default();
		let a = build_search_cache_key(&optimizer.optimize("Docker"), &request)
			.expect("Failed to build cache key.");
		let b = build_search_cache_key(&optimizer.optimize("  docker "), &request)
			.expect("Failed to build cache key.");
		let c = build_search_cache_key(
			&optimizer.optimize("docker"),
			&SearchConfig { limit: Some(3), ..Default::default() },
		)
		.expect("Failed to build cache key.");

		assert_eq!(a, b);
		assert_ne!(a, c);
	}

	#[test]
	fn entries_expire_after_ttl() {
		let cache = cache(10, 8);
		let start = Instant::now();

		cache.insert_at("k".to_string(), result("a"), start);

		assert!(cache.get_at("k", start + Duration::from_secs(9)).is_some());
		assert!(cache.get_at("k", start + Duration::from_secs(10)).is_none());
	}

	#[test]
	fn capacity_evicts_oldest_insertion() {
		let cache = cache(60, 2);
		let start = Instant::now();

		cache.insert_at("a".to_string(), result("a"), start);
		cache.insert_at("b".to_string(), result("b"), start + Duration::from_secs(1));
		cache.insert_at("c".to_string(), result("c"), start + Duration::from_secs(2));

		let now = start + Duration::from_secs(3);

		assert!(cache.get_at("a", now).is_none());
		assert!(cache.get_at("b", now).is_some());
		assert!(cache.get_at("c", now).is_some());
		assert_eq!(cache.evictions(), 1);
		assert_eq!(cache.len(), 2);
	}

	#[test]
	fn disabled_cache_stores_nothing() {
		let cache = QueryCache::new(&SearchCache { enabled: false, ..Default::default() });

		cache.insert("k".to_string(), result("a"));

		assert!(cache.get("k").is_none());
		assert!(cache.is_empty());
	}

	#[test]
	fn percentiles_interpolate() {
		let values = [10.0, 20.0, 30.0, 40.0];

		assert_eq!(percentile(&values, 0.5), 25.0);
		assert_eq!(percentile(&values, 0.0), 10.0);
		assert_eq!(percentile(&values, 1.0), 40.0);
		assert_eq!(percentile(&[], 0.9), 0.0);
	}

	#[test]
	fn metrics_track_hits_and_source_failures() {
		let metrics = SearchMetrics::new(&SearchOptimizer::default());

		metrics.record_query(100.0, false);
		metrics.record_query(3_000.0, true);
		metrics.record_source("jira", SourceStatus::Ok);
		metrics.record_source("jira", SourceStatus::TimedOut);

		let stats = metrics.stats(0);

		assert_eq!(stats.total_queries, 2);
		assert_eq!(stats.cache_hit_rate, 0.5);
		assert_eq!(stats.slow_queries, 1);
		assert_eq!(stats.source_failure_rates.get("jira"), Some(&0.5));
	}

	#[test]
	fn recommendations_wait_for_enough_queries() {
		let optimizer =
			SearchOptimizer { min_queries_for_recommendations: 5, ..Default::default() };
		let cache = SearchCache::default();
		let mut stats = PerformanceStats { total_queries: 4, ..Default::default() };

		assert!(recommend(&stats, &optimizer, &cache).is_empty());

		stats.total_queries = 5;
		stats.p95_ms = optimizer.slow_query_ms + 1.0;
		stats.source_failure_rates.insert("jira".to_string(), 0.5);

		let kinds: Vec<RecommendationKind> =
			recommend(&stats, &optimizer, &cache).into_iter().map(|rec| rec.kind).collect();

		assert_eq!(
			kinds,
			vec![
				RecommendationKind::LowCacheHitRate,
				RecommendationKind::SlowQueries,
				RecommendationKind::UnreliableSource,
			]
		);
	}
}
