use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub providers: Providers,
	#[serde(default)]
	pub storage: Storage,
	#[serde(default)]
	pub sources: Vec<SourceConfig>,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub graph: Graph,
	#[serde(default)]
	pub rerank: Rerank,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Providers {
	/// Optional. Without it, hybrid search, files sources and semantic relations are unavailable.
	pub embedding: Option<EmbeddingProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
	pub postgres: Option<Postgres>,
	pub qdrant: Option<Qdrant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
	/// Table with `doc_id` and `score` columns backing popularity lookups.
	pub popularity_table: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
	Database,
	Wiki,
	CodeRepository,
	IssueTracker,
	Files,
}
impl SourceType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Database => "database",
			Self::Wiki => "wiki",
			Self::CodeRepository => "code_repository",
			Self::IssueTracker => "issue_tracker",
			Self::Files => "files",
		}
	}

	/// Documentation-oriented sources rank above issue trackers.
	pub fn default_weight(self) -> f64 {
		match self {
			Self::Wiki => 1.2,
			Self::Files => 1.1,
			Self::CodeRepository => 1.0,
			Self::Database => 0.9,
			Self::IssueTracker => 0.8,
		}
	}

	pub fn supports_hybrid(self) -> bool {
		matches!(self, Self::Database | Self::Wiki | Self::CodeRepository)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
	pub source_id: String,
	pub source_type: SourceType,
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Falls back to [`SourceType::default_weight`] when absent.
	pub weight: Option<f64>,
	#[serde(default = "default_source_timeout_seconds")]
	pub timeout_seconds: u64,
	#[serde(default = "default_source_max_results")]
	pub max_results: u32,
	/// Vector collection holding this source's embedded documents.
	pub collection: Option<String>,
	#[serde(default)]
	pub connection: SourceConnection,
}
impl SourceConfig {
	pub fn effective_weight(&self) -> f64 {
		self.weight.unwrap_or_else(|| self.source_type.default_weight())
	}
}

/// Adapter-specific settings. Which fields are required depends on the source type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConnection {
	pub api_base: Option<String>,
	pub api_key: Option<String>,
	/// Confluence space key, GitLab project id or Jira project key.
	pub project: Option<String>,
	pub table: Option<String>,
	pub id_column: Option<String>,
	pub title_column: Option<String>,
	pub content_column: Option<String>,
	pub updated_at_column: Option<String>,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	pub default_sources: Vec<String>,
	pub default_limit: u32,
	pub max_limit: u32,
	pub max_concurrent_sources: u32,
	pub dedup_prefix_chars: u32,
	pub cache: SearchCache,
	pub optimizer: SearchOptimizer,
	pub timeouts: SearchTimeouts,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_sources: Vec::new(),
			default_limit: 10,
			max_limit: 200,
			max_concurrent_sources: 8,
			dedup_prefix_chars: 200,
			cache: SearchCache::default(),
			optimizer: SearchOptimizer::default(),
			timeouts: SearchTimeouts::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchCache {
	pub enabled: bool,
	pub ttl_seconds: u64,
	pub max_entries: u32,
}
impl Default for SearchCache {
	fn default() -> Self {
		Self { enabled: true, ttl_seconds: 300, max_entries: 1_000 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchOptimizer {
	pub expand_queries: bool,
	pub latency_window: u32,
	pub slow_query_ms: f64,
	pub min_queries_for_recommendations: u32,
}
impl Default for SearchOptimizer {
	fn default() -> Self {
		Self {
			expand_queries: true,
			latency_window: 1_000,
			slow_query_ms: 2_000.0,
			min_queries_for_recommendations: 20,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchTimeouts {
	pub base_ms: u64,
	pub per_extra_source_ms: u64,
	pub large_limit_ms: u64,
	pub hybrid_ms: u64,
	pub long_query_ms: u64,
	pub max_ms: u64,
}
impl Default for SearchTimeouts {
	fn default() -> Self {
		Self {
			base_ms: 10_000,
			per_extra_source_ms: 2_000,
			large_limit_ms: 3_000,
			hybrid_ms: 5_000,
			long_query_ms: 2_000,
			max_ms: 30_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Graph {
	pub max_concurrent_nodes: u32,
	pub max_concurrent_scores: u32,
	pub timeouts: GraphTimeouts,
}
impl Default for Graph {
	fn default() -> Self {
		Self {
			max_concurrent_nodes: 10,
			max_concurrent_scores: 20,
			timeouts: GraphTimeouts::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphTimeouts {
	pub base_ms: u64,
	pub per_candidate_ms: u64,
	pub semantic_ms: u64,
	pub max_ms: u64,
	/// Budget for each individual build step.
	pub step_ms: u64,
}
impl Default for GraphTimeouts {
	fn default() -> Self {
		Self {
			base_ms: 15_000,
			per_candidate_ms: 100,
			semantic_ms: 10_000,
			max_ms: 45_000,
			step_ms: 15_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Rerank {
	pub max_concurrent: u32,
	pub max_related_per_result: u32,
	pub intent_cache_entries: u32,
	pub timeouts: RerankTimeouts,
}
impl Default for Rerank {
	fn default() -> Self {
		Self {
			max_concurrent: 20,
			max_related_per_result: 5,
			intent_cache_entries: 512,
			timeouts: RerankTimeouts::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RerankTimeouts {
	pub base_ms: u64,
	pub per_candidate_ms: u64,
	pub graph_ms: u64,
	pub max_ms: u64,
}
impl Default for RerankTimeouts {
	fn default() -> Self {
		Self { base_ms: 5_000, per_candidate_ms: 50, graph_ms: 3_000, max_ms: 20_000 }
	}
}

fn default_true() -> bool {
	true
}

fn default_source_timeout_seconds() -> u64 {
	10
}

fn default_source_max_results() -> u32 {
	50
}
