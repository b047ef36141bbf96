pub mod cache;
pub mod graph;
pub mod models;
pub mod orchestrator;
pub mod rerank;
pub mod scoring;
pub mod sources;
pub mod timeouts;

mod error;

pub use error::{Error, Result};
pub use graph::{DocumentGraph, DocumentNode, DocumentRelation, GraphBuild, RelationType};
pub use models::{
	ContextualScore, GraphSummary, HealthReport, RankedCandidate, RelatedDocument, RerankContext,
	SearchCandidate, SearchConfig, SearchResult, SourceReport, SourceStatus, UserPreferences,
};
pub use rerank::RerankOutcome;
pub use sources::{DataSource, QueryParams, SourcePager};

use std::{
	future::Future,
	pin::Pin,
	sync::Arc,
	time::{Duration, Instant},
};

use tokio::task::JoinSet;

use cache::{PerformanceStats, QueryCache, QueryOptimizer, Recommendation, SearchMetrics};
use rerank::IntentCache;
use seek_config::{Config, EmbeddingProviderConfig, SourceConfig, SourceConnection};
use seek_storage::{db::Db, models::VectorHit, qdrant::QdrantStore, queries};
use sources::SourceContext;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	/// One vector per input text, in input order.
	fn embed_batch<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait PopularityStore
where
	Self: Send + Sync,
{
	/// Interaction-based score for a document, `None` when it has no history.
	fn get_score<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, color_eyre::Result<Option<f32>>>;
}

pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		collection: &'a str,
		vector: &'a [f32],
		limit: u32,
		offset: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<VectorHit>>>;

	fn health_check<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<()>>;
}

/// Optional collaborators. Each missing one degrades the features that need it.
#[derive(Clone, Default)]
pub struct Providers {
	pub embedding: Option<Arc<dyn EmbeddingProvider>>,
	pub popularity: Option<Arc<dyn PopularityStore>>,
	pub vector_index: Option<Arc<dyn VectorIndex>>,
}

pub struct HttpEmbedding {
	cfg: EmbeddingProviderConfig,
}
impl HttpEmbedding {
	pub fn new(cfg: EmbeddingProviderConfig) -> Self {
		Self { cfg }
	}
}

pub struct PgPopularity {
	db: Arc<Db>,
	table: String,
}
impl PgPopularity {
	pub fn new(db: Arc<Db>, table: String) -> Self {
		Self { db, table }
	}
}

pub struct QdrantIndex {
	store: QdrantStore,
}
impl QdrantIndex {
	pub fn new(store: QdrantStore) -> Self {
		Self { store }
	}
}

pub struct SeekService {
	pub cfg: Config,
	pub providers: Providers,
	sources: Vec<RegisteredSource>,
	cache: QueryCache,
	optimizer: QueryOptimizer,
	metrics: SearchMetrics,
	intents: IntentCache,
}

struct RegisteredSource {
	cfg: SourceConfig,
	source: Arc<dyn DataSource>,
}

impl EmbeddingProvider for HttpEmbedding {
	fn embed_batch<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(seek_providers::embedding::embed(&self.cfg, texts))
	}
}

impl PopularityStore for PgPopularity {
	fn get_score<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, color_eyre::Result<Option<f32>>> {
		Box::pin(async move {
			Ok(queries::fetch_popularity(&self.db.pool, &self.table, doc_id).await?)
		})
	}
}

impl VectorIndex for QdrantIndex {
	fn search<'a>(
		&'a self,
		collection: &'a str,
		vector: &'a [f32],
		limit: u32,
		offset: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<VectorHit>>> {
		Box::pin(async move {
			Ok(self.store.search(collection, vector.to_vec(), limit, offset).await?)
		})
	}

	fn health_check<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move { Ok(self.store.ping().await?) })
	}
}

impl SeekService {
	/// Registers ready-made sources. A source without a matching `[[sources]]` entry gets the
	/// defaults for its type.
	pub fn new(cfg: Config, sources: Vec<Arc<dyn DataSource>>, providers: Providers) -> Self {
		let sources = sources
			.into_iter()
			.map(|source| {
				let source_cfg = cfg
					.sources
					.iter()
					.find(|entry| entry.source_id == source.source_id())
					.cloned()
					.unwrap_or_else(|| default_source_config(source.as_ref()));

				RegisteredSource { cfg: source_cfg, source }
			})
			.collect();

		Self {
			cache: QueryCache::new(&cfg.search.cache),
			optimizer: QueryOptimizer::new(&cfg.search.optimizer),
			metrics: SearchMetrics::new(&cfg.search.optimizer),
			intents: IntentCache::new(cfg.rerank.intent_cache_entries as usize),
			sources,
			providers,
			cfg,
		}
	}

	/// Connects the configured backends and builds every enabled source.
	pub async fn connect(cfg: Config) -> Result<Self> {
		let db = match cfg.storage.postgres.as_ref() {
			Some(postgres) => Some(Arc::new(Db::connect(postgres).await?)),
			None => None,
		};
		let vector_index: Option<Arc<dyn VectorIndex>> = match cfg.storage.qdrant.as_ref() {
			Some(qdrant) => Some(Arc::new(QdrantIndex::new(QdrantStore::new(qdrant)?))),
			None => None,
		};
		let embedding = cfg.providers.embedding.clone().map(|embedding| {
			Arc::new(HttpEmbedding::new(embedding)) as Arc<dyn EmbeddingProvider>
		});
		let popularity: Option<Arc<dyn PopularityStore>> = match (
			db.as_ref(),
			cfg.storage.postgres.as_ref().and_then(|postgres| postgres.popularity_table.clone()),
		) {
			(Some(db), Some(table)) => Some(Arc::new(PgPopularity::new(db.clone(), table))),
			_ => None,
		};
		let ctx =
			SourceContext { db, embedding: embedding.clone(), vector_index: vector_index.clone() };
		let mut registered = Vec::new();

		for source_cfg in cfg.sources.iter().filter(|source| source.enabled) {
			registered.push(sources::build_source(source_cfg, &ctx)?);

			tracing::debug!(
				source_id = %source_cfg.source_id,
				source_type = source_cfg.source_type.as_str(),
				"Registered source."
			);
		}

		Ok(Self::new(cfg, registered, Providers { embedding, popularity, vector_index }))
	}

	pub fn source_ids(&self) -> Vec<&str> {
		self.sources.iter().map(|entry| entry.source.source_id()).collect()
	}

	pub fn cache(&self) -> &QueryCache {
		&self.cache
	}

	pub fn optimizer(&self) -> &QueryOptimizer {
		&self.optimizer
	}

	pub fn stats(&self) -> PerformanceStats {
		self.metrics.stats(self.cache.evictions())
	}

	pub fn recommendations(&self) -> Vec<Recommendation> {
		cache::recommend(&self.stats(), &self.cfg.search.optimizer, &self.cfg.search.cache)
	}

	/// Probes every enabled source concurrently. Reports keep registration order.
	pub async fn health(&self) -> Vec<HealthReport> {
		let mut tasks = JoinSet::new();
		let enabled: Vec<&RegisteredSource> =
			self.sources.iter().filter(|entry| entry.cfg.enabled).collect();

		for (idx, entry) in enabled.iter().enumerate() {
			let source = entry.source.clone();
			let budget = Duration::from_secs(entry.cfg.timeout_seconds);

			tasks.spawn(async move {
				let started = Instant::now();
				let outcome = tokio::time::timeout(budget, source.health_check()).await;
				let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
				let error = match outcome {
					Ok(Ok(())) => None,
					Ok(Err(err)) => Some(err.to_string()),
					Err(_) => Some(format!("Health check timed out after {} s.", budget.as_secs())),
				};

				(idx, latency_ms, error)
			});
		}

		let mut reports: Vec<HealthReport> = enabled
			.iter()
			.map(|entry| HealthReport {
				source_id: entry.cfg.source_id.clone(),
				source_type: entry.source.source_type(),
				healthy: false,
				latency_ms: 0.0,
				error: Some("Health check did not complete.".to_string()),
			})
			.collect();

		while let Some(joined) = tasks.join_next().await {
			let Ok((idx, latency_ms, error)) = joined else {
				continue;
			};
			let report = &mut reports[idx];

			if let Some(message) = error.as_deref() {
				tracing::warn!(
					source_id = %report.source_id,
					error = %message,
					"Source is unhealthy."
				);
			}

			report.healthy = error.is_none();
			report.latency_ms = latency_ms;
			report.error = error;
		}

		reports
	}

	/// Builds a relationship graph over `candidates`. Never fails; problems are reported as
	/// degradations.
	pub async fn build_graph(
		&self,
		candidates: &[SearchCandidate],
		include_semantic: bool,
	) -> GraphBuild {
		graph::GraphBuilder::new(&self.cfg.graph, self.providers.embedding.clone())
			.build(candidates, include_semantic)
			.await
	}

	pub async fn rerank(
		&self,
		candidates: &[SearchCandidate],
		query: &str,
		context: &RerankContext,
		graph: Option<&DocumentGraph>,
		limit: usize,
	) -> RerankOutcome {
		rerank::Reranker::new(&self.cfg.rerank, self.providers.popularity.clone(), &self.intents)
			.rerank(candidates, query, context, graph, limit, time::OffsetDateTime::now_utc())
			.await
	}
}

fn default_source_config(source: &dyn DataSource) -> SourceConfig {
	SourceConfig {
		source_id: source.source_id().to_string(),
		source_type: source.source_type(),
		enabled: true,
		weight: None,
		timeout_seconds: 10,
		max_results: 50,
		collection: None,
		connection: SourceConnection::default(),
	}
}
