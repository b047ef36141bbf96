//! Searchable backends, one implementation per [`SourceType`].

mod database;
mod files;
mod remote;

pub use database::DatabaseSource;
pub use files::FilesSource;
pub use remote::{CodeRepositorySource, IssueTrackerSource, WikiSource};

use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;

use crate::{
	BoxFuture, EmbeddingProvider, Error, Result, VectorIndex, models::SearchCandidate, scoring,
};
use seek_config::{SourceConfig, SourceType};
use seek_domain::text;
use seek_providers::SourceHit;
use seek_storage::{db::Db, models::VectorHit};

const SNIPPET_CHARS: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryParams {
	pub limit: u32,
	pub offset: u32,
}

pub trait DataSource
where
	Self: Send + Sync,
{
	fn source_id(&self) -> &str;

	fn source_type(&self) -> SourceType;

	/// One page of candidates, best first, with scores in `[0, 1]`.
	fn query<'a>(
		&'a self,
		text: &'a str,
		params: QueryParams,
	) -> BoxFuture<'a, Result<Vec<SearchCandidate>>>;

	fn health_check<'a>(&'a self) -> BoxFuture<'a, Result<()>>;
}
impl dyn DataSource {
	/// Pages through [`DataSource::query`] in batches of `batch_size`.
	pub fn stream<'a>(&'a self, text: &'a str, batch_size: u32) -> SourcePager<'a> {
		SourcePager { source: self, text, batch_size: batch_size.max(1), offset: 0, done: false }
	}
}

/// Async pager returned by [`DataSource::stream`]. Ends after a short page, an empty page or an
/// error.
pub struct SourcePager<'a> {
	source: &'a dyn DataSource,
	text: &'a str,
	batch_size: u32,
	offset: u32,
	done: bool,
}
impl SourcePager<'_> {
	pub async fn next_batch(&mut self) -> Option<Result<Vec<SearchCandidate>>> {
		if self.done {
			return None;
		}

		let params = QueryParams { limit: self.batch_size, offset: self.offset };

		match self.source.query(self.text, params).await {
			Ok(batch) => {
				if (batch.len() as u32) < self.batch_size {
					self.done = true;
				}
				if batch.is_empty() {
					return None;
				}

				self.offset = self.offset.saturating_add(batch.len() as u32);

				Some(Ok(batch))
			},
			Err(err) => {
				self.done = true;

				Some(Err(err))
			},
		}
	}
}

/// Shared backends a source may need. Each is optional; a source whose backend is missing fails
/// to build.
#[derive(Clone, Default)]
pub struct SourceContext {
	pub db: Option<Arc<Db>>,
	pub embedding: Option<Arc<dyn EmbeddingProvider>>,
	pub vector_index: Option<Arc<dyn VectorIndex>>,
}

pub fn build_source(cfg: &SourceConfig, ctx: &SourceContext) -> Result<Arc<dyn DataSource>> {
	let source: Arc<dyn DataSource> = match cfg.source_type {
		SourceType::Wiki => Arc::new(WikiSource::new(cfg)?),
		SourceType::CodeRepository => Arc::new(CodeRepositorySource::new(cfg)?),
		SourceType::IssueTracker => Arc::new(IssueTrackerSource::new(cfg)?),
		SourceType::Database => {
			let Some(db) = ctx.db.clone() else {
				return Err(Error::Config {
					message: format!("Source {} requires storage.postgres.", cfg.source_id),
				});
			};

			Arc::new(DatabaseSource::new(cfg, db)?)
		},
		SourceType::Files => {
			let (Some(embedding), Some(index)) = (ctx.embedding.clone(), ctx.vector_index.clone())
			else {
				return Err(Error::Config {
					message: format!(
						"Source {} requires an embedding provider and storage.qdrant.",
						cfg.source_id
					),
				});
			};

			Arc::new(FilesSource::new(cfg, embedding, index)?)
		},
	};

	Ok(source)
}

/// Converts remote hits in rank order, scoring the first hit 1.0 and the last 0.0.
pub(crate) fn rank_hits(
	source_id: &str,
	source_type: SourceType,
	hits: Vec<SourceHit>,
) -> Vec<SearchCandidate> {
	let total = hits.len();

	hits.into_iter()
		.enumerate()
		.map(|(idx, hit)| SearchCandidate {
			snippet: snippet(&hit.content),
			id: hit.id,
			title: hit.title,
			content: hit.content,
			source_id: source_id.to_string(),
			source_type,
			score: scoring::rank_normalize(idx + 1, total),
			metadata: hit.metadata,
		})
		.collect()
}

/// A vector hit as a candidate. A `doc_id` payload field lets it merge with keyword hits for the
/// same document.
pub(crate) fn vector_candidate(
	source_id: &str,
	source_type: SourceType,
	hit: VectorHit,
) -> SearchCandidate {
	let VectorHit { id, score, mut payload } = hit;
	let id = match payload.remove("doc_id") {
		Some(Value::String(doc_id)) if !doc_id.is_empty() => doc_id,
		_ => format!("{source_id}:{id}"),
	};
	let title = take_string(&mut payload, &["title", "filename", "name"]).unwrap_or_default();
	let content = take_string(&mut payload, &["content", "text", "body"]).unwrap_or_default();

	SearchCandidate {
		snippet: snippet(&content),
		id,
		title,
		content,
		source_id: source_id.to_string(),
		source_type,
		score: scoring::unit(score),
		metadata: payload,
	}
}

pub(crate) fn unavailable(source_id: &str, err: impl std::fmt::Display) -> Error {
	Error::SourceUnavailable { source_id: source_id.to_string(), message: err.to_string() }
}

pub(crate) fn snippet(content: &str) -> Option<String> {
	let trimmed = content.trim();

	if trimmed.is_empty() {
		return None;
	}

	Some(text::prefix_chars(trimmed, SNIPPET_CHARS).to_string())
}

fn take_string(payload: &mut BTreeMap<String, Value>, keys: &[&str]) -> Option<String> {
	for key in keys {
		if let Some(Value::String(value)) = payload.get(*key) {
			let value = value.clone();

			payload.remove(*key);

			return Some(value);
		}
	}

	None
}
