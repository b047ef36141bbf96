//! In-memory collaborators for service tests.

use std::{
	collections::{BTreeMap, HashMap},
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Value;

use seek_config::SourceType;
use seek_service::{
	BoxFuture, DataSource, EmbeddingProvider, Error, PopularityStore, QueryParams, Result,
	SearchCandidate, VectorIndex,
};
use seek_storage::models::VectorHit;

pub fn candidate(
	source_id: &str,
	source_type: SourceType,
	id: &str,
	title: &str,
	content: &str,
	score: f32,
) -> SearchCandidate {
	SearchCandidate {
		id: id.to_string(),
		title: title.to_string(),
		content: content.to_string(),
		source_id: source_id.to_string(),
		source_type,
		score,
		metadata: BTreeMap::new(),
		snippet: None,
	}
}

/// Serves a fixed candidate list. Pages by `offset` and `limit`, optionally after a delay or with
/// a failure.
pub struct StaticSource {
	source_id: String,
	source_type: SourceType,
	candidates: Vec<SearchCandidate>,
	delay: Option<Duration>,
	failure: Option<String>,
	calls: Arc<AtomicUsize>,
}
impl StaticSource {
	pub fn new(source_id: &str, source_type: SourceType, candidates: Vec<SearchCandidate>) -> Self {
		Self {
			source_id: source_id.to_string(),
			source_type,
			candidates,
			delay: None,
			failure: None,
			calls: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// Every query fails with `message`.
	pub fn failing(source_id: &str, source_type: SourceType, message: &str) -> Self {
		Self { failure: Some(message.to_string()), ..Self::new(source_id, source_type, Vec::new()) }
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	/// Shared counter of `query` calls, readable after the source moves into a service.
	pub fn calls(&self) -> Arc<AtomicUsize> {
		self.calls.clone()
	}
}
impl DataSource for StaticSource {
	fn source_id(&self) -> &str {
		&self.source_id
	}

	fn source_type(&self) -> SourceType {
		self.source_type
	}

	fn query<'a>(
		&'a self,
		_text: &'a str,
		params: QueryParams,
	) -> BoxFuture<'a, Result<Vec<SearchCandidate>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}
			if let Some(message) = self.failure.as_ref() {
				return Err(Error::SourceUnavailable {
					source_id: self.source_id.clone(),
					message: message.clone(),
				});
			}

			Ok(self
				.candidates
				.iter()
				.skip(params.offset as usize)
				.take(params.limit as usize)
				.cloned()
				.collect())
		})
	}

	fn health_check<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			match self.failure.as_ref() {
				Some(message) => Err(Error::SourceUnavailable {
					source_id: self.source_id.clone(),
					message: message.clone(),
				}),
				None => Ok(()),
			}
		})
	}
}

/// Bag-of-words vectors: each lowercase word adds weight to one hashed dimension. Texts sharing
/// words get a high cosine similarity.
pub struct HashEmbedding {
	pub dimensions: usize,
	delay: Option<Duration>,
	calls: Arc<AtomicUsize>,
}
impl HashEmbedding {
	pub fn new(dimensions: usize) -> Self {
		Self { dimensions: dimensions.max(1), delay: None, calls: Arc::new(AtomicUsize::new(0)) }
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> Arc<AtomicUsize> {
		self.calls.clone()
	}

	fn vector(&self, text: &str) -> Vec<f32> {
		let mut vector = vec![0.0; self.dimensions];

		for word in text
			.split(|ch: char| !ch.is_alphanumeric())
			.filter(|word| !word.is_empty())
			.map(str::to_lowercase)
		{
			let hash = blake3::hash(word.as_bytes());
			let mut bytes = [0_u8; 8];

			bytes.copy_from_slice(&hash.as_bytes()[..8]);

			vector[(u64::from_le_bytes(bytes) % self.dimensions as u64) as usize] += 1.0;
		}

		vector
	}
}
impl EmbeddingProvider for HashEmbedding {
	fn embed_batch<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let vectors = texts.iter().map(|text| self.vector(text)).collect();
		let delay = self.delay;

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			Ok(vectors)
		})
	}
}

pub struct FailingEmbedding;
impl EmbeddingProvider for FailingEmbedding {
	fn embed_batch<'a>(
		&'a self,
		_texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Err(color_eyre::eyre::eyre!("Embedding backend is down.")) })
	}
}

#[derive(Default)]
pub struct MapPopularity {
	pub scores: HashMap<String, f32>,
	delay: Option<Duration>,
}
impl MapPopularity {
	pub fn new(scores: &[(&str, f32)]) -> Self {
		Self {
			scores: scores.iter().map(|(id, score)| (id.to_string(), *score)).collect(),
			delay: None,
		}
	}

	/// Every lookup waits `delay` before answering.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}
}
impl PopularityStore for MapPopularity {
	fn get_score<'a>(&'a self, doc_id: &'a str) -> BoxFuture<'a, color_eyre::Result<Option<f32>>> {
		let score = self.scores.get(doc_id).copied();
		let delay = self.delay;

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			Ok(score)
		})
	}
}

/// Returns the same hits for every collection and vector.
#[derive(Default)]
pub struct StaticVectorIndex {
	pub hits: Vec<VectorHit>,
}
impl StaticVectorIndex {
	pub fn hit(id: &str, score: f32, payload: &[(&str, Value)]) -> VectorHit {
		VectorHit {
			id: id.to_string(),
			score,
			payload: payload.iter().map(|(key, value)| (key.to_string(), value.clone())).collect(),
		}
	}
}
impl VectorIndex for StaticVectorIndex {
	fn search<'a>(
		&'a self,
		_collection: &'a str,
		_vector: &'a [f32],
		limit: u32,
		offset: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<VectorHit>>> {
		let hits =
			self.hits.iter().skip(offset as usize).take(limit as usize).cloned().collect();

		Box::pin(async move { Ok(hits) })
	}

	fn health_check<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move { Ok(()) })
	}
}
