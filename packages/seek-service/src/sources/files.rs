use std::sync::Arc;

use crate::{
	BoxFuture, EmbeddingProvider, Error, Result, VectorIndex,
	models::SearchCandidate,
	sources::{self, DataSource, QueryParams},
};
use seek_config::{SourceConfig, SourceType};

/// Uploaded files, searched by vector similarity only.
pub struct FilesSource {
	id: String,
	collection: String,
	embedding: Arc<dyn EmbeddingProvider>,
	index: Arc<dyn VectorIndex>,
}
impl FilesSource {
	pub fn new(
		cfg: &SourceConfig,
		embedding: Arc<dyn EmbeddingProvider>,
		index: Arc<dyn VectorIndex>,
	) -> Result<Self> {
		let Some(collection) = cfg.collection.clone() else {
			return Err(Error::Config {
				message: format!("sources.{}.collection must be set.", cfg.source_id),
			});
		};

		Ok(Self { id: cfg.source_id.clone(), collection, embedding, index })
	}
}
impl DataSource for FilesSource {
	fn source_id(&self) -> &str {
		&self.id
	}

	fn source_type(&self) -> SourceType {
		SourceType::Files
	}

	fn query<'a>(
		&'a self,
		text: &'a str,
		params: QueryParams,
	) -> BoxFuture<'a, Result<Vec<SearchCandidate>>> {
		Box::pin(async move {
			let texts = vec![text.to_string()];
			let mut vectors = self
				.embedding
				.embed_batch(&texts)
				.await
				.map_err(|err| sources::unavailable(&self.id, err))?;
			let Some(vector) = vectors.pop() else {
				let message = "Embedding provider returned no vectors.";

				return Err(sources::unavailable(&self.id, message));
			};
			let hits = self
				.index
				.search(&self.collection, &vector, params.limit, params.offset)
				.await
				.map_err(|err| sources::unavailable(&self.id, err))?;

			Ok(hits
				.into_iter()
				.map(|hit| sources::vector_candidate(&self.id, SourceType::Files, hit))
				.collect())
		})
	}

	fn health_check<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.index.health_check().await.map_err(|err| sources::unavailable(&self.id, err))
		})
	}
}
