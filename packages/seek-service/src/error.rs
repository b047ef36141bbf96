pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Only `InvalidRequest`, `NoSourcesResolved` and `Timeout` fail a search. The other variants are
/// logged and reported as degradations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("No sources resolved: {message}")]
	NoSourcesResolved { message: String },
	#[error("Source {source_id} unavailable: {message}")]
	SourceUnavailable { source_id: String, message: String },
	#[error("Graph build degraded: {message}")]
	GraphBuildDegraded { message: String },
	#[error("Rerank fell back to source order: {message}")]
	RerankFallback { message: String },
	#[error("Embedding unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("{phase} timed out after {budget_ms} ms.")]
	Timeout { phase: String, budget_ms: u64 },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Config error: {message}")]
	Config { message: String },
}
impl From<seek_storage::Error> for Error {
	fn from(err: seek_storage::Error) -> Self {
		match err {
			seek_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}

impl From<seek_config::Error> for Error {
	fn from(err: seek_config::Error) -> Self {
		Self::Config { message: err.to_string() }
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
