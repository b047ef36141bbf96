use crate::{
	BoxFuture, Error, Result,
	models::SearchCandidate,
	sources::{self, DataSource, QueryParams},
};
use seek_config::{SourceConfig, SourceType};
use seek_providers::{confluence::ConfluenceClient, gitlab::GitLabClient, jira::JiraClient};

/// Confluence pages matched with CQL.
pub struct WikiSource {
	id: String,
	client: ConfluenceClient,
}
impl WikiSource {
	pub fn new(cfg: &SourceConfig) -> Result<Self> {
		let client =
			ConfluenceClient::new(cfg).map_err(|err| Error::Config { message: err.to_string() })?;

		Ok(Self { id: cfg.source_id.clone(), client })
	}
}
impl DataSource for WikiSource {
	fn source_id(&self) -> &str {
		&self.id
	}

	fn source_type(&self) -> SourceType {
		SourceType::Wiki
	}

	fn query<'a>(
		&'a self,
		text: &'a str,
		params: QueryParams,
	) -> BoxFuture<'a, Result<Vec<SearchCandidate>>> {
		Box::pin(async move {
			let hits = self
				.client
				.search(text, params.limit, params.offset)
				.await
				.map_err(|err| sources::unavailable(&self.id, err))?;

			Ok(sources::rank_hits(&self.id, SourceType::Wiki, hits))
		})
	}

	fn health_check<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.client.ping().await.map_err(|err| sources::unavailable(&self.id, err))
		})
	}
}

/// GitLab blob search, scoped to one project when `connection.project` is set.
pub struct CodeRepositorySource {
	id: String,
	client: GitLabClient,
}
impl CodeRepositorySource {
	pub fn new(cfg: &SourceConfig) -> Result<Self> {
		let client =
			GitLabClient::new(cfg).map_err(|err| Error::Config { message: err.to_string() })?;

		Ok(Self { id: cfg.source_id.clone(), client })
	}
}
impl DataSource for CodeRepositorySource {
	fn source_id(&self) -> &str {
		&self.id
	}

	fn source_type(&self) -> SourceType {
		SourceType::CodeRepository
	}

	fn query<'a>(
		&'a self,
		text: &'a str,
		params: QueryParams,
	) -> BoxFuture<'a, Result<Vec<SearchCandidate>>> {
		Box::pin(async move {
			let hits = self
				.client
				.search(text, params.limit, params.offset)
				.await
				.map_err(|err| sources::unavailable(&self.id, err))?;

			Ok(sources::rank_hits(&self.id, SourceType::CodeRepository, hits))
		})
	}

	fn health_check<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.client.ping().await.map_err(|err| sources::unavailable(&self.id, err))
		})
	}
}

pub struct IssueTrackerSource {
	id: String,
	client: JiraClient,
}
impl IssueTrackerSource {
	pub fn new(cfg: &SourceConfig) -> Result<Self> {
		let client =
			JiraClient::new(cfg).map_err(|err| Error::Config { message: err.to_string() })?;

		Ok(Self { id: cfg.source_id.clone(), client })
	}
}
impl DataSource for IssueTrackerSource {
	fn source_id(&self) -> &str {
		&self.id
	}

	fn source_type(&self) -> SourceType {
		SourceType::IssueTracker
	}

	fn query<'a>(
		&'a self,
		text: &'a str,
		params: QueryParams,
	) -> BoxFuture<'a, Result<Vec<SearchCandidate>>> {
		Box::pin(async move {
			let hits = self
				.client
				.search(text, params.limit, params.offset)
				.await
				.map_err(|err| sources::unavailable(&self.id, err))?;

			Ok(sources::rank_hits(&self.id, SourceType::IssueTracker, hits))
		})
	}

	fn health_check<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.client.ping().await.map_err(|err| sources::unavailable(&self.id, err))
		})
	}
}
