//! GitLab blob search.

use std::{collections::BTreeMap, time::Duration};

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::{Map, Value};

use crate::SourceHit;
use seek_config::SourceConfig;

pub struct GitLabClient {
	source_id: String,
	client: Client,
	api_base: String,
	api_key: String,
	project: Option<String>,
	default_headers: Map<String, Value>,
}
impl GitLabClient {
	pub fn new(cfg: &SourceConfig) -> Result<Self> {
		let conn = &cfg.connection;

		Ok(Self {
			source_id: cfg.source_id.clone(),
			client: crate::http_client(Duration::from_secs(cfg.timeout_seconds))?,
			api_base: crate::required(cfg, "api_base", &conn.api_base)?.to_string(),
			api_key: crate::required(cfg, "api_key", &conn.api_key)?.to_string(),
			project: conn.project.clone(),
			default_headers: conn.default_headers.clone(),
		})
	}

	/// GitLab pages are 1-based; `offset` is rounded down to a page boundary.
	pub async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<Vec<SourceHit>> {
		let per_page = limit.clamp(1, 100);
		let page = offset / per_page + 1;
		let res = self
			.client
			.get(search_url(&self.api_base, self.project.as_deref()))
			.headers(crate::private_token_headers(&self.api_key, &self.default_headers)?)
			.query(&[
				("scope", "blobs".to_string()),
				("search", query.to_string()),
				("per_page", per_page.to_string()),
				("page", page.to_string()),
			])
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_blob_response(&json, &self.source_id)
	}

	pub async fn ping(&self) -> Result<()> {
		self.client
			.get(format!("{}/api/v4/version", self.api_base))
			.headers(crate::private_token_headers(&self.api_key, &self.default_headers)?)
			.send()
			.await?
			.error_for_status()?;

		Ok(())
	}
}

fn search_url(api_base: &str, project: Option<&str>) -> String {
	match project {
		Some(project) => {
			// Namespaced paths must be URL-encoded in the `:id` segment.
			let id = project.replace('/', "%2F");

			format!("{api_base}/api/v4/projects/{id}/search")
		},
		None => format!("{api_base}/api/v4/search"),
	}
}

fn parse_blob_response(json: &Value, source_id: &str) -> Result<Vec<SourceHit>> {
	let blobs =
		json.as_array().ok_or_else(|| eyre::eyre!("GitLab blob search must return an array."))?;
	let mut hits = Vec::with_capacity(blobs.len());

	for blob in blobs {
		let path = blob
			.get("path")
			.or_else(|| blob.get("filename"))
			.and_then(Value::as_str)
			.ok_or_else(|| eyre::eyre!("GitLab blob missing path."))?;
		let project_id = blob.get("project_id").and_then(Value::as_u64).unwrap_or_default();
		let git_ref = blob.get("ref").and_then(Value::as_str).unwrap_or("HEAD");
		let startline = blob.get("startline").and_then(Value::as_u64).unwrap_or(1);
		let content = blob.get("data").and_then(Value::as_str).unwrap_or_default();
		let mut metadata = BTreeMap::new();

		metadata.insert("path".to_string(), Value::from(path));
		metadata.insert("ref".to_string(), Value::from(git_ref));
		metadata.insert("project_id".to_string(), Value::from(project_id));
		metadata.insert("startline".to_string(), Value::from(startline));
		metadata.insert("content_type".to_string(), Value::from("code"));

		hits.push(SourceHit {
			id: format!("{source_id}:{project_id}:{git_ref}:{path}:{startline}"),
			title: path.to_string(),
			content: content.to_string(),
			metadata,
		});
	}

	Ok(hits)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn project_scoped_urls_encode_namespaces() {
		assert_eq!(
			search_url("https://gitlab.example.com", Some("platform/deploy")),
			"https://gitlab.example.com/api/v4/projects/platform%2Fdeploy/search"
		);
		assert_eq!(search_url("https://g", None), "https://g/api/v4/search");
	}

	#[test]
	fn parses_blobs() {
		let json = serde_json::json!([{
			"basename": "Dockerfile",
			"data": "FROM python:3.12\nRUN pip install fastapi\n",
			"path": "deploy/Dockerfile",
			"filename": "deploy/Dockerfile",
			"ref": "main",
			"startline": 1,
			"project_id": 7
		}]);
		let hits = parse_blob_response(&json, "gitlab").expect("Failed to parse blob response.");

		assert_eq!(hits[0].id, "gitlab:7:main:deploy/Dockerfile:1");
		assert_eq!(hits[0].title, "deploy/Dockerfile");
		assert_eq!(hits[0].metadata["ref"], "main");
	}
}
