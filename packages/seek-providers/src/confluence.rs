//! Confluence content search over the REST API using CQL.

use std::{collections::BTreeMap, time::Duration};

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::{Map, Value};

use crate::SourceHit;
use seek_config::SourceConfig;

pub struct ConfluenceClient {
	source_id: String,
	client: Client,
	api_base: String,
	api_key: String,
	space: Option<String>,
	default_headers: Map<String, Value>,
}
impl ConfluenceClient {
	pub fn new(cfg: &SourceConfig) -> Result<Self> {
		let conn = &cfg.connection;

		Ok(Self {
			source_id: cfg.source_id.clone(),
			client: crate::http_client(Duration::from_secs(cfg.timeout_seconds))?,
			api_base: crate::required(cfg, "api_base", &conn.api_base)?.to_string(),
			api_key: crate::required(cfg, "api_key", &conn.api_key)?.to_string(),
			space: conn.project.clone(),
			default_headers: conn.default_headers.clone(),
		})
	}

	pub async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<Vec<SourceHit>> {
		let url = format!("{}/rest/api/content/search", self.api_base);
		let cql = build_cql(query, self.space.as_deref());
		let res = self
			.client
			.get(url)
			.headers(crate::auth_headers(&self.api_key, &self.default_headers)?)
			.query(&[
				("cql", cql),
				("limit", limit.to_string()),
				("start", offset.to_string()),
				("expand", "body.storage,version,space".to_string()),
			])
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_search_response(&json, &self.source_id)
	}

	pub async fn ping(&self) -> Result<()> {
		let url = format!("{}/rest/api/space", self.api_base);

		self.client
			.get(url)
			.headers(crate::auth_headers(&self.api_key, &self.default_headers)?)
			.query(&[("limit", "1")])
			.send()
			.await?
			.error_for_status()?;

		Ok(())
	}
}

fn build_cql(query: &str, space: Option<&str>) -> String {
	let mut cql = format!("type = page AND text ~ {}", crate::quote_phrase(query));

	if let Some(space) = space {
		cql.push_str(&format!(" AND space = {}", crate::quote_phrase(space)));
	}

	cql
}

/// Hit ids are `<source_id>:<page id>`.
fn parse_search_response(json: &Value, source_id: &str) -> Result<Vec<SourceHit>> {
	let results = json
		.get("results")
		.and_then(Value::as_array)
		.ok_or_else(|| eyre::eyre!("Confluence response is missing results array."))?;
	let base = crate::str_at(json, "/_links/base").unwrap_or_default();
	let mut hits = Vec::with_capacity(results.len());

	for item in results {
		let id = item
			.get("id")
			.and_then(Value::as_str)
			.ok_or_else(|| eyre::eyre!("Confluence result missing id."))?;
		let title = item.get("title").and_then(Value::as_str).unwrap_or_default();
		let content = crate::str_at(item, "/body/storage/value")
			.map(crate::strip_markup)
			.unwrap_or_default();
		let mut metadata = BTreeMap::new();

		if let Some(when) = crate::str_at(item, "/version/when") {
			metadata.insert("updated_at".to_string(), Value::from(when));
		}
		if let Some(author) = crate::str_at(item, "/version/by/displayName") {
			metadata.insert("author".to_string(), Value::from(author));
		}
		if let Some(space) = crate::str_at(item, "/space/key") {
			metadata.insert("space".to_string(), Value::from(space));
		}
		if let Some(webui) = crate::str_at(item, "/_links/webui") {
			metadata.insert("url".to_string(), Value::from(format!("{base}{webui}")));
		}

		metadata.insert("content_type".to_string(), Value::from("documentation"));

		hits.push(SourceHit {
			id: format!("{source_id}:{id}"),
			title: title.to_string(),
			content,
			metadata,
		});
	}

	Ok(hits)
}
