//! Jira issue search using JQL.

use std::{collections::BTreeMap, time::Duration};

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::{Map, Value};

use crate::SourceHit;
use seek_config::SourceConfig;

const FIELDS: &str =
	"summary,description,updated,created,reporter,assignee,labels,issuetype,status";

pub struct JiraClient {
	source_id: String,
	client: Client,
	api_base: String,
	api_key: String,
	project: Option<String>,
	default_headers: Map<String, Value>,
}
impl JiraClient {
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

	pub async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<Vec<SourceHit>> {
		let res = self
			.client
			.get(format!("{}/rest/api/2/search", self.api_base))
			.headers(crate::auth_headers(&self.api_key, &self.default_headers)?)
			.query(&[
				("jql", build_jql(query, self.project.as_deref())),
				("startAt", offset.to_string()),
				("maxResults", limit.to_string()),
				("fields", FIELDS.to_string()),
			])
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_search_response(&json, &self.source_id, &self.api_base)
	}

	pub async fn ping(&self) -> Result<()> {
		self.client
			.get(format!("{}/rest/api/2/myself", self.api_base))
			.headers(crate::auth_headers(&self.api_key, &self.default_headers)?)
			.send()
			.await?
			.error_for_status()?;

		Ok(())
	}
}

fn build_jql(query: &str, project: Option<&str>) -> String {
	let text = format!("text ~ {}", crate::quote_phrase(query));

	match project {
		Some(project) =>
			format!("project = {} AND {text} ORDER BY updated DESC", crate::quote_phrase(project)),
		None => format!("{text} ORDER BY updated DESC"),
	}
}

/// Jira renders offsets as `+0000`; RFC 3339 wants `+00:00`.
fn normalize_timestamp(raw: &str) -> String {
	let bytes = raw.as_bytes();
	let len = bytes.len();

	if len > 5
		&& matches!(bytes[len - 5], b'+' | b'-')
		&& bytes[len - 4..].iter().all(u8::is_ascii_digit)
	{
		return format!("{}:{}", &raw[..len - 2], &raw[len - 2..]);
	}

	raw.to_string()
}

fn parse_search_response(
	json: &Value,
	source_id: &str,
	api_base: &str,
) -> Result<Vec<SourceHit>> {
	let issues = json
		.get("issues")
		.and_then(Value::as_array)
		.ok_or_else(|| eyre::eyre!("Jira response is missing issues array."))?;
	let mut hits = Vec::with_capacity(issues.len());

	for issue in issues {
		let key = issue
			.get("key")
			.and_then(Value::as_str)
			.ok_or_else(|| eyre::eyre!("Jira issue missing key."))?;
		let summary = crate::str_at(issue, "/fields/summary").unwrap_or_default();
		let description = crate::str_at(issue, "/fields/description").unwrap_or_default();
		let mut metadata = BTreeMap::new();

		metadata.insert("key".to_string(), Value::from(key));
		metadata.insert("url".to_string(), Value::from(format!("{api_base}/browse/{key}")));
		metadata.insert("content_type".to_string(), Value::from("issue"));

		if let Some(updated) = crate::str_at(issue, "/fields/updated") {
			metadata.insert("updated_at".to_string(), Value::from(normalize_timestamp(updated)));
		}
		if let Some(created) = crate::str_at(issue, "/fields/created") {
			metadata.insert("created_at".to_string(), Value::from(normalize_timestamp(created)));
		}
		if let Some(author) = crate::str_at(issue, "/fields/reporter/displayName") {
			metadata.insert("author".to_string(), Value::from(author));
		}
		if let Some(status) = crate::str_at(issue, "/fields/status/name") {
			metadata.insert("status".to_string(), Value::from(status));
		}
		if let Some(kind) = crate::str_at(issue, "/fields/issuetype/name") {
			metadata.insert("issue_type".to_string(), Value::from(kind));
		}
		if let Some(labels) = issue.pointer("/fields/labels").filter(|labels| labels.is_array()) {
			metadata.insert("tags".to_string(), labels.clone());
		}

		hits.push(SourceHit {
			id: format!("{source_id}:{key}"),
			title: format!("{key}: {summary}"),
			content: description.to_string(),
			metadata,
		});
	}

	Ok(hits)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalizes_compact_offsets() {
		assert_eq!(
			normalize_timestamp("2024-01-15T10:30:00.000+0000"),
			"2024-01-15T10:30:00.000+00:00"
		);
		assert_eq!(normalize_timestamp("2024-01-15T10:30:00Z"), "2024-01-15T10:30:00Z");
	}

	#[test]
	fn jql_orders_by_recency() {
		assert_eq!(
			build_jql("login crash", Some("OPS")),
			r#"project = "OPS" AND text ~ "login crash" ORDER BY updated DESC"#
		);
	}

	#[test]
	fn parses_issues() {
		let json = serde_json::json!({
			"issues": [{
				"key": "OPS-12",
				"fields": {
					"summary": "Deploy fails",
					"description": "docker push times out",
					"updated": "2024-01-15T10:30:00.000+0000",
					"labels": ["docker", "ci"],
					"reporter": { "displayName": "Kim" }
				}
			}]
		});
		let hits = parse_search_response(&json, "jira", "https://jira.example.com")
			.expect("Failed to parse search response.");

		assert_eq!(hits[0].id, "jira:OPS-12");
		assert_eq!(hits[0].title, "OPS-12: Deploy fails");
		assert_eq!(hits[0].metadata["updated_at"], "2024-01-15T10:30:00.000+00:00");
		assert_eq!(hits[0].metadata["tags"], serde_json::json!(["docker", "ci"]));
		assert_eq!(hits[0].metadata["url"], "https://jira.example.com/browse/OPS-12");
	}
}
