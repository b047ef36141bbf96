pub mod confluence;
pub mod embedding;
pub mod gitlab;
pub mod jira;

use std::{collections::BTreeMap, sync::LazyLock, time::Duration};

use color_eyre::{Result, eyre};
use regex::Regex;
use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde::Serialize;
use serde_json::{Map, Value};

use seek_config::SourceConfig;

/// One document returned by a remote search API, before the service assigns a score.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceHit {
	pub id: String,
	pub title: String,
	pub content: String,
	pub metadata: BTreeMap<String, Value>,
}

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	extend_headers(&mut headers, default_headers)?;

	Ok(headers)
}

/// GitLab-style token authentication.
pub fn private_token_headers(
	api_key: &str,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(HeaderName::from_static("private-token"), HeaderValue::from_str(api_key)?);

	extend_headers(&mut headers, default_headers)?;

	Ok(headers)
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
	Ok(Client::builder().timeout(timeout).build()?)
}

pub(crate) fn required<'a>(
	cfg: &SourceConfig,
	label: &str,
	value: &'a Option<String>,
) -> Result<&'a str> {
	value
		.as_deref()
		.ok_or_else(|| eyre::eyre!("sources.{}.connection.{label} is required.", cfg.source_id))
}

/// Quotes a phrase for CQL and JQL `~` clauses.
pub(crate) fn quote_phrase(text: &str) -> String {
	let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");

	format!("\"{escaped}\"")
}

/// Drops markup tags and collapses whitespace.
pub(crate) fn strip_markup(html: &str) -> String {
	static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

	let stripped = match TAG.as_ref() {
		Some(re) => re.replace_all(html, " ").into_owned(),
		None => html.to_string(),
	};

	stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
	value.pointer(pointer).and_then(Value::as_str)
}

fn extend_headers(headers: &mut HeaderMap, default_headers: &Map<String, Value>) -> Result<()> {
	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(eyre::eyre!("Default header values must be strings."));
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_tags_and_whitespace() {
		assert_eq!(strip_markup("<p>Run <b>docker</b>\n compose</p>"), "Run docker compose");
	}

	#[test]
	fn quotes_embedded_quotes() {
		assert_eq!(quote_phrase(r#"say "hi""#), r#""say \"hi\"""#);
	}
}
