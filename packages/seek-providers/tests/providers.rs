use reqwest::header::{AUTHORIZATION, HeaderName};
use serde_json::{Map, Value};

#[test]
fn builds_bearer_auth_header() {
	let headers =
		seek_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn builds_private_token_header_with_defaults() {
	let mut defaults = Map::new();

	defaults.insert("x-team".to_string(), Value::String("search".to_string()));

	let headers = seek_providers::private_token_headers("glpat-1", &defaults)
		.expect("Failed to build headers.");

	assert_eq!(
		headers.get(HeaderName::from_static("private-token")).expect("Missing token header."),
		"glpat-1"
	);
	assert_eq!(headers.get("x-team").expect("Missing default header."), "search");
	assert!(headers.get(AUTHORIZATION).is_none());
}

#[test]
fn rejects_non_string_default_headers() {
	let mut defaults = Map::new();

	defaults.insert("x-retries".to_string(), Value::from(3));

	assert!(seek_providers::auth_headers("secret", &defaults).is_err());
}
