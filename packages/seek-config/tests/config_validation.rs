use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use seek_config::{Config, SourceType};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_value() -> Value {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.")
}

fn render(value: &Value) -> String {
	toml::to_string(value).expect("Failed to render template config.")
}

fn source_table_mut<'a>(value: &'a mut Value, source_id: &str) -> &'a mut toml::Table {
	value
		.get_mut("sources")
		.and_then(Value::as_array_mut)
		.expect("Template config must include [[sources]].")
		.iter_mut()
		.filter_map(Value::as_table_mut)
		.find(|table| table.get("source_id").and_then(Value::as_str) == Some(source_id))
		.expect("Template config must include the requested source.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("seek_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> seek_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = seek_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation_error(payload: String, expected: &str) {
	let err = load_payload(payload).expect_err("Expected a validation error.");
	let message = err.to_string();

	assert!(message.contains(expected), "Unexpected error message: {message}");
}

#[test]
fn sample_config_loads_and_normalizes() {
	let cfg = load_payload(SAMPLE_CONFIG_TEMPLATE_TOML.to_string())
		.expect("Sample config should load.");

	assert_eq!(cfg.sources.len(), 5);

	let confluence = &cfg.sources[0];

	assert_eq!(confluence.source_type, SourceType::Wiki);
	assert!(confluence.enabled);
	assert_eq!(confluence.timeout_seconds, 10);
	assert_eq!(confluence.max_results, 50);
	assert_eq!(confluence.connection.api_base.as_deref(), Some("https://wiki.example.com"));
	assert!((confluence.effective_weight() - 1.2).abs() < f64::EPSILON);

	let jira = &cfg.sources[2];

	assert!((jira.effective_weight() - 0.7).abs() < f64::EPSILON);
	assert_eq!(cfg.search.dedup_prefix_chars, 200);
	assert_eq!(cfg.graph.max_concurrent_scores, 20);
	assert_eq!(cfg.rerank.max_related_per_result, 3);
}

#[test]
fn documentation_sources_outweigh_issue_trackers_by_default() {
	assert!(SourceType::Wiki.default_weight() > SourceType::IssueTracker.default_weight());
	assert!(SourceType::Files.default_weight() > SourceType::IssueTracker.default_weight());
}

#[test]
fn missing_file_reports_read_error() {
	let err = seek_config::load(std::path::Path::new("/nonexistent/seek.toml"))
		.expect_err("Expected read error.");

	assert!(matches!(err, seek_config::Error::ReadConfig { .. }));
}

#[test]
fn duplicate_source_ids_are_rejected() {
	let mut value = sample_value();

	source_table_mut(&mut value, "jira")
		.insert("source_id".to_string(), Value::String("gitlab".to_string()));

	expect_validation_error(render(&value), "sources.source_id gitlab is declared more than once.");
}

#[test]
fn http_sources_require_api_base() {
	let mut value = sample_value();
	let connection = source_table_mut(&mut value, "gitlab")
		.get_mut("connection")
		.and_then(Value::as_table_mut)
		.expect("gitlab source must have a connection table.");

	connection.insert("api_base".to_string(), Value::String("  ".to_string()));

	expect_validation_error(
		render(&value),
		"sources.gitlab.connection.api_base must be set for code_repository sources.",
	);
}

#[test]
fn database_identifiers_must_be_plain() {
	let mut value = sample_value();
	let connection = source_table_mut(&mut value, "catalog")
		.get_mut("connection")
		.and_then(Value::as_table_mut)
		.expect("catalog source must have a connection table.");

	connection.insert("table".to_string(), Value::String("docs; DROP TABLE x".to_string()));

	expect_validation_error(
		render(&value),
		"sources.catalog.connection.table must be a plain SQL identifier.",
	);
}

#[test]
fn files_sources_require_embedding_provider() {
	let mut value = sample_value();

	value
		.get_mut("providers")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [providers].")
		.remove("embedding");

	expect_validation_error(
		render(&value),
		"sources.uploads requires storage.qdrant and providers.embedding.",
	);
}

#[test]
fn default_sources_must_exist() {
	let mut value = sample_value();
	let search = value
		.get_mut("search")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [search].");

	search.insert(
		"default_sources".to_string(),
		Value::Array(vec![Value::String("notion".to_string())]),
	);

	expect_validation_error(
		render(&value),
		"search.default_sources references unknown source notion.",
	);
}

#[test]
fn graph_node_concurrency_is_capped() {
	let mut value = sample_value();
	let graph = value
		.get_mut("graph")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [graph].");

	graph.insert("max_concurrent_nodes".to_string(), Value::Integer(11));

	expect_validation_error(
		render(&value),
		"graph.max_concurrent_nodes must be in the range 1-10.",
	);
}

#[test]
fn cache_ttl_must_be_positive_when_enabled() {
	let mut value = sample_value();
	let cache = value
		.get_mut("search")
		.and_then(Value::as_table_mut)
		.and_then(|search| search.get_mut("cache"))
		.and_then(Value::as_table_mut)
		.expect("Template config must include [search.cache].");

	cache.insert("ttl_seconds".to_string(), Value::Integer(0));

	expect_validation_error(render(&value), "search.cache.ttl_seconds must be greater than zero.");
}
