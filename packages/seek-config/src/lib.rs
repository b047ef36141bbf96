mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Graph, GraphTimeouts, Postgres, Providers, Qdrant, Rerank,
	RerankTimeouts, Search, SearchCache, SearchOptimizer, SearchTimeouts, Service, SourceConfig,
	SourceConnection, SourceType, Storage,
};

use std::{collections::HashSet, fs, path::Path};

/// Upper bound on concurrent node analyses during graph construction.
pub const MAX_GRAPH_NODE_CONCURRENCY: u32 = 10;
/// Upper bound on concurrent score calculations in the graph builder and reranker.
pub const MAX_SCORE_CONCURRENCY: u32 = 20;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if let Some(embedding) = cfg.providers.embedding.as_ref() {
		validate_embedding(embedding)?;
	}
	if let Some(postgres) = cfg.storage.postgres.as_ref() {
		if postgres.dsn.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.postgres.dsn must be non-empty.".to_string(),
			});
		}
		if postgres.pool_max_conns == 0 {
			return Err(Error::Validation {
				message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
			});
		}
		if let Some(table) = postgres.popularity_table.as_deref()
			&& !is_sql_identifier(table)
		{
			return Err(Error::Validation {
				message: "storage.postgres.popularity_table must be a plain SQL identifier."
					.to_string(),
			});
		}
	}
	if let Some(qdrant) = cfg.storage.qdrant.as_ref()
		&& qdrant.url.trim().is_empty()
	{
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}

	validate_sources(cfg)?;
	validate_search(cfg)?;
	validate_graph(&cfg.graph)?;
	validate_rerank(&cfg.rerank)?;

	Ok(())
}

fn validate_embedding(cfg: &EmbeddingProviderConfig) -> Result<()> {
	if cfg.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("providers.embedding.api_base", &cfg.api_base),
		("providers.embedding.api_key", &cfg.api_key),
		("providers.embedding.model", &cfg.model),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	Ok(())
}

fn validate_sources(cfg: &Config) -> Result<()> {
	let mut seen = HashSet::new();

	for source in &cfg.sources {
		let id = source.source_id.trim();

		if id.is_empty() {
			return Err(Error::Validation {
				message: "sources.source_id must be non-empty.".to_string(),
			});
		}
		if !seen.insert(id) {
			return Err(Error::Validation {
				message: format!("sources.source_id {id} is declared more than once."),
			});
		}
		if let Some(weight) = source.weight {
			if !weight.is_finite() {
				return Err(Error::Validation {
					message: format!("sources.{id}.weight must be a finite number."),
				});
			}
			if weight < 0.0 {
				return Err(Error::Validation {
					message: format!("sources.{id}.weight must be zero or greater."),
				});
			}
		}
		if source.timeout_seconds == 0 {
			return Err(Error::Validation {
				message: format!("sources.{id}.timeout_seconds must be greater than zero."),
			});
		}
		if source.max_results == 0 {
			return Err(Error::Validation {
				message: format!("sources.{id}.max_results must be greater than zero."),
			});
		}

		validate_connection(cfg, source)?;
	}

	Ok(())
}

fn validate_connection(cfg: &Config, source: &SourceConfig) -> Result<()> {
	let id = source.source_id.as_str();
	let conn = &source.connection;
	let require = |label: &str, value: &Option<String>| -> Result<()> {
		match value.as_deref() {
			Some(value) if !value.trim().is_empty() => Ok(()),
			_ => Err(Error::Validation {
				message: format!(
					"sources.{id}.connection.{label} must be set for {} sources.",
					source.source_type.as_str()
				),
			}),
		}
	};

	match source.source_type {
		SourceType::Wiki | SourceType::CodeRepository | SourceType::IssueTracker => {
			require("api_base", &conn.api_base)?;
			require("api_key", &conn.api_key)?;
		},
		SourceType::Database => {
			require("table", &conn.table)?;

			if cfg.storage.postgres.is_none() {
				return Err(Error::Validation {
					message: format!("sources.{id} requires storage.postgres."),
				});
			}

			for (label, value) in [
				("table", conn.table.as_deref()),
				("id_column", conn.id_column.as_deref()),
				("title_column", conn.title_column.as_deref()),
				("content_column", conn.content_column.as_deref()),
				("updated_at_column", conn.updated_at_column.as_deref()),
			] {
				if let Some(value) = value
					&& !is_sql_identifier(value)
				{
					return Err(Error::Validation {
						message: format!(
							"sources.{id}.connection.{label} must be a plain SQL identifier."
						),
					});
				}
			}
		},
		SourceType::Files => {
			if source.collection.as_deref().map(|c| c.trim().is_empty()).unwrap_or(true) {
				return Err(Error::Validation {
					message: format!("sources.{id}.collection must be set for files sources."),
				});
			}
			if cfg.storage.qdrant.is_none() || cfg.providers.embedding.is_none() {
				return Err(Error::Validation {
					message: format!(
						"sources.{id} requires storage.qdrant and providers.embedding."
					),
				});
			}
		},
	}

	Ok(())
}

fn validate_search(cfg: &Config) -> Result<()> {
	let search = &cfg.search;

	for name in &search.default_sources {
		if !cfg.sources.iter().any(|source| &source.source_id == name) {
			return Err(Error::Validation {
				message: format!("search.default_sources references unknown source {name}."),
			});
		}
	}

	if search.default_limit == 0 {
		return Err(Error::Validation {
			message: "search.default_limit must be greater than zero.".to_string(),
		});
	}
	if search.max_limit < search.default_limit {
		return Err(Error::Validation {
			message: "search.max_limit must be at least search.default_limit.".to_string(),
		});
	}
	if search.max_concurrent_sources == 0 {
		return Err(Error::Validation {
			message: "search.max_concurrent_sources must be greater than zero.".to_string(),
		});
	}
	if search.dedup_prefix_chars == 0 {
		return Err(Error::Validation {
			message: "search.dedup_prefix_chars must be greater than zero.".to_string(),
		});
	}
	if search.cache.enabled {
		if search.cache.ttl_seconds == 0 {
			return Err(Error::Validation {
				message: "search.cache.ttl_seconds must be greater than zero.".to_string(),
			});
		}
		if search.cache.max_entries == 0 {
			return Err(Error::Validation {
				message: "search.cache.max_entries must be greater than zero.".to_string(),
			});
		}
	}
	if search.optimizer.latency_window == 0 {
		return Err(Error::Validation {
			message: "search.optimizer.latency_window must be greater than zero.".to_string(),
		});
	}
	if !search.optimizer.slow_query_ms.is_finite() || search.optimizer.slow_query_ms <= 0.0 {
		return Err(Error::Validation {
			message: "search.optimizer.slow_query_ms must be a positive number.".to_string(),
		});
	}

	let timeouts = &search.timeouts;

	validate_budget("search.timeouts", timeouts.base_ms, timeouts.max_ms)
}

fn validate_graph(cfg: &Graph) -> Result<()> {
	if cfg.max_concurrent_nodes == 0 || cfg.max_concurrent_nodes > MAX_GRAPH_NODE_CONCURRENCY {
		return Err(Error::Validation {
			message: format!(
				"graph.max_concurrent_nodes must be in the range 1-{MAX_GRAPH_NODE_CONCURRENCY}."
			),
		});
	}
	if cfg.max_concurrent_scores == 0 || cfg.max_concurrent_scores > MAX_SCORE_CONCURRENCY {
		return Err(Error::Validation {
			message: format!(
				"graph.max_concurrent_scores must be in the range 1-{MAX_SCORE_CONCURRENCY}."
			),
		});
	}
	if cfg.timeouts.step_ms == 0 {
		return Err(Error::Validation {
			message: "graph.timeouts.step_ms must be greater than zero.".to_string(),
		});
	}

	validate_budget("graph.timeouts", cfg.timeouts.base_ms, cfg.timeouts.max_ms)
}

fn validate_rerank(cfg: &Rerank) -> Result<()> {
	if cfg.max_concurrent == 0 || cfg.max_concurrent > MAX_SCORE_CONCURRENCY {
		return Err(Error::Validation {
			message: format!(
				"rerank.max_concurrent must be in the range 1-{MAX_SCORE_CONCURRENCY}."
			),
		});
	}
	if cfg.intent_cache_entries == 0 {
		return Err(Error::Validation {
			message: "rerank.intent_cache_entries must be greater than zero.".to_string(),
		});
	}

	validate_budget("rerank.timeouts", cfg.timeouts.base_ms, cfg.timeouts.max_ms)
}

fn validate_budget(label: &str, base_ms: u64, max_ms: u64) -> Result<()> {
	if base_ms == 0 {
		return Err(Error::Validation {
			message: format!("{label}.base_ms must be greater than zero."),
		});
	}
	if max_ms < base_ms {
		return Err(Error::Validation {
			message: format!("{label}.max_ms must be at least {label}.base_ms."),
		});
	}

	Ok(())
}

fn is_sql_identifier(value: &str) -> bool {
	let mut chars = value.chars();
	let Some(first) = chars.next() else { return false };

	(first.is_ascii_alphabetic() || first == '_')
		&& chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
}

fn normalize(cfg: &mut Config) {
	if let Some(postgres) = cfg.storage.postgres.as_mut()
		&& postgres.popularity_table.as_deref().map(|t| t.trim().is_empty()).unwrap_or(false)
	{
		postgres.popularity_table = None;
	}

	for source in &mut cfg.sources {
		source.source_id = source.source_id.trim().to_string();

		if source.collection.as_deref().map(|c| c.trim().is_empty()).unwrap_or(false) {
			source.collection = None;
		}

		let conn = &mut source.connection;

		for field in [
			&mut conn.api_base,
			&mut conn.api_key,
			&mut conn.project,
			&mut conn.id_column,
			&mut conn.title_column,
			&mut conn.content_column,
			&mut conn.updated_at_column,
		] {
			if field.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false) {
				*field = None;
			}
		}
		if let Some(api_base) = conn.api_base.as_mut() {
			while api_base.ends_with('/') {
				api_base.pop();
			}
		}
	}

	cfg.search.default_sources.retain(|name| !name.trim().is_empty());
}
