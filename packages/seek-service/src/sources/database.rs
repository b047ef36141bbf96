use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;
use time::format_description::well_known::Rfc3339;

use crate::{
	BoxFuture, Error, Result,
	models::SearchCandidate,
	sources::{self, DataSource, QueryParams},
};
use seek_config::{SourceConfig, SourceType};
use seek_domain::intent;
use seek_storage::{
	db::Db,
	models::DocumentRow,
	queries::{self, TableSpec},
};

const MAX_QUERY_TOKENS: usize = 8;

/// Keyword search over one Postgres table.
pub struct DatabaseSource {
	id: String,
	db: Arc<Db>,
	spec: TableSpec,
}
impl DatabaseSource {
	pub fn new(cfg: &SourceConfig, db: Arc<Db>) -> Result<Self> {
		let spec = TableSpec::from_connection(&cfg.connection)
			.map_err(|err| Error::Config { message: err.to_string() })?;

		Ok(Self { id: cfg.source_id.clone(), db, spec })
	}
}
impl DataSource for DatabaseSource {
	fn source_id(&self) -> &str {
		&self.id
	}

	fn source_type(&self) -> SourceType {
		SourceType::Database
	}

	fn query<'a>(
		&'a self,
		text: &'a str,
		params: QueryParams,
	) -> BoxFuture<'a, Result<Vec<SearchCandidate>>> {
		Box::pin(async move {
			let tokens = query_tokens(text);
			let rows = queries::search_documents(
				&self.db.pool,
				&self.spec,
				&tokens,
				params.limit,
				params.offset,
			)
			.await
			.map_err(|err| sources::unavailable(&self.id, err))?;

			Ok(rows.into_iter().map(|row| row_candidate(&self.id, tokens.len(), row)).collect())
		})
	}

	fn health_check<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.db.ping().await.map_err(|err| sources::unavailable(&self.id, err))
		})
	}
}

fn query_tokens(text: &str) -> Vec<String> {
	let mut tokens = intent::keywords(text);

	tokens.truncate(MAX_QUERY_TOKENS);

	tokens
}

/// Scores a row by the share of query tokens it matched.
fn row_candidate(source_id: &str, token_count: usize, row: DocumentRow) -> SearchCandidate {
	let score = if token_count == 0 {
		0.0
	} else {
		(row.matched.max(0) as f32 / token_count as f32).clamp(0.0, 1.0)
	};
	let mut metadata = BTreeMap::new();

	metadata.insert("row_id".to_string(), Value::from(row.id.clone()));
	metadata.insert("content_type".to_string(), Value::from("record"));

	if let Some(updated_at) = row.updated_at
		&& let Ok(formatted) = updated_at.format(&Rfc3339)
	{
		metadata.insert("updated_at".to_string(), Value::from(formatted));
	}

	SearchCandidate {
		id: format!("{source_id}:{}", row.id),
		title: row.title,
		snippet: sources::snippet(&row.content),
		content: row.content,
		source_id: source_id.to_string(),
		source_type: SourceType::Database,
		score,
		metadata,
	}
}
