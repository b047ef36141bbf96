use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{Error, Result, models::DocumentRow};
use seek_config::SourceConnection;

/// Identifiers of a searchable document table. Every name is checked before it reaches SQL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSpec {
	pub table: String,
	pub id_column: String,
	pub title_column: String,
	pub content_column: String,
	pub updated_at_column: Option<String>,
}
impl TableSpec {
	pub fn from_connection(conn: &SourceConnection) -> Result<Self> {
		let table = conn
			.table
			.clone()
			.ok_or_else(|| Error::InvalidArgument("Database sources need a table.".to_string()))?;
		let spec = Self {
			table,
			id_column: conn.id_column.clone().unwrap_or_else(|| "id".to_string()),
			title_column: conn.title_column.clone().unwrap_or_else(|| "title".to_string()),
			content_column: conn.content_column.clone().unwrap_or_else(|| "content".to_string()),
			updated_at_column: conn.updated_at_column.clone(),
		};

		for name in [&spec.table, &spec.id_column, &spec.title_column, &spec.content_column]
			.into_iter()
			.chain(spec.updated_at_column.as_ref())
		{
			ensure_identifier(name)?;
		}

		Ok(spec)
	}
}

/// Rows matching any token in title or content, most matched tokens first.
pub async fn search_documents(
	pool: &PgPool,
	spec: &TableSpec,
	tokens: &[String],
	limit: u32,
	offset: u32,
) -> Result<Vec<DocumentRow>> {
	if tokens.is_empty() {
		return Ok(Vec::new());
	}

	let mut builder = build_search_query(spec, tokens);

	builder.push(" LIMIT ");
	builder.push_bind(i64::from(limit));
	builder.push(" OFFSET ");
	builder.push_bind(i64::from(offset));

	let rows = builder.build_query_as::<DocumentRow>().fetch_all(pool).await?;

	Ok(rows)
}

pub async fn fetch_popularity(pool: &PgPool, table: &str, doc_id: &str) -> Result<Option<f32>> {
	ensure_identifier(table)?;

	let sql = format!("SELECT score::real FROM {table} WHERE doc_id = $1");
	let score: Option<(f32,)> =
		sqlx::query_as(&sql).bind(doc_id).fetch_optional(pool).await?;

	Ok(score.map(|(score,)| score))
}

fn build_search_query<'a>(spec: &TableSpec, tokens: &'a [String]) -> QueryBuilder<'a, Postgres> {
	let TableSpec { table, id_column, title_column, content_column, updated_at_column } = spec;
	let updated = match updated_at_column {
		Some(column) => format!("{column}::timestamptz"),
		None => "NULL::timestamptz".to_string(),
	};
	let mut builder = QueryBuilder::new(format!(
		"SELECT {id_column}::text AS id, {title_column}::text AS title, \
		 {content_column}::text AS content, {updated} AS updated_at, ("
	));

	for (idx, token) in tokens.iter().enumerate() {
		if idx > 0 {
			builder.push(" + ");
		}

		builder.push(format!("(({title_column} ILIKE "));
		builder.push_bind(like_pattern(token));
		builder.push(format!(") OR ({content_column} ILIKE "));
		builder.push_bind(like_pattern(token));
		builder.push("))::int");
	}

	builder.push(format!(") AS matched FROM {table} WHERE "));

	for (idx, token) in tokens.iter().enumerate() {
		if idx > 0 {
			builder.push(" OR ");
		}

		builder.push(format!("{title_column} ILIKE "));
		builder.push_bind(like_pattern(token));
		builder.push(format!(" OR {content_column} ILIKE "));
		builder.push_bind(like_pattern(token));
	}

	builder.push(format!(" ORDER BY matched DESC, {id_column}"));

	builder
}

fn like_pattern(token: &str) -> String {
	let escaped = token.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");

	format!("%{escaped}%")
}

fn ensure_identifier(name: &str) -> Result<()> {
	let mut chars = name.chars();
	let valid = chars.next().is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
		&& chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.');

	if !valid {
		return Err(Error::InvalidArgument(format!("{name:?} is not a plain SQL identifier.")));
	}

	Ok(())
}
