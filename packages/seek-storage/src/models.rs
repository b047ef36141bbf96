use std::collections::BTreeMap;

use time::OffsetDateTime;

#[derive(Debug, sqlx::FromRow)]
pub struct DocumentRow {
	pub id: String,
	pub title: String,
	pub content: String,
	pub updated_at: Option<OffsetDateTime>,
	/// Number of query tokens the row matched.
	pub matched: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VectorHit {
	pub id: String,
	pub score: f32,
	pub payload: BTreeMap<String, serde_json::Value>,
}
