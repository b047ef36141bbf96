use std::collections::{BTreeMap, HashMap};

use qdrant_client::qdrant::{
	PointId, Query, QueryPointsBuilder, ScoredPoint, Value, point_id::PointIdOptions, value::Kind,
};
use serde_json::{Map, Number, Value as JsonValue};

use crate::{Result, models::VectorHit};

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
}
impl QdrantStore {
	pub fn new(cfg: &seek_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client })
	}

	/// Nearest neighbours of `vector` in `collection`, best first.
	pub async fn search(
		&self,
		collection: &str,
		vector: Vec<f32>,
		limit: u32,
		offset: u32,
	) -> Result<Vec<VectorHit>> {
		let query = QueryPointsBuilder::new(collection)
			.query(Query::new_nearest(vector))
			.with_payload(true)
			.limit(u64::from(limit))
			.offset(u64::from(offset));
		let response = self.client.query(query).await?;

		Ok(response.result.iter().filter_map(vector_hit).collect())
	}

	pub async fn ping(&self) -> Result<()> {
		self.client.health_check().await?;

		Ok(())
	}
}

fn vector_hit(point: &ScoredPoint) -> Option<VectorHit> {
	let id = point.id.as_ref().and_then(point_id_to_string)?;

	Some(VectorHit { id, score: point.score, payload: payload_to_json(&point.payload) })
}

fn point_id_to_string(point_id: &PointId) -> Option<String> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Num(id)) => Some(id.to_string()),
		Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
		None => None,
	}
}

pub fn payload_to_json(payload: &HashMap<String, Value>) -> BTreeMap<String, JsonValue> {
	payload.iter().map(|(key, value)| (key.clone(), value_to_json(value))).collect()
}

fn value_to_json(value: &Value) -> JsonValue {
	match &value.kind {
		Some(Kind::StringValue(text)) => JsonValue::String(text.clone()),
		Some(Kind::IntegerValue(number)) => JsonValue::from(*number),
		Some(Kind::DoubleValue(number)) =>
			Number::from_f64(*number).map(JsonValue::Number).unwrap_or(JsonValue::Null),
		Some(Kind::BoolValue(flag)) => JsonValue::Bool(*flag),
		Some(Kind::ListValue(list)) =>
			JsonValue::Array(list.values.iter().map(value_to_json).collect()),
		Some(Kind::StructValue(fields)) => JsonValue::Object(
			fields
				.fields
				.iter()
				.map(|(key, value)| (key.clone(), value_to_json(value)))
				.collect::<Map<_, _>>(),
		),
		Some(Kind::NullValue(_)) | None => JsonValue::Null,
	}
}
