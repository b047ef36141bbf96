use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::RelationType;
use seek_config::SourceType;
use seek_domain::{classifier::DocumentType, intent::TechnicalLevel};

/// One retrieved item. Immutable once a source hands it to the orchestrator.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SearchCandidate {
	pub id: String,
	pub title: String,
	pub content: String,
	pub source_id: String,
	pub source_type: SourceType,
	pub score: f32,
	#[serde(default)]
	pub metadata: BTreeMap<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub snippet: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UserPreferences {
	pub sources: Vec<String>,
	pub authors: Vec<String>,
	pub content_types: Vec<String>,
	pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RerankContext {
	pub technical_level: Option<TechnicalLevel>,
	pub domain: Option<String>,
	pub preferences: UserPreferences,
}

/// Per-request search settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
	/// Empty means the configured default set, or every enabled source when that is empty too.
	pub selected_sources: Vec<String>,
	/// Falls back to `search.default_limit`.
	pub limit: Option<u32>,
	pub hybrid_search: bool,
	pub source_weights: BTreeMap<String, f64>,
	pub source_type_filter: Option<Vec<SourceType>>,
	pub build_graph: bool,
	pub include_semantic: bool,
	pub rerank: bool,
	pub context: RerankContext,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ContextualScore {
	pub base: f32,
	pub intent: f32,
	pub temporal: f32,
	pub popularity: f32,
	pub relationship: f32,
	pub personalization: f32,
	pub final_score: f32,
	pub explanation: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RelatedDocument {
	pub doc_id: String,
	pub title: String,
	pub relation_type: RelationType,
	pub strength: f32,
	pub evidence: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GraphSummary {
	pub document_type: DocumentType,
	pub importance_score: f32,
	pub relationship_count: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RankedCandidate {
	#[serde(flatten)]
	pub candidate: SearchCandidate,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub contextual_score: Option<ContextualScore>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub related_documents: Vec<RelatedDocument>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub graph: Option<GraphSummary>,
}
impl RankedCandidate {
	pub fn plain(candidate: SearchCandidate) -> Self {
		Self { candidate, contextual_score: None, related_documents: Vec::new(), graph: None }
	}

	/// Score used for ordering: the contextual final score when present, else the base score.
	pub fn ranking_score(&self) -> f32 {
		self.contextual_score
			.as_ref()
			.map(|score| score.final_score)
			.unwrap_or(self.candidate.score)
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
	Ok,
	Failed,
	TimedOut,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SourceReport {
	pub source_id: String,
	pub status: SourceStatus,
	pub candidates: usize,
	pub elapsed_ms: f64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SearchResult {
	pub candidates: Vec<RankedCandidate>,
	/// Candidate count after deduplication and before truncation.
	pub total_results: usize,
	pub search_time_ms: f64,
	pub sources_searched: Vec<String>,
	pub source_reports: Vec<SourceReport>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub degradations: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HealthReport {
	pub source_id: String,
	pub source_type: SourceType,
	pub healthy: bool,
	pub latency_ms: f64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
