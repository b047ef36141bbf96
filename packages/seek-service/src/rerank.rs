use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
};

use serde_json::Value;
use time::{
	Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
	Error, PopularityStore,
	graph::DocumentGraph,
	models::{ContextualScore, RankedCandidate, RerankContext, SearchCandidate, UserPreferences},
	scoring, timeouts,
};
use seek_domain::{
	classifier::DocumentType,
	intent::{self, IntentOverrides, UserIntent},
	text,
};

const DATE_KEYS: &[&str] = &["updated_at", "last_modified", "modified_at", "created_at", "date"];
const NEUTRAL_SCORE: f32 = 0.5;
const BASE_PERSONALIZATION: f32 = 0.3;
const STRONG_RELATION: f32 = 0.7;

/// Reranked candidates plus the fallback cause, if any.
#[derive(Clone, Debug, Default)]
pub struct RerankOutcome {
	pub candidates: Vec<RankedCandidate>,
	pub degradations: Vec<String>,
}

/// Analyzed intents keyed by a hash of the normalized query and overrides. Cleared when full.
pub struct IntentCache {
	capacity: usize,
	entries: RwLock<HashMap<String, Arc<UserIntent>>>,
}
impl IntentCache {
	pub fn new(capacity: usize) -> Self {
		Self { capacity: capacity.max(1), entries: RwLock::new(HashMap::new()) }
	}

	pub fn analyze(&self, query: &str, overrides: &IntentOverrides) -> Arc<UserIntent> {
		let key = intent_key(query, overrides);

		if let Some(found) =
			self.entries.read().unwrap_or_else(|err| err.into_inner()).get(&key).cloned()
		{
			return found;
		}

		let analyzed = Arc::new(intent::analyze_intent(query, overrides));
		let mut entries = self.entries.write().unwrap_or_else(|err| err.into_inner());

		if entries.len() >= self.capacity {
			entries.clear();
		}

		entries.insert(key, analyzed.clone());

		analyzed
	}

	pub fn len(&self) -> usize {
		self.entries.read().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Graph-derived inputs for one candidate, copied out so scoring tasks own their data.
#[derive(Clone, Debug, Default)]
struct GraphFeatures {
	document_type: Option<DocumentType>,
	relations: usize,
	strong_relations: usize,
}

pub struct Reranker<'a> {
	cfg: &'a seek_config::Rerank,
	popularity: Option<Arc<dyn PopularityStore>>,
	intents: &'a IntentCache,
}
impl<'a> Reranker<'a> {
	pub fn new(
		cfg: &'a seek_config::Rerank,
		popularity: Option<Arc<dyn PopularityStore>>,
		intents: &'a IntentCache,
	) -> Self {
		Self { cfg, popularity, intents }
	}

	/// Scores every candidate, stable-sorts by final score and keeps `limit`. On timeout or when
	/// every scoring task fails, returns the input order truncated with no contextual scores.
	pub async fn rerank(
		&self,
		candidates: &[SearchCandidate],
		query: &str,
		context: &RerankContext,
		graph: Option<&DocumentGraph>,
		limit: usize,
		now: OffsetDateTime,
	) -> RerankOutcome {
		if candidates.is_empty() || limit == 0 {
			return RerankOutcome::default();
		}

		let overrides = IntentOverrides {
			technical_level: context.technical_level,
			domain: context.domain.clone(),
		};
		let intent = self.intents.analyze(query, &overrides);
		let budget = timeouts::rerank_budget(&self.cfg.timeouts, candidates.len(), graph.is_some());
		let features: Vec<GraphFeatures> =
			candidates.iter().map(|candidate| graph_features(graph, &candidate.id)).collect();
		let preferences = Arc::new(context.preferences.clone());
		let task = self.score_all(candidates, intent, preferences, features, now);
		let scored = tokio::time::timeout(budget, task).await;
		let scores = match scored {
			Ok(scores) if scores.iter().any(Option::is_some) => scores,
			Ok(_) => {
				return fallback(
					candidates,
					limit,
					Error::RerankFallback { message: "every scoring task failed".to_string() },
				);
			},
			Err(_) => {
				return fallback(
					candidates,
					limit,
					Error::RerankFallback {
						message: format!("timed out after {} ms", budget.as_millis()),
					},
				);
			},
		};
		let mut ranked: Vec<RankedCandidate> = candidates
			.iter()
			.cloned()
			.zip(scores)
			.map(|(candidate, score)| RankedCandidate {
				contextual_score: score,
				..RankedCandidate::plain(candidate)
			})
			.collect();

		ranked.sort_by(|a, b| scoring::cmp_f32_desc(a.ranking_score(), b.ranking_score()));
		ranked.truncate(limit);

		RerankOutcome { candidates: ranked, degradations: Vec::new() }
	}

	async fn score_all(
		&self,
		candidates: &[SearchCandidate],
		intent: Arc<UserIntent>,
		preferences: Arc<UserPreferences>,
		features: Vec<GraphFeatures>,
		now: OffsetDateTime,
	) -> Vec<Option<ContextualScore>> {
		let semaphore = Arc::new(Semaphore::new(self.cfg.max_concurrent.max(1) as usize));
		let mut tasks = JoinSet::new();

		for (idx, (candidate, features)) in candidates.iter().cloned().zip(features).enumerate() {
			let semaphore = semaphore.clone();
			let intent = intent.clone();
			let preferences = preferences.clone();
			let popularity = self.popularity.clone();

			tasks.spawn(async move {
				let _permit = semaphore.acquire_owned().await.ok()?;
				let popularity = popularity_score(popularity.as_deref(), &candidate.id).await;

				Some((
					idx,
					contextual_score(&candidate, &intent, &preferences, &features, popularity, now),
				))
			});
		}

		let mut scores = vec![None; candidates.len()];

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok(Some((idx, score))) => scores[idx] = Some(score),
				Ok(None) => tracing::warn!("Rerank task could not acquire a permit."),
				Err(err) => tracing::warn!(error = %err, "Rerank task failed."),
			}
		}

		scores
	}
}

fn fallback(candidates: &[SearchCandidate], limit: usize, err: Error) -> RerankOutcome {
	tracing::warn!(error = %err, "Rerank fell back to source order.");

	RerankOutcome {
		candidates: candidates.iter().take(limit).cloned().map(RankedCandidate::plain).collect(),
		degradations: vec![err.to_string()],
	}
}

fn intent_key(query: &str, overrides: &IntentOverrides) -> String {
	let payload = serde_json::json!({
		"query": text::normalize_whitespace(query),
		"technical_level": overrides.technical_level,
		"domain": overrides.domain,
	});

	blake3::hash(payload.to_string().as_bytes()).to_hex().to_string()
}

fn graph_features(graph: Option<&DocumentGraph>, doc_id: &str) -> GraphFeatures {
	let Some(node) = graph.and_then(|graph| graph.get(doc_id)) else {
		return GraphFeatures::default();
	};

	GraphFeatures {
		document_type: Some(node.document_type),
		relations: node.relations.len(),
		strong_relations: node
			.relations
			.iter()
			.filter(|relation| relation.strength >= STRONG_RELATION)
			.count(),
	}
}

async fn popularity_score(store: Option<&dyn PopularityStore>, doc_id: &str) -> f32 {
	let Some(store) = store else {
		return NEUTRAL_SCORE;
	};

	match store.get_score(doc_id).await {
		Ok(Some(score)) => scoring::unit(score),
		Ok(None) => NEUTRAL_SCORE,
		Err(err) => {
			tracing::debug!(doc_id, error = %err, "Popularity lookup failed.");

			NEUTRAL_SCORE
		},
	}
}

fn contextual_score(
	candidate: &SearchCandidate,
	intent: &UserIntent,
	preferences: &UserPreferences,
	features: &GraphFeatures,
	popularity: f32,
	now: OffsetDateTime,
) -> ContextualScore {
	let base = scoring::unit(candidate.score);
	let intent_score = intent_score(candidate, intent);
	let temporal = temporal_score(candidate, now);
	let relationship = relationship_score(features);
	let personalization = personalization_score(candidate, preferences, features);
	let final_score = scoring::unit(
		0.30 * base
			+ 0.25 * intent_score
			+ 0.15 * temporal
			+ 0.10 * popularity
			+ 0.10 * relationship
			+ 0.10 * personalization,
	);
	let explanation = explain(
		base,
		intent_score,
		temporal,
		popularity,
		relationship,
		personalization,
		intent.primary_intent.as_str(),
	);

	ContextualScore {
		base,
		intent: intent_score,
		temporal,
		popularity,
		relationship,
		personalization,
		final_score,
		explanation,
	}
}

fn intent_score(candidate: &SearchCandidate, intent: &UserIntent) -> f32 {
	let haystack = format!("{} {}", candidate.title, candidate.content).to_lowercase();
	let primary = text::hit_ratio(&haystack, intent.primary_intent.patterns());
	let keywords = if intent.keywords.is_empty() {
		0.0
	} else {
		let hits = intent
			.keywords
			.iter()
			.filter(|keyword| text::contains_term(&haystack, keyword))
			.count();

		hits as f32 / intent.keywords.len() as f32
	};
	let level = text::hit_ratio(&haystack, intent.technical_level.terms());
	let domain = text::hit_ratio(&haystack, intent::domain_terms(&intent.domain));

	scoring::unit(0.4 * primary + 0.3 * keywords + 0.15 * level + 0.15 * domain)
}

fn temporal_score(candidate: &SearchCandidate, now: OffsetDateTime) -> f32 {
	let date = DATE_KEYS.iter().find_map(|key| candidate.metadata.get(*key).and_then(parse_date));
	let Some(date) = date else {
		return NEUTRAL_SCORE;
	};
	let age_days = (now - date).whole_days().max(0);

	match age_days {
		0..=30 => 1.0,
		31..=90 => 0.8,
		91..=365 => 0.6,
		366..=730 => 0.4,
		_ => 0.2,
	}
}

/// RFC 3339, `YYYY-MM-DD`, or unix seconds as a number or numeric string.
fn parse_date(value: &Value) -> Option<OffsetDateTime> {
	match value {
		Value::Number(number) => number
			.as_i64()
			.or_else(|| number.as_f64().map(|secs| secs as i64))
			.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok()),
		Value::String(raw) => {
			let raw = raw.trim();

			if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
				return Some(parsed);
			}
			if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
				return Some(date.midnight().assume_utc());
			}

			raw.parse::<i64>().ok().and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
		},
		_ => None,
	}
}

fn relationship_score(features: &GraphFeatures) -> f32 {
	let Some(document_type) = features.document_type else {
		return 0.0;
	};
	let type_bonus = match document_type {
		DocumentType::Code | DocumentType::Documentation => 0.1,
		DocumentType::Configuration | DocumentType::Test => 0.05,
		DocumentType::Unknown => 0.0,
	};

	scoring::unit(
		(features.relations as f32 * 0.1).min(0.5)
			+ (features.strong_relations as f32 * 0.05).min(0.2)
			+ type_bonus,
	)
}

fn personalization_score(
	candidate: &SearchCandidate,
	preferences: &UserPreferences,
	features: &GraphFeatures,
) -> f32 {
	let mut bonus = 0.0_f32;
	let mut matched = false;

	if preferences.sources.iter().any(|source| {
		source.eq_ignore_ascii_case(&candidate.source_id)
			|| source.eq_ignore_ascii_case(candidate.source_type.as_str())
	}) {
		bonus += 0.3;
		matched = true;
	}
	if let Some(author) = metadata_str(candidate, "author")
		&& preferences.authors.iter().any(|preferred| preferred.eq_ignore_ascii_case(author))
	{
		bonus += 0.2;
		matched = true;
	}

	let content_types: Vec<&str> = features
		.document_type
		.map(DocumentType::as_str)
		.into_iter()
		.chain(metadata_str(candidate, "content_type"))
		.collect();

	if preferences
		.content_types
		.iter()
		.any(|preferred| content_types.iter().any(|kind| preferred.eq_ignore_ascii_case(kind)))
	{
		bonus += 0.15;
		matched = true;
	}

	let tag_hits = candidate_tags(candidate)
		.iter()
		.filter(|tag| preferences.tags.iter().any(|preferred| preferred.eq_ignore_ascii_case(tag)))
		.count();

	if tag_hits > 0 {
		bonus += (tag_hits as f32 * 0.05).min(0.15);
		matched = true;
	}

	if matched { (BASE_PERSONALIZATION + bonus).min(1.0) } else { BASE_PERSONALIZATION }
}

fn metadata_str<'a>(candidate: &'a SearchCandidate, key: &str) -> Option<&'a str> {
	candidate.metadata.get(key).and_then(Value::as_str).filter(|value| !value.is_empty())
}

/// Tags from a string array or a comma-separated string.
fn candidate_tags(candidate: &SearchCandidate) -> Vec<String> {
	match candidate.metadata.get("tags") {
		Some(Value::Array(items)) =>
			items.iter().filter_map(Value::as_str).map(|tag| tag.trim().to_string()).collect(),
		Some(Value::String(raw)) => raw
			.split(',')
			.map(str::trim)
			.filter(|tag| !tag.is_empty())
			.map(str::to_string)
			.collect(),
		_ => Vec::new(),
	}
}

fn explain(
	base: f32,
	intent: f32,
	temporal: f32,
	popularity: f32,
	relationship: f32,
	personalization: f32,
	intent_name: &str,
) -> String {
	let mut reasons = Vec::new();

	if base > 0.7 {
		reasons.push("high base relevance".to_string());
	}
	if intent > 0.5 {
		reasons.push(format!("matches {intent_name} intent"));
	}
	if temporal >= 0.8 {
		reasons.push("recently updated".to_string());
	}
	if popularity > 0.7 {
		reasons.push("popular with other users".to_string());
	}
	if relationship > 0.3 {
		reasons.push("well connected to related documents".to_string());
	}
	if personalization > 0.5 {
		reasons.push("matches your preferences".to_string());
	}

	if reasons.is_empty() { "standard relevance".to_string() } else { reasons.join("; ") }
}
