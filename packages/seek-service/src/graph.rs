//! Relationship graph over one batch of candidates.
//!
//! Nodes live in an id-keyed arena and relations are plain edge records that name their target by
//! id, so the graph has no ownership cycles and is read-only once built.

use std::{
	collections::{BTreeMap, BTreeSet, HashMap, HashSet},
	sync::Arc,
	time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{EmbeddingProvider, Error, models::SearchCandidate, scoring, timeouts};
use seek_domain::{
	classifier::{self, CodeMetadata, DocumentType},
	text,
};

const MIN_DEPENDENCY_TOKEN_CHARS: usize = 3;
const MAX_DEPENDENCY_TARGETS: usize = 3;
const DEPENDENCY_STRENGTH: f32 = 0.8;
const STRUCTURAL_THRESHOLD: f32 = 0.3;
const SEMANTIC_THRESHOLD: f32 = 0.5;
const SEMANTIC_PREFIX_CHARS: usize = 500;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
	Dependency,
	Structural,
	Semantic,
	Temporal,
}
impl RelationType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Dependency => "dependency",
			Self::Structural => "structural",
			Self::Semantic => "semantic",
			Self::Temporal => "temporal",
		}
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DocumentRelation {
	pub source_doc_id: String,
	pub target_doc_id: String,
	pub relation_type: RelationType,
	pub strength: f32,
	pub evidence: Vec<String>,
	#[serde(default)]
	pub metadata: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DocumentNode {
	pub candidate: SearchCandidate,
	pub document_type: DocumentType,
	pub importance_score: f32,
	pub code_metadata: Option<CodeMetadata>,
	/// Outgoing relations, in the order the build steps produced them.
	pub relations: Vec<DocumentRelation>,
}

#[derive(Clone, Debug, Default)]
pub struct DocumentGraph {
	nodes: HashMap<String, DocumentNode>,
	order: Vec<String>,
	degraded: bool,
}
impl DocumentGraph {
	pub fn get(&self, doc_id: &str) -> Option<&DocumentNode> {
		self.nodes.get(doc_id)
	}

	/// Nodes in candidate order.
	pub fn nodes(&self) -> impl Iterator<Item = &DocumentNode> {
		self.order.iter().filter_map(|id| self.nodes.get(id))
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}

	/// Whether this is the relation-free fallback built after a failed or timed-out build.
	pub fn is_degraded(&self) -> bool {
		self.degraded
	}

	pub fn relation_count(&self) -> usize {
		self.nodes.values().map(|node| node.relations.len()).sum()
	}

	/// One regex-classified node per candidate and no relations.
	pub fn disconnected(candidates: &[SearchCandidate]) -> Self {
		let nodes = unique(candidates)
			.into_iter()
			.map(|candidate| {
				let document_type = classifier::classify(&candidate.content);

				node(candidate.clone(), NodeAnalysis { document_type, code_metadata: None })
			})
			.collect();

		Self::from_nodes(nodes, true)
	}

	fn from_nodes(nodes: Vec<DocumentNode>, degraded: bool) -> Self {
		let order: Vec<String> = nodes.iter().map(|node| node.candidate.id.clone()).collect();
		let nodes = nodes.into_iter().map(|node| (node.candidate.id.clone(), node)).collect();

		Self { nodes, order, degraded }
	}
}

/// A built graph plus the non-fatal problems hit on the way.
#[derive(Clone, Debug, Default)]
pub struct GraphBuild {
	pub graph: DocumentGraph,
	pub degradations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
struct NodeAnalysis {
	document_type: DocumentType,
	code_metadata: Option<CodeMetadata>,
}

/// Read-only per-node features shared with blocking relation tasks.
struct NodeView {
	id: String,
	score: f32,
	document_type: DocumentType,
	title: String,
	title_lower: String,
	content: String,
	content_lower: String,
	imports: Vec<String>,
	dependencies: Vec<String>,
	names: BTreeSet<String>,
	title_words: BTreeSet<String>,
}

pub struct GraphBuilder<'a> {
	cfg: &'a seek_config::Graph,
	embedding: Option<Arc<dyn EmbeddingProvider>>,
}
impl<'a> GraphBuilder<'a> {
	pub fn new(cfg: &'a seek_config::Graph, embedding: Option<Arc<dyn EmbeddingProvider>>) -> Self {
		Self { cfg, embedding }
	}

	/// Candidates sharing an id collapse to the first occurrence.
	pub async fn build(
		&self,
		candidates: &[SearchCandidate],
		include_semantic: bool,
	) -> GraphBuild {
		let candidates: Vec<SearchCandidate> = unique(candidates).into_iter().cloned().collect();

		if candidates.is_empty() {
			return GraphBuild::default();
		}

		let budget =
			timeouts::graph_budget(&self.cfg.timeouts, candidates.len(), include_semantic);
		let outcome =
			tokio::time::timeout(budget, self.build_connected(&candidates, include_semantic)).await;

		match outcome {
			Ok(Some(build)) => build,
			Ok(None) => {
				let err = Error::GraphBuildDegraded {
					message: "every node analysis failed".to_string(),
				};

				tracing::warn!(error = %err, candidates = candidates.len(), "Graph build failed.");

				fallback(&candidates, err)
			},
			Err(_) => {
				let err = Error::GraphBuildDegraded {
					message: format!("timed out after {} ms", budget.as_millis()),
				};

				tracing::warn!(
					error = %err,
					candidates = candidates.len(),
					"Graph build timed out."
				);

				fallback(&candidates, err)
			},
		}
	}

	async fn build_connected(
		&self,
		candidates: &[SearchCandidate],
		include_semantic: bool,
	) -> Option<GraphBuild> {
		let analyses = self.analyze_nodes(candidates).await?;
		let mut nodes: Vec<DocumentNode> = candidates
			.iter()
			.cloned()
			.zip(analyses)
			.map(|(candidate, analysis)| node(candidate, analysis))
			.collect();
		let views: Arc<Vec<NodeView>> = Arc::new(nodes.iter().map(view).collect());
		let index: HashMap<String, usize> =
			views.iter().enumerate().map(|(idx, view)| (view.id.clone(), idx)).collect();
		let step = Duration::from_millis(self.cfg.timeouts.step_ms);
		let mut degradations = Vec::new();
		let mut relations = Vec::new();

		match self.dependency_step(views.clone(), step).await {
			Some(found) => relations.extend(found),
			None => degradations.push(step_timeout("Dependency relations", step)),
		}
		match self.structural_step(views.clone(), step).await {
			Some(found) => relations.extend(found),
			None => degradations.push(step_timeout("Structural relations", step)),
		}

		if include_semantic {
			match self.semantic_step(views.clone(), step).await {
				Ok(found) => relations.extend(found),
				Err(err) => {
					tracing::warn!(error = %err, "Semantic relations skipped.");

					degradations.push(err.to_string());
				},
			}
		}

		for mut relation in relations {
			if relation.source_doc_id == relation.target_doc_id
				|| !index.contains_key(&relation.target_doc_id)
			{
				continue;
			}

			let Some(&source) = index.get(&relation.source_doc_id) else {
				continue;
			};

			relation.strength = scoring::unit(relation.strength);

			nodes[source].relations.push(relation);
		}

		Some(GraphBuild { graph: DocumentGraph::from_nodes(nodes, false), degradations })
	}

	/// Classifies every candidate on the blocking pool. `None` when every analysis failed; a
	/// single failure falls back to regex classification for that node.
	async fn analyze_nodes(&self, candidates: &[SearchCandidate]) -> Option<Vec<NodeAnalysis>> {
		let semaphore = Arc::new(Semaphore::new(self.cfg.max_concurrent_nodes.max(1) as usize));
		let mut tasks = JoinSet::new();

		for (idx, candidate) in candidates.iter().enumerate() {
			let semaphore = semaphore.clone();
			let content = candidate.content.clone();
			let hint = source_hint(candidate);

			tasks.spawn(async move {
				let analysis = match semaphore.acquire_owned().await {
					Ok(_permit) =>
						tokio::task::spawn_blocking(move || analyze(&content, &hint)).await.ok(),
					Err(_) => None,
				};

				(idx, analysis)
			});
		}

		let mut analyses: Vec<Option<NodeAnalysis>> = vec![None; candidates.len()];

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok((idx, analysis)) => analyses[idx] = analysis,
				Err(err) => tracing::warn!(error = %err, "Node analysis task failed."),
			}
		}

		if analyses.iter().all(Option::is_none) {
			return None;
		}

		Some(
			analyses
				.into_iter()
				.zip(candidates)
				.map(|(analysis, candidate)| {
					analysis.unwrap_or_else(|| {
						tracing::warn!(doc_id = %candidate.id, "Node analysis fell back to regex.");

						NodeAnalysis {
							document_type: classifier::classify(&candidate.content),
							code_metadata: None,
						}
					})
				})
				.collect(),
		)
	}

	async fn dependency_step(
		&self,
		views: Arc<Vec<NodeView>>,
		step: Duration,
	) -> Option<Vec<DocumentRelation>> {
		let task = tokio::task::spawn_blocking(move || dependency_relations(&views));

		match tokio::time::timeout(step, task).await {
			Ok(Ok(relations)) => Some(relations),
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Dependency relation task failed.");

				Some(Vec::new())
			},
			Err(_) => None,
		}
	}

	async fn structural_step(
		&self,
		views: Arc<Vec<NodeView>>,
		step: Duration,
	) -> Option<Vec<DocumentRelation>> {
		let rows = views.len();
		let cap = self.cfg.max_concurrent_scores as usize;
		let task = run_rows(rows, cap, move |row| structural_row(&views, row));

		tokio::time::timeout(step, task).await.ok()
	}

	async fn semantic_step(
		&self,
		views: Arc<Vec<NodeView>>,
		step: Duration,
	) -> Result<Vec<DocumentRelation>, Error> {
		let Some(embedding) = self.embedding.as_ref() else {
			return Err(Error::EmbeddingUnavailable {
				message: "no embedding provider is configured".to_string(),
			});
		};
		let texts: Vec<String> = views
			.iter()
			.map(|view| {
				let prefix = text::prefix_chars(&view.content, SEMANTIC_PREFIX_CHARS);

				format!("{}\n{prefix}", view.title)
			})
			.collect();
		let vectors = match tokio::time::timeout(step, embedding.embed_batch(&texts)).await {
			Ok(Ok(vectors)) => vectors,
			Ok(Err(err)) => return Err(Error::EmbeddingUnavailable { message: err.to_string() }),
			Err(_) => {
				return Err(Error::EmbeddingUnavailable {
					message: format!("embedding timed out after {} ms", step.as_millis()),
				});
			},
		};

		if vectors.len() != views.len() {
			return Err(Error::EmbeddingUnavailable {
				message: format!("expected {} vectors, got {}", views.len(), vectors.len()),
			});
		}

		let dims = vectors.first().map(Vec::len).unwrap_or(0);

		if dims == 0 || vectors.iter().any(|vector| vector.len() != dims) {
			return Err(Error::EmbeddingUnavailable {
				message: "embedding vectors have inconsistent dimensions".to_string(),
			});
		}

		let vectors = Arc::new(vectors);
		let cap = self.cfg.max_concurrent_scores as usize;
		let task = run_rows(views.len(), cap, move |row| semantic_row(&views, &vectors, row));

		tokio::time::timeout(step, task).await.map_err(|_| Error::GraphBuildDegraded {
			message: format!("semantic relations timed out after {} ms", step.as_millis()),
		})
	}
}

fn fallback(candidates: &[SearchCandidate], err: Error) -> GraphBuild {
	let graph = DocumentGraph::disconnected(candidates);

	GraphBuild { graph, degradations: vec![err.to_string()] }
}

fn step_timeout(step_name: &str, budget: Duration) -> String {
	let err = Error::GraphBuildDegraded {
		message: format!("{step_name} timed out after {} ms", budget.as_millis()),
	};

	tracing::warn!(error = %err, "Graph step skipped.");

	err.to_string()
}

fn unique(candidates: &[SearchCandidate]) -> Vec<&SearchCandidate> {
	let mut seen = HashSet::new();

	candidates.iter().filter(|candidate| seen.insert(candidate.id.as_str())).collect()
}

fn source_hint(candidate: &SearchCandidate) -> String {
	match candidate.metadata.get("path") {
		Some(Value::String(path)) if !path.is_empty() => path.clone(),
		_ => candidate.title.clone(),
	}
}

fn analyze(content: &str, hint: &str) -> NodeAnalysis {
	let document_type = classifier::classify(content);
	let code_metadata =
		document_type.carries_code().then(|| classifier::extract_code_metadata(content, hint));

	NodeAnalysis { document_type, code_metadata }
}

fn node(candidate: SearchCandidate, analysis: NodeAnalysis) -> DocumentNode {
	let importance_score = importance(
		candidate.score,
		analysis.document_type,
		analysis.code_metadata.as_ref(),
	);

	DocumentNode {
		candidate,
		document_type: analysis.document_type,
		importance_score,
		code_metadata: analysis.code_metadata,
		relations: Vec::new(),
	}
}

fn importance(score: f32, document_type: DocumentType, code: Option<&CodeMetadata>) -> f32 {
	let multiplier = match document_type {
		DocumentType::Code => 1.2,
		DocumentType::Documentation => 1.1,
		DocumentType::Configuration => 1.0,
		DocumentType::Test => 0.9,
		DocumentType::Unknown => 0.8,
	};
	let (complexity, deps) =
		code.map(|code| (code.complexity_score, code.dependencies.len())).unwrap_or((0, 0));
	let complexity_bonus = (complexity as f32 * 0.01).min(0.1);
	let dependency_bonus = (deps as f32 * 0.02).min(0.1);

	scoring::unit(scoring::unit(score) * multiplier + complexity_bonus + dependency_bonus)
}

fn view(node: &DocumentNode) -> NodeView {
	let candidate = &node.candidate;
	let code = node.code_metadata.as_ref();
	let names = code
		.map(|code| {
			code.functions.iter().chain(&code.classes).map(|name| name.to_lowercase()).collect()
		})
		.unwrap_or_default();

	NodeView {
		id: candidate.id.clone(),
		score: candidate.score,
		document_type: node.document_type,
		title: candidate.title.clone(),
		title_lower: candidate.title.to_lowercase(),
		content: candidate.content.clone(),
		content_lower: candidate.content.to_lowercase(),
		imports: code
			.map(|code| code.imports.iter().map(|import| import.to_lowercase()).collect())
			.unwrap_or_default(),
		dependencies: code
			.map(|code| code.dependencies.iter().map(|dep| dep.to_lowercase()).collect())
			.unwrap_or_default(),
		names,
		title_words: text::word_set(&candidate.title),
	}
}

/// Links each code node to up to three nodes per dependency token, best match first.
fn dependency_relations(views: &[NodeView]) -> Vec<DocumentRelation> {
	let mut out = Vec::new();

	for (source_idx, source) in views.iter().enumerate() {
		if source.document_type != DocumentType::Code {
			continue;
		}

		// Target index to evidence, in first-seen order.
		let mut links: Vec<(usize, Vec<String>)> = Vec::new();

		for token in &source.dependencies {
			if token.chars().count() < MIN_DEPENDENCY_TOKEN_CHARS {
				continue;
			}

			let mut matches: Vec<(usize, u8, &'static str)> = views
				.iter()
				.enumerate()
				.filter(|(idx, _)| *idx != source_idx)
				.filter_map(|(idx, target)| {
					dependency_match(target, token).map(|(quality, field)| (idx, quality, field))
				})
				.collect();

			matches.sort_by(|a, b| {
				b.1.cmp(&a.1)
					.then_with(|| scoring::cmp_f32_desc(views[a.0].score, views[b.0].score))
					.then_with(|| a.0.cmp(&b.0))
			});
			matches.truncate(MAX_DEPENDENCY_TARGETS);

			for (target_idx, _, field) in matches {
				let evidence = format!("imports '{token}' (matched {field})");

				match links.iter_mut().find(|(idx, _)| *idx == target_idx) {
					Some((_, found)) =>
						if !found.contains(&evidence) {
							found.push(evidence);
						},
					None => links.push((target_idx, vec![evidence])),
				}
			}
		}

		for (target_idx, evidence) in links {
			out.push(DocumentRelation {
				source_doc_id: source.id.clone(),
				target_doc_id: views[target_idx].id.clone(),
				relation_type: RelationType::Dependency,
				strength: DEPENDENCY_STRENGTH,
				evidence,
				metadata: BTreeMap::new(),
			});
		}
	}

	out
}

/// Match quality of `token` against a node: title 3, import list 2, content 1. Substring match, so
/// `fastapi_utils.py` matches `fastapi`.
fn dependency_match(target: &NodeView, token: &str) -> Option<(u8, &'static str)> {
	if target.title_lower.contains(token) {
		return Some((3, "title"));
	}
	if target.imports.iter().any(|import| import.contains(token)) {
		return Some((2, "imports"));
	}
	if target.content_lower.contains(token) {
		return Some((1, "content"));
	}

	None
}

fn structural_similarity(a: &NodeView, b: &NodeView) -> f32 {
	let type_match = if a.document_type == b.document_type { 1.0 } else { 0.0 };

	0.4 * type_match
		+ 0.4 * text::jaccard(&a.names, &b.names)
		+ 0.2 * text::jaccard(&a.title_words, &b.title_words)
}

/// Pairs `(row, j)` for `j > row`, emitted in both directions.
fn structural_row(views: &[NodeView], row: usize) -> Vec<DocumentRelation> {
	let mut out = Vec::new();

	for col in row + 1..views.len() {
		let similarity = structural_similarity(&views[row], &views[col]);

		if similarity > STRUCTURAL_THRESHOLD {
			push_reciprocal(&mut out, views, row, col, RelationType::Structural, similarity, || {
				vec![format!("structural similarity {similarity:.2}")]
			});
		}
	}

	out
}

fn semantic_row(views: &[NodeView], vectors: &[Vec<f32>], row: usize) -> Vec<DocumentRelation> {
	let mut out = Vec::new();

	for col in row + 1..views.len() {
		let Some(similarity) = scoring::cosine_similarity(&vectors[row], &vectors[col]) else {
			continue;
		};

		if similarity > SEMANTIC_THRESHOLD {
			push_reciprocal(&mut out, views, row, col, RelationType::Semantic, similarity, || {
				vec![format!("embedding cosine similarity {similarity:.2}")]
			});
		}
	}

	out
}

fn push_reciprocal(
	out: &mut Vec<DocumentRelation>,
	views: &[NodeView],
	a: usize,
	b: usize,
	relation_type: RelationType,
	strength: f32,
	evidence: impl Fn() -> Vec<String>,
) {
	for (source, target) in [(a, b), (b, a)] {
		out.push(DocumentRelation {
			source_doc_id: views[source].id.clone(),
			target_doc_id: views[target].id.clone(),
			relation_type,
			strength,
			evidence: evidence(),
			metadata: BTreeMap::new(),
		});
	}
}

/// Runs `row` for every index on the blocking pool with at most `cap` rows in flight. Output is
/// in row order; failed rows contribute nothing.
async fn run_rows<F>(rows: usize, cap: usize, row: F) -> Vec<DocumentRelation>
where
	F: Fn(usize) -> Vec<DocumentRelation> + Send + Sync + 'static,
{
	let row = Arc::new(row);
	let semaphore = Arc::new(Semaphore::new(cap.max(1)));
	let mut tasks = JoinSet::new();

	for idx in 0..rows {
		let row = row.clone();
		let semaphore = semaphore.clone();

		tasks.spawn(async move {
			let relations = match semaphore.acquire_owned().await {
				Ok(_permit) => tokio::task::spawn_blocking(move || row(idx)).await.ok(),
				Err(_) => None,
			};

			(idx, relations)
		});
	}

	let mut by_row: Vec<Vec<DocumentRelation>> = vec![Vec::new(); rows];

	while let Some(joined) = tasks.join_next().await {
		match joined {
			Ok((idx, Some(relations))) => by_row[idx] = relations,
			Ok((idx, None)) => tracing::warn!(row = idx, "Relation row failed."),
			Err(err) => tracing::warn!(error = %err, "Relation row task failed."),
		}
	}

	by_row.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	use seek_config::SourceType;

	fn candidate(id: &str, title: &str, content: &str, score: f32) -> SearchCandidate {
		SearchCandidate {
			id: id.to_string(),
			title: title.to_string(),
			content: content.to_string(),
			source_id: "gitlab".to_string(),
			source_type: SourceType::CodeRepository,
			score,
			metadata: BTreeMap::new(),
			snippet: None,
		}
	}

	fn views(candidates: &[SearchCandidate]) -> Vec<NodeView> {
		candidates
			.iter()
			.map(|c| node(c.clone(), analyze(&c.content, &source_hint(c))))
			.map(|node| view(&node))
			.collect()
	}

	#[test]
	fn importance_is_bounded() {
		let code = CodeMetadata {
			complexity_score: 50,
			dependencies: vec!["a".to_string(); 10],
			..Default::default()
		};

		assert_eq!(importance(1.0, DocumentType::Code, Some(&code)), 1.0);
		assert!((importance(0.5, DocumentType::Unknown, None) - 0.4).abs() < 1e-6);
		assert!((importance(0.5, DocumentType::Code, Some(&code)) - 0.8).abs() < 1e-6);
	}

	#[test]
	fn dependency_prefers_title_matches() {
		let candidates = vec![
			candidate("app", "app.py", "import fastapi\n\napp = fastapi.FastAPI()\n", 0.9),
			candidate("mention", "Notes", "We looked at fastapi briefly.", 0.9),
			candidate("guide", "FastAPI guide", "Routing and middleware.", 0.1),
		];
		let relations = dependency_relations(&views(&candidates));

		assert_eq!(relations.len(), 2);
		assert_eq!(relations[0].target_doc_id, "guide");
		assert_eq!(relations[0].evidence, vec!["imports 'fastapi' (matched title)".to_string()]);
		assert_eq!(relations[1].target_doc_id, "mention");
		assert_eq!(relations[1].evidence, vec!["imports 'fastapi' (matched content)".to_string()]);
		assert!(relations.iter().all(|relation| relation.strength == DEPENDENCY_STRENGTH));
	}

	#[test]
	fn dependency_matches_tokens_inside_file_names() {
		let candidates = vec![
			candidate("main", "main.py", "import fastapi\n\napp = fastapi.FastAPI()\n", 0.9),
			candidate("utils", "fastapi_utils.py", "def helper():\n    return 1\n", 0.5),
			candidate("guide", "FastAPIGuide", "Routing notes.", 0.4),
		];
		let relations = dependency_relations(&views(&candidates));
		let targets: Vec<&str> =
			relations.iter().map(|relation| relation.target_doc_id.as_str()).collect();

		assert_eq!(targets, vec!["utils", "guide"]);
		assert!(relations.iter().all(|relation| relation.strength == DEPENDENCY_STRENGTH));
		assert!(relations.iter().all(|relation| {
			relation.evidence == vec!["imports 'fastapi' (matched title)".to_string()]
		}));
	}

	#[test]
	fn dependency_keeps_top_three_targets() {
		let mut candidates =
			vec![candidate("app", "app.py", "import requests\nrequests.get(url)\n", 0.9)];

		for idx in 0..5 {
			candidates.push(candidate(
				&format!("doc-{idx}"),
				&format!("requests notes {idx}"),
				"",
				idx as f32 / 10.0,
			));
		}

		let relations = dependency_relations(&views(&candidates));
		let targets: Vec<&str> =
			relations.iter().map(|relation| relation.target_doc_id.as_str()).collect();

		assert_eq!(targets, vec!["doc-4", "doc-3", "doc-2"]);
	}

	#[test]
	fn structural_similarity_weights_type_names_and_titles() {
		let candidates = vec![
			candidate("a", "billing service", "def charge(x):\n    return x\n", 0.5),
			candidate("b", "billing worker", "def charge(y):\n    return y\n", 0.5),
		];
		let views = views(&candidates);
		let similarity = structural_similarity(&views[0], &views[1]);

		// Same type, identical names, one of three title words shared.
		assert!((similarity - (0.4 + 0.4 + 0.2 / 3.0)).abs() < 1e-6);
		assert_eq!(structural_row(&views, 0).len(), 2);
	}

	#[test]
	fn disconnected_graph_keeps_every_node() {
		let candidates = vec![
			candidate("a", "A", "# Overview\n\nSee [docs](x).", 0.5),
			candidate("a", "A again", "duplicate id", 0.4),
			candidate("b", "B", "plain words", 0.3),
		];
		let graph = DocumentGraph::disconnected(&candidates);

		assert!(graph.is_degraded());
		assert_eq!(graph.len(), 2);
		assert_eq!(graph.relation_count(), 0);
		assert_eq!(graph.get("a").map(|node| node.candidate.title.as_str()), Some("A"));
	}

	#[derive(Default)]
	struct RecordingEmbedding {
		texts: std::sync::Mutex<Vec<String>>,
	}
	impl EmbeddingProvider for RecordingEmbedding {
		fn embed_batch<'a>(
			&'a self,
			texts: &'a [String],
		) -> crate::BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
			self.texts.lock().unwrap_or_else(|err| err.into_inner()).extend(texts.iter().cloned());

			let vectors = texts.iter().map(|_| vec![1.0, 0.0]).collect();

			Box::pin(async move { Ok(vectors) })
		}
	}

	#[tokio::test]
	async fn semantic_text_keeps_original_case() {
		let cfg = seek_config::Graph::default();
		let embedding = Arc::new(RecordingEmbedding::default());
		let builder =
			GraphBuilder::new(&cfg, Some(embedding.clone() as Arc<dyn EmbeddingProvider>));
		let candidates = vec![
			candidate("deploy", "Deploy Guide", "Use Docker Compose for Staging.", 0.8),
			candidate("release", "Release Notes", "Ship On Fridays.", 0.6),
		];
		let build = builder.build(&candidates, true).await;
		let texts = embedding.texts.lock().unwrap_or_else(|err| err.into_inner()).clone();

		assert_eq!(
			texts,
			vec![
				"Deploy Guide\nUse Docker Compose for Staging.".to_string(),
				"Release Notes\nShip On Fridays.".to_string(),
			]
		);
		assert!(build.degradations.is_empty());
	}
}
