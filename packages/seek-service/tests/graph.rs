use std::{collections::HashSet, sync::Arc, time::Duration};

use seek_config::SourceType;
use seek_domain::classifier::DocumentType;
use seek_service::{
	DocumentGraph, EmbeddingProvider, Providers, RelationType, SearchCandidate, SeekService,
};
use seek_testkit::fakes::{FailingEmbedding, HashEmbedding, candidate};

fn service(embedding: Option<Arc<dyn EmbeddingProvider>>) -> SeekService {
	SeekService::new(
		seek_testkit::test_config(Vec::new()),
		Vec::new(),
		Providers { embedding, ..Default::default() },
	)
}

fn candidates() -> Vec<SearchCandidate> {
	vec![
		candidate(
			"gitlab",
			SourceType::CodeRepository,
			"gitlab:main",
			"main.py",
			"import fastapi\n\napp = fastapi.FastAPI()\n\n@app.get(\"/health\")\ndef health():\n    return {\"ok\": True}\n",
			0.9,
		),
		candidate(
			"confluence",
			SourceType::Wiki,
			"confluence:fastapi",
			"FastAPI service guide",
			"How our services expose health endpoints and structure routers.",
			0.7,
		),
		candidate(
			"confluence",
			SourceType::Wiki,
			"confluence:health",
			"Service guide for health endpoints",
			"How our services expose health endpoints and structure routers.",
			0.5,
		),
		candidate(
			"jira",
			SourceType::IssueTracker,
			"jira:OPS-1",
			"Quarterly budget review",
			"Finance asked for the numbers before Friday.",
			0.2,
		),
	]
}

fn assert_well_formed(graph: &DocumentGraph) {
	let ids: HashSet<&str> = graph.nodes().map(|node| node.candidate.id.as_str()).collect();

	for node in graph.nodes() {
		for relation in &node.relations {
			assert!((0.0..=1.0).contains(&relation.strength));
			assert!(ids.contains(relation.target_doc_id.as_str()));
			assert_ne!(relation.target_doc_id, node.candidate.id);
		}
	}
}

#[tokio::test]
async fn fastapi_import_links_to_the_fastapi_guide() {
	let build = service(None).build_graph(&candidates(), false).await;
	let main = build.graph.get("gitlab:main").expect("Missing code node.");
	let dependency = main
		.relations
		.iter()
		.find(|relation| {
			relation.relation_type == RelationType::Dependency
				&& relation.target_doc_id == "confluence:fastapi"
		})
		.expect("Missing dependency relation.");

	assert_eq!(main.document_type, DocumentType::Code);
	assert_eq!(dependency.strength, 0.8);
	assert!(dependency.evidence.iter().any(|evidence| evidence.contains("fastapi")));
	assert!(build.degradations.is_empty());
	assert_well_formed(&build.graph);
}

#[tokio::test]
async fn embedding_failure_keeps_every_node() {
	let build = service(Some(Arc::new(FailingEmbedding))).build_graph(&candidates(), true).await;

	assert_eq!(build.graph.len(), 4);
	assert!(
		build
			.graph
			.nodes()
			.flat_map(|node| &node.relations)
			.all(|relation| relation.relation_type != RelationType::Semantic)
	);
	assert!(build.degradations.iter().any(|message| message.starts_with("Embedding unavailable")));
	assert_well_formed(&build.graph);
}

#[tokio::test]
async fn missing_embedding_provider_skips_semantic_relations() {
	let build = service(None).build_graph(&candidates(), true).await;

	assert_eq!(build.graph.len(), 4);
	assert!(build.degradations.iter().any(|message| message.starts_with("Embedding unavailable")));
}

#[tokio::test]
async fn similar_texts_get_reciprocal_semantic_relations() {
	let embedding = HashEmbedding::new(64);
	let build = service(Some(Arc::new(embedding))).build_graph(&candidates(), true).await;
	let semantic: Vec<(&str, &str)> = build
		.graph
		.nodes()
		.flat_map(|node| &node.relations)
		.filter(|relation| relation.relation_type == RelationType::Semantic)
		.map(|relation| (relation.source_doc_id.as_str(), relation.target_doc_id.as_str()))
		.collect();

	assert!(semantic.contains(&("confluence:fastapi", "confluence:health")));
	assert!(semantic.contains(&("confluence:health", "confluence:fastapi")));
	assert!(build.degradations.is_empty());
	assert_well_formed(&build.graph);
}

#[tokio::test]
async fn duplicate_ids_collapse_to_one_node() {
	let mut input = candidates();

	input.push(input[0].clone());

	let build = service(None).build_graph(&input, false).await;

	assert_eq!(build.graph.len(), 4);
}

#[tokio::test]
async fn empty_input_builds_an_empty_graph() {
	let build = service(None).build_graph(&[], true).await;

	assert!(build.graph.is_empty());
	assert_eq!(build.graph.relation_count(), 0);
}

#[tokio::test]
async fn slow_embeddings_time_out_into_a_disconnected_graph() {
	let mut cfg = seek_testkit::test_config(Vec::new());

	cfg.graph.timeouts.max_ms = 100;

	let embedding = HashEmbedding::new(64).with_delay(Duration::from_secs(5));
	let service = SeekService::new(
		cfg,
		Vec::new(),
		Providers {
			embedding: Some(Arc::new(embedding) as Arc<dyn EmbeddingProvider>),
			..Default::default()
		},
	);
	let build = service.build_graph(&candidates(), true).await;

	assert!(build.graph.is_degraded());
	assert_eq!(build.graph.len(), 4);
	assert_eq!(build.graph.relation_count(), 0);
	assert_eq!(build.degradations.len(), 1);
	assert!(build.degradations[0].starts_with("Graph build degraded"));
	assert_well_formed(&build.graph);
}
