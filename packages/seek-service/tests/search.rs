use std::{
	sync::{Arc, atomic::Ordering},
	time::Duration,
};

use serde_json::json;

use seek_config::{Config, SourceType};
use seek_service::{
	DataSource, Error, Providers, SearchConfig, SearchResult, SeekService, SourceStatus,
};
use seek_testkit::fakes::{HashEmbedding, StaticSource, StaticVectorIndex, candidate};

fn confluence() -> StaticSource {
	StaticSource::new(
		"confluence",
		SourceType::Wiki,
		vec![
			candidate(
				"confluence",
				SourceType::Wiki,
				"confluence:1",
				"Docker deployment guide",
				"How we deploy services with docker compose in staging.",
				0.9,
			),
			candidate(
				"confluence",
				SourceType::Wiki,
				"confluence:2",
				"Deployment checklist",
				"Steps to verify a deployment before release.",
				0.6,
			),
			candidate(
				"confluence",
				SourceType::Wiki,
				"confluence:3",
				"Onboarding",
				"Accounts, laptops and docker desktop setup.",
				0.3,
			),
		],
	)
}

fn gitlab() -> StaticSource {
	StaticSource::new(
		"gitlab",
		SourceType::CodeRepository,
		vec![
			candidate(
				"gitlab",
				SourceType::CodeRepository,
				"gitlab:10",
				"Dockerfile",
				"FROM rust:1.85 AS build\nRUN cargo build --release\n",
				0.8,
			),
			candidate(
				"gitlab",
				SourceType::CodeRepository,
				"gitlab:11",
				"deploy.sh",
				"#!/bin/sh\ndocker compose up -d\n",
				0.7,
			),
			candidate(
				"gitlab",
				SourceType::CodeRepository,
				"gitlab:12",
				"README.md",
				"Run the deployment script after building the docker image.",
				0.4,
			),
		],
	)
}

fn config() -> Config {
	seek_testkit::test_config(vec![
		seek_testkit::source_config("confluence", SourceType::Wiki),
		seek_testkit::source_config("gitlab", SourceType::CodeRepository),
	])
}

fn service(cfg: Config, sources: Vec<StaticSource>, providers: Providers) -> SeekService {
	let sources =
		sources.into_iter().map(|source| Arc::new(source) as Arc<dyn DataSource>).collect();

	SeekService::new(cfg, sources, providers)
}

fn request(limit: u32) -> SearchConfig {
	SearchConfig {
		selected_sources: vec!["confluence".to_string(), "gitlab".to_string()],
		limit: Some(limit),
		..Default::default()
	}
}

fn ids(result: &SearchResult) -> Vec<String> {
	result.candidates.iter().map(|item| item.candidate.id.clone()).collect()
}

#[tokio::test]
async fn docker_deployment_searches_both_sources() {
	let service = service(config(), vec![confluence(), gitlab()], Providers::default());
	let result =
		service.search("docker deployment", &request(5)).await.expect("Failed to search.");

	assert!(result.candidates.len() <= 5);
	assert!(!result.candidates.is_empty());
	assert_eq!(result.sources_searched, vec!["confluence".to_string(), "gitlab".to_string()]);
	assert_eq!(result.total_results, 6);

	for item in &result.candidates {
		assert!(["confluence", "gitlab"].contains(&item.candidate.source_id.as_str()));
		assert!((0.0..=1.0).contains(&item.candidate.score));
	}
	for pair in result.candidates.windows(2) {
		assert!(pair[0].candidate.score >= pair[1].candidate.score);
	}

	assert!(result.source_reports.iter().all(|report| report.status == SourceStatus::Ok));
	assert!(result.degradations.is_empty());
}

#[tokio::test]
async fn repeated_search_returns_the_same_order() {
	let mut cfg = config();

	cfg.search.cache.enabled = false;

	let service = service(cfg, vec![confluence(), gitlab()], Providers::default());
	let first = service.search("docker deployment", &request(10)).await.expect("Failed to search.");
	let second =
		service.search("docker deployment", &request(10)).await.expect("Failed to search.");

	assert_eq!(first.sources_searched, second.sources_searched);
	assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn shared_content_prefix_keeps_the_higher_score() {
	let shared = format!("{} different endings follow", "docker ".repeat(40));
	let wiki = StaticSource::new(
		"confluence",
		SourceType::Wiki,
		vec![candidate(
			"confluence",
			SourceType::Wiki,
			"confluence:copy",
			"Copy",
			&format!("{shared} in the wiki"),
			0.2,
		)],
	);
	let code = StaticSource::new(
		"gitlab",
		SourceType::CodeRepository,
		vec![candidate(
			"gitlab",
			SourceType::CodeRepository,
			"gitlab:original",
			"Original",
			&format!("{shared} in the repository"),
			0.9,
		)],
	);
	let service = service(config(), vec![wiki, code], Providers::default());
	let result = service.search("docker", &request(10)).await.expect("Failed to search.");

	assert_eq!(ids(&result), vec!["gitlab:original".to_string()]);
	assert_eq!(result.total_results, 1);
}

#[tokio::test]
async fn cached_result_is_identical_until_ttl_expires() {
	let mut cfg = config();

	cfg.search.cache.ttl_seconds = 1;

	let wiki = confluence();
	let wiki_calls = wiki.calls();
	let service = service(cfg, vec![wiki, gitlab()], Providers::default());
	let first = service.search("docker deployment", &request(5)).await.expect("Failed to search.");
	let second =
		service.search("docker deployment", &request(5)).await.expect("Failed to search.");

	assert_eq!(wiki_calls.load(Ordering::SeqCst), 1);
	assert_eq!(
		serde_json::to_string(&first).expect("Failed to encode result."),
		serde_json::to_string(&second).expect("Failed to encode result.")
	);

	tokio::time::sleep(Duration::from_millis(1_200)).await;

	service.search("docker deployment", &request(5)).await.expect("Failed to search.");

	assert_eq!(wiki_calls.load(Ordering::SeqCst), 2);

	let stats = service.stats();

	assert_eq!(stats.total_queries, 3);
	assert_eq!(stats.cache_hits, 1);
}

#[tokio::test]
async fn optimized_queries_share_a_cache_entry() {
	let wiki = confluence();
	let wiki_calls = wiki.calls();
	let service = service(config(), vec![wiki, gitlab()], Providers::default());

	service.search("Docker   deployment", &request(5)).await.expect("Failed to search.");
	service.search("docker deployment?", &request(5)).await.expect("Failed to search.");

	assert_eq!(wiki_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_source_is_reported_and_never_cached() {
	let wiki = confluence();
	let wiki_calls = wiki.calls();
	let broken = StaticSource::failing("gitlab", SourceType::CodeRepository, "HTTP 502");
	let service = service(config(), vec![wiki, broken], Providers::default());
	let result = service.search("docker deployment", &request(5)).await.expect("Failed to search.");

	assert!(result.candidates.iter().all(|item| item.candidate.source_id == "confluence"));
	assert_eq!(result.sources_searched, vec!["confluence".to_string(), "gitlab".to_string()]);

	let report = result
		.source_reports
		.iter()
		.find(|report| report.source_id == "gitlab")
		.expect("Missing gitlab report.");

	assert_eq!(report.status, SourceStatus::Failed);
	assert!(report.error.as_deref().is_some_and(|error| error.contains("HTTP 502")));

	service.search("docker deployment", &request(5)).await.expect("Failed to search.");

	assert_eq!(wiki_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn slow_source_times_out_without_failing_the_search() {
	let mut cfg = config();

	if let Some(gitlab) = cfg.sources.iter_mut().find(|source| source.source_id == "gitlab") {
		gitlab.timeout_seconds = 1;
	}

	let slow = gitlab().with_delay(Duration::from_secs(5));
	let service = service(cfg, vec![confluence(), slow], Providers::default());
	let result = service.search("docker deployment", &request(5)).await.expect("Failed to search.");
	let statuses: Vec<SourceStatus> =
		result.source_reports.iter().map(|report| report.status).collect();

	assert_eq!(statuses, vec![SourceStatus::Ok, SourceStatus::TimedOut]);
	assert!(!result.candidates.is_empty());
}

#[tokio::test]
async fn search_deadline_without_answers_is_a_timeout() {
	let mut cfg = config();

	cfg.search.timeouts.max_ms = 100;

	let sources = vec![
		confluence().with_delay(Duration::from_secs(5)),
		gitlab().with_delay(Duration::from_secs(5)),
	];
	let service = service(cfg, sources, Providers::default());

	assert!(matches!(
		service.search("docker deployment", &request(5)).await,
		Err(Error::Timeout { budget_ms: 100, .. })
	));
}

#[tokio::test]
async fn unresolvable_selection_is_an_error() {
	let service = service(config(), vec![confluence(), gitlab()], Providers::default());
	let unknown = SearchConfig { selected_sources: vec!["missing".to_string()], ..request(5) };
	let filtered = SearchConfig {
		source_type_filter: Some(vec![SourceType::IssueTracker]),
		..request(5)
	};

	assert!(matches!(
		service.search("docker", &unknown).await,
		Err(Error::NoSourcesResolved { .. })
	));
	assert!(matches!(
		service.search("docker", &filtered).await,
		Err(Error::NoSourcesResolved { .. })
	));
}

#[tokio::test]
async fn disabled_sources_are_skipped() {
	let mut cfg = config();

	if let Some(gitlab) = cfg.sources.iter_mut().find(|source| source.source_id == "gitlab") {
		gitlab.enabled = false;
	}

	let service = service(cfg, vec![confluence(), gitlab()], Providers::default());
	let result = service.search("docker", &request(5)).await.expect("Failed to search.");

	assert_eq!(result.sources_searched, vec!["confluence".to_string()]);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
	let service = service(config(), vec![confluence()], Providers::default());
	let mut negative_weight = request(5);

	negative_weight.source_weights.insert("confluence".to_string(), -1.0);

	for (query, request) in [
		("   ", request(5)),
		("docker", request(0)),
		("docker", request(10_000)),
		("docker", negative_weight),
	] {
		assert!(matches!(
			service.search(query, &request).await,
			Err(Error::InvalidRequest { .. })
		));
	}
}

#[tokio::test]
async fn request_weights_override_source_weights() {
	let service = service(config(), vec![confluence(), gitlab()], Providers::default());
	let mut weighted = request(10);

	weighted.source_weights.insert("confluence".to_string(), 0.0);

	let result = service.search("docker deployment", &weighted).await.expect("Failed to search.");
	let last = result.candidates.last().expect("Missing candidates.");

	assert_eq!(last.candidate.source_id, "confluence");
	assert_eq!(last.candidate.score, 0.0);
	assert_eq!(result.candidates[0].candidate.source_id, "gitlab");
}

#[tokio::test]
async fn hybrid_search_merges_vector_hits() {
	let mut cfg = config();

	if let Some(wiki) = cfg.sources.iter_mut().find(|source| source.source_id == "confluence") {
		wiki.collection = Some("wiki_pages".to_string());
	}

	let index = StaticVectorIndex {
		hits: vec![
			StaticVectorIndex::hit("p1", 0.95, &[("doc_id", json!("confluence:3"))]),
			StaticVectorIndex::hit(
				"p2",
				0.5,
				&[("title", json!("Swarm notes")), ("content", json!("Docker swarm rollout."))],
			),
		],
	};
	let embedding = HashEmbedding::new(16);
	let embedding_calls = embedding.calls();
	let providers = Providers {
		embedding: Some(Arc::new(embedding)),
		vector_index: Some(Arc::new(index)),
		..Default::default()
	};
	let service = service(cfg, vec![confluence(), gitlab()], providers);
	let mut hybrid = request(10);

	hybrid.hybrid_search = true;
	hybrid.source_weights.insert("confluence".to_string(), 0.5);

	let result = service.search("docker deployment", &hybrid).await.expect("Failed to search.");
	let score_of = |id: &str| {
		result
			.candidates
			.iter()
			.find(|item| item.candidate.id == id)
			.map(|item| item.candidate.score)
	};

	assert_eq!(embedding_calls.load(Ordering::SeqCst), 1);
	assert!(score_of("confluence:3").is_some_and(|score| (score - 0.475).abs() < 1e-6));
	assert!(score_of("confluence:p2").is_some());
	assert_eq!(result.total_results, 7);
	assert!(result.degradations.is_empty());
}

#[tokio::test]
async fn hybrid_search_without_embeddings_degrades_to_keywords() {
	let mut cfg = config();

	if let Some(wiki) = cfg.sources.iter_mut().find(|source| source.source_id == "confluence") {
		wiki.collection = Some("wiki_pages".to_string());
	}

	let service = service(cfg, vec![confluence(), gitlab()], Providers::default());
	let mut hybrid = request(10);

	hybrid.hybrid_search = true;

	let result = service.search("docker deployment", &hybrid).await.expect("Failed to search.");

	assert_eq!(result.total_results, 6);
	assert_eq!(result.degradations.len(), 1);
	assert!(result.degradations[0].starts_with("Embedding unavailable"));
}

#[tokio::test]
async fn graph_and_rerank_annotate_results() {
	let providers =
		Providers { embedding: Some(Arc::new(HashEmbedding::new(32))), ..Default::default() };
	let service = service(config(), vec![confluence(), gitlab()], providers);
	let enriched = SearchConfig {
		build_graph: true,
		include_semantic: true,
		rerank: true,
		..request(5)
	};
	let result = service.search("docker deployment", &enriched).await.expect("Failed to search.");
	let returned = ids(&result);

	assert_eq!(result.candidates.len(), 5);

	for item in &result.candidates {
		let score = item.contextual_score.as_ref().expect("Missing contextual score.");

		for value in [
			score.base,
			score.intent,
			score.temporal,
			score.popularity,
			score.relationship,
			score.personalization,
			score.final_score,
		] {
			assert!((0.0..=1.0).contains(&value));
		}

		let graph = item.graph.as_ref().expect("Missing graph summary.");

		assert!((0.0..=1.0).contains(&graph.importance_score));
		assert!(item.related_documents.len() <= service.cfg.rerank.max_related_per_result as usize);

		for related in &item.related_documents {
			assert!((0.0..=1.0).contains(&related.strength));
			assert!(returned.contains(&related.doc_id));
			assert_ne!(related.doc_id, item.candidate.id);
		}
	}
	for pair in result.candidates.windows(2) {
		assert!(pair[0].ranking_score() >= pair[1].ranking_score());
	}
}

#[tokio::test]
async fn health_reports_follow_registration_order() {
	let broken = StaticSource::failing("gitlab", SourceType::CodeRepository, "token expired");
	let service = service(config(), vec![confluence(), broken], Providers::default());
	let reports = service.health().await;

	assert_eq!(reports.len(), 2);
	assert_eq!(reports[0].source_id, "confluence");
	assert!(reports[0].healthy);
	assert_eq!(reports[1].source_id, "gitlab");
	assert!(!reports[1].healthy);
	assert!(reports[1].error.as_deref().is_some_and(|error| error.contains("token expired")));
}

#[tokio::test]
async fn stream_pages_until_a_short_batch() {
	let source: Arc<dyn DataSource> = Arc::new(gitlab());
	let mut pager = source.stream("docker", 2);
	let mut sizes = Vec::new();

	while let Some(batch) = pager.next_batch().await {
		sizes.push(batch.expect("Failed to fetch batch.").len());
	}

	assert_eq!(sizes, vec![2, 1]);
}
