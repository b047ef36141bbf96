use std::{
	collections::HashSet,
	fs,
	path::{Path, PathBuf},
	time::Instant,
};

use clap::Parser;
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use seek_service::{
	SearchConfig, SearchResult, SeekService, SourceStatus,
	cache::{PerformanceStats, Recommendation},
};

#[derive(Debug, Parser)]
#[command(
	version = seek_cli::VERSION,
	rename_all = "kebab",
	styles = seek_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, short = 'd', value_name = "FILE")]
	pub dataset: PathBuf,
	/// Overrides every query's limit.
	#[arg(long, value_name = "N")]
	pub limit: Option<u32>,
	#[arg(long, value_name = "N", default_value_t = 1)]
	pub runs_per_query: u32,
}

#[derive(Debug, Deserialize)]
pub struct EvalDataset {
	name: Option<String>,
	/// Request used by queries without their own.
	#[serde(default)]
	defaults: SearchConfig,
	queries: Vec<EvalQuery>,
}

#[derive(Debug, Deserialize)]
struct EvalQuery {
	id: Option<String>,
	query: String,
	expected_ids: Vec<String>,
	request: Option<SearchConfig>,
}

#[derive(Debug, Serialize)]
pub struct EvalOutput {
	dataset: EvalDatasetInfo,
	settings: EvalSettings,
	summary: EvalSummary,
	queries: Vec<QueryReport>,
	performance: PerformanceStats,
	recommendations: Vec<Recommendation>,
}

#[derive(Debug, Serialize)]
struct EvalDatasetInfo {
	name: String,
	query_count: usize,
}

#[derive(Debug, Serialize)]
struct EvalSettings {
	#[serde(skip_serializing_if = "Option::is_none")]
	limit: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	runs_per_query: Option<u32>,
}

#[derive(Debug, Serialize)]
struct EvalSummary {
	avg_recall_at_k: f64,
	avg_precision_at_k: f64,
	mean_rr: f64,
	mean_ndcg: f64,
	latency_ms_p50: f64,
	latency_ms_p95: f64,
	failed_queries: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	stability: Option<StabilitySummary>,
}

#[derive(Debug, Serialize)]
struct StabilitySummary {
	runs_per_query: u32,
	avg_positional_churn_at_k: f64,
	avg_set_churn_at_k: f64,
}

#[derive(Debug, Serialize)]
struct QueryReport {
	id: String,
	query: String,
	expected_count: usize,
	retrieved_count: usize,
	relevant_count: usize,
	recall_at_k: f64,
	precision_at_k: f64,
	rr: f64,
	ndcg: f64,
	latency_ms: f64,
	expected_ids: Vec<String>,
	retrieved_ids: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	unhealthy_sources: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	degradations: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	stability: Option<QueryStability>,
}

#[derive(Debug, Serialize, Clone, Copy)]
struct QueryStability {
	runs_per_query: u32,
	positional_churn_at_k: f64,
	set_churn_at_k: f64,
}

struct Metrics {
	recall_at_k: f64,
	precision_at_k: f64,
	rr: f64,
	ndcg: f64,
	relevant_count: usize,
}

struct QueryRun {
	first: SearchResult,
	latency_ms: f64,
	stability: Option<QueryStability>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = seek_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let dataset = load_dataset(args.dataset.as_path())?;
	let service = SeekService::connect(config).await?;
	let output = evaluate(&service, &dataset, args.limit, args.runs_per_query).await;
	let json = serde_json::to_string_pretty(&output)?;

	println!("{json}");

	Ok(())
}

pub fn load_dataset(path: &Path) -> color_eyre::Result<EvalDataset> {
	let raw = fs::read_to_string(path)?;
	let dataset: EvalDataset = serde_json::from_str(&raw)?;

	if dataset.queries.is_empty() {
		return Err(eyre::eyre!("Dataset must include at least one query."));
	}

	Ok(dataset)
}

/// Runs every query against `service`. A failed query scores zero and keeps its error in the
/// report.
pub async fn evaluate(
	service: &SeekService,
	dataset: &EvalDataset,
	limit: Option<u32>,
	runs_per_query: u32,
) -> EvalOutput {
	let runs_per_query = runs_per_query.max(1);
	let mut reports = Vec::with_capacity(dataset.queries.len());
	let mut latencies_ms = Vec::with_capacity(dataset.queries.len());
	let mut stability_positional = Vec::new();
	let mut stability_set = Vec::new();

	for (index, query) in dataset.queries.iter().enumerate() {
		let mut request = query.request.clone().unwrap_or_else(|| dataset.defaults.clone());

		if limit.is_some() {
			request.limit = limit;
		}

		let id = query.id.clone().unwrap_or_else(|| format!("q{}", index + 1));
		let expected: HashSet<String> = query.expected_ids.iter().cloned().collect();
		let outcome = run_query_n_times(service, &query.query, &request, runs_per_query).await;
		let report = match outcome {
			Ok(QueryRun { first, latency_ms, stability }) => {
				let retrieved = unique_ids(first.candidates.iter().map(|item| &item.candidate.id));
				let metrics = compute_metrics(&retrieved, &expected);

				if let Some(s) = stability {
					stability_positional.push(s.positional_churn_at_k);
					stability_set.push(s.set_churn_at_k);
				}

				latencies_ms.push(latency_ms);

				QueryReport {
					id,
					query: query.query.clone(),
					expected_count: expected.len(),
					retrieved_count: retrieved.len(),
					relevant_count: metrics.relevant_count,
					recall_at_k: metrics.recall_at_k,
					precision_at_k: metrics.precision_at_k,
					rr: metrics.rr,
					ndcg: metrics.ndcg,
					latency_ms,
					expected_ids: query.expected_ids.clone(),
					retrieved_ids: retrieved,
					unhealthy_sources: first
						.source_reports
						.iter()
						.filter(|report| report.status != SourceStatus::Ok)
						.map(|report| report.source_id.clone())
						.collect(),
					degradations: first.degradations,
					error: None,
					stability,
				}
			},
			Err(err) => {
				tracing::warn!(query_id = %id, error = %err, "Evaluation query failed.");

				QueryReport {
					id,
					query: query.query.clone(),
					expected_count: expected.len(),
					retrieved_count: 0,
					relevant_count: 0,
					recall_at_k: 0.0,
					precision_at_k: 0.0,
					rr: 0.0,
					ndcg: 0.0,
					latency_ms: 0.0,
					expected_ids: query.expected_ids.clone(),
					retrieved_ids: Vec::new(),
					unhealthy_sources: Vec::new(),
					degradations: Vec::new(),
					error: Some(err.to_string()),
					stability: None,
				}
			},
		};

		reports.push(report);
	}

	let mut summary = summarize(&reports, &latencies_ms);

	if runs_per_query > 1 && !stability_positional.is_empty() {
		let count = stability_positional.len() as f64;

		summary.stability = Some(StabilitySummary {
			runs_per_query,
			avg_positional_churn_at_k: stability_positional.iter().sum::<f64>() / count,
			avg_set_churn_at_k: stability_set.iter().sum::<f64>() / count,
		});
	}

	EvalOutput {
		dataset: EvalDatasetInfo {
			name: dataset.name.clone().unwrap_or_else(|| "eval".to_string()),
			query_count: reports.len(),
		},
		settings: EvalSettings {
			limit,
			runs_per_query: (runs_per_query > 1).then_some(runs_per_query),
		},
		summary,
		queries: reports,
		performance: service.stats(),
		recommendations: service.recommendations(),
	}
}

async fn run_query_n_times(
	service: &SeekService,
	query: &str,
	request: &SearchConfig,
	runs: u32,
) -> seek_service::Result<QueryRun> {
	let mut first: Option<(SearchResult, Vec<String>)> = None;
	let mut latency_total_ms = 0.0_f64;
	let mut positional_churn_sum = 0.0_f64;
	let mut set_churn_sum = 0.0_f64;
	let mut churn_count = 0_u32;

	for _ in 0..runs {
		let start = Instant::now();
		let result = service.search(query, request).await?;

		latency_total_ms += start.elapsed().as_secs_f64() * 1_000.0;

		let retrieved = unique_ids(result.candidates.iter().map(|item| &item.candidate.id));
		let Some((_, baseline)) = first.as_ref() else {
			first = Some((result, retrieved));

			continue;
		};
		let k = baseline.len().max(1);
		let (positional_churn_at_k, set_churn_at_k) =
			churn_against_baseline_at_k(baseline, &retrieved, k);

		positional_churn_sum += positional_churn_at_k;
		set_churn_sum += set_churn_at_k;
		churn_count += 1;
	}

	let Some((first, _)) = first else {
		return Err(seek_service::Error::InvalidRequest {
			message: "runs_per_query must be at least 1.".to_string(),
		});
	};
	let stability = (churn_count > 0).then(|| QueryStability {
		runs_per_query: runs,
		positional_churn_at_k: positional_churn_sum / churn_count as f64,
		set_churn_at_k: set_churn_sum / churn_count as f64,
	});

	Ok(QueryRun { first, latency_ms: latency_total_ms / runs as f64, stability })
}

fn churn_against_baseline_at_k(baseline: &[String], other: &[String], k: usize) -> (f64, f64) {
	let k = k.max(1);
	let positional_diff = (0..k).filter(|idx| baseline.get(*idx) != other.get(*idx)).count();
	let base_set: HashSet<&String> = baseline.iter().take(k).collect();
	let other_set: HashSet<&String> = other.iter().take(k).collect();
	let overlap = base_set.intersection(&other_set).count();

	(positional_diff as f64 / k as f64, 1.0 - (overlap as f64 / k as f64))
}

fn unique_ids<'a, I>(iter: I) -> Vec<String>
where
	I: IntoIterator<Item = &'a String>,
{
	let mut seen = HashSet::new();

	iter.into_iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}

fn compute_metrics(retrieved: &[String], expected: &HashSet<String>) -> Metrics {
	let mut relevant_count = 0_usize;
	let mut dcg = 0.0_f64;
	let mut first_hit: Option<usize> = None;

	for (idx, id) in retrieved.iter().enumerate() {
		if expected.contains(id) {
			let rank = idx + 1;

			relevant_count += 1;
			dcg += 1.0 / (rank as f64 + 1.0).log2();

			if first_hit.is_none() {
				first_hit = Some(rank);
			}
		}
	}

	let ideal_hits = expected.len().min(retrieved.len());
	let idcg: f64 = (1..=ideal_hits).map(|rank| 1.0 / (rank as f64 + 1.0).log2()).sum();
	let ndcg = if idcg > 0.0 { dcg / idcg } else { 0.0 };
	let rr = first_hit.map(|rank| 1.0 / rank as f64).unwrap_or(0.0);
	let precision_at_k =
		if retrieved.is_empty() { 0.0 } else { relevant_count as f64 / retrieved.len() as f64 };
	let recall_at_k =
		if expected.is_empty() { 0.0 } else { relevant_count as f64 / expected.len() as f64 };

	Metrics { recall_at_k, precision_at_k, rr, ndcg, relevant_count }
}

fn summarize(reports: &[QueryReport], latencies_ms: &[f64]) -> EvalSummary {
	let count = reports.len().max(1) as f64;
	let mut sorted = latencies_ms.to_vec();

	sorted.sort_by(|a, b| a.total_cmp(b));

	EvalSummary {
		avg_recall_at_k: reports.iter().map(|r| r.recall_at_k).sum::<f64>() / count,
		avg_precision_at_k: reports.iter().map(|r| r.precision_at_k).sum::<f64>() / count,
		mean_rr: reports.iter().map(|r| r.rr).sum::<f64>() / count,
		mean_ndcg: reports.iter().map(|r| r.ndcg).sum::<f64>() / count,
		latency_ms_p50: percentile(&sorted, 0.50),
		latency_ms_p95: percentile(&sorted, 0.95),
		failed_queries: reports.iter().filter(|r| r.error.is_some()).count(),
		stability: None,
	}
}

fn percentile(values: &[f64], percentile: f64) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	let clamped = percentile.clamp(0.0, 1.0);
	let pos = clamped * (values.len() as f64 - 1.0);
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;

	if lower == upper {
		values[lower]
	} else {
		let weight = pos - lower as f64;

		values[lower] * (1.0 - weight) + values[upper] * weight
	}
}
