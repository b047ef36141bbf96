use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use seek_config::SourceType;
use seek_domain::intent::TechnicalLevel;
use seek_service::{SearchConfig, SeekService};

#[derive(Debug, Parser)]
#[command(
	version = seek_cli::VERSION,
	rename_all = "kebab",
	styles = seek_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Search the configured sources and print the result as JSON.
	Search(SearchArgs),
	/// Probe every enabled source and print one report per source.
	Health,
}

#[derive(Debug, clap::Args)]
pub struct SearchArgs {
	pub query: String,
	/// Base request as JSON. Flags below override its fields.
	#[arg(long, value_name = "FILE")]
	pub request: Option<PathBuf>,
	#[arg(long, short = 's', value_name = "ID", value_delimiter = ',')]
	pub sources: Vec<String>,
	#[arg(
		long = "type",
		value_name = "TYPE",
		value_delimiter = ',',
		value_parser = parse_snake::<SourceType>,
	)]
	pub source_types: Vec<SourceType>,
	#[arg(long, short = 'n', value_name = "N")]
	pub limit: Option<u32>,
	#[arg(long = "weight", value_name = "ID=WEIGHT", value_parser = parse_weight)]
	pub weights: Vec<(String, f64)>,
	#[arg(long)]
	pub hybrid: bool,
	#[arg(long)]
	pub graph: bool,
	/// Add embedding-based relations to the graph.
	#[arg(long, requires = "graph")]
	pub semantic: bool,
	#[arg(long)]
	pub rerank: bool,
	#[arg(long, value_name = "LEVEL", value_parser = parse_snake::<TechnicalLevel>)]
	pub technical_level: Option<TechnicalLevel>,
	#[arg(long, value_name = "NAME")]
	pub domain: Option<String>,
}
impl SearchArgs {
	pub fn search_config(&self) -> color_eyre::Result<SearchConfig> {
		let mut request: SearchConfig = match self.request.as_ref() {
			Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
			None => SearchConfig::default(),
		};

		if !self.sources.is_empty() {
			request.selected_sources = self.sources.clone();
		}
		if !self.source_types.is_empty() {
			request.source_type_filter = Some(self.source_types.clone());
		}
		if self.limit.is_some() {
			request.limit = self.limit;
		}

		request.source_weights.extend(self.weights.iter().cloned());
		request.hybrid_search |= self.hybrid;
		request.build_graph |= self.graph;
		request.include_semantic |= self.semantic;
		request.rerank |= self.rerank;

		if self.technical_level.is_some() {
			request.context.technical_level = self.technical_level;
		}
		if self.domain.is_some() {
			request.context.domain = self.domain.clone();
		}

		Ok(request)
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = seek_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let service = SeekService::connect(config).await?;
	let json = match &args.command {
		Command::Search(search) => {
			let request = search.search_config()?;
			let result = service.search(&search.query, &request).await?;

			serde_json::to_string_pretty(&result)?
		},
		Command::Health => {
			let reports = service.health().await;

			if reports.iter().any(|report| !report.healthy) {
				tracing::warn!(
					unhealthy = reports.iter().filter(|report| !report.healthy).count(),
					"Some sources are unhealthy."
				);
			}

			serde_json::to_string_pretty(&reports)?
		},
	};

	println!("{json}");

	Ok(())
}

/// Parses a snake_case enum name; dashes are accepted in place of underscores.
fn parse_snake<T>(raw: &str) -> Result<T, String>
where
	T: DeserializeOwned,
{
	let name = raw.trim().to_ascii_lowercase().replace('-', "_");

	serde_json::from_value(Value::String(name)).map_err(|_| format!("Unknown value {raw:?}."))
}

fn parse_weight(raw: &str) -> Result<(String, f64), String> {
	let Some((source_id, weight)) = raw.split_once('=') else {
		return Err(format!("Expected ID=WEIGHT, got {raw:?}."));
	};
	let weight: f64 =
		weight.trim().parse().map_err(|_| format!("Weight for {source_id:?} is not a number."))?;

	if !weight.is_finite() || weight < 0.0 {
		return Err(format!("Weight for {source_id:?} must be a finite number >= 0."));
	}

	Ok((source_id.trim().to_string(), weight))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn search_flags_build_a_request() {
		let args = Args::try_parse_from([
			"seek-search",
			"-c",
			"seek.toml",
			"search",
			"docker deployment",
			"--sources",
			"confluence,gitlab",
			"--type",
			"wiki,code-repository",
			"-n",
			"5",
			"--weight",
			"gitlab=0.5",
			"--graph",
			"--semantic",
			"--rerank",
			"--technical-level",
			"beginner",
		])
		.expect("Failed to parse args.");
		let Command::Search(search) = args.command else {
			panic!("Expected the search subcommand.");
		};
		let request = search.search_config().expect("Failed to build request.");

		assert_eq!(request.selected_sources, vec!["confluence".to_string(), "gitlab".to_string()]);
		assert_eq!(
			request.source_type_filter,
			Some(vec![SourceType::Wiki, SourceType::CodeRepository])
		);
		assert_eq!(request.limit, Some(5));
		assert_eq!(request.source_weights.get("gitlab"), Some(&0.5));
		assert!(request.build_graph && request.include_semantic && request.rerank);
		assert!(!request.hybrid_search);
		assert_eq!(request.context.technical_level, Some(TechnicalLevel::Beginner));
	}

	#[test]
	fn semantic_requires_graph() {
		let parsed = Args::try_parse_from([
			"seek-search",
			"-c",
			"seek.toml",
			"search",
			"docker",
			"--semantic",
		]);

		assert!(parsed.is_err());
	}

	#[test]
	fn rejects_bad_weights() {
		assert!(parse_weight("gitlab").is_err());
		assert!(parse_weight("gitlab=-1").is_err());
		assert!(parse_weight("gitlab=fast").is_err());
		assert_eq!(parse_weight(" gitlab = 2 "), Ok(("gitlab".to_string(), 2.0)));
	}
}
