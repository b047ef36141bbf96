use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::text;

pub const MAX_KEYWORDS: usize = 10;
pub const GENERAL_DOMAIN: &str = "general";

const STOP_WORDS: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
	"i", "in", "is", "it", "me", "my", "of", "on", "or", "should", "the", "this", "to", "what",
	"when", "where", "which", "who", "why", "with", "you",
];
const BEGINNER_TERMS: &[&str] = &[
	"introduction",
	"tutorial",
	"beginner",
	"basic",
	"basics",
	"getting started",
	"simple",
	"what is",
	"how to",
	"learn",
];
const INTERMEDIATE_TERMS: &[&str] =
	&["example", "best practice", "best practices", "pattern", "configure", "setup", "usage"];
const ADVANCED_TERMS: &[&str] = &[
	"advanced",
	"optimization",
	"optimize",
	"performance",
	"architecture",
	"internals",
	"scalability",
	"distributed",
	"concurrency",
	"low-level",
];
const DOMAINS: &[(&str, &[&str])] = &[
	(
		"devops",
		&[
			"docker",
			"kubernetes",
			"k8s",
			"deployment",
			"deploy",
			"ci",
			"pipeline",
			"terraform",
			"ansible",
			"helm",
			"container",
			"jenkins",
			"monitoring",
		],
	),
	(
		"frontend",
		&[
			"react",
			"vue",
			"angular",
			"css",
			"html",
			"javascript",
			"typescript",
			"ui",
			"component",
			"browser",
			"frontend",
		],
	),
	(
		"backend",
		&[
			"api",
			"server",
			"endpoint",
			"rest",
			"graphql",
			"microservice",
			"backend",
			"fastapi",
			"django",
			"flask",
			"spring",
		],
	),
	(
		"data",
		&[
			"sql",
			"etl",
			"warehouse",
			"pandas",
			"spark",
			"analytics",
			"dataset",
			"schema",
			"database",
		],
	),
	(
		"machine_learning",
		&[
			"model",
			"training",
			"neural",
			"ml",
			"machine learning",
			"pytorch",
			"tensorflow",
			"embedding",
			"inference",
			"llm",
		],
	),
	(
		"security",
		&[
			"auth",
			"authentication",
			"authorization",
			"oauth",
			"encryption",
			"vulnerability",
			"security",
			"token",
			"tls",
			"permission",
		],
	),
];

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
	CodeSearch,
	Documentation,
	Debugging,
	Learning,
	Implementation,
	Configuration,
}
impl IntentCategory {
	/// Declaration order, which also breaks ties.
	pub const ALL: [Self; 6] = [
		Self::CodeSearch,
		Self::Documentation,
		Self::Debugging,
		Self::Learning,
		Self::Implementation,
		Self::Configuration,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::CodeSearch => "code_search",
			Self::Documentation => "documentation",
			Self::Debugging => "debugging",
			Self::Learning => "learning",
			Self::Implementation => "implementation",
			Self::Configuration => "configuration",
		}
	}

	pub fn patterns(self) -> &'static [&'static str] {
		match self {
			Self::CodeSearch => &[
				"function",
				"class",
				"method",
				"code",
				"implementation of",
				"source",
				"snippet",
				"api",
				"module",
				"definition",
			],
			Self::Documentation => &[
				"documentation",
				"docs",
				"guide",
				"manual",
				"reference",
				"readme",
				"wiki",
				"explain",
				"overview",
				"specification",
			],
			Self::Debugging => &[
				"error",
				"bug",
				"fix",
				"issue",
				"exception",
				"crash",
				"fail",
				"not working",
				"debug",
				"traceback",
			],
			Self::Learning => &[
				"how to",
				"tutorial",
				"learn",
				"introduction",
				"getting started",
				"example",
				"what is",
				"beginner",
				"basics",
				"understand",
			],
			Self::Implementation => &[
				"implement",
				"build",
				"create",
				"develop",
				"integrate",
				"add",
				"write",
				"deploy",
				"deployment",
				"setup",
			],
			Self::Configuration => &[
				"config",
				"configuration",
				"settings",
				"environment",
				"env",
				"setup",
				"install",
				"yaml",
				"parameter",
				"options",
			],
		}
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicalLevel {
	Beginner,
	Intermediate,
	Advanced,
}
impl TechnicalLevel {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Beginner => "beginner",
			Self::Intermediate => "intermediate",
			Self::Advanced => "advanced",
		}
	}

	/// Vocabulary that signals content written for this level.
	pub fn terms(self) -> &'static [&'static str] {
		match self {
			Self::Beginner => BEGINNER_TERMS,
			Self::Intermediate => INTERMEDIATE_TERMS,
			Self::Advanced => ADVANCED_TERMS,
		}
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct UserIntent {
	pub primary_intent: IntentCategory,
	pub secondary_intents: BTreeSet<IntentCategory>,
	pub confidence: f32,
	pub keywords: Vec<String>,
	pub technical_level: TechnicalLevel,
	pub domain: String,
}

/// Caller-supplied values that win over what the query text suggests.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IntentOverrides {
	pub technical_level: Option<TechnicalLevel>,
	pub domain: Option<String>,
}

pub fn analyze_intent(query: &str, overrides: &IntentOverrides) -> UserIntent {
	let lowered = text::normalize_whitespace(query);
	let scored: Vec<(IntentCategory, usize)> = IntentCategory::ALL
		.iter()
		.map(|category| (*category, text::term_hits(&lowered, category.patterns())))
		.collect();
	let (primary_intent, primary_hits) = scored.iter().fold(
		(IntentCategory::CodeSearch, 0),
		|best, (category, hits)| if *hits > best.1 { (*category, *hits) } else { best },
	);
	let secondary_intents = scored
		.iter()
		.filter(|(category, hits)| *hits > 0 && *category != primary_intent)
		.map(|(category, _)| *category)
		.collect();
	let confidence =
		(primary_hits as f32 / primary_intent.patterns().len() as f32).clamp(0.0, 1.0);
	let technical_level = overrides.technical_level.unwrap_or_else(|| detect_level(&lowered));
	let domain = overrides
		.domain
		.as_deref()
		.map(str::trim)
		.filter(|domain| !domain.is_empty())
		.map(str::to_string)
		.unwrap_or_else(|| detect_domain(&lowered).to_string());

	UserIntent {
		primary_intent,
		secondary_intents,
		confidence,
		keywords: keywords(query),
		technical_level,
		domain,
	}
}

/// Query tokens of at least two characters, stop words removed, first occurrence order.
pub fn keywords(query: &str) -> Vec<String> {
	let mut out: Vec<String> = Vec::new();

	for word in text::words(query) {
		if word.chars().count() < 2 || STOP_WORDS.contains(&word.as_str()) || out.contains(&word) {
			continue;
		}

		out.push(word);

		if out.len() == MAX_KEYWORDS {
			break;
		}
	}

	out
}

/// Term table of a named domain. Unknown domains, including `general`, have none.
pub fn domain_terms(domain: &str) -> &'static [&'static str] {
	DOMAINS.iter().find(|(name, _)| *name == domain).map(|(_, terms)| *terms).unwrap_or(&[])
}

fn detect_level(lowered: &str) -> TechnicalLevel {
	let beginner = text::term_hits(lowered, BEGINNER_TERMS);
	let advanced = text::term_hits(lowered, ADVANCED_TERMS);

	match beginner.cmp(&advanced) {
		std::cmp::Ordering::Greater => TechnicalLevel::Beginner,
		std::cmp::Ordering::Less => TechnicalLevel::Advanced,
		std::cmp::Ordering::Equal => TechnicalLevel::Intermediate,
	}
}

fn detect_domain(lowered: &str) -> &'static str {
	let mut best = (GENERAL_DOMAIN, 0);

	for (name, terms) in DOMAINS {
		let hits = text::term_hits(lowered, terms);

		if hits > best.1 {
			best = (*name, hits);
		}
	}

	best.0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn debugging_queries_pick_debugging() {
		let intent = analyze_intent("fix crash error in login", &IntentOverrides::default());

		assert_eq!(intent.primary_intent, IntentCategory::Debugging);
		assert!((intent.confidence - 0.3).abs() < 1e-6);
		assert!(intent.secondary_intents.is_empty());
	}

	#[test]
	fn ties_follow_declaration_order() {
		// One documentation hit and one configuration hit.
		let intent = analyze_intent("yaml guide", &IntentOverrides::default());

		assert_eq!(intent.primary_intent, IntentCategory::Documentation);
		assert!(intent.secondary_intents.contains(&IntentCategory::Configuration));
	}

	#[test]
	fn queries_without_hits_have_zero_confidence() {
		let intent = analyze_intent("zebra", &IntentOverrides::default());

		assert_eq!(intent.primary_intent, IntentCategory::CodeSearch);
		assert_eq!(intent.confidence, 0.0);
		assert_eq!(intent.technical_level, TechnicalLevel::Intermediate);
		assert_eq!(intent.domain, GENERAL_DOMAIN);
	}

	#[test]
	fn keywords_drop_stop_words_and_duplicates() {
		let words = keywords("How to deploy the API to the API gateway");

		assert_eq!(words, vec!["deploy", "api", "gateway"]);
	}

	#[test]
	fn keywords_are_capped() {
		let words = keywords("alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu");

		assert_eq!(words.len(), MAX_KEYWORDS);
		assert_eq!(words.last().map(String::as_str), Some("kappa"));
	}

	#[test]
	fn overrides_win() {
		let overrides = IntentOverrides {
			technical_level: Some(TechnicalLevel::Advanced),
			domain: Some("security".to_string()),
		};
		let intent = analyze_intent("introduction to docker tutorial", &overrides);

		assert_eq!(intent.technical_level, TechnicalLevel::Advanced);
		assert_eq!(intent.domain, "security");
	}

	#[test]
	fn unknown_domains_have_no_terms() {
		assert!(domain_terms(GENERAL_DOMAIN).is_empty());
		assert!(domain_terms("devops").contains(&"docker"));
	}
}
