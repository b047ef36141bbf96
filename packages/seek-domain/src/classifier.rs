use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tree_sitter::{Language, Node, Parser};

const CODE_INDICATORS: &[&str] = &[
	r"\b(?:async\s+)?def\s+\w+\s*\(",
	r"\bclass\s+\w+",
	r"\bfn\s+\w+",
	r"\bfunction\s*\*?\s*\w*\s*\(",
	r"(?m)^\s*import\s+[\w.]+",
	r"(?m)^\s*from\s+[\w.]+\s+import\b",
	r"(?m)^\s*(?:pub\s+)?use\s+[\w:]+",
	r"\breturn\b",
	r"\b(?:const|let|var)\s+\w+\s*=",
	r"\bpub\s+(?:fn|struct|enum|trait|mod)\b",
	r"#include\s*<",
	r"\bfunc\s+\w+\s*\(",
	r"\b(?:public|private|protected)\s+(?:static\s+)?\w+",
];
const CONFIGURATION_INDICATORS: &[&str] = &[
	r"(?m)^\s*\[[\w.\-]+\]\s*$",
	r"(?m)^[A-Z][A-Z0-9_]*=",
	r"(?m)^\s*[\w-]+:\s*$",
	r"(?m)^\s*-\s+[\w-]+:\s",
	r#""[\w-]+"\s*:\s*"#,
	r"\b(?:apiVersion|kind|services|environment|ports|volumes|image|replicas):",
	r#"(?m)^\s*[\w.-]+\s*=\s*(?:true|false|\d+|"[^"]*")\s*$"#,
];
const DOCUMENTATION_INDICATORS: &[&str] = &[
	r"(?m)^#{1,6}\s+\S",
	r"(?m)^```",
	r"\[[^\]]+\]\([^)]+\)",
	r"(?m)^\s*\d+\.\s+\w",
	r"\*\*[^*]+\*\*",
	r"(?i)\b(?:overview|introduction|getting started|usage|installation|tutorial|readme)\b",
];
const TEST_INDICATORS: &[&str] = &[
	r"\b(?:def|fn|function)\s+test_?\w*",
	r"#\[(?:tokio::)?test\]",
	r"\bassert(?:_eq|_ne)?!?\s*\(",
	r"(?m)^\s*assert\s",
	r"\b(?:describe|it|test)\s*\(\s*['\x22]",
	r"\bexpect\s*\(",
	r"\b(?:unittest|pytest|mock)\b",
	r"@Test\b",
];
const COMPLEXITY_KEYWORDS: &str =
	r"\b(?:if|elif|else|for|while|loop|match|case|switch|try|except|catch)\b";
const EXCLUDED_RUST_ROOTS: &[&str] = &["std", "core", "alloc", "crate", "self", "super"];

static CODE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(CODE_INDICATORS));
static CONFIGURATION: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(CONFIGURATION_INDICATORS));
static DOCUMENTATION: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(DOCUMENTATION_INDICATORS));
static TEST: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(TEST_INDICATORS));
static COMPLEXITY: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(COMPLEXITY_KEYWORDS).ok());

static PYTHON_FNS: LazyLock<Vec<Regex>> =
	LazyLock::new(|| compile(&[r"(?m)^\s*(?:async\s+)?def\s+(\w+)"]));
static PYTHON_CLASSES: LazyLock<Vec<Regex>> =
	LazyLock::new(|| compile(&[r"(?m)^\s*class\s+(\w+)"]));
static RUST_FNS: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(&[r"\bfn\s+(\w+)"]));
static RUST_CLASSES: LazyLock<Vec<Regex>> =
	LazyLock::new(|| compile(&[r"\b(?:struct|enum|trait)\s+(\w+)"]));
static SCRIPT_FNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
	compile(&[
		r"\bfunction\s*\*?\s+(\w+)",
		r"\b(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s*)?\([^)]*\)\s*=>",
	])
});
static SCRIPT_CLASSES: LazyLock<Vec<Regex>> =
	LazyLock::new(|| compile(&[r"\bclass\s+(\w+)", r"\binterface\s+(\w+)"]));
static GO_FNS: LazyLock<Vec<Regex>> =
	LazyLock::new(|| compile(&[r"\bfunc\s+(?:\([^)]*\)\s*)?(\w+)"]));
static GO_CLASSES: LazyLock<Vec<Regex>> =
	LazyLock::new(|| compile(&[r"\btype\s+(\w+)\s+(?:struct|interface)\b"]));
static JAVA_FNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
	compile(&[
		r"(?m)^\s*(?:(?:public|private|protected|static|final)\s+)*[\w<>\[\]]+\s+(\w+)\s*\([^)]*\)\s*\{",
	])
});
static JAVA_CLASSES: LazyLock<Vec<Regex>> =
	LazyLock::new(|| compile(&[r"\b(?:class|interface|enum)\s+(\w+)"]));
static GENERIC_FNS: LazyLock<Vec<Regex>> =
	LazyLock::new(|| compile(&[r"\b(?:def|fn|function|func)\s+(\w+)"]));
static GENERIC_CLASSES: LazyLock<Vec<Regex>> =
	LazyLock::new(|| compile(&[r"\b(?:class|struct|interface|trait)\s+(\w+)"]));

const PYTHON_IMPORT_PATTERNS: &[&str] = &[
	r"(?m)^\s*import\s+([\w.]+(?:\s*,\s*[\w.]+)*)",
	r"(?m)^\s*from\s+(\.*[\w.]*)\s+import\b",
];
const SCRIPT_IMPORT_PATTERNS: &[&str] = &[
	r#"import\s+(?:[^'";]*?\s+from\s+)?['"]([^'"]+)['"]"#,
	r#"require\(\s*['"]([^'"]+)['"]\s*\)"#,
];

static PYTHON_IMPORTS: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(PYTHON_IMPORT_PATTERNS));
static RUST_IMPORTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
	compile(&[r"(?m)^\s*(?:pub\s+)?use\s+([\w:]+)", r"(?m)^\s*extern\s+crate\s+(\w+)"])
});
static SCRIPT_IMPORTS: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(SCRIPT_IMPORT_PATTERNS));
static GO_IMPORTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
	compile(&[r#"(?m)^\s*import\s+(?:\w+\s+)?"([^"]+)""#, r#"(?m)^\s+(?:\w+\s+)?"([^"]+)"\s*$"#])
});
static JAVA_IMPORTS: LazyLock<Vec<Regex>> =
	LazyLock::new(|| compile(&[r"(?m)^\s*import\s+(?:static\s+)?([\w.]+)"]));
static GENERIC_IMPORTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
	let patterns: Vec<&str> =
		PYTHON_IMPORT_PATTERNS.iter().chain(SCRIPT_IMPORT_PATTERNS).copied().collect();

	compile(&patterns)
});

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
	Code,
	Documentation,
	Configuration,
	Test,
	Unknown,
}
impl DocumentType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Code => "code",
			Self::Documentation => "documentation",
			Self::Configuration => "configuration",
			Self::Test => "test",
			Self::Unknown => "unknown",
		}
	}

	/// Whether code metadata is extracted for documents of this type.
	pub fn carries_code(self) -> bool {
		matches!(self, Self::Code | Self::Test)
	}
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CodeMetadata {
	pub language: Option<String>,
	pub imports: Vec<String>,
	pub functions: Vec<String>,
	pub classes: Vec<String>,
	pub complexity_score: u32,
	pub dependencies: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Lang {
	Python,
	Rust,
	JavaScript,
	TypeScript,
	Go,
	Java,
}
impl Lang {
	fn as_str(self) -> &'static str {
		match self {
			Self::Python => "python",
			Self::Rust => "rust",
			Self::JavaScript => "javascript",
			Self::TypeScript => "typescript",
			Self::Go => "go",
			Self::Java => "java",
		}
	}

	fn from_extension(ext: &str) -> Option<Self> {
		match ext {
			"py" | "pyi" => Some(Self::Python),
			"rs" => Some(Self::Rust),
			"js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
			"ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
			"go" => Some(Self::Go),
			"java" => Some(Self::Java),
			_ => None,
		}
	}

	fn grammar(self) -> Option<Language> {
		match self {
			Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
			Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
			_ => None,
		}
	}
}

/// Picks the indicator set with the most regex hits. Ties favor code, then configuration, then
/// documentation, then test.
pub fn classify(content: &str) -> DocumentType {
	let ranked = [
		(DocumentType::Code, count_hits(&CODE, content)),
		(DocumentType::Configuration, count_hits(&CONFIGURATION, content)),
		(DocumentType::Documentation, count_hits(&DOCUMENTATION, content)),
		(DocumentType::Test, count_hits(&TEST, content)),
	];
	let mut best = (DocumentType::Unknown, 0);

	for (kind, hits) in ranked {
		if hits > best.1 {
			best = (kind, hits);
		}
	}

	best.0
}

/// `source_hint` is usually a title or path; a file extension in it decides the language.
pub fn extract_code_metadata(content: &str, source_hint: &str) -> CodeMetadata {
	let lang = detect_language(content, source_hint);
	let (functions, classes) = match lang {
		Some(lang) => parse_definitions(lang, content)
			.unwrap_or_else(|| scan_definitions(Some(lang), content)),
		None => scan_definitions(None, content),
	};
	let imports = scan_imports(lang, content);
	let dependencies = dependency_roots(lang, &imports);

	CodeMetadata {
		language: lang.map(|lang| lang.as_str().to_string()),
		imports,
		functions,
		classes,
		complexity_score: complexity(content),
		dependencies,
	}
}

pub fn complexity(content: &str) -> u32 {
	COMPLEXITY.as_ref().map(|re| re.find_iter(content).count() as u32).unwrap_or(0)
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
	patterns.iter().filter_map(|pattern| Regex::new(pattern).ok()).collect()
}

fn count_hits(patterns: &[Regex], content: &str) -> usize {
	patterns.iter().map(|re| re.find_iter(content).count()).sum()
}

fn detect_language(content: &str, source_hint: &str) -> Option<Lang> {
	let from_hint = source_hint
		.split(|ch: char| ch.is_whitespace() || ch == '/' || ch == '\\')
		.filter_map(|segment| segment.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()))
		.filter_map(|ext| Lang::from_extension(&ext))
		.next_back();

	from_hint.or_else(|| sniff_language(content))
}

fn sniff_language(content: &str) -> Option<Lang> {
	static SNIFFERS: LazyLock<Vec<(Lang, Regex)>> = LazyLock::new(|| {
		[
			(Lang::Rust, r"(?m)^\s*(?:pub\s+)?(?:fn|struct|enum|impl|use)\s+\w+|\blet\s+mut\b"),
			(Lang::Go, r"(?m)^package\s+\w+|\bfunc\s+\w+\s*\("),
			(Lang::Java, r"\bpublic\s+(?:final\s+)?class\s+\w+|(?m)^import\s+java\."),
			(Lang::TypeScript, r"\binterface\s+\w+\s*\{|:\s*(?:string|number|boolean)\b"),
			(Lang::JavaScript, r"\bfunction\s+\w+\s*\(|\brequire\s*\(|=>\s*\{|\bconst\s+\w+\s*="),
			(Lang::Python, r"(?m)^\s*(?:def\s+\w+\s*\(|import\s+\w|from\s+[\w.]+\s+import\b)"),
		]
		.into_iter()
		.filter_map(|(lang, pattern)| Regex::new(pattern).ok().map(|re| (lang, re)))
		.collect()
	});

	SNIFFERS
		.iter()
		.map(|(lang, re)| (*lang, re.find_iter(content).count()))
		.filter(|(_, hits)| *hits > 0)
		.fold(None, |best: Option<(Lang, usize)>, (lang, hits)| match best {
			Some((_, best_hits)) if best_hits >= hits => best,
			_ => Some((lang, hits)),
		})
		.map(|(lang, _)| lang)
}

/// Grammar walk. `None` when no grammar exists or the tree contains syntax errors.
fn parse_definitions(lang: Lang, content: &str) -> Option<(Vec<String>, Vec<String>)> {
	let grammar = lang.grammar()?;
	let mut parser = Parser::new();

	parser.set_language(&grammar).ok()?;

	let tree = parser.parse(content, None)?;
	let root = tree.root_node();

	if root.has_error() {
		return None;
	}

	let source = content.as_bytes();
	let mut functions = Vec::new();
	let mut classes = Vec::new();
	let mut stack = vec![root];

	while let Some(node) = stack.pop() {
		let bucket = match (lang, node.kind()) {
			(Lang::Python, "function_definition") | (Lang::Rust, "function_item") =>
				Some(&mut functions),
			(Lang::Python, "class_definition")
			| (Lang::Rust, "struct_item" | "enum_item" | "trait_item") => Some(&mut classes),
			_ => None,
		};

		if let Some(bucket) = bucket
			&& let Some(name) = node_name(node, source)
		{
			push_unique(bucket, name);
		}

		// Reverse so the stack pops children in source order.
		for idx in (0..node.child_count()).rev() {
			if let Some(child) = node.child(idx) {
				stack.push(child);
			}
		}
	}

	Some((functions, classes))
}

fn node_name(node: Node<'_>, source: &[u8]) -> Option<String> {
	let name = node.child_by_field_name("name")?;

	name.utf8_text(source).ok().map(str::to_string)
}

fn scan_definitions(lang: Option<Lang>, content: &str) -> (Vec<String>, Vec<String>) {
	let (function_patterns, class_patterns): (&[Regex], &[Regex]) = match lang {
		Some(Lang::Python) => (PYTHON_FNS.as_slice(), PYTHON_CLASSES.as_slice()),
		Some(Lang::Rust) => (RUST_FNS.as_slice(), RUST_CLASSES.as_slice()),
		Some(Lang::JavaScript | Lang::TypeScript) =>
			(SCRIPT_FNS.as_slice(), SCRIPT_CLASSES.as_slice()),
		Some(Lang::Go) => (GO_FNS.as_slice(), GO_CLASSES.as_slice()),
		Some(Lang::Java) => (JAVA_FNS.as_slice(), JAVA_CLASSES.as_slice()),
		None => (GENERIC_FNS.as_slice(), GENERIC_CLASSES.as_slice()),
	};

	(capture_all(function_patterns, content), capture_all(class_patterns, content))
}

fn scan_imports(lang: Option<Lang>, content: &str) -> Vec<String> {
	let patterns: &[Regex] = match lang {
		Some(Lang::Python) => PYTHON_IMPORTS.as_slice(),
		Some(Lang::Rust) => RUST_IMPORTS.as_slice(),
		Some(Lang::JavaScript | Lang::TypeScript) => SCRIPT_IMPORTS.as_slice(),
		Some(Lang::Go) => GO_IMPORTS.as_slice(),
		Some(Lang::Java) => JAVA_IMPORTS.as_slice(),
		None => GENERIC_IMPORTS.as_slice(),
	};
	let mut imports = Vec::new();

	for capture in capture_all(patterns, content) {
		// `import a, b` yields several modules from one capture.
		for module in capture.split(',').map(str::trim).filter(|module| !module.is_empty()) {
			push_unique(&mut imports, module.to_string());
		}
	}

	imports
}

fn dependency_roots(lang: Option<Lang>, imports: &[String]) -> Vec<String> {
	let mut roots = Vec::new();

	for import in imports {
		if import.starts_with('.') {
			continue;
		}

		let root = match lang {
			Some(Lang::Rust) => import.split("::").next().unwrap_or_default().to_string(),
			Some(Lang::JavaScript | Lang::TypeScript) | None if import.starts_with('@') =>
				import.splitn(3, '/').take(2).collect::<Vec<_>>().join("/"),
			Some(Lang::Go) => import.clone(),
			Some(Lang::Java) => import.splitn(3, '.').take(2).collect::<Vec<_>>().join("."),
			_ => import
				.split(['.', '/'])
				.next()
				.unwrap_or_default()
				.to_string(),
		};

		if root.is_empty() || EXCLUDED_RUST_ROOTS.contains(&root.as_str()) {
			continue;
		}

		push_unique(&mut roots, root);
	}

	roots
}

fn capture_all(patterns: &[Regex], content: &str) -> Vec<String> {
	let mut found = Vec::new();

	for re in patterns {
		for caps in re.captures_iter(content) {
			if let Some(name) = caps.get(1) {
				push_unique(&mut found, name.as_str().to_string());
			}
		}
	}

	found
}

fn push_unique(values: &mut Vec<String>, value: String) {
	if !values.contains(&value) {
		values.push(value);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_content_is_unknown() {
		assert_eq!(classify(""), DocumentType::Unknown);
		assert_eq!(classify("plain words without markers"), DocumentType::Unknown);
	}

	#[test]
	fn python_tests_classify_as_test() {
		let content = "def test_login():\n    assert login('a') == 1\n";

		assert_eq!(classify(content), DocumentType::Test);
	}

	#[test]
	fn markdown_classifies_as_documentation() {
		let content = "# Deploying\n\nSee [the guide](https://example.com).\n\n1. Build\n2. Ship\n";

		assert_eq!(classify(content), DocumentType::Documentation);
	}

	#[test]
	fn ties_prefer_code() {
		// One code hit (`return`) against one documentation hit (`**bold**`).
		assert_eq!(classify("**note** return"), DocumentType::Code);
	}

	#[test]
	fn grammar_walk_extracts_python_definitions() {
		let content = "import os\nfrom fastapi.routing import APIRouter\n\nclass Api:\n    def \
		               route(self):\n        if True:\n            return 1\n\ndef main():\n    \
		               pass\n";
		let meta = extract_code_metadata(content, "app/server.py");

		assert_eq!(meta.language.as_deref(), Some("python"));
		assert_eq!(meta.functions, vec!["route".to_string(), "main".to_string()]);
		assert_eq!(meta.classes, vec!["Api".to_string()]);
		assert_eq!(meta.imports, vec!["os".to_string(), "fastapi.routing".to_string()]);
		assert_eq!(meta.dependencies, vec!["os".to_string(), "fastapi".to_string()]);
		assert_eq!(meta.complexity_score, 1);
	}

	#[test]
	fn broken_syntax_falls_back_to_regex_scan() {
		let content = "fn ok() {}\nfn broken( {\nstruct Item;";
		let meta = extract_code_metadata(content, "lib.rs");

		assert_eq!(meta.language.as_deref(), Some("rust"));
		assert_eq!(meta.functions, vec!["ok".to_string(), "broken".to_string()]);
		assert_eq!(meta.classes, vec!["Item".to_string()]);
	}

	#[test]
	fn rust_internal_roots_are_not_dependencies() {
		let content = "use std::fmt;\nuse crate::model::Item;\nuse serde::Serialize;\n";
		let meta = extract_code_metadata(content, "src/lib.rs");

		assert_eq!(meta.dependencies, vec!["serde".to_string()]);
	}

	#[test]
	fn relative_script_imports_are_not_dependencies() {
		let content = "import React from 'react';\nimport { x } from './local';\nconst fp = \
		               require('lodash/fp');\n";
		let meta = extract_code_metadata(content, "ui/App.jsx");

		assert_eq!(meta.dependencies, vec!["react".to_string(), "lodash".to_string()]);
	}

	#[test]
	fn language_is_sniffed_without_a_hint() {
		let meta = extract_code_metadata("import fastapi\n\napp = fastapi.FastAPI()\n", "");

		assert_eq!(meta.language.as_deref(), Some("python"));
		assert_eq!(meta.dependencies, vec!["fastapi".to_string()]);
	}

	#[test]
	fn extraction_tables_compile_every_pattern() {
		let tables: [(&[Regex], usize); 18] = [
			(PYTHON_FNS.as_slice(), 1),
			(PYTHON_CLASSES.as_slice(), 1),
			(RUST_FNS.as_slice(), 1),
			(RUST_CLASSES.as_slice(), 1),
			(SCRIPT_FNS.as_slice(), 2),
			(SCRIPT_CLASSES.as_slice(), 2),
			(GO_FNS.as_slice(), 1),
			(GO_CLASSES.as_slice(), 1),
			(JAVA_FNS.as_slice(), 1),
			(JAVA_CLASSES.as_slice(), 1),
			(GENERIC_FNS.as_slice(), 1),
			(GENERIC_CLASSES.as_slice(), 1),
			(PYTHON_IMPORTS.as_slice(), 2),
			(RUST_IMPORTS.as_slice(), 2),
			(SCRIPT_IMPORTS.as_slice(), 2),
			(GO_IMPORTS.as_slice(), 2),
			(JAVA_IMPORTS.as_slice(), 1),
			(GENERIC_IMPORTS.as_slice(), 4),
		];

		for (idx, (table, expected)) in tables.iter().enumerate() {
			assert_eq!(table.len(), *expected, "table {idx} dropped a pattern");
		}
	}

	#[test]
	fn repeated_extraction_is_stable() {
		let content =
			"from app.models import User\n\nclass Repo:\n    def find(self):\n        pass\n";
		let first = extract_code_metadata(content, "repo.py");
		let second = extract_code_metadata(content, "repo.py");

		assert_eq!(first, second);
		assert_eq!(first.classes, vec!["Repo".to_string()]);
		assert_eq!(first.dependencies, vec!["app".to_string()]);
	}
}
