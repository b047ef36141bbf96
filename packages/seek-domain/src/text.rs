//! Word-level helpers shared by the classifier, the intent analyzer and the graph builder.

use std::collections::BTreeSet;

use unicode_segmentation::UnicodeSegmentation;

/// Lower-cased Unicode words of `text`, in order.
pub fn words(text: &str) -> Vec<String> {
	text.unicode_words().map(str::to_lowercase).collect()
}

pub fn word_set(text: &str) -> BTreeSet<String> {
	text.unicode_words().map(str::to_lowercase).collect()
}

/// `|a ∩ b| / |a ∪ b|`, zero when both sets are empty.
pub fn jaccard<T>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f32
where
	T: Ord,
{
	let union = a.union(b).count();

	if union == 0 {
		return 0.0;
	}

	a.intersection(b).count() as f32 / union as f32
}

/// Whether `term` occurs in `haystack` on word boundaries. Both sides are expected lower-cased.
pub fn contains_term(haystack: &str, term: &str) -> bool {
	if term.is_empty() {
		return false;
	}

	haystack.match_indices(term).any(|(start, _)| {
		let end = start + term.len();
		let before = haystack[..start].chars().next_back();
		let after = haystack[end..].chars().next();

		!before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
	})
}

/// Number of distinct `terms` present in `haystack`.
pub fn term_hits(haystack: &str, terms: &[&str]) -> usize {
	terms.iter().filter(|term| contains_term(haystack, term)).count()
}

/// Hits divided by table size, zero for an empty table.
pub fn hit_ratio(haystack: &str, terms: &[&str]) -> f32 {
	if terms.is_empty() {
		return 0.0;
	}

	term_hits(haystack, terms) as f32 / terms.len() as f32
}

/// Trims, collapses internal whitespace and lower-cases.
pub fn normalize_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// The first `max_chars` characters of `text`, never splitting a code point.
pub fn prefix_chars(text: &str, max_chars: usize) -> &str {
	match text.char_indices().nth(max_chars) {
		Some((idx, _)) => &text[..idx],
		None => text,
	}
}

fn is_word_char(ch: char) -> bool {
	ch.is_alphanumeric() || ch == '_'
}
