use std::cmp::Ordering;

/// Descending order with NaN sorted last.
pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

/// Clamps to `[0, 1]`; NaN becomes zero.
pub fn unit(value: f32) -> f32 {
	if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Maps 1-based `rank` out of `total` onto `[0, 1]`, best rank first.
pub fn rank_normalize(rank: usize, total: usize) -> f32 {
	if total <= 1 {
		return 1.0;
	}

	1.0 - (rank.saturating_sub(1) as f32 / (total - 1) as f32)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
	if a.len() != b.len() || a.is_empty() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut norm_a = 0.0_f32;
	let mut norm_b = 0.0_f32;

	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
		return None;
	}

	Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rank_normalize_spans_unit_interval() {
		assert_eq!(rank_normalize(1, 5), 1.0);
		assert_eq!(rank_normalize(5, 5), 0.0);
		assert_eq!(rank_normalize(3, 5), 0.5);
		assert_eq!(rank_normalize(1, 1), 1.0);
	}

	#[test]
	fn nan_sorts_last() {
		let mut values = vec![0.2, f32::NAN, 0.9];

		values.sort_by(|a, b| cmp_f32_desc(*a, *b));

		assert_eq!(values[0], 0.9);
		assert!(values[2].is_nan());
	}

	#[test]
	fn cosine_rejects_mismatched_or_zero_vectors() {
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), None);
		assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]), Some(1.0));
	}
}
