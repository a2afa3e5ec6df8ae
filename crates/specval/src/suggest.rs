//! "Did you mean" candidates for unresolved identifiers.

/// Similarity below which a candidate is never suggested.
pub const DEFAULT_CUTOFF: f64 = 0.6;
pub const DEFAULT_LIMIT: usize = 3;

/// Up to `limit` entries of `pool` whose similarity to `target` is at least
/// `cutoff`, best first. Ties keep pool order.
pub fn suggestions<'a, I>(target: &str, pool: I, limit: usize, cutoff: f64) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(f64, &str)> = pool
        .into_iter()
        .filter(|candidate| *candidate != target)
        .map(|candidate| (similarity(target, candidate), candidate))
        .filter(|(score, _)| *score >= cutoff)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

/// [`suggestions`] with the default cutoff and cap.
pub fn closest<'a, I>(target: &str, pool: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    suggestions(target, pool, DEFAULT_LIMIT, DEFAULT_CUTOFF)
}

/// `1 - distance / longest`, case-insensitive; 1.0 for two empty strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Human-readable tail for an error message, empty when nothing is close.
pub fn did_you_mean(candidates: &[String]) -> Option<String> {
    if candidates.is_empty() {
        None
    } else {
        Some(format!("did you mean: {}?", candidates.join(", ")))
    }
}
