//! Approximate string matching for "did you mean" suggestions.

/// Minimum similarity (0.0 – 1.0) for a candidate to be suggested.
pub const MATCH_THRESHOLD: f64 = 0.6;

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Similarity in `[0, 1]`; `1.0` means identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Best match for `candidate` in `pool`, if any is similar enough.
///
/// Ties go to the name that sorts first so suggestions are stable across runs.
pub fn best_match<'p, I>(candidate: &str, pool: I) -> Option<&'p str>
where
    I: IntoIterator<Item = &'p str>,
{
    pool.into_iter()
        .map(|name| (similarity(candidate, name), name))
        .filter(|(score, _)| *score >= MATCH_THRESHOLD)
        .max_by(|(sa, na), (sb, nb)| sa.total_cmp(sb).then_with(|| nb.cmp(na)))
        .map(|(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("camra", "camera"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_best_match_finds_typo() {
        let pool = ["camera", "canvas", "input"];
        assert_eq!(best_match("camra", pool), Some("camera"));
    }

    #[test]
    fn test_best_match_rejects_distant_names() {
        let pool = ["camera"];
        assert_eq!(best_match("zzz", pool), None);
        assert_eq!(best_match("x", std::iter::empty()), None);
    }

    #[test]
    fn test_ties_prefer_first_in_order() {
        let pool = ["bat", "cat"];
        assert_eq!(best_match("at", pool), Some("bat"));
    }
}
