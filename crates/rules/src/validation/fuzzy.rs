//! Levenshtein-based "did you mean" suggestions.

/// Closest candidate by edit distance, case-insensitive. Candidates further
/// than half the longer string's length away are not suggested.
pub(crate) fn fuzzy_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let needle = input.to_lowercase();
    let (best, dist) = candidates
        .iter()
        .map(|&c| (c, levenshtein(&needle, &c.to_lowercase())))
        .min_by_key(|&(_, d)| d)?;

    let longest = input.chars().count().max(best.chars().count());
    (dist <= longest / 2).then_some(best)
}

/// `"did you mean 'x'?"` for the closest candidate, if any is close enough.
pub(crate) fn did_you_mean(input: &str, candidates: &[&str]) -> Option<String> {
    fuzzy_match(input, candidates).map(|m| format!("did you mean '{m}'?"))
}

/// Levenshtein edit distance between two strings.
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let n = b.len();

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
