//! Partial-ratio string similarity on a 0–100 scale.
//!
//! The shorter string is slid across the longer one and each equal-length
//! window is scored with normalised Levenshtein similarity. Windows are only
//! tried at alignments suggested by shared character bigrams (or single
//! characters when no bigram is shared), which keeps long posts cheap to
//! score against short NGO names.

use std::collections::{BTreeSet, HashMap, HashSet};
use strsim::normalized_levenshtein;

/// Best-aligned substring similarity between `a` and `b`, rounded to 0..=100.
///
/// Returns 100 when the shorter string occurs verbatim in the longer one and
/// 0 when either string is empty. The comparison is case-sensitive; callers
/// lowercase both sides first.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let short_str: String = short.iter().collect();

    if short.len() == long.len() {
        let long_str: String = long.iter().collect();
        return to_score(normalized_levenshtein(&short_str, &long_str));
    }

    let short_counts = char_counts(&short);
    let mut seen: HashSet<&[char]> = HashSet::new();
    let mut best = 0.0_f64;
    for start in candidate_starts(&short, &long) {
        let window = &long[start..start + short.len()];
        if !seen.insert(window) {
            continue;
        }
        // Equal-length strings sharing `k` characters are at least `len - k` edits apart.
        let bound = shared_chars(&short_counts, window) as f64 / short.len() as f64;
        if bound <= best {
            continue;
        }
        let window: String = window.iter().collect();
        let score = normalized_levenshtein(&short_str, &window);
        if score > best {
            best = score;
            if best > 0.995 {
                return 100;
            }
        }
    }
    to_score(best)
}

/// Lowercase, replace anything that is not alphanumeric with a space, trim.
pub fn normalize_for_fuzzy(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

fn to_score(similarity: f64) -> u8 {
    (similarity * 100.0).round().clamp(0.0, 100.0) as u8
}

fn char_counts(chars: &[char]) -> HashMap<char, usize> {
    let mut counts = HashMap::new();
    for &c in chars {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts
}

/// Size of the multiset intersection of `counts` and `window`.
fn shared_chars(counts: &HashMap<char, usize>, window: &[char]) -> usize {
    let mut remaining = counts.clone();
    window
        .iter()
        .filter(|c| match remaining.get_mut(*c) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        })
        .count()
}

/// Window start offsets in `long` worth scoring against `short`.
fn candidate_starts(short: &[char], long: &[char]) -> BTreeSet<usize> {
    let max_start = long.len() - short.len();
    let mut starts = BTreeSet::new();

    if short.len() >= 2 {
        let mut bigrams: HashMap<(char, char), Vec<usize>> = HashMap::new();
        for (i, pair) in short.windows(2).enumerate() {
            bigrams.entry((pair[0], pair[1])).or_default().push(i);
        }
        for (j, pair) in long.windows(2).enumerate() {
            if let Some(positions) = bigrams.get(&(pair[0], pair[1])) {
                for &i in positions {
                    starts.insert(j.saturating_sub(i).min(max_start));
                }
            }
        }
    }

    if starts.is_empty() {
        let mut unigrams: HashMap<char, Vec<usize>> = HashMap::new();
        for (i, &c) in short.iter().enumerate() {
            unigrams.entry(c).or_default().push(i);
        }
        for (j, c) in long.iter().enumerate() {
            if let Some(positions) = unigrams.get(c) {
                for &i in positions {
                    starts.insert(j.saturating_sub(i).min(max_start));
                }
            }
        }
    }
    starts
}
