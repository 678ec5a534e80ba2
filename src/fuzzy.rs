//! String similarity scores on a 0–100 scale.
//!
//! All four scores are built on `strsim::normalized_levenshtein`. They are
//! meant for already-normalized channel names: uppercase tokens separated
//! by single spaces.

use std::collections::BTreeSet;

use crate::models::MatchMethod;

/// Edit-distance similarity in `0.0..=1.0`. Zero if either side is empty.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

/// [`similarity`] scaled to 0–100 and rounded.
pub fn ratio(a: &str, b: &str) -> u8 {
    to_score(similarity(a, b))
}

/// Best [`ratio`] of the shorter string against every same-length window
/// of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };
    if short.is_empty() {
        return 0;
    }
    if short.len() == long.len() {
        return ratio(a, b);
    }

    let short: String = short.into_iter().collect();
    let mut best = 0;
    for window in long.windows(short.chars().count()) {
        let candidate: String = window.iter().collect();
        best = best.max(ratio(&short, &candidate));
        if best == 100 {
            break;
        }
    }
    best
}

/// [`ratio`] after sorting each side's tokens.
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Compares the shared tokens against each side's shared-plus-remaining
/// tokens and keeps the best of the three pairings.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();

    let shared = join(set_a.intersection(&set_b).copied());
    let only_a = join(set_a.difference(&set_b).copied());
    let only_b = join(set_b.difference(&set_a).copied());

    let combined_a = join([shared.as_str(), only_a.as_str()].into_iter().filter(|s| !s.is_empty()));
    let combined_b = join([shared.as_str(), only_b.as_str()].into_iter().filter(|s| !s.is_empty()));

    ratio(&shared, &combined_a)
        .max(ratio(&shared, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

/// The four guide-mode scores, in the order they are compared.
pub fn all_scores(a: &str, b: &str) -> [(MatchMethod, u8); 4] {
    [
        (MatchMethod::Similarity, ratio(a, b)),
        (MatchMethod::Partial, partial_ratio(a, b)),
        (MatchMethod::TokenSort, token_sort_ratio(a, b)),
        (MatchMethod::TokenSet, token_set_ratio(a, b)),
    ]
}

pub(crate) fn to_score(similarity: f64) -> u8 {
    (similarity * 100.0).round().clamp(0.0, 100.0) as u8
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    tokens.collect::<Vec<_>>().join(" ")
}
