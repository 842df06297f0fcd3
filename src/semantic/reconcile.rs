use std::collections::HashSet;
use tracing::debug;

use crate::ocr::TextElement;

/// Answer meaning "nothing in the list belongs to the category".
pub const NONE_SENTINEL: &str = "NONE";

const WORD_DELIMITERS: &[char] = &[' ', '|', '-', ',', '.'];

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileConfig {
    /// A best match must score strictly above this.
    pub match_threshold: f64,
    /// Word-level similarity that counts as a word-boundary match.
    pub word_similarity: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.3,
            word_similarity: 0.8,
        }
    }
}

/// Maps a comma-separated category answer back onto the recognized
/// elements. Each output carries the answer's (corrected) text and the
/// coordinates of the closest original; answers with no close original are
/// dropped.
pub fn reconcile(
    originals: &[TextElement],
    answer: &str,
    config: &ReconcileConfig,
) -> Vec<TextElement> {
    let answer = answer.trim();
    if answer.is_empty() || answer == NONE_SENTINEL {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut matched = Vec::new();
    for raw in answer.split(',') {
        let candidate = raw.trim().trim_matches(|ch| ch == '"' || ch == '\'').trim();
        if candidate.is_empty() || candidate == NONE_SENTINEL {
            continue;
        }
        if !seen.insert(candidate.to_lowercase()) {
            continue;
        }
        match best_match(candidate, originals, config) {
            Some((original, score)) => {
                debug!(
                    "reconcile: '{}' -> '{}' at ({}, {}) score {:.2}",
                    candidate, original.text, original.x, original.y, score
                );
                matched.push(TextElement::new(candidate, original.x, original.y));
            }
            None => debug!("reconcile: no match for '{}'", candidate),
        }
    }
    matched
}

fn best_match<'a>(
    candidate: &str,
    originals: &'a [TextElement],
    config: &ReconcileConfig,
) -> Option<(&'a TextElement, f64)> {
    let target = candidate.to_lowercase();
    let mut best: Option<(&TextElement, f64)> = None;
    for original in originals {
        let source = original.text.trim().to_lowercase();
        if source.is_empty() {
            continue;
        }
        let score = match_score(&target, &source, config);
        let best_score = best.map_or(0.0, |(_, score)| score);
        if score > best_score && score > config.match_threshold {
            best = Some((original, score));
        }
    }
    best
}

/// Both inputs are expected lower-cased.
pub(crate) fn match_score(target: &str, source: &str, config: &ReconcileConfig) -> f64 {
    if target == source {
        return 1.0;
    }
    if source.contains(target) || target.contains(source) {
        return 0.9;
    }
    if is_word_match(target, source, config.word_similarity) {
        return 0.85;
    }
    let target_len = target.chars().count();
    let source_len = source.chars().count();
    let ratio = target_len.min(source_len) as f64 / target_len.max(source_len) as f64;
    similarity(target, source) * ratio
}

fn is_word_match(target: &str, source: &str, word_similarity: f64) -> bool {
    source
        .split(WORD_DELIMITERS)
        .map(str::trim)
        .filter(|word| !word.is_empty())
        .any(|word| word == target || similarity(word, target) > word_similarity)
}

/// `1 - distance / longer length`, in characters.
pub(crate) fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let longest = a.chars().count().max(b.chars().count());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    let mut previous = (0..=b.len()).collect::<Vec<_>>();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
