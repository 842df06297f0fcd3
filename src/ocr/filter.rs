use std::collections::HashSet;
use tracing::debug;

use super::TextElement;

const SIGNIFICANT_SHORT: &[&str] = &[
    "안", "좋", "나", "다", "를", "을", "의", "에", "로", "과", "와", "OK", "NO", "ON", "UP", "GO",
    "IN", "TO", "AT", "BY", "@", "#", "$", "%", "&", "*", "+", "-", "=", "?", "!",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// Strings up to this many characters must be allow-listed.
    pub short_max: usize,
    /// Longer strings are engine garbage.
    pub max_chars: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            short_max: 2,
            max_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Empty,
    Overlong,
    InsignificantShort,
    SymbolsOnly,
    Repeating,
}

#[derive(Debug, Clone, Default)]
pub struct NoiseFilter {
    config: FilterConfig,
}

impl NoiseFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn is_valid(&self, text: &str) -> bool {
        self.rejection(text).is_none()
    }

    /// Drops low-information elements; survivors keep their coordinates.
    pub fn keep(&self, elements: Vec<TextElement>) -> Vec<TextElement> {
        let before = elements.len();
        let kept = elements
            .into_iter()
            .filter(|element| match self.rejection(&element.text) {
                Some(reason) => {
                    debug!("noise filter: rejected '{}' ({:?})", element.text, reason);
                    false
                }
                None => true,
            })
            .collect::<Vec<_>>();
        debug!("noise filter: kept {} of {} elements", kept.len(), before);
        kept
    }

    fn rejection(&self, text: &str) -> Option<Rejection> {
        let text = text.trim();
        if text.is_empty() {
            return Some(Rejection::Empty);
        }
        let len = text.chars().count();
        if len > self.config.max_chars {
            return Some(Rejection::Overlong);
        }
        if len <= self.config.short_max && !is_significant_short(text) {
            return Some(Rejection::InsignificantShort);
        }
        if !text.chars().any(char::is_alphanumeric) {
            return Some(Rejection::SymbolsOnly);
        }
        if is_repeating_pattern(text) {
            return Some(Rejection::Repeating);
        }
        None
    }
}

fn is_significant_short(text: &str) -> bool {
    text.chars().all(|ch| ch.is_ascii_digit()) || SIGNIFICANT_SHORT.contains(&text)
}

fn is_repeating_pattern(text: &str) -> bool {
    let chars = text.chars().collect::<Vec<_>>();
    let len = chars.len();
    if len < 3 {
        return false;
    }
    if chars.iter().all(|ch| *ch == chars[0]) {
        return true;
    }
    (1..=len / 3).any(|k| len % k == 0 && chars.chunks(k).all(|chunk| chunk == &chars[..k]))
}

/// Case-insensitive dedup on the trimmed text. The first occurrence and its
/// coordinates win.
pub fn dedupe(elements: Vec<TextElement>) -> Vec<TextElement> {
    let mut seen = HashSet::new();
    let before = elements.len();
    let unique = elements
        .into_iter()
        .filter(|element| {
            let key = element.text.trim().to_lowercase();
            !key.is_empty() && seen.insert(key)
        })
        .collect::<Vec<_>>();
    debug!("dedupe: {} unique of {} elements", unique.len(), before);
    unique
}
