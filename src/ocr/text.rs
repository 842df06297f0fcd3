use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Joins recognition units that came out of one engine call.
pub const UNIT_SEPARATOR: &str = " | ";

static DIAGNOSTIC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Warning: Invalid resolution \d+ dpi\. Using \d+ instead\.",
        r"Estimating resolution as \d+",
        r"Warning:.*",
        r"Error:.*",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerConfig {
    /// Lines up to this many characters are treated as fragments and grouped.
    pub short_line_max: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { short_line_max: 10 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    config: NormalizerConfig,
}

impl TextNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }
        let cleaned = strip_diagnostics(raw);
        let lines = cleaned
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>();

        match lines.as_slice() {
            [] => String::new(),
            [single] => single.to_string(),
            _ => {
                let units = self.group_lines(&lines);
                debug!("normalized {} lines into {} units", lines.len(), units.len());
                units.join(UNIT_SEPARATOR)
            }
        }
    }

    fn group_lines(&self, lines: &[&str]) -> Vec<String> {
        let mut units = Vec::new();
        let mut group: Vec<&str> = Vec::new();
        for line in lines {
            if line.chars().count() <= self.config.short_line_max {
                group.push(line);
                continue;
            }
            if !group.is_empty() {
                units.push(group.join(" "));
                group.clear();
            }
            units.push(line.to_string());
        }
        if !group.is_empty() {
            units.push(group.join(" "));
        }
        units
    }
}

fn strip_diagnostics(raw: &str) -> String {
    let mut cleaned = raw.to_string();
    for pattern in DIAGNOSTIC_PATTERNS.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &str) -> String {
        TextNormalizer::default().normalize(raw)
    }

    #[test]
    fn resolution_warning_is_removed() {
        assert_eq!(
            normalize("Warning: Invalid resolution 300 dpi. Using 70 instead.\nHELLO"),
            "HELLO"
        );
    }

    #[test]
    fn estimating_and_error_lines_are_removed() {
        assert_eq!(
            normalize("Estimating resolution as 412\nError: leptonica\n  MENU  \n"),
            "MENU"
        );
    }

    #[test]
    fn short_lines_are_grouped() {
        assert_eq!(normalize("a\nb\nLongLineHere"), "a b | LongLineHere");
    }

    #[test]
    fn long_line_flushes_pending_group() {
        assert_eq!(
            normalize("LongLineHere\n1\n2\nAnotherLongLine\nend"),
            "LongLineHere | 1 2 | AnotherLongLine | end"
        );
    }

    #[test]
    fn grouping_counts_characters_not_bytes() {
        // Ten Hangul syllables are 30 bytes but still a short line.
        assert_eq!(normalize("가나다라마바사아자차\n카"), "가나다라마바사아자차 카");
    }

    #[test]
    fn diagnostics_only_is_empty() {
        assert_eq!(normalize("Warning: nothing here\n\n   \n"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn single_line_is_returned_verbatim() {
        assert_eq!(normalize("  Hello World  "), "Hello World");
    }
}
