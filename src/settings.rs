use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ocr::engine::LayoutMode;
use crate::ocr::{DetectionStrategy, DetectorConfig, FilterConfig, NormalizerConfig, PipelineConfig};
use crate::providers::CompletionOptions;
use crate::semantic::ReconcileConfig;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub max_upload_bytes: usize,
    pub binary_candidates: Vec<PathBuf>,
    pub tessdata_candidates: Vec<PathBuf>,
    pub languages: String,
    pub engine_timeout: Duration,
    pub full_image_layouts: Vec<LayoutMode>,
    pub region_layouts: Vec<LayoutMode>,
    /// Engine invocations in flight per request; 0 means one per CPU.
    pub concurrency: usize,
    pub detector: DetectorConfig,
    pub short_line_max: usize,
    pub max_chars: usize,
    pub reconcile: ReconcileConfig,
    pub llm_model: Option<String>,
    pub llm_temperature: f64,
    pub llm_max_tokens: u32,
    pub llm_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8000,
            max_upload_bytes: 20 * 1024 * 1024,
            binary_candidates: Vec::new(),
            tessdata_candidates: Vec::new(),
            languages: "kor+eng".to_string(),
            engine_timeout: Duration::from_secs(15),
            full_image_layouts: vec![LayoutMode::Auto, LayoutMode::Block],
            region_layouts: vec![LayoutMode::Word, LayoutMode::Line],
            concurrency: 0,
            detector: DetectorConfig::default(),
            short_line_max: 10,
            max_chars: 200,
            reconcile: ReconcileConfig::default(),
            llm_model: None,
            llm_temperature: 0.1,
            llm_max_tokens: 150,
            llm_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    server: Option<ServerSettings>,
    engine: Option<EngineSettings>,
    detector: Option<DetectorSettings>,
    text: Option<TextSettings>,
    reconcile: Option<ReconcileSettings>,
    llm: Option<LlmSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    port: Option<u16>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct EngineSettings {
    binary_candidates: Option<Vec<String>>,
    tessdata_candidates: Option<Vec<String>>,
    languages: Option<String>,
    timeout_secs: Option<u64>,
    full_image_layouts: Option<Vec<LayoutMode>>,
    region_layouts: Option<Vec<LayoutMode>>,
    concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectorSettings {
    min_area: Option<f64>,
    max_area: Option<f64>,
    min_width: Option<u32>,
    min_height: Option<u32>,
    max_height: Option<u32>,
    padding: Option<u32>,
    iou_threshold: Option<f32>,
    close_width: Option<u32>,
    close_height: Option<u32>,
    canny_low: Option<f32>,
    canny_high: Option<f32>,
    threshold_radius: Option<u32>,
    strategies: Option<Vec<DetectionStrategy>>,
}

#[derive(Debug, Default, Deserialize)]
struct TextSettings {
    short_line_max: Option<usize>,
    max_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconcileSettings {
    match_threshold: Option<f64>,
    word_similarity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmSettings {
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

/// Embedded defaults, then `./settings.toml`, `./settings.local.toml` and
/// `extra_path`, then environment overrides.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults);

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}

impl Settings {
    fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(server) = incoming.server {
            if let Some(port) = server.port
                && port > 0
            {
                self.port = port;
            }
            if let Some(limit) = server.max_upload_bytes
                && limit > 0
            {
                self.max_upload_bytes = limit;
            }
        }
        if let Some(engine) = incoming.engine {
            if let Some(candidates) = engine.binary_candidates {
                self.binary_candidates = to_paths(candidates);
            }
            if let Some(candidates) = engine.tessdata_candidates {
                self.tessdata_candidates = to_paths(candidates);
            }
            if let Some(languages) = engine.languages
                && !languages.trim().is_empty()
            {
                self.languages = languages.trim().to_string();
            }
            if let Some(secs) = engine.timeout_secs
                && secs > 0
            {
                self.engine_timeout = Duration::from_secs(secs);
            }
            if let Some(layouts) = engine.full_image_layouts
                && !layouts.is_empty()
            {
                self.full_image_layouts = layouts;
            }
            if let Some(layouts) = engine.region_layouts
                && !layouts.is_empty()
            {
                self.region_layouts = layouts;
            }
            if let Some(concurrency) = engine.concurrency {
                self.concurrency = concurrency;
            }
        }
        if let Some(detector) = incoming.detector {
            self.detector.merge(detector);
        }
        if let Some(text) = incoming.text {
            if let Some(max) = text.short_line_max
                && max > 0
            {
                self.short_line_max = max;
            }
            if let Some(max) = text.max_chars
                && max > 0
            {
                self.max_chars = max;
            }
        }
        if let Some(reconcile) = incoming.reconcile {
            if let Some(threshold) = reconcile.match_threshold
                && threshold > 0.0
            {
                self.reconcile.match_threshold = threshold;
            }
            if let Some(similarity) = reconcile.word_similarity
                && similarity > 0.0
            {
                self.reconcile.word_similarity = similarity;
            }
        }
        if let Some(llm) = incoming.llm {
            if let Some(model) = llm.model {
                let model = model.trim();
                self.llm_model = if model.is_empty() {
                    None
                } else {
                    Some(model.to_string())
                };
            }
            if let Some(temperature) = llm.temperature
                && temperature >= 0.0
            {
                self.llm_temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens
                && max_tokens > 0
            {
                self.llm_max_tokens = max_tokens;
            }
            if let Some(secs) = llm.timeout_secs
                && secs > 0
            {
                self.llm_timeout = Duration::from_secs(secs);
            }
        }
    }

    /// `PORT` replaces the port; `TESSERACT_PATH` and `TESSDATA_PREFIX`
    /// are tried ahead of the configured candidates.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(port) = get("PORT").and_then(|value| value.trim().parse::<u16>().ok())
            && port > 0
        {
            self.port = port;
        }
        if let Some(binary) = get("TESSERACT_PATH") {
            self.binary_candidates.insert(0, PathBuf::from(binary.trim()));
        }
        if let Some(prefix) = get("TESSDATA_PREFIX") {
            let prefix = PathBuf::from(prefix.trim());
            self.tessdata_candidates.insert(0, prefix.join("tessdata"));
            self.tessdata_candidates.insert(0, prefix);
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let concurrency = if self.concurrency == 0 {
            num_cpus::get()
        } else {
            self.concurrency
        };
        PipelineConfig {
            detector: self.detector.clone(),
            normalizer: NormalizerConfig {
                short_line_max: self.short_line_max,
            },
            filter: FilterConfig {
                max_chars: self.max_chars,
                ..FilterConfig::default()
            },
            full_image_ladder: self.full_image_layouts.clone(),
            region_ladder: self.region_layouts.clone(),
            concurrency: concurrency.max(1),
            ..PipelineConfig::default()
        }
    }

    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
            timeout: self.llm_timeout,
        }
    }
}

impl DetectorConfig {
    fn merge(&mut self, incoming: DetectorSettings) {
        if let Some(value) = incoming.min_area
            && value >= 0.0
        {
            self.min_area = value;
        }
        if let Some(value) = incoming.max_area
            && value > 0.0
        {
            self.max_area = value;
        }
        if let Some(value) = incoming.min_width {
            self.min_width = value;
        }
        if let Some(value) = incoming.min_height {
            self.min_height = value;
        }
        if let Some(value) = incoming.max_height
            && value > 0
        {
            self.max_height = value;
        }
        if let Some(value) = incoming.padding {
            self.padding = value;
        }
        if let Some(value) = incoming.iou_threshold
            && value > 0.0
        {
            self.iou_threshold = value;
        }
        if let Some(value) = incoming.close_width
            && value > 0
        {
            self.close_width = value;
        }
        if let Some(value) = incoming.close_height
            && value > 0
        {
            self.close_height = value;
        }
        if let Some(value) = incoming.canny_low
            && value > 0.0
        {
            self.canny_low = value;
        }
        if let Some(value) = incoming.canny_high
            && value > 0.0
        {
            self.canny_high = value;
        }
        if let Some(value) = incoming.threshold_radius
            && value > 0
        {
            self.threshold_radius = value;
        }
        if let Some(strategies) = incoming.strategies
            && !strategies.is_empty()
        {
            self.strategies = strategies;
        }
    }
}

fn to_paths(values: Vec<String>) -> Vec<PathBuf> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Settings {
        let mut settings = Settings::default();
        settings.merge_str(DEFAULT_SETTINGS_TOML).expect("defaults parse");
        settings
    }

    #[test]
    fn embedded_defaults_match_reference_tuning() {
        let settings = defaults();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.languages, "kor+eng");
        assert_eq!(settings.engine_timeout, Duration::from_secs(15));
        assert_eq!(settings.region_layouts, vec![LayoutMode::Word, LayoutMode::Line]);
        assert_eq!(settings.detector, DetectorConfig::default());
        assert_eq!(settings.reconcile, ReconcileConfig::default());
        assert_eq!(settings.llm_model, None);
        assert_eq!(
            settings.binary_candidates.first(),
            Some(&PathBuf::from("/usr/bin/tesseract"))
        );
    }

    #[test]
    fn later_layers_override_field_by_field() {
        let mut settings = defaults();
        settings
            .merge_str(
                r#"
                [detector]
                min_area = 250.0
                strategies = ["threshold"]

                [llm]
                model = "gemini"
                max_tokens = 0
                "#,
            )
            .unwrap();
        assert_eq!(settings.detector.min_area, 250.0);
        assert_eq!(settings.detector.max_area, 50_000.0);
        assert_eq!(settings.detector.strategies, vec![DetectionStrategy::Threshold]);
        assert_eq!(settings.llm_model.as_deref(), Some("gemini"));
        assert_eq!(settings.llm_max_tokens, 150);
    }

    #[test]
    fn unknown_layout_is_a_parse_error() {
        let mut settings = defaults();
        assert!(
            settings
                .merge_str("[engine]\nregion_layouts = [\"diagonal\"]\n")
                .is_err()
        );
    }

    #[test]
    fn environment_takes_precedence() {
        let mut settings = defaults();
        settings.apply_env(|key| match key {
            "PORT" => Some("9100".to_string()),
            "TESSERACT_PATH" => Some("/opt/ocr/bin/tesseract".to_string()),
            "TESSDATA_PREFIX" => Some("/opt/ocr/share".to_string()),
            _ => None,
        });
        assert_eq!(settings.port, 9100);
        assert_eq!(settings.binary_candidates[0], PathBuf::from("/opt/ocr/bin/tesseract"));
        assert_eq!(settings.tessdata_candidates[0], PathBuf::from("/opt/ocr/share"));
        assert_eq!(
            settings.tessdata_candidates[1],
            PathBuf::from("/opt/ocr/share/tessdata")
        );
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut settings = defaults();
        settings.apply_env(|key| (key == "PORT").then(|| "http".to_string()));
        assert_eq!(settings.port, 8000);
    }

    #[test]
    fn pipeline_config_resolves_concurrency() {
        let mut settings = defaults();
        assert!(settings.pipeline_config().concurrency >= 1);
        settings.concurrency = 3;
        settings.max_chars = 80;
        let config = settings.pipeline_config();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.filter.max_chars, 80);
        assert_eq!(config.full_image_ladder, vec![LayoutMode::Auto, LayoutMode::Block]);
    }

    #[test]
    fn missing_extra_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(load_settings(Some(&missing)).is_err());
    }
}
