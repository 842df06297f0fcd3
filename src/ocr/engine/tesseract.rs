use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{EngineFailure, EngineFuture, RecognitionEngine, RecognitionOptions};

/// Engine locations resolved once at startup.
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    pub binary: PathBuf,
    pub tessdata: PathBuf,
    pub timeout: Duration,
}

impl TesseractConfig {
    /// Picks the first existing binary and data directory from the
    /// candidate lists.
    pub fn resolve(
        binary_candidates: &[PathBuf],
        tessdata_candidates: &[PathBuf],
        timeout: Duration,
    ) -> Result<Self> {
        let binary = first_existing(binary_candidates, Path::is_file).ok_or_else(|| {
            anyhow!(
                "tesseract binary not found (checked: {})",
                display_paths(binary_candidates)
            )
        })?;
        let tessdata = first_existing(tessdata_candidates, Path::is_dir).ok_or_else(|| {
            anyhow!(
                "tesseract language data not found (checked: {})",
                display_paths(tessdata_candidates)
            )
        })?;
        Ok(Self {
            binary,
            tessdata,
            timeout,
        })
    }
}

fn first_existing(candidates: &[PathBuf], check: fn(&Path) -> bool) -> Option<PathBuf> {
    candidates.iter().find(|path| check(path)).cloned()
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Languages with a `.traineddata` file in `tessdata`, sorted.
pub fn available_languages(tessdata: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(tessdata)
        .with_context(|| format!("failed to read language data: {}", tessdata.display()))?;
    let mut langs = Vec::new();
    for entry in entries {
        let path = entry.with_context(|| "failed to read language data entry")?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("traineddata") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|value| value.to_str()) {
            langs.push(stem.to_string());
        }
    }
    langs.sort();
    Ok(langs)
}

/// Keeps the requested languages that have data, in request order. Missing
/// secondary languages only warn; nothing available is an error.
pub fn normalize_languages(requested: &str, available: &[String]) -> Result<Vec<String>> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }

    let mut chosen: Vec<String> = Vec::new();
    let mut missing = Vec::new();
    for raw in trimmed.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() || chosen.iter().any(|value| value == lang) {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }
    Ok(chosen)
}

#[derive(Debug, Clone)]
pub struct Tesseract {
    config: Arc<TesseractConfig>,
}

impl Tesseract {
    pub fn new(config: TesseractConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &TesseractConfig {
        &self.config
    }
}

impl RecognitionEngine for Tesseract {
    fn run(&self, image: PathBuf, options: RecognitionOptions) -> EngineFuture {
        let config = self.config.clone();
        Box::pin(async move {
            let languages = options.language_arg();
            let mut command = Command::new(&config.binary);
            command
                .arg(&image)
                .arg("stdout")
                .arg("-l")
                .arg(&languages)
                .arg("--psm")
                .arg(options.layout.psm().to_string())
                .env("TESSDATA_PREFIX", &config.tessdata)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let started = Instant::now();
            // Dropping the pending output on timeout kills the child.
            let output = tokio::time::timeout(config.timeout, command.output())
                .await
                .map_err(|_| EngineFailure::Timeout(config.timeout))??;
            debug!(
                "tesseract psm={} lang={} finished in {:?}",
                options.layout.psm(),
                languages,
                started.elapsed()
            );

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if is_language_failure(&stderr) {
                    return Err(EngineFailure::LanguageUnavailable(languages));
                }
                return Err(EngineFailure::Exit {
                    status: output.status.to_string(),
                    stderr,
                });
            }
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        })
    }

    fn is_available(&self) -> bool {
        self.config.binary.is_file()
    }
}

fn is_language_failure(stderr: &str) -> bool {
    stderr.contains("Failed loading language") || stderr.contains("Error opening data file")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_picks_first_existing_candidates() {
        let dir = tempdir().expect("tempdir");
        let binary = dir.path().join("tesseract");
        std::fs::write(&binary, "").expect("write binary");
        let data = dir.path().join("tessdata");
        std::fs::create_dir(&data).expect("create data");

        let config = TesseractConfig::resolve(
            &[dir.path().join("missing"), binary.clone()],
            &[dir.path().join("nope"), data.clone()],
            Duration::from_secs(5),
        )
        .expect("resolve");
        assert_eq!(config.binary, binary);
        assert_eq!(config.tessdata, data);
    }

    #[test]
    fn resolve_fails_without_binary() {
        let dir = tempdir().expect("tempdir");
        let err = TesseractConfig::resolve(
            &[dir.path().join("missing")],
            &[dir.path().to_path_buf()],
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(err.to_string().contains("binary not found"));
    }

    #[test]
    fn languages_are_read_from_traineddata_files() {
        let dir = tempdir().expect("tempdir");
        for name in ["kor.traineddata", "eng.traineddata", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").expect("write");
        }
        let langs = available_languages(dir.path()).expect("languages");
        assert_eq!(langs, vec!["eng".to_string(), "kor".to_string()]);
    }

    #[test]
    fn missing_secondary_language_degrades_to_primary() {
        let available = vec!["kor".to_string(), "osd".to_string()];
        let chosen = normalize_languages("kor+eng", &available).expect("languages");
        assert_eq!(chosen, vec!["kor".to_string()]);
    }

    #[test]
    fn no_available_language_is_an_error() {
        let available = vec!["jpn".to_string()];
        assert!(normalize_languages("kor+eng", &available).is_err());
        assert!(normalize_languages("  ", &available).is_err());
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        path
    }

    fn engine_at(binary: PathBuf, tessdata: &Path, timeout: Duration) -> Tesseract {
        Tesseract::new(TesseractConfig {
            binary,
            tessdata: tessdata.to_path_buf(),
            timeout,
        })
    }

    // Scripts are all written before any is launched so no file is still
    // open for writing when a child is spawned.
    #[cfg(unix)]
    #[tokio::test]
    async fn subprocess_outcomes_are_classified() {
        let dir = tempdir().expect("tempdir");
        let stalls = script(dir.path(), "stalls", "sleep 5");
        let no_lang = script(
            dir.path(),
            "no_lang",
            "echo \"Failed loading language 'kor'\" >&2\nexit 1",
        );
        let crashes = script(dir.path(), "crashes", "echo \"Image too small\" >&2\nexit 3");
        let reads = script(
            dir.path(),
            "reads",
            "echo \"Estimating resolution as 300\" >&2\necho \"$1 $2 $3 $4 $5 $6\"",
        );
        let image = dir.path().join("region.png");
        std::fs::write(&image, b"png").expect("write image");
        let options = RecognitionOptions::new(
            crate::ocr::engine::LayoutMode::Word,
            vec!["kor".to_string(), "eng".to_string()],
        );

        let started = Instant::now();
        let result = engine_at(stalls, dir.path(), Duration::from_millis(300))
            .run(image.clone(), options.clone())
            .await;
        assert!(matches!(result, Err(EngineFailure::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(3));

        let result = engine_at(no_lang, dir.path(), Duration::from_secs(5))
            .run(image.clone(), options.clone())
            .await;
        assert!(matches!(
            result,
            Err(EngineFailure::LanguageUnavailable(ref langs)) if langs == "kor+eng"
        ));

        let result = engine_at(crashes, dir.path(), Duration::from_secs(5))
            .run(image.clone(), options.clone())
            .await;
        match result {
            Err(EngineFailure::Exit { stderr, .. }) => assert_eq!(stderr, "Image too small"),
            other => panic!("unexpected result: {:?}", other),
        }

        let text = engine_at(reads, dir.path(), Duration::from_secs(5))
            .run(image.clone(), options)
            .await
            .expect("recognition");
        assert_eq!(
            text.trim(),
            format!("{} stdout -l kor+eng --psm 8", image.display())
        );
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let dir = tempdir().expect("tempdir");
        let engine = engine_at(dir.path().join("absent"), dir.path(), Duration::from_secs(1));
        assert!(!engine.is_available());
    }

    #[test]
    fn language_failures_are_recognized() {
        assert!(is_language_failure(
            "Error opening data file /usr/share/tessdata/kor.traineddata"
        ));
        assert!(is_language_failure("Failed loading language 'kor'"));
        assert!(!is_language_failure("Image too small to scale!!"));
    }
}
