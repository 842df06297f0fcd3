use futures_util::stream::{self, StreamExt};
use image::DynamicImage;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::detect::{DetectorConfig, RegionDetector};
use super::engine::{LayoutMode, RecognitionEngine};
use super::filter::{FilterConfig, NoiseFilter, dedupe};
use super::preprocess::prepare_region;
use super::recognize::RecognitionAdapter;
use super::text::{NormalizerConfig, TextNormalizer};
use super::{Region, TextElement};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub normalizer: NormalizerConfig,
    pub filter: FilterConfig,
    pub full_image_ladder: Vec<LayoutMode>,
    pub region_ladder: Vec<LayoutMode>,
    /// Upscale factor applied to region crops before recognition.
    pub region_scale: u32,
    /// Engine invocations in flight per request.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            normalizer: NormalizerConfig::default(),
            filter: FilterConfig::default(),
            full_image_ladder: vec![LayoutMode::Auto, LayoutMode::Block],
            region_ladder: vec![LayoutMode::Word, LayoutMode::Line],
            region_scale: 2,
            concurrency: 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has no pixels")]
    EmptyImage,
    #[error("image analysis task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub width: u32,
    pub height: u32,
    pub elements: Vec<TextElement>,
}

struct Job {
    origin: (u32, u32),
    image: DynamicImage,
    ladder: Vec<LayoutMode>,
}

/// Image bytes in, consolidated text elements out. Holds no per-request
/// state, so one instance serves concurrent requests.
pub struct Pipeline<E: RecognitionEngine> {
    adapter: RecognitionAdapter<E>,
    detector: RegionDetector,
    normalizer: TextNormalizer,
    filter: NoiseFilter,
    config: PipelineConfig,
}

impl<E: RecognitionEngine> Pipeline<E> {
    pub fn new(engine: Arc<E>, languages: Vec<String>, config: PipelineConfig) -> Self {
        Self {
            adapter: RecognitionAdapter::new(engine, languages),
            detector: RegionDetector::new(config.detector.clone()),
            normalizer: TextNormalizer::new(config.normalizer.clone()),
            filter: NoiseFilter::new(config.filter.clone()),
            config,
        }
    }

    pub fn is_available(&self) -> bool {
        self.adapter.engine().is_available()
    }

    pub async fn extract(&self, image_bytes: Vec<u8>) -> Result<Extraction, PipelineError> {
        let started = Instant::now();
        let detector = self.detector.clone();
        let scale = self.config.region_scale;
        let radius = self.config.detector.threshold_radius;

        let (image, crops) = tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&image_bytes)?;
            if image.width() == 0 || image.height() == 0 {
                return Err(PipelineError::EmptyImage);
            }
            let crops = detector
                .detect(&image)
                .into_iter()
                .map(|region| {
                    let crop = prepare_region(&image, &region, scale, radius);
                    (region, crop)
                })
                .collect::<Vec<_>>();
            Ok((image, crops))
        })
        .await??;

        let (width, height) = (image.width(), image.height());
        let region_count = crops.len();
        let elements = self.consolidate(image, crops).await;
        info!(
            "extraction: {}x{} image, {} regions, {} elements in {:?}",
            width,
            height,
            region_count,
            elements.len(),
            started.elapsed()
        );
        Ok(Extraction {
            width,
            height,
            elements,
        })
    }

    async fn consolidate(
        &self,
        image: DynamicImage,
        crops: Vec<(Region, DynamicImage)>,
    ) -> Vec<TextElement> {
        let whole = Job {
            origin: Region::whole(image.width(), image.height()).centroid(),
            image,
            ladder: self.config.full_image_ladder.clone(),
        };
        let jobs = std::iter::once(whole).chain(crops.into_iter().map(|(region, crop)| Job {
            origin: region.centroid(),
            image: crop,
            ladder: self.config.region_ladder.clone(),
        }));

        let adapter = self.adapter.clone();
        let recognized = stream::iter(jobs)
            .map(move |job| {
                let adapter = adapter.clone();
                async move {
                    let raw = adapter.recognize_image(&job.image, &job.ladder).await;
                    (job.origin, raw)
                }
            })
            .buffered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut elements = Vec::new();
        for ((x, y), raw) in recognized {
            let text = self.normalizer.normalize(&raw);
            if text.is_empty() {
                continue;
            }
            if !self.filter.is_valid(&text) {
                debug!("extraction: dropped '{}' at ({}, {})", text, x, y);
                continue;
            }
            elements.push(TextElement::new(text, x, y));
        }
        self.filter.keep(dedupe(elements))
    }
}
