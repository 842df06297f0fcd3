use image::{DynamicImage, GrayImage};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::edges::canny;
use serde::Deserialize;
use tracing::debug;

use super::Region;
use super::geom::{pad_clamped, suppress_overlaps};
use super::preprocess::{close_rect, dark_foreground, to_luma};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrategy {
    /// Canny edge map.
    Edges,
    /// Inverted local-mean threshold.
    Threshold,
}

/// Acceptance rules for candidate text regions. Bands are exclusive on
/// both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub min_area: f64,
    pub max_area: f64,
    pub min_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub padding: u32,
    pub iou_threshold: f32,
    pub close_width: u32,
    pub close_height: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub threshold_radius: u32,
    pub strategies: Vec<DetectionStrategy>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_area: 100.0,
            max_area: 50_000.0,
            min_width: 15,
            min_height: 8,
            max_height: 100,
            padding: 5,
            iou_threshold: 0.3,
            close_width: 10,
            close_height: 2,
            canny_low: 50.0,
            canny_high: 150.0,
            threshold_radius: 5,
            strategies: vec![DetectionStrategy::Edges, DetectionStrategy::Threshold],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionDetector {
    config: DetectorConfig,
}

impl RegionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Candidate text regions in first-seen order. An empty result is a
    /// normal outcome; callers still recognize the whole image.
    pub fn detect(&self, image: &DynamicImage) -> Vec<Region> {
        let luma = to_luma(image);
        let (width, height) = luma.dimensions();
        if width < 3 || height < 3 {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for strategy in &self.config.strategies {
            let mask = self.foreground(&luma, *strategy);
            let closed = close_rect(&mask, self.config.close_width, self.config.close_height);
            let found = self.regions_from_mask(&closed, width, height);
            debug!("region detection: {:?} produced {} regions", strategy, found.len());
            candidates.extend(found);
        }

        let before = candidates.len();
        let regions = suppress_overlaps(candidates, self.config.iou_threshold);
        debug!(
            "region detection: kept {} of {} regions after overlap suppression",
            regions.len(),
            before
        );
        regions
    }

    fn foreground(&self, luma: &GrayImage, strategy: DetectionStrategy) -> GrayImage {
        match strategy {
            DetectionStrategy::Edges => {
                let low = self.config.canny_low.min(self.config.canny_high);
                let high = self.config.canny_low.max(self.config.canny_high);
                canny(luma, low, high)
            }
            DetectionStrategy::Threshold => dark_foreground(luma, self.config.threshold_radius),
        }
    }

    fn regions_from_mask(&self, mask: &GrayImage, width: u32, height: u32) -> Vec<Region> {
        find_contours::<u32>(mask)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .filter_map(|contour| {
                let bounds = bounding_box(&contour)?;
                let area = contour_area(&contour);
                if !self.accepts(area, &bounds) {
                    debug!(
                        "region detection: rejected area={:.0} size={}x{}",
                        area, bounds.w, bounds.h
                    );
                    return None;
                }
                Some(pad_clamped(&bounds, self.config.padding, width, height))
            })
            .collect()
    }

    pub(crate) fn accepts(&self, area: f64, bounds: &Region) -> bool {
        let config = &self.config;
        area > config.min_area
            && area < config.max_area
            && bounds.w > config.min_width
            && bounds.h > config.min_height
            && bounds.h < config.max_height
    }
}

fn bounding_box(contour: &Contour<u32>) -> Option<Region> {
    let first = contour.points.first()?;
    let (mut x1, mut y1, mut x2, mut y2) = (first.x, first.y, first.x, first.y);
    for point in &contour.points {
        x1 = x1.min(point.x);
        y1 = y1.min(point.y);
        x2 = x2.max(point.x);
        y2 = y2.max(point.y);
    }
    Some(Region::new(x1, y1, x2 - x1 + 1, y2 - y1 + 1))
}

// Shoelace formula over the traced border.
fn contour_area(contour: &Contour<u32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0f64;
    for (idx, point) in points.iter().enumerate() {
        let next = &points[(idx + 1) % points.len()];
        twice += point.x as f64 * next.y as f64 - next.x as f64 * point.y as f64;
    }
    twice.abs() / 2.0
}
