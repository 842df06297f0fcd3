use super::Region;

pub(super) fn iou(a: &Region, b: &Region) -> f32 {
    let ix1 = a.x.max(b.x);
    let iy1 = a.y.max(b.y);
    let ix2 = a.right().min(b.right());
    let iy2 = a.bottom().min(b.bottom());

    if ix2 <= ix1 || iy2 <= iy1 {
        return 0.0;
    }
    let inter = (ix2 - ix1) as f32 * (iy2 - iy1) as f32;
    let area_a = a.area() as f32;
    let area_b = b.area() as f32;
    inter / (area_a + area_b - inter).max(1.0)
}

/// Grows `region` by `padding` on every side without leaving the image.
pub(super) fn pad_clamped(region: &Region, padding: u32, width: u32, height: u32) -> Region {
    let x1 = region.x.saturating_sub(padding);
    let y1 = region.y.saturating_sub(padding);
    let x2 = region.right().saturating_add(padding).min(width);
    let y2 = region.bottom().saturating_add(padding).min(height);
    Region {
        x: x1,
        y: y1,
        w: x2.saturating_sub(x1),
        h: y2.saturating_sub(y1),
    }
}

/// Keeps the first of any group of regions overlapping by more than `threshold`.
pub(super) fn suppress_overlaps(regions: Vec<Region>, threshold: f32) -> Vec<Region> {
    let mut kept: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        if kept
            .iter()
            .any(|existing| iou(existing, &region) > threshold)
        {
            continue;
        }
        kept.push(region);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_regions_is_one() {
        let a = Region::new(10, 10, 20, 10);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_regions_is_zero() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(10, 0, 10, 10);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(5, 0, 10, 10);
        let value = iou(&a, &b);
        assert!((value - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn padding_is_clamped_to_image() {
        let padded = pad_clamped(&Region::new(2, 3, 10, 10), 5, 14, 100);
        assert_eq!(padded, Region::new(0, 0, 14, 18));
    }

    #[test]
    fn overlapping_regions_keep_first_seen() {
        let first = Region::new(0, 0, 40, 10);
        let second = Region::new(2, 0, 40, 10);
        let far = Region::new(100, 100, 40, 10);
        let kept = suppress_overlaps(vec![first, second, far], 0.3);
        assert_eq!(kept, vec![first, far]);
    }
}
