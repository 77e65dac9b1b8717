use photomesh_image::Image;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Bresenham circle of radius 3 as `(dx, dy)` offsets, clockwise from the top.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// A FAST corner with its score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FastCorner {
    /// Column of the corner.
    pub x: usize,
    /// Row of the corner.
    pub y: usize,
    /// Sum of absolute differences over the best contiguous arc, minus the threshold per pixel.
    pub score: f32,
}

// Ordering used by the NMS heap: highest score first, then top-left first.
#[derive(Clone, Copy, PartialEq)]
struct HeapCorner(FastCorner);

impl Eq for HeapCorner {}

impl Ord for HeapCorner {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then_with(|| other.0.y.cmp(&self.0.y))
            .then_with(|| other.0.x.cmp(&self.0.x))
    }
}

impl PartialOrd for HeapCorner {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Segment test and score for the pixel at `(x, y)`.
///
/// PRECONDITION: the pixel is at least 3 pixels away from every border.
fn fast_corner_score(
    src: &[f32],
    cols: usize,
    x: usize,
    y: usize,
    threshold: f32,
    arc_length: usize,
) -> Option<f32> {
    let center = src[y * cols + x];
    let lower = center - threshold;
    let upper = center + threshold;

    let pixel = |i: usize| {
        let (dx, dy) = CIRCLE[i];
        src[(y as i32 + dy) as usize * cols + (x as i32 + dx) as usize]
    };

    // any arc of `arc_length` consecutive pixels covers at least `arc_length / 4` compass points
    let compass = [pixel(0), pixel(4), pixel(8), pixel(12)];
    let min_compass = arc_length / 4;
    let n_bright = compass.iter().filter(|&&p| p > upper).count();
    let n_dark = compass.iter().filter(|&&p| p < lower).count();
    if n_bright < min_compass && n_dark < min_compass {
        return None;
    }

    let mut pixels = [0f32; 16];
    let mut bright_mask = 0u32;
    let mut dark_mask = 0u32;
    for (i, p) in pixels.iter_mut().enumerate() {
        *p = pixel(i);
        if *p > upper {
            bright_mask |= 1 << i;
        } else if *p < lower {
            dark_mask |= 1 << i;
        }
    }

    // duplicate the 16 bits so that arcs may wrap around
    let bright_mask = bright_mask | (bright_mask << 16);
    let dark_mask = dark_mask | (dark_mask << 16);
    let window = (1u32 << arc_length) - 1;

    let mut best: Option<f32> = None;
    for shift in 0..16 {
        let is_arc = (bright_mask >> shift) & window == window
            || (dark_mask >> shift) & window == window;
        if !is_arc {
            continue;
        }

        let score = (shift..shift + arc_length)
            .map(|i| (pixels[i % 16] - center).abs() - threshold)
            .sum::<f32>();

        best = Some(best.map_or(score, |b: f32| b.max(score)));
    }

    best
}

/// Detect FAST corners with non-maximum suppression.
///
/// # Arguments
///
/// * `src` - The source intensity image.
/// * `threshold` - Minimum absolute intensity difference between the centre and the arc pixels.
/// * `arc_length` - Number of contiguous circle pixels that must all be brighter or darker.
/// * `border` - Pixels closer than this to any image border are not tested (at least 3).
/// * `nms` - Suppress corners that have a stronger corner in their 3x3 neighbourhood.
///
/// # Returns
///
/// The detected corners sorted by decreasing score.
pub fn fast_feature_detector(
    src: &Image<f32, 1>,
    threshold: f32,
    arc_length: usize,
    border: usize,
    nms: bool,
) -> Vec<FastCorner> {
    let (cols, rows) = (src.width(), src.height());
    let border = border.max(3);
    let arc_length = arc_length.clamp(1, 16);

    if rows <= 2 * border || cols <= 2 * border {
        return Vec::new();
    }

    let data = src.as_slice();

    let corners: Vec<FastCorner> = (border..rows - border)
        .into_par_iter()
        .flat_map_iter(|y| {
            (border..cols - border).filter_map(move |x| {
                fast_corner_score(data, cols, x, y, threshold, arc_length)
                    .map(|score| FastCorner { x, y, score })
            })
        })
        .collect();

    let mut heap: BinaryHeap<HeapCorner> = corners.into_iter().map(HeapCorner).collect();

    if !nms {
        return heap.into_sorted_vec().into_iter().rev().map(|c| c.0).collect();
    }

    let mut suppressed = vec![false; rows * cols];
    let mut kept = Vec::new();
    while let Some(HeapCorner(corner)) = heap.pop() {
        let idx = corner.y * cols + corner.x;
        if suppressed[idx] {
            continue;
        }

        kept.push(corner);

        for ny in corner.y - 1..=corner.y + 1 {
            for nx in corner.x - 1..=corner.x + 1 {
                suppressed[ny * cols + nx] = true;
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use photomesh_image::ImageError;

    fn image_from(data: Vec<u8>) -> Result<Image<f32, 1>, ImageError> {
        Image::new([7, 7].into(), data.into_iter().map(|v| v as f32).collect())
    }

    #[test]
    fn test_fast_feature_detector_blob() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let img = image_from(vec![
            50,  50,  50,  50,  50,  50,  50,
            50,  50,  50,  50,  50,  50,  50,
            50,  50, 200, 200, 200,  50,  50,
            50,  50, 200, 200, 200,  50,  50,
            50,  50, 200, 200, 200,  50,  50,
            50,  50,  50,  50,  50,  50,  50,
            50,  50,  50,  50,  50,  50,  50,
        ])?;
        let corners = fast_feature_detector(&img, 100.0, 9, 3, true);
        assert_eq!(corners.len(), 1);
        assert_eq!((corners[0].x, corners[0].y), (3, 3));
        assert!(corners[0].score > 0.0);
        Ok(())
    }

    #[test]
    fn test_fast_feature_detector_up() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let img = image_from(vec![
             50,  50,  50,  50,  50,  50,  50,
             50,  50,  50,  50,  50,  50,  50,
             50,  50,  50,  50,  50,  50,  50,
             50,  50,  50, 200,  50,  50,  50,
            200, 200, 200, 200, 200, 200, 200,
            200, 200, 200, 200, 200, 200, 200,
            200, 200, 200, 200, 200, 200, 200,
        ])?;
        let corners = fast_feature_detector(&img, 100.0, 9, 3, true);
        assert_eq!(corners.len(), 1);
        assert_eq!((corners[0].x, corners[0].y), (3, 3));
        Ok(())
    }

    #[test]
    fn test_fast_feature_detector_flat() -> Result<(), ImageError> {
        let img = Image::<f32, 1>::from_size_val([16, 16].into(), 128.0)?;
        assert!(fast_feature_detector(&img, 10.0, 9, 3, true).is_empty());
        Ok(())
    }

    #[test]
    fn test_fast_nms_keeps_strongest() -> Result<(), ImageError> {
        // a bright square produces corner responses around each of its corners
        let size = 32;
        let mut img = Image::<f32, 1>::from_size_val([size, size].into(), 20.0)?;
        for y in 10..22 {
            for x in 10..22 {
                img.set_pixel(x, y, 0, 220.0)?;
            }
        }

        let all = fast_feature_detector(&img, 40.0, 9, 3, false);
        let kept = fast_feature_detector(&img, 40.0, 9, 3, true);

        assert!(!kept.is_empty());
        assert!(kept.len() <= all.len());
        for w in kept.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
        for (i, a) in kept.iter().enumerate() {
            for b in kept.iter().skip(i + 1) {
                assert!(a.x.abs_diff(b.x) > 1 || a.y.abs_diff(b.y) > 1);
            }
        }

        Ok(())
    }
}
