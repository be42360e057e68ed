//! Box decoding for YOLO-style single-class plate detectors.

use crate::frame::Region;

/// Candidate box in model-input coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl RawBox {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &RawBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Decode a `[4 + classes, predictions]` row-major output (`cx, cy, w, h`
/// rows, then one score row per class). The best class score is the box score.
pub fn decode_predictions(
    data: &[f32],
    rows: usize,
    predictions: usize,
    threshold: f32,
) -> Vec<RawBox> {
    if rows < 5 || data.len() < rows * predictions {
        return Vec::new();
    }
    let at = |row: usize, i: usize| data[row * predictions + i];
    (0..predictions)
        .filter_map(|i| {
            let score = (4..rows).map(|row| at(row, i)).fold(f32::MIN, f32::max);
            if !score.is_finite() || score < threshold {
                return None;
            }
            let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
            Some(RawBox {
                x1: cx - w / 2.0,
                y1: cy - h / 2.0,
                x2: cx + w / 2.0,
                y2: cy + h / 2.0,
                score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression. Output is ordered by descending score.
pub fn non_max_suppression(mut boxes: Vec<RawBox>, iou_threshold: f32, limit: usize) -> Vec<RawBox> {
    boxes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let mut keep: Vec<RawBox> = Vec::new();
    for candidate in boxes {
        if keep.len() >= limit {
            break;
        }
        if keep.iter().all(|kept| kept.iou(&candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Map a model-input box back to frame pixels.
pub fn to_region(raw: &RawBox, scale_x: f32, scale_y: f32) -> Region {
    Region::new(
        (raw.x1 * scale_x).floor() as i32,
        (raw.y1 * scale_y).floor() as i32,
        (raw.x2 * scale_x).ceil() as i32,
        (raw.y2 * scale_y).ceil() as i32,
        raw.score,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> RawBox {
        RawBox {
            x1,
            y1,
            x2,
            y2,
            score,
        }
    }

    #[test]
    fn decodes_centre_format_and_applies_threshold() {
        // 5 rows (cx, cy, w, h, score) x 3 predictions
        let data = [
            10.0, 50.0, 0.0, //
            10.0, 50.0, 0.0, //
            4.0, 20.0, 2.0, //
            2.0, 10.0, 2.0, //
            0.9, 0.3, 0.7, //
        ];
        let boxes = decode_predictions(&data, 5, 3, 0.5);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0], raw(8.0, 9.0, 12.0, 11.0, 0.9));
        assert_eq!(boxes[1].score, 0.7);
    }

    #[test]
    fn malformed_outputs_decode_to_nothing() {
        assert!(decode_predictions(&[1.0; 8], 4, 2, 0.1).is_empty());
        assert!(decode_predictions(&[1.0; 4], 5, 2, 0.1).is_empty());
    }

    #[test]
    fn suppression_keeps_best_of_overlapping_boxes() {
        let boxes = vec![
            raw(0.0, 0.0, 10.0, 10.0, 0.6),
            raw(1.0, 1.0, 10.0, 10.0, 0.8),
            raw(50.0, 50.0, 60.0, 60.0, 0.4),
        ];
        let kept = non_max_suppression(boxes, 0.5, 10);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.8);
        assert_eq!(kept[1].score, 0.4);
    }

    #[test]
    fn suppression_honours_limit() {
        let boxes = (0..5)
            .map(|i| raw(i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0, 0.5))
            .collect();
        assert_eq!(non_max_suppression(boxes, 0.5, 3).len(), 3);
    }

    #[test]
    fn scales_back_to_frame_pixels() {
        let region = to_region(&raw(10.0, 20.0, 30.5, 40.0, 0.7), 2.0, 0.5);
        assert_eq!(region, Region::new(20, 10, 61, 20, 0.7));
    }
}
