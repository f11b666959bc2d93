//! Normalization of raw detector responses and the derived, display-ready
//! views over them.
//!
//! The hosted model returns center-anchored boxes whose units depend on
//! whether the response carries source-image dimensions. Everything past this
//! module speaks exactly one dialect: top-left origin, unit-normalized,
//! clamped to the unit square.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One object hypothesis exactly as the detection service reports it.
///
/// `x`/`y` are **center** coordinates. The four spatial fields are optional
/// as a group in practice, but the wire format allows any subset to be
/// missing; anything less than all four means the detection carries no
/// usable spatial data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    #[serde(rename = "class")]
    pub class_label: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

/// Pixel dimensions of the image the detector reasoned over, when the
/// service chooses to report them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageDims {
    pub width: f64,
    pub height: f64,
}

/// Top-level response body of the detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    #[serde(default)]
    pub predictions: Vec<RawPrediction>,
    /// Model-side inference time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageDims>,
}

/// Unit the raw spatial fields are expressed in, decided exactly once per
/// response. Downstream code never re-inspects the dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateSpace {
    /// Spatial fields are pixels of a `width` x `height` source image.
    Pixel { width: f64, height: f64 },
    /// Spatial fields are already fractions of the unit square.
    Normalized,
}

impl CoordinateSpace {
    /// Dimensions count only when both are positive and finite; anything
    /// else (absent, zeroed, or garbage) means the coordinates are trusted
    /// as pre-normalized.
    #[must_use]
    pub fn resolve(dims: Option<&ImageDims>) -> Self {
        match dims {
            Some(d)
                if d.width.is_finite()
                    && d.height.is_finite()
                    && d.width > 0.0
                    && d.height > 0.0 =>
            {
                Self::Pixel {
                    width: d.width,
                    height: d.height,
                }
            }
            _ => Self::Normalized,
        }
    }
}

/// Axis-aligned rectangle in unit-square coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Builds a box that is guaranteed renderable: `0 <= x,y <= 1`,
    /// `x + width <= 1`, `y + height <= 1`. Out-of-range input is clamped,
    /// never rejected.
    #[must_use]
    pub fn clamped(x: f64, y: f64, width: f64, height: f64) -> Self {
        let x = x.clamp(0.0, 1.0);
        let y = y.clamp(0.0, 1.0);
        Self {
            x,
            y,
            width: width.clamp(0.0, 1.0 - x),
            height: height.clamp(0.0, 1.0 - y),
        }
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A normalized detection. `bbox` is absent when the source carried no
/// spatial data (classification-only hypotheses) or when the reported values
/// were malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    #[must_use]
    pub fn has_bbox(&self) -> bool {
        self.bbox.is_some()
    }
}

/// Converts a raw response body into the uniform detection list.
///
/// Per-item degradation: a prediction with missing or non-finite spatial
/// fields yields `bbox: None` and the rest of the list is unaffected. Labels
/// and confidences are copied verbatim.
#[must_use]
pub fn normalize(predictions: &[RawPrediction], space: CoordinateSpace) -> Vec<Detection> {
    predictions
        .iter()
        .map(|prediction| Detection {
            class_label: prediction.class_label.clone(),
            confidence: prediction.confidence,
            bbox: normalize_bbox(prediction, space),
        })
        .collect()
}

/// Convenience over [`normalize`] that resolves the coordinate space from the
/// response itself.
#[must_use]
pub fn normalize_response(response: &DetectionResponse) -> Vec<Detection> {
    let space = CoordinateSpace::resolve(response.image.as_ref());
    normalize(&response.predictions, space)
}

fn normalize_bbox(prediction: &RawPrediction, space: CoordinateSpace) -> Option<BoundingBox> {
    let (Some(cx), Some(cy), Some(w), Some(h)) = (
        prediction.x,
        prediction.y,
        prediction.width,
        prediction.height,
    ) else {
        debug!(
            class = %prediction.class_label,
            "prediction carries no spatial data, skipping overlay"
        );
        return None;
    };

    if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
        warn!(
            class = %prediction.class_label,
            cx, cy, w, h,
            "non-finite bounding box in detector response, dropping overlay"
        );
        return None;
    }

    let (cx, cy, w, h) = match space {
        CoordinateSpace::Pixel { width, height } => (cx / width, cy / height, w / width, h / height),
        CoordinateSpace::Normalized => (cx, cy, w, h),
    };

    // The detector contract is center-anchored; display wants top-left.
    let x = cx - w / 2.0;
    let y = cy - h / 2.0;

    if !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite()) {
        warn!(
            class = %prediction.class_label,
            "bounding box became non-finite during normalization, dropping overlay"
        );
        return None;
    }

    Some(BoundingBox::clamped(x, y, w, h))
}

/// Per-class tallies in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts(Vec<(String, usize)>);

impl ClassCounts {
    fn increment(&mut self, label: &str) {
        if let Some(entry) = self.0.iter_mut().find(|(l, _)| l == label) {
            entry.1 += 1;
        } else {
            self.0.push((label.to_string(), 1));
        }
    }

    #[must_use]
    pub fn get(&self, label: &str) -> usize {
        self.0
            .iter()
            .find(|(l, _)| l == label)
            .map_or(0, |(_, n)| *n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(label, count)| (label.as_str(), *count))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.0.iter().map(|(_, n)| n).sum()
    }
}

/// Result of one filtering pass: the surviving detections in their original
/// order plus the aggregate counts the summary UI feeds on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub filtered: Vec<Detection>,
    pub class_counts: ClassCounts,
    pub total: usize,
}

/// Coerces a threshold into the `[0, 1]` contract domain. NaN maps to 0.0 so
/// a garbage slider value can never hide detections.
#[must_use]
pub fn clamp_threshold(threshold: f64) -> f64 {
    if threshold.is_nan() {
        0.0
    } else {
        threshold.clamp(0.0, 1.0)
    }
}

/// Stable confidence filter plus per-class aggregation.
///
/// Pure and deterministic; callers recompute it on every threshold change
/// instead of caching.
#[must_use]
pub fn filter_and_count(detections: &[Detection], threshold: f64) -> FilterSummary {
    let threshold = clamp_threshold(threshold);

    let mut filtered = Vec::with_capacity(detections.len());
    let mut class_counts = ClassCounts::default();

    for detection in detections {
        if detection.confidence >= threshold {
            class_counts.increment(&detection.class_label);
            filtered.push(detection.clone());
        }
    }

    let total = filtered.len();
    FilterSummary {
        filtered,
        class_counts,
        total,
    }
}

/// Redraws a box at `factor` of its size around the same center point.
///
/// Factors outside `(0, 1]` (including non-finite ones) are coerced to 1.0;
/// the result is clamped so it never leaves the unit square.
#[must_use]
pub fn shrink_to_center(bbox: &BoundingBox, factor: f64) -> BoundingBox {
    let factor = coerce_shrink_factor(factor);

    let width = bbox.width * factor;
    let height = bbox.height * factor;
    let x = bbox.x + (bbox.width - width) / 2.0;
    let y = bbox.y + (bbox.height - height) / 2.0;

    BoundingBox::clamped(x, y, width, height)
}

#[must_use]
pub fn coerce_shrink_factor(factor: f64) -> f64 {
    if factor.is_finite() && factor > 0.0 {
        factor.min(1.0)
    } else {
        1.0
    }
}
