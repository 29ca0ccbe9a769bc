use crate::labels::{Emotion, Gender, Race};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;

/// Axis-aligned rectangle in the pixel space of the buffer it was detected in.
///
/// Detectors only emit regions with a non-negative origin and positive extent;
/// the signed representation exists so that degenerate input can be reported
/// instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge, widened so that it cannot overflow.
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge, widened so that it cannot overflow.
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// True when the region has zero or negative extent.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Offset that maps coordinates inside this region to its parent space.
    pub fn offset(&self) -> Offset {
        Offset { dx: self.x, dy: self.y }
    }

    /// Whether `(x, y)` lies inside the region, edges included.
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x as i64 <= self.right() && y >= self.y && y as i64 <= self.bottom()
    }

    pub fn area(&self) -> i64 {
        if self.is_degenerate() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Signed translation between a child and its parent coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

impl Neg for Offset {
    type Output = Offset;

    fn neg(self) -> Offset {
        Offset {
            dx: -self.dx,
            dy: -self.dy,
        }
    }
}

// --- Detection defaults (frontal faces / eyes inside a face crop) ---
const FACE_SCALE_FACTOR: f32 = 1.1;
const FACE_MIN_NEIGHBORS: u32 = 5;
const FACE_MIN_SIZE: (u32, u32) = (30, 30);
const EYE_SCALE_FACTOR: f32 = 1.1;
const EYE_MIN_NEIGHBORS: u32 = 5;
const EYE_MIN_SIZE: (u32, u32) = (10, 10);

/// Sensitivity/specificity controls for a multi-scale detector run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionParameters {
    /// Pyramid step between scales, at least [`Self::MIN_SCALE_FACTOR`].
    pub scale_factor: f32,
    /// Minimum number of agreeing raw windows for a candidate to survive.
    pub min_neighbors: u32,
    /// Smallest accepted (width, height).
    pub min_size: (u32, u32),
}

impl DetectionParameters {
    /// Smallest accepted pyramid step. Steps closer to 1.0 multiply the
    /// number of pyramid levels without finding anything new.
    pub const MIN_SCALE_FACTOR: f32 = 1.01;

    /// Fixed parameters for eye detection inside a cropped face.
    pub const EYES: DetectionParameters = DetectionParameters {
        scale_factor: EYE_SCALE_FACTOR,
        min_neighbors: EYE_MIN_NEIGHBORS,
        min_size: EYE_MIN_SIZE,
    };

    pub fn with_min_neighbors(mut self, min_neighbors: u32) -> Self {
        self.min_neighbors = min_neighbors;
        self
    }

    pub fn with_scale_factor(mut self, scale_factor: f32) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_min_size(mut self, width: u32, height: u32) -> Self {
        self.min_size = (width, height);
        self
    }

    /// Whether a region meets the minimum size.
    pub fn accepts(&self, region: &Region) -> bool {
        !region.is_degenerate()
            && region.width as u32 >= self.min_size.0
            && region.height as u32 >= self.min_size.1
    }
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            scale_factor: FACE_SCALE_FACTOR,
            min_neighbors: FACE_MIN_NEIGHBORS,
            min_size: FACE_MIN_SIZE,
        }
    }
}

/// A detected face with its eyes, all in the parent buffer's coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub region: Region,
    pub eyes: Vec<Region>,
}

/// A categorical label with its confidence, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scored<T> {
    pub label: T,
    pub confidence: f32,
}

impl<T> Scored<T> {
    pub fn new(label: T, confidence: f32) -> Self {
        Self { label, confidence }
    }
}

/// An attribute the inference capability can estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Age,
    Gender,
    Race,
    Emotion,
}

impl Feature {
    /// Every feature, in the order requested by a full analysis.
    pub const ALL: [Feature; 4] = [Feature::Age, Feature::Gender, Feature::Race, Feature::Emotion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Age => "age",
            Feature::Gender => "gender",
            Feature::Race => "race",
            Feature::Emotion => "emotion",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute estimates for one face. Any field may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeResult {
    pub region: Region,
    pub age: Option<u32>,
    pub gender: Option<Scored<Gender>>,
    pub emotion: Option<Scored<Emotion>>,
    pub race: Option<Scored<Race>>,
}

impl AttributeResult {
    /// A result for `region` with no attributes populated.
    pub fn empty(region: Region) -> Self {
        Self {
            region,
            age: None,
            gender: None,
            emotion: None,
            race: None,
        }
    }

    /// Clear every attribute not listed in `features`.
    pub fn retain_features(&mut self, features: &[Feature]) {
        if !features.contains(&Feature::Age) {
            self.age = None;
        }
        if !features.contains(&Feature::Gender) {
            self.gender = None;
        }
        if !features.contains(&Feature::Race) {
            self.race = None;
        }
        if !features.contains(&Feature::Emotion) {
            self.emotion = None;
        }
    }

    /// Features that carry a value, in [`Feature::ALL`] order.
    pub fn populated(&self) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|f| match f {
                Feature::Age => self.age.is_some(),
                Feature::Gender => self.gender.is_some(),
                Feature::Race => self.race.is_some(),
                Feature::Emotion => self.emotion.is_some(),
            })
            .collect()
    }
}
