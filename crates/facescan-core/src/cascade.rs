//! Haar-feature cascade evaluation over integral images.
//!
//! A cascade is a sequence of boosted stages; each stage sums the votes of
//! its weak classifiers (small decision trees over Haar features) and
//! rejects the window as soon as a stage total falls below the stage
//! threshold. Feature responses are normalised by the window's standard
//! deviation so one threshold works across lighting conditions.
//!
//! Models are read from OpenCV's cascade XML (`opencv-cascade-classifier`
//! with `BOOST` stages and `HAAR` features), the format of the published
//! `haarcascade_*.xml` files. Upright and 45° tilted features are both
//! supported.

use crate::detector::DetectorError;
use std::path::Path;
use std::str::FromStr;

/// Summed-area tables of a luminance buffer.
///
/// The upright tables (values and squared values) are always built. The
/// tilted table for 45° features is built only on request.
pub struct IntegralImage {
    width: usize,
    height: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
    tilted: Option<Vec<u64>>,
}

impl IntegralImage {
    /// Build from a single-channel row-major buffer.
    pub fn new(gray: &[u8], width: u32, height: u32) -> Self {
        let w = width as usize;
        let h = height as usize;
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];

        for y in 0..h {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = gray[y * w + x] as u64;
                row += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                sq_sum[(y + 1) * stride + x + 1] = sq_sum[y * stride + x + 1] + row_sq;
            }
        }

        Self {
            width: w,
            height: h,
            sum,
            sq_sum,
            tilted: None,
        }
    }

    /// Build the upright tables plus the tilted table.
    pub fn with_tilted(gray: &[u8], width: u32, height: u32) -> Self {
        let mut integral = Self::new(gray, width, height);
        integral.tilted = Some(tilted_table(gray, integral.width, integral.height));
        integral
    }

    pub fn width(&self) -> u32 {
        self.width as u32
    }

    pub fn height(&self) -> u32 {
        self.height as u32
    }

    /// Sum of pixel values in `[x, x+w) × [y, y+h)`. Caller keeps it in bounds.
    pub fn rect_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::lookup(&self.sum, self.width + 1, x, y, w, h)
    }

    /// Sum of squared pixel values in `[x, x+w) × [y, y+h)`.
    pub fn rect_sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::lookup(&self.sq_sum, self.width + 1, x, y, w, h)
    }

    /// Mean pixel value in a rectangle.
    pub fn rect_mean(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let area = w as u64 * h as u64;
        if area == 0 {
            return 0.0;
        }
        self.rect_sum(x, y, w, h) as f64 / area as f64
    }

    /// Sum over a rectangle rotated by 45°: top corner at `(x, y)`, `w`
    /// pixels along the down-right diagonal and `h` along the down-left one.
    ///
    /// Zero when the tilted table was not built.
    pub fn tilted_sum(&self, x: i64, y: i64, w: i64, h: i64) -> i64 {
        if self.tilted.is_none() {
            return 0;
        }
        self.tilted_at(x, y) - self.tilted_at(x - h, y + h) - self.tilted_at(x + w, y + w)
            + self.tilted_at(x + w - h, y + w + h)
    }

    /// Tilted table entry at image coordinates, clamped to the stored range.
    fn tilted_at(&self, x: i64, y: i64) -> i64 {
        let Some(table) = &self.tilted else {
            return 0;
        };
        let pad = self.height as i64 + 1;
        let stride = self.width as i64 + 2 * pad + 1;
        let col = (x + pad).clamp(0, stride - 1);
        let row = y.clamp(0, self.height as i64);
        table[(row * stride + col) as usize] as i64
    }

    fn lookup(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }
}

/// `T(X, Y)` = sum of pixels `(x, y)` with `y < Y` and `|x - X + 1| <= Y - y - 1`.
///
/// Columns are padded by `height + 1` on both sides; entries there cover no
/// image pixel on the outermost columns and stay zero.
fn tilted_table(gray: &[u8], w: usize, h: usize) -> Vec<u64> {
    let pad = h + 1;
    let stride = w + 2 * pad + 1;
    let mut table = vec![0u64; stride * (h + 1)];
    let pixel = |x: isize, y: isize| -> u64 {
        if x >= 0 && y >= 0 && (x as usize) < w && (y as usize) < h {
            gray[y as usize * w + x as usize] as u64
        } else {
            0
        }
    };

    for y in 1..=h {
        for col in 1..stride - 1 {
            let x = col as isize - pad as isize;
            let mut v = table[(y - 1) * stride + col - 1]
                + table[(y - 1) * stride + col + 1]
                + pixel(x - 1, y as isize - 1)
                + pixel(x - 1, y as isize - 2);
            if y >= 2 {
                v -= table[(y - 2) * stride + col];
            }
            table[y * stride + col] = v;
        }
    }
    table
}

/// Window-level classifier evaluated at every position of the pyramid sweep.
pub trait WindowClassifier: Send + Sync {
    /// Base (scale 1.0) window size in pixels.
    fn window_size(&self) -> (u32, u32);

    /// Whether [`evaluate`](Self::evaluate) reads tilted sums.
    fn needs_tilted(&self) -> bool {
        false
    }

    /// Whether the window at `(x, y)`, scaled by `scale`, is a positive.
    fn evaluate(&self, integral: &IntegralImage, x: u32, y: u32, scale: f32) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

/// Weighted rectangles, upright or rotated by 45°.
#[derive(Debug, Clone, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<FeatureRect>,
    pub tilted: bool,
}

/// Split node of a weak classifier tree. A child `> 0` is a node index,
/// a child `<= 0` is the negated index of a leaf value.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub feature: usize,
    pub threshold: f32,
    /// Taken when the normalised response is below `threshold`.
    pub left: i32,
    pub right: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f32>,
}

impl WeakClassifier {
    fn vote(&self, response: impl Fn(usize) -> f64) -> f32 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            let next = if response(node.feature) < node.threshold as f64 {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return self.leaves[next.unsigned_abs() as usize];
            }
            idx = next as usize;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<WeakClassifier>,
}

/// A boosted Haar cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct HaarCascade {
    pub width: u32,
    pub height: u32,
    pub stages: Vec<Stage>,
    pub features: Vec<HaarFeature>,
}

impl HaarCascade {
    /// Load an OpenCV cascade XML file. Missing or malformed files are
    /// reported as `ClassifierUnavailable`.
    pub fn load(path: &str) -> Result<Self, DetectorError> {
        if !Path::new(path).exists() {
            return Err(DetectorError::ClassifierUnavailable(format!(
                "cascade file not found: {path}"
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| DetectorError::ClassifierUnavailable(format!("{path}: {e}")))?;
        let cascade = Self::from_xml(&text)
            .map_err(|e| DetectorError::ClassifierUnavailable(format!("{path}: {e}")))?;

        tracing::info!(
            path,
            window = ?(cascade.width, cascade.height),
            stages = cascade.stages.len(),
            features = cascade.features.len(),
            tilted = cascade.needs_tilted(),
            "loaded Haar cascade"
        );
        Ok(cascade)
    }

    /// Parse and validate a cascade in OpenCV's XML storage format.
    pub fn from_xml(text: &str) -> Result<Self, String> {
        let doc = roxmltree::Document::parse(text).map_err(|e| e.to_string())?;
        let node = doc
            .root_element()
            .children()
            .find(|n| n.is_element())
            .ok_or("empty cascade file")?;
        if node.attribute("type_id") == Some("opencv-haar-classifier") {
            return Err("old-style opencv-haar-classifier cascades are not supported".into());
        }

        let stage_type = node_text(child(node, "stageType")?);
        let feature_type = node_text(child(node, "featureType")?);
        if !stage_type.eq_ignore_ascii_case("BOOST") || !feature_type.eq_ignore_ascii_case("HAAR") {
            return Err(format!("unsupported cascade type {stage_type}/{feature_type}"));
        }

        let width: u32 = parse_child(node, "width")?;
        let height: u32 = parse_child(node, "height")?;
        if width == 0 || height == 0 {
            return Err("cascade window size is zero".into());
        }

        let features = items(child(node, "features")?)
            .enumerate()
            .map(|(i, f)| parse_feature(f, width, height).map_err(|e| format!("feature {i}: {e}")))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = items(child(node, "stages")?)
            .enumerate()
            .map(|(i, s)| parse_stage(s, features.len()).map_err(|e| format!("stage {i}: {e}")))
            .collect::<Result<Vec<_>, _>>()?;
        if stages.is_empty() {
            return Err("cascade has no stages".into());
        }

        Ok(Self {
            width,
            height,
            stages,
            features,
        })
    }

    /// Normalised response of one feature for the window at `(x, y)`.
    fn response(&self, feature: &HaarFeature, integral: &IntegralImage, window: Window) -> f64 {
        let Window { x, y, ww, wh, scale, norm } = window;
        let scale_coord = |v: u32| (v as f32 * scale).round() as u32;

        let mut response = 0.0f64;
        for r in &feature.rects {
            let sum = if feature.tilted {
                integral.tilted_sum(
                    x as i64 + scale_coord(r.x) as i64,
                    y as i64 + scale_coord(r.y) as i64,
                    scale_coord(r.width).max(1) as i64,
                    scale_coord(r.height).max(1) as i64,
                ) as f64
            } else {
                let rx = x + scale_coord(r.x);
                let ry = y + scale_coord(r.y);
                let rw = scale_coord(r.width).max(1).min(x + ww - rx);
                let rh = scale_coord(r.height).max(1).min(y + wh - ry);
                integral.rect_sum(rx, ry, rw, rh) as f64
            };
            response += r.weight as f64 * sum;
        }
        response / norm
    }
}

/// Geometry and variance normaliser of the window under evaluation.
#[derive(Clone, Copy)]
struct Window {
    x: u32,
    y: u32,
    ww: u32,
    wh: u32,
    scale: f32,
    norm: f64,
}

impl WindowClassifier for HaarCascade {
    fn window_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn needs_tilted(&self) -> bool {
        self.features.iter().any(|f| f.tilted)
    }

    fn evaluate(&self, integral: &IntegralImage, x: u32, y: u32, scale: f32) -> bool {
        let ww = (self.width as f32 * scale).round() as u32;
        let wh = (self.height as f32 * scale).round() as u32;
        if ww == 0 || wh == 0 || x + ww > integral.width() || y + wh > integral.height() {
            return false;
        }

        // variance is taken inside a one-pixel (scaled) border
        let border = scale.round().max(1.0) as u32;
        let (nx, ny, nw, nh) = if ww > 2 * border && wh > 2 * border {
            (x + border, y + border, ww - 2 * border, wh - 2 * border)
        } else {
            (x, y, ww, wh)
        };
        let area = nw as f64 * nh as f64;
        let sum = integral.rect_sum(nx, ny, nw, nh) as f64;
        let sq_sum = integral.rect_sq_sum(nx, ny, nw, nh) as f64;
        let spread = area * sq_sum - sum * sum;
        let norm = if spread > 0.0 { spread.sqrt() } else { 1.0 };

        let window = Window { x, y, ww, wh, scale, norm };
        for stage in &self.stages {
            let total: f32 = stage
                .classifiers
                .iter()
                .map(|weak| weak.vote(|f| self.response(&self.features[f], integral, window)))
                .sum();
            if total < stage.threshold {
                return false;
            }
        }
        true
    }
}

fn child<'a, 'i>(node: roxmltree::Node<'a, 'i>, name: &str) -> Result<roxmltree::Node<'a, 'i>, String> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| format!("<{}> has no <{name}>", node.tag_name().name()))
}

/// Elements of an OpenCV sequence (`<_>` children).
fn items<'a, 'i>(node: roxmltree::Node<'a, 'i>) -> impl Iterator<Item = roxmltree::Node<'a, 'i>> {
    node.children().filter(|n| n.has_tag_name("_"))
}

fn node_text<'a>(node: roxmltree::Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn parse_token<T: FromStr>(token: &str) -> Result<T, String> {
    token.parse().map_err(|_| format!("bad number {token:?}"))
}

fn parse_child<T: FromStr>(node: roxmltree::Node, name: &str) -> Result<T, String> {
    parse_token(node_text(child(node, name)?))
}

fn parse_feature(node: roxmltree::Node, width: u32, height: u32) -> Result<HaarFeature, String> {
    let tilted = match node.children().find(|n| n.has_tag_name("tilted")) {
        Some(t) => parse_token::<u8>(node_text(t))? != 0,
        None => false,
    };

    let mut rects = Vec::new();
    for r in items(child(node, "rects")?) {
        let tokens: Vec<&str> = node_text(r).split_whitespace().collect();
        let &[x, y, w, h, weight] = tokens.as_slice() else {
            return Err(format!("rectangle needs 5 values, got {}", tokens.len()));
        };
        let rect = FeatureRect {
            x: parse_token(x)?,
            y: parse_token(y)?,
            width: parse_token(w)?,
            height: parse_token(h)?,
            weight: parse_token(weight)?,
        };
        if !rect_fits(&rect, tilted, width, height) {
            return Err("rectangle outside the window".into());
        }
        rects.push(rect);
    }
    if rects.is_empty() {
        return Err("feature has no rectangles".into());
    }
    Ok(HaarFeature { rects, tilted })
}

/// Upright rectangles span `[x, x+w) × [y, y+h)`; tilted ones span
/// `[x-h, x+w]` horizontally and `[y, y+w+h]` vertically.
fn rect_fits(r: &FeatureRect, tilted: bool, width: u32, height: u32) -> bool {
    if r.width == 0 || r.height == 0 {
        return false;
    }
    if tilted {
        r.x >= r.height
            && r.x.checked_add(r.width).is_some_and(|right| right <= width)
            && r.y
                .checked_add(r.width)
                .and_then(|v| v.checked_add(r.height))
                .is_some_and(|bottom| bottom <= height)
    } else {
        r.x.checked_add(r.width).is_some_and(|right| right <= width)
            && r.y.checked_add(r.height).is_some_and(|bottom| bottom <= height)
    }
}

fn parse_stage(node: roxmltree::Node, feature_count: usize) -> Result<Stage, String> {
    let threshold = parse_child(node, "stageThreshold")?;
    let classifiers = items(child(node, "weakClassifiers")?)
        .map(|weak| parse_weak(weak, feature_count))
        .collect::<Result<Vec<_>, _>>()?;
    if classifiers.is_empty() {
        return Err("stage has no weak classifiers".into());
    }
    Ok(Stage {
        threshold,
        classifiers,
    })
}

/// `internalNodes` holds `left right feature threshold` per node.
fn parse_weak(node: roxmltree::Node, feature_count: usize) -> Result<WeakClassifier, String> {
    let tokens: Vec<&str> = node_text(child(node, "internalNodes")?).split_whitespace().collect();
    if tokens.is_empty() || tokens.len() % 4 != 0 {
        return Err(format!("internalNodes needs groups of 4 values, got {}", tokens.len()));
    }
    let nodes = tokens
        .chunks(4)
        .map(|n| -> Result<TreeNode, String> {
            Ok(TreeNode {
                left: parse_token(n[0])?,
                right: parse_token(n[1])?,
                feature: parse_token(n[2])?,
                threshold: parse_token(n[3])?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let leaves = node_text(child(node, "leafValues")?)
        .split_whitespace()
        .map(parse_token)
        .collect::<Result<Vec<f32>, _>>()?;

    for (i, n) in nodes.iter().enumerate() {
        if n.feature >= feature_count {
            return Err(format!("node {i} uses missing feature {}", n.feature));
        }
        for next in [n.left, n.right] {
            let valid = if next > 0 {
                // children come after their parent, so every walk ends at a leaf
                (next as usize) > i && (next as usize) < nodes.len()
            } else {
                (next.unsigned_abs() as usize) < leaves.len()
            };
            if !valid {
                return Err(format!("node {i} has invalid child {next}"));
            }
        }
    }
    Ok(WeakClassifier { nodes, leaves })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-stage cascade firing on windows whose top half is darker than the bottom half.
    const EDGE_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>8</height>
  <width>8</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <!-- stage 0 -->
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>5.0000000000000000e-01</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 2.5000000000000000e-01</internalNodes>
          <leafValues>
            0. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 8 4 -1.</_>
        <_>
          0 4 8 4 1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    /// Two-level tree: fires on a horizontal edge of either polarity.
    const EITHER_EDGE_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>8</height>
  <width>8</width>
  <stages>
    <_>
      <stageThreshold>0.5</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>1 0 0 0.25 -1 -2 1 0.25</internalNodes>
          <leafValues>1. 0. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_><rects><_>0 0 8 4 -1.</_><_>0 4 8 4 1.</_></rects></_>
    <_><rects><_>0 0 8 4 1.</_><_>0 4 8 4 -1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    fn edge_image(top: u8, bottom: u8) -> Vec<u8> {
        // 16x16: top 8 rows `top`, bottom 8 rows `bottom`
        let mut gray = vec![top; 16 * 16];
        for v in gray.iter_mut().skip(8 * 16) {
            *v = bottom;
        }
        gray
    }

    fn brute_tilted(gray: &[u8], w: usize, h: usize, big_x: i64, big_y: i64) -> i64 {
        let mut total = 0;
        for y in 0..h as i64 {
            for x in 0..w as i64 {
                if y < big_y && (x - big_x + 1).abs() <= big_y - y - 1 {
                    total += gray[y as usize * w + x as usize] as i64;
                }
            }
        }
        total
    }

    #[test]
    fn test_integral_rect_sum() {
        // 3x3 ramp 1..=9
        let gray: Vec<u8> = (1..=9).collect();
        let ii = IntegralImage::new(&gray, 3, 3);
        assert_eq!(ii.rect_sum(0, 0, 3, 3), 45);
        assert_eq!(ii.rect_sum(1, 1, 2, 2), 5 + 6 + 8 + 9);
        assert_eq!(ii.rect_sum(2, 0, 1, 1), 3);
        assert_eq!(ii.rect_sq_sum(0, 0, 2, 1), 1 + 4);
        assert!((ii.rect_mean(0, 0, 3, 3) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_tilted_table_matches_definition() {
        let (w, h) = (7usize, 5usize);
        let gray: Vec<u8> = (0..w * h).map(|i| ((i * 37) % 251) as u8).collect();
        let ii = IntegralImage::with_tilted(&gray, w as u32, h as u32);
        for y in 0..=h as i64 {
            for x in -(h as i64)..=(w + h) as i64 {
                assert_eq!(ii.tilted_at(x, y), brute_tilted(&gray, w, h, x, y), "T({x}, {y})");
            }
        }
    }

    #[test]
    fn test_tilted_unit_rect() {
        // 5x5 ramp: value = y * 5 + x + 1; a 1x1 tilted rect at (2, 1)
        // covers (1, 1) and (1, 2)
        let gray: Vec<u8> = (1..=25).collect();
        let ii = IntegralImage::with_tilted(&gray, 5, 5);
        assert_eq!(ii.tilted_sum(2, 1, 1, 1), 7 + 12);
        assert_eq!(IntegralImage::new(&gray, 5, 5).tilted_sum(2, 1, 1, 1), 0);
    }

    #[test]
    fn test_parse_opencv_cascade() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        assert_eq!(cascade.window_size(), (8, 8));
        assert_eq!(cascade.stages.len(), 1);
        assert_eq!(cascade.features.len(), 1);
        assert!(!cascade.needs_tilted());

        let weak = &cascade.stages[0].classifiers[0];
        assert_eq!(
            weak.nodes,
            vec![TreeNode { feature: 0, threshold: 0.25, left: 0, right: -1 }]
        );
        assert_eq!(weak.leaves, vec![0.0, 1.0]);
        assert_eq!(
            cascade.features[0].rects[1],
            FeatureRect { x: 0, y: 4, width: 8, height: 4, weight: 1.0 }
        );
    }

    #[test]
    fn test_parse_tilted_feature() {
        let xml = EDGE_CASCADE.replace(
            "0 4 8 4 1.</_></rects>",
            "0 4 8 4 1.</_></rects><tilted>1</tilted>",
        );
        // the upright rects do not fit as tilted ones (x must be >= h)
        assert!(HaarCascade::from_xml(&xml).is_err());

        let xml = xml
            .replace("0 0 8 4 -1.", "2 0 2 2 -1.")
            .replace("0 4 8 4 1.", "3 1 1 1 2.");
        let cascade = HaarCascade::from_xml(&xml).unwrap();
        assert!(cascade.features[0].tilted);
        assert!(cascade.needs_tilted());
    }

    #[test]
    fn test_parse_rejects_feature_outside_window() {
        let bad = EDGE_CASCADE.replace("0 4 8 4 1.", "4 4 8 4 1.");
        assert!(HaarCascade::from_xml(&bad).is_err());
    }

    #[test]
    fn test_parse_rejects_overflowing_rectangle() {
        let bad = EDGE_CASCADE.replace("0 4 8 4 1.", "4294967295 4 8 4 1.");
        assert!(HaarCascade::from_xml(&bad).is_err());
        let bad = EDGE_CASCADE.replace("0 4 8 4 1.", "0 4294967290 8 4 1.");
        assert!(HaarCascade::from_xml(&bad).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_trees() {
        for (from, to) in [
            ("0 -1 0 2.5", "0 -1 3 2.5"),  // missing feature
            ("0 -1 0 2.5", "0 -2 0 2.5"),  // missing leaf
            ("0 -1 0 2.5", "1 -1 0 2.5"),  // node beyond the tree
            ("0 -1 0 2.5", "0 -1 0"),      // short node
        ] {
            let bad = EDGE_CASCADE.replace(from, to);
            assert!(HaarCascade::from_xml(&bad).is_err(), "{to} should be rejected");
        }
    }

    #[test]
    fn test_parse_rejects_other_formats() {
        let lbp = EDGE_CASCADE.replace("<featureType>HAAR", "<featureType>LBP");
        assert!(HaarCascade::from_xml(&lbp).is_err());
        let legacy = r#"<opencv_storage><haarcascade_frontalface_alt type_id="opencv-haar-classifier">
            <size>20 20</size></haarcascade_frontalface_alt></opencv_storage>"#;
        assert!(HaarCascade::from_xml(legacy).is_err());
        let no_stages = EDGE_CASCADE.replace("<stages>", "<unused>").replace("</stages>", "</unused>");
        assert!(HaarCascade::from_xml(&no_stages).is_err());
        assert!(HaarCascade::from_xml("not xml").is_err());
    }

    #[test]
    fn test_load_missing_file_is_unavailable() {
        let err = HaarCascade::load("/nonexistent/haarcascade_frontalface_default.xml").unwrap_err();
        assert!(matches!(err, DetectorError::ClassifierUnavailable(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.xml");
        std::fs::write(&path, EDGE_CASCADE).unwrap();
        let cascade = HaarCascade::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cascade.width, 8);

        let json = dir.path().join("edge.json");
        std::fs::write(&json, r#"{"width": 8}"#).unwrap();
        let err = HaarCascade::load(json.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, DetectorError::ClassifierUnavailable(_)));
    }

    #[test]
    fn test_evaluate_edge_window() {
        let gray = edge_image(0, 255);
        let ii = IntegralImage::new(&gray, 16, 16);
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();

        // Window straddling the edge: top half dark, bottom half bright
        assert!(cascade.evaluate(&ii, 0, 4, 1.0));
        // Same window scaled to 16x16 covering the whole image
        assert!(cascade.evaluate(&ii, 0, 0, 2.0));
        // Uniform windows never fire
        assert!(!cascade.evaluate(&ii, 0, 0, 1.0));
        assert!(!cascade.evaluate(&ii, 0, 8, 1.0));
        // Window that does not fit
        assert!(!cascade.evaluate(&ii, 10, 10, 1.0));
    }

    #[test]
    fn test_evaluate_tree_classifier() {
        let cascade = HaarCascade::from_xml(EITHER_EDGE_CASCADE).unwrap();
        let dark_top = IntegralImage::new(&edge_image(0, 255), 16, 16);
        let bright_top = IntegralImage::new(&edge_image(255, 0), 16, 16);

        // root split decides the dark-over-bright case, the second node the inverse
        assert!(cascade.evaluate(&dark_top, 0, 4, 1.0));
        assert!(cascade.evaluate(&bright_top, 0, 4, 1.0));
        assert!(!cascade.evaluate(&dark_top, 0, 0, 1.0));
        assert!(!cascade.evaluate(&bright_top, 0, 8, 1.0));
    }

    #[test]
    fn test_edge_cascade_drives_detector() {
        use crate::detector::{detect, CascadeDetector};
        use crate::{DetectionParameters, PixelBuffer};

        let gray = PixelBuffer::new(edge_image(0, 255), 16, 16, 1).unwrap();
        let detector = CascadeDetector::new("edge", HaarCascade::from_xml(EDGE_CASCADE).unwrap());
        let params = DetectionParameters::default().with_min_neighbors(1).with_min_size(8, 8);
        let regions = detect(&gray, &detector, &params).unwrap();
        assert!(!regions.is_empty());
        assert!(regions.iter().all(|r| r.y < 8 && r.bottom() > 8), "{regions:?}");
    }
}
