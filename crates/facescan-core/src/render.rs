//! Annotation overlay renderer.
//!
//! Draws detection rectangles, stacked label lines and nested (eye) regions
//! onto a copy of the input buffer.

use crate::buffer::{luminance, BufferError, PixelBuffer};
use crate::glyphs::{self, GLYPH_HEIGHT};
use crate::types::{AttributeResult, FaceDetection, Region};
use image::{ImageBuffer, Luma, Pixel, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

/// RGB colour triple.
pub type Color = [u8; 3];

/// Padding around label text inside its background box.
const LABEL_PADDING: i32 = 2;
/// Rectangle thickness is capped here.
const MAX_THICKNESS: u32 = 1 << 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Top-level rectangle colour.
    pub primary: Color,
    /// Nested (eye) rectangle colour.
    pub secondary: Color,
    /// Rectangle line thickness, drawn inward, at most 65536.
    pub thickness: u32,
    pub label_color: Color,
    /// Filled box behind each label line; `None` draws bare text.
    pub label_background: Option<Color>,
    /// Integer glyph scale (glyphs are 3×5 at scale 1).
    pub label_scale: i32,
    /// Gap between the rectangle edge and the nearest label line.
    pub label_margin: i32,
    /// Vertical distance between consecutive label lines.
    pub line_spacing: i32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            primary: [0, 0, 255],
            secondary: [0, 255, 0],
            thickness: 2,
            label_color: [0, 0, 0],
            label_background: Some([255, 255, 255]),
            label_scale: 2,
            label_margin: 8,
            line_spacing: 16,
        }
    }
}

impl RenderOptions {
    fn text_height(&self) -> i32 {
        GLYPH_HEIGHT * self.label_scale
    }
}

/// One top-level overlay item.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub region: Region,
    pub labels: Vec<String>,
    /// Drawn in the secondary colour, without labels.
    pub nested: Vec<Region>,
}

impl From<&FaceDetection> for Annotation {
    fn from(face: &FaceDetection) -> Self {
        Self {
            region: face.region,
            labels: vec!["Face".to_string()],
            nested: face.eyes.clone(),
        }
    }
}

impl Annotation {
    /// One label line per populated attribute; `Face N` (1-based) when none are.
    pub fn from_attributes(index: usize, result: &AttributeResult) -> Self {
        let mut labels = Vec::new();
        if let Some(age) = result.age {
            labels.push(format!("Age: {age}"));
        }
        if let Some(g) = &result.gender {
            labels.push(format!("Gender: {} ({:.1}%)", g.label, g.confidence));
        }
        if let Some(e) = &result.emotion {
            labels.push(format!("Emotion: {} ({:.1}%)", e.label, e.confidence));
        }
        if let Some(r) = &result.race {
            labels.push(format!("Race: {} ({:.1}%)", r.label, r.confidence));
        }
        if labels.is_empty() {
            labels.push(format!("Face {}", index + 1));
        }
        Self {
            region: result.region,
            labels,
            nested: Vec::new(),
        }
    }
}

/// Rendered copy of a buffer plus the number of degenerate regions skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedBuffer {
    buffer: PixelBuffer,
    skipped: usize,
}

impl AnnotatedBuffer {
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }

    /// Regions with zero or negative extent that were not drawn.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Top row of each label line for a stack of `lines` labels on `region`.
///
/// The stack sits above the rectangle unless its top would be negative, in
/// which case the whole stack moves below the rectangle. A stack whose top
/// lands exactly on row 0 stays above.
pub fn label_rows(region: &Region, lines: usize, options: &RenderOptions) -> Vec<i64> {
    if lines == 0 {
        return Vec::new();
    }
    let n = lines as i64;
    let spacing = options.line_spacing as i64;
    let margin = options.label_margin as i64;
    let last_top = region.y as i64 - margin - options.text_height() as i64;
    let stack_top = last_top - (n - 1) * spacing;
    if stack_top >= 0 {
        (0..n).map(|j| stack_top + j * spacing).collect()
    } else {
        let first_top = region.bottom() + margin;
        (0..n).map(|j| first_top + j * spacing).collect()
    }
}

/// Draw `annotations` onto a copy of `buffer`.
pub fn render(
    buffer: &PixelBuffer,
    annotations: &[Annotation],
    options: &RenderOptions,
) -> Result<AnnotatedBuffer, BufferError> {
    buffer.ensure_supported()?;
    let (w, h) = (buffer.width(), buffer.height());
    let mismatch = || BufferError::LengthMismatch {
        expected: w as usize * h as usize * buffer.channels() as usize,
        actual: buffer.data().len(),
    };

    let (data, skipped) = if buffer.channels() == 1 {
        let mut img: ImageBuffer<Luma<u8>, Vec<u8>> =
            ImageBuffer::from_raw(w, h, buffer.data().to_vec()).ok_or_else(mismatch)?;
        let skipped = draw_annotations(&mut img, annotations, options, |c| Luma([luminance(c)]));
        (img.into_raw(), skipped)
    } else {
        let mut img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(w, h, buffer.data().to_vec()).ok_or_else(mismatch)?;
        let skipped = draw_annotations(&mut img, annotations, options, Rgb);
        (img.into_raw(), skipped)
    };

    if skipped > 0 {
        tracing::debug!(skipped, "render: skipped degenerate regions");
    }

    Ok(AnnotatedBuffer {
        buffer: PixelBuffer::new(data, w, h, buffer.channels())?,
        skipped,
    })
}

fn draw_annotations<P>(
    img: &mut ImageBuffer<P, Vec<u8>>,
    annotations: &[Annotation],
    options: &RenderOptions,
    paint: impl Fn(Color) -> P,
) -> usize
where
    P: Pixel<Subpixel = u8>,
{
    let (canvas_w, canvas_h) = (img.width() as i64, img.height() as i64);
    let mut skipped = 0;
    for annotation in annotations {
        if annotation.region.is_degenerate() {
            skipped += 1 + annotation.nested.len();
            continue;
        }
        draw_frame(img, &annotation.region, options.thickness, paint(options.primary));

        for nested in &annotation.nested {
            if nested.is_degenerate() {
                skipped += 1;
                continue;
            }
            draw_frame(img, nested, options.thickness, paint(options.secondary));
        }

        let x = annotation.region.x;
        let box_h = options.text_height() + 2 * LABEL_PADDING;
        let rows = label_rows(&annotation.region, annotation.labels.len(), options);
        for (text, top) in annotation.labels.iter().zip(rows) {
            // lines starting past the canvas cannot show any pixel
            if x as i64 >= canvas_w || top - LABEL_PADDING as i64 >= canvas_h || top + (box_h as i64) <= 0 {
                continue;
            }
            let top = top as i32;
            if let Some(bg) = options.label_background {
                let box_w = glyphs::text_width(text, options.label_scale) + 2 * LABEL_PADDING;
                let rect = Rect::at(x, top - LABEL_PADDING).of_size(box_w as u32, box_h as u32);
                draw_filled_rect_mut(img, rect, paint(bg));
            }
            glyphs::draw_text(
                img,
                x + LABEL_PADDING,
                top,
                text,
                options.label_scale,
                paint(options.label_color),
            );
        }
    }
    skipped
}

/// Hollow rectangle `thickness` pixels wide, growing inward from the region edge.
///
/// Edges further than `thickness` outside the canvas are pulled in to just
/// past the border, where none of their rings can be seen.
fn draw_frame<P>(img: &mut ImageBuffer<P, Vec<u8>>, region: &Region, thickness: u32, color: P)
where
    P: Pixel<Subpixel = u8>,
{
    let rings = thickness.clamp(1, MAX_THICKNESS) as i64;
    let left = (region.x as i64).max(-rings - 1);
    let top = (region.y as i64).max(-rings - 1);
    let right = region.right().min(img.width() as i64 + rings + 1);
    let bottom = region.bottom().min(img.height() as i64 + rings + 1);
    for t in 0..rings {
        let (w, h) = (right - left - 2 * t, bottom - top - 2 * t);
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at((left + t) as i32, (top + t) as i32).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Emotion;
    use crate::types::Scored;

    fn gray_canvas() -> PixelBuffer {
        PixelBuffer::filled(120, 100, &[128]).unwrap()
    }

    #[test]
    fn test_render_does_not_mutate_input() {
        let input = PixelBuffer::filled(120, 100, &[10, 20, 30]).unwrap();
        let before = input.clone();
        let face = FaceDetection {
            region: Region::new(30, 40, 40, 40),
            eyes: vec![Region::new(40, 50, 8, 8)],
        };
        let out = render(&input, &[Annotation::from(&face)], &RenderOptions::default()).unwrap();
        assert_eq!(input, before);
        assert_ne!(out.buffer(), &input);
        assert_eq!(
            (out.buffer().width(), out.buffer().height(), out.buffer().channels()),
            (120, 100, 3)
        );
    }

    #[test]
    fn test_rectangle_edges_drawn() {
        let face = FaceDetection { region: Region::new(20, 40, 30, 20), eyes: vec![] };
        let opts = RenderOptions { thickness: 1, ..RenderOptions::default() };
        let out = render(&PixelBuffer::filled(100, 100, &[0, 0, 0]).unwrap(), &[(&face).into()], &opts).unwrap();
        let buf = out.buffer();
        assert_eq!(buf.pixel(20, 40), &[0, 0, 255]);
        assert_eq!(buf.pixel(49, 59), &[0, 0, 255]);
        assert_eq!(buf.pixel(35, 50), &[0, 0, 0], "interior stays untouched");
    }

    #[test]
    fn test_eyes_use_secondary_colour() {
        let face = FaceDetection {
            region: Region::new(10, 30, 60, 60),
            eyes: vec![Region::new(20, 40, 10, 10)],
        };
        let opts = RenderOptions { thickness: 1, ..RenderOptions::default() };
        let out = render(&PixelBuffer::filled(100, 100, &[0, 0, 0]).unwrap(), &[(&face).into()], &opts).unwrap();
        assert_eq!(out.buffer().pixel(20, 40), &[0, 255, 0]);
    }

    #[test]
    fn test_gray_buffer_gets_luminance_colour() {
        let face = FaceDetection { region: Region::new(10, 40, 20, 20), eyes: vec![] };
        let opts = RenderOptions { primary: [255, 255, 255], ..RenderOptions::default() };
        let out = render(&gray_canvas(), &[(&face).into()], &opts).unwrap();
        assert_eq!(out.buffer().channels(), 1);
        assert_eq!(out.buffer().pixel(10, 40), &[255]);
    }

    #[test]
    fn test_labels_above_when_room() {
        let opts = RenderOptions::default();
        let rows = label_rows(&Region::new(10, 80, 40, 40), 2, &opts);
        // last line top = 80 - 8 - 10 = 62, first = 62 - 16 = 46
        assert_eq!(rows, vec![46, 62]);
    }

    #[test]
    fn test_labels_flip_below_near_top() {
        let opts = RenderOptions::default();
        let region = Region::new(10, 5, 40, 40);
        let rows = label_rows(&region, 3, &opts);
        assert_eq!(rows, vec![53, 69, 85]);
        assert!(rows.iter().all(|&r| r >= 0));
    }

    #[test]
    fn test_label_tie_stays_above() {
        let opts = RenderOptions::default();
        // single line: top = y - 8 - 10 = 0 exactly
        assert_eq!(label_rows(&Region::new(0, 18, 10, 10), 1, &opts), vec![0]);
        // one pixel higher flips below
        assert_eq!(label_rows(&Region::new(0, 17, 10, 10), 1, &opts), vec![35]);
    }

    #[test]
    fn test_stack_flips_as_unit() {
        let opts = RenderOptions::default();
        // last line would fit (50 - 18 = 32) but the first of four would not (32 - 48 < 0)
        let rows = label_rows(&Region::new(0, 50, 10, 10), 4, &opts);
        assert!(rows.iter().all(|&r| r >= 60));
    }

    #[test]
    fn test_degenerate_regions_counted() {
        let annotations = vec![
            Annotation { region: Region::new(0, 0, 0, 10), labels: vec![], nested: vec![] },
            Annotation {
                region: Region::new(10, 30, 20, 20),
                labels: vec!["Face".into()],
                nested: vec![Region::new(12, 32, -3, 4), Region::new(12, 32, 4, 4)],
            },
        ];
        let out = render(&gray_canvas(), &annotations, &RenderOptions::default()).unwrap();
        assert_eq!(out.skipped(), 2);
    }

    #[test]
    fn test_region_off_canvas_does_not_panic() {
        let annotations = vec![Annotation {
            region: Region::new(100, 90, 80, 80),
            labels: vec!["Face 1".into()],
            nested: vec![],
        }];
        let out = render(&gray_canvas(), &annotations, &RenderOptions::default()).unwrap();
        assert_eq!(out.skipped(), 0);
    }

    #[test]
    fn test_extreme_regions_do_not_overflow() {
        let input = gray_canvas();
        let annotations = vec![
            Annotation {
                region: Region::new(i32::MAX - 5, 0, 100, 4),
                labels: vec!["Face".into()],
                nested: vec![],
            },
            Annotation {
                region: Region::new(-5, -5, i32::MAX, i32::MAX),
                labels: vec!["Face".into(), "Age: 30".into()],
                nested: vec![Region::new(0, i32::MAX - 1, 10, 10)],
            },
        ];
        let out = render(&input, &annotations, &RenderOptions::default()).unwrap();
        assert_eq!(out.buffer(), &input, "nothing of these regions lies on the canvas");

        // a right edge on column 0 survives pulling the far left edge in
        let clipped = Annotation { region: Region::new(-100, 10, 101, 20), labels: vec![], nested: vec![] };
        let opts = RenderOptions { primary: [255, 255, 255], ..RenderOptions::default() };
        let out = render(&input, &[clipped], &opts).unwrap();
        assert_eq!(out.buffer().pixel(0, 20), &[255]);
        assert_eq!(out.buffer().pixel(1, 20), &[128]);
    }

    #[test]
    fn test_huge_thickness_fills_region() {
        let annotations = vec![Annotation {
            region: Region::new(2, 2, 6, 6),
            labels: vec![],
            nested: vec![],
        }];
        let opts = RenderOptions { thickness: u32::MAX, primary: [255, 255, 255], ..RenderOptions::default() };
        let out = render(&gray_canvas(), &annotations, &opts).unwrap();
        assert_eq!(out.buffer().pixel(4, 4), &[255]);
        assert_eq!(out.buffer().pixel(1, 1), &[128]);
    }

    #[test]
    fn test_label_rows_do_not_overflow() {
        let opts = RenderOptions::default();
        let rows = label_rows(&Region::new(0, 0, 10, i32::MAX), 2, &opts);
        assert_eq!(rows, vec![i32::MAX as i64 + 8, i32::MAX as i64 + 24]);
    }

    #[test]
    fn test_attribute_labels() {
        let mut result = AttributeResult::empty(Region::new(0, 0, 10, 10));
        assert_eq!(Annotation::from_attributes(1, &result).labels, vec!["Face 2"]);

        result.age = Some(31);
        result.emotion = Some(Scored::new(Emotion::Happy, 88.0));
        assert_eq!(
            Annotation::from_attributes(0, &result).labels,
            vec!["Age: 31", "Emotion: Happy (88.0%)"]
        );
    }

    #[test]
    fn test_rejects_rgba() {
        let rgba = PixelBuffer::filled(4, 4, &[0, 0, 0, 0]).unwrap();
        assert!(render(&rgba, &[], &RenderOptions::default()).is_err());
    }
}
