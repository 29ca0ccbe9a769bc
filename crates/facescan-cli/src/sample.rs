//! Synthetic test portraits for trying the pipeline without a camera.

use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_ellipse_mut, draw_hollow_ellipse_mut, draw_line_segment_mut,
};

const SKIN: Rgb<u8> = Rgb([140, 180, 220]);
const SKIN_DARK: Rgb<u8> = Rgb([120, 160, 200]);
const BROWN: Rgb<u8> = Rgb([19, 69, 139]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// 500×500 single portrait: face, eyes with pupils, brows, mouth, hair.
pub fn single_face() -> RgbImage {
    let mut img = RgbImage::from_pixel(500, 500, Rgb([240, 240, 240]));

    draw_filled_ellipse_mut(&mut img, (250, 250), 100, 130, SKIN);
    // hair cap over the top of the head
    draw_filled_ellipse_mut(&mut img, (250, 150), 105, 45, BROWN);

    for cx in [220, 280] {
        draw_filled_circle_mut(&mut img, (cx, 220), 12, WHITE);
        draw_filled_circle_mut(&mut img, (cx, 220), 8, BLACK);
        for dy in 0..3 {
            let y = 196.0 + dy as f32;
            draw_line_segment_mut(&mut img, (cx as f32 - 15.0, y + 4.0), (cx as f32 + 15.0, y), BROWN);
        }
    }

    // nose
    draw_line_segment_mut(&mut img, (250.0, 235.0), (243.0, 265.0), SKIN_DARK);
    draw_line_segment_mut(&mut img, (243.0, 265.0), (255.0, 265.0), SKIN_DARK);

    for inset in 0..3 {
        draw_hollow_ellipse_mut(&mut img, (250, 290), 25 - inset, 12 - inset, BLACK);
    }
    img
}

/// 600×400 pair of simple faces side by side.
pub fn two_faces() -> RgbImage {
    let mut img = RgbImage::from_pixel(600, 400, Rgb([250, 250, 250]));
    for (cx, skin) in [(150, SKIN), (450, SKIN_DARK)] {
        draw_filled_circle_mut(&mut img, (cx, 200), 60, skin);
        draw_filled_circle_mut(&mut img, (cx - 15, 185), 6, BLACK);
        draw_filled_circle_mut(&mut img, (cx + 15, 185), 6, BLACK);
        for inset in 0..2 {
            draw_hollow_ellipse_mut(&mut img, (cx, 210), 15 - inset, 8 - inset, BLACK);
        }
    }
    img
}
