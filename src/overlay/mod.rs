//! Frame annotation: detection boxes, message panel, total and FPS

pub mod font;

use crate::denomination::format_cop;
use crate::predictor::BanknoteDetection;
use font::{glyph, GLYPH_HEIGHT, GLYPH_WIDTH};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const BOX_THICKNESS: i32 = 2;
const PANEL_START_Y: i32 = 30;
const PANEL_STEP: i32 = 35;
const PANEL_X: i32 = 10;
const TEXT_PADDING: i32 = 5;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Width in pixels of `text` at the given scale
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_WIDTH * scale.max(1)
}

/// Height in pixels of one line of text at the given scale
pub fn text_height(scale: u32) -> u32 {
    GLYPH_HEIGHT * scale.max(1)
}

/// Draw `text` with its top-left corner at (x, y); pixels outside the image are skipped
pub fn draw_text(image: &mut RgbImage, text: &str, x: i32, y: i32, color: [u8; 3], scale: u32) {
    let scale = scale.max(1) as i32;
    let (width, height) = (image.width() as i32, image.height() as i32);
    let color = Rgb(color);

    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else { continue };
        let origin_x = x + i as i32 * GLYPH_WIDTH as i32 * scale;

        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH as i32 {
                if bits & (0x80 >> col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = origin_x + col * scale + dx;
                        let py = y + row as i32 * scale + dy;
                        if px >= 0 && py >= 0 && px < width && py < height {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}

/// Filled rectangle spanning (x1, y1) to (x2, y2) inclusive; empty spans are ignored
fn fill_rect(image: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, color: Rgb<u8>) {
    if x2 < x1 || y2 < y1 {
        return;
    }
    let rect = Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32);
    draw_filled_rect_mut(image, rect, color);
}

/// Black text on bright colours, white text on dark ones
fn contrasting_text(color: [u8; 3]) -> [u8; 3] {
    let luma = 0.299 * color[0] as f32 + 0.587 * color[1] as f32 + 0.114 * color[2] as f32;
    if luma > 140.0 {
        [0, 0, 0]
    } else {
        [255, 255, 255]
    }
}

/// Box per detection in its denomination colour, tagged with `"<label> <conf>"`
pub fn draw_detection_boxes(image: &mut RgbImage, detections: &[BanknoteDetection]) {
    for det in detections {
        let [x1, y1, x2, y2] = det.bbox.map(|v| v.round() as i32);
        let w = x2 - x1;
        let h = y2 - y1;
        if w <= 0 || h <= 0 {
            continue;
        }

        let color = det.color();
        for t in 0..BOX_THICKNESS {
            if w - 2 * t <= 0 || h - 2 * t <= 0 {
                break;
            }
            let rect = Rect::at(x1 + t, y1 + t).of_size((w - 2 * t) as u32, (h - 2 * t) as u32);
            draw_hollow_rect_mut(image, rect, Rgb(color));
        }

        let tag = format!("{} {:.2}", det.class, det.confidence / 100.0);
        let tag_w = text_width(&tag, 1) as i32 + 2 * 2;
        let tag_h = text_height(1) as i32 + 2 * 2;

        // Above the box, or just inside it when the box touches the top edge
        let tag_y = if y1 - tag_h >= 0 { y1 - tag_h } else { y1 };
        fill_rect(image, x1, tag_y, x1 + tag_w - 1, tag_y + tag_h - 1, Rgb(color));
        draw_text(image, &tag, x1 + 2, tag_y + 2, contrasting_text(color), 1);
    }
}

/// One line of text per entry on a black background, starting at y=30 with a 35px step
///
/// Returns the baseline for whatever is drawn next.
pub fn draw_message_panel(image: &mut RgbImage, lines: &[(String, [u8; 3])]) -> i32 {
    let mut y_offset = PANEL_START_Y;
    let text_h = text_height(1) as i32;

    for (text, color) in lines {
        let text_w = text_width(text, 1) as i32;
        fill_rect(
            image,
            PANEL_X,
            y_offset - text_h - TEXT_PADDING,
            PANEL_X + text_w + 2 * TEXT_PADDING,
            y_offset + TEXT_PADDING,
            BLACK,
        );
        draw_text(image, text, PANEL_X + TEXT_PADDING, y_offset - text_h, *color, 1);
        y_offset += PANEL_STEP;
    }

    y_offset
}

/// Green box with `Total: $<amount> COP` at the given baseline; nothing is drawn for zero
pub fn draw_total(image: &mut RgbImage, total: u64, y_offset: i32) {
    if total == 0 {
        return;
    }

    let text = format!("Total: ${} COP", format_cop(total));
    let text_w = text_width(&text, 2) as i32;
    let right = (PANEL_X + 290).max(PANEL_X + text_w + 3 * TEXT_PADDING);

    fill_rect(image, PANEL_X, y_offset - 25, right, y_offset + 10, GREEN);
    draw_text(image, &text, PANEL_X + TEXT_PADDING, y_offset - 20, [0, 0, 0], 2);
}

/// `FPS: <fps>` in green at the bottom-left corner
pub fn draw_fps(image: &mut RgbImage, fps: f64) {
    let text = format!("FPS: {:.2}", fps);
    let y = image.height() as i32 - text_height(2) as i32 - 10;
    draw_text(image, &text, PANEL_X, y, GREEN.0, 2);
}
