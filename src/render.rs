//! Frame annotation.
//!
//! Draws onto a copy of the captured frame:
//! - a white status band with the current mode,
//! - red thick boxes for defects, green boxes for normal items,
//! - thin gray boxes for ignored detections (debug mode only).
//!
//! Text needs a TrueType font. Without one, boxes and the band are still drawn.

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

use crate::classify::{ClassifiedDetection, Decision, FrameClassification};
use crate::detect::BoundingBox;
use crate::frame::Frame;
use crate::session::Mode;

pub const STATUS_BAND_HEIGHT: u32 = 40;

pub const DEFECT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const NORMAL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const IGNORED_COLOR: Rgb<u8> = Rgb([128, 128, 128]);
const BAND_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const DEBUG_TEXT_COLOR: Rgb<u8> = Rgb([100, 100, 100]);
const FILTER_TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const LABEL_SCALE: f32 = 18.0;
const STATUS_SCALE: f32 = 24.0;

#[derive(Default)]
pub struct Renderer {
    font: Option<FontVec>,
}

impl Renderer {
    /// Renderer without text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer that labels boxes using the TrueType/OpenType font at `path`.
    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read font file {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow!("invalid font file {}: {}", path.display(), e))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw the overlay for one frame. The frame itself is left untouched.
    pub fn annotate(
        &self,
        frame: &Frame,
        classification: &FrameClassification,
        mode: Mode,
    ) -> RgbImage {
        let mut canvas = frame.to_canvas();
        self.draw_status(&mut canvas, mode);

        for entry in &classification.entries {
            if entry.decision == Decision::Ignored && !mode.is_debug() {
                continue;
            }
            self.draw_entry(&mut canvas, entry);
        }
        canvas
    }

    fn draw_status(&self, canvas: &mut RgbImage, mode: Mode) {
        let band_height = STATUS_BAND_HEIGHT.min(canvas.height());
        if canvas.width() == 0 || band_height == 0 {
            return;
        }
        draw_filled_rect_mut(
            canvas,
            Rect::at(0, 0).of_size(canvas.width(), band_height),
            BAND_COLOR,
        );
        if let Some(font) = &self.font {
            let color = if mode.is_debug() {
                DEBUG_TEXT_COLOR
            } else {
                FILTER_TEXT_COLOR
            };
            draw_text_mut(
                canvas,
                color,
                10,
                8,
                PxScale::from(STATUS_SCALE),
                font,
                mode.status_text(),
            );
        }
    }

    fn draw_entry(&self, canvas: &mut RgbImage, entry: &ClassifiedDetection) {
        let detection = &entry.detection;
        let (color, thickness, label) = match entry.decision {
            Decision::Defect => (
                DEFECT_COLOR,
                4,
                format!("DEFECT! {} {:.2}", detection.label, detection.confidence),
            ),
            Decision::Normal => (
                NORMAL_COLOR,
                2,
                format!("{} {:.2}", detection.label, detection.confidence),
            ),
            Decision::Ignored => (IGNORED_COLOR, 1, format!("{} (Ignored)", detection.label)),
        };

        draw_box(canvas, detection.bbox, color, thickness);

        if let Some(font) = &self.font {
            let y = (detection.bbox.y1 - 10 - LABEL_SCALE as i32).max(0);
            draw_text_mut(
                canvas,
                color,
                detection.bbox.x1.max(0),
                y,
                PxScale::from(LABEL_SCALE),
                font,
                &label,
            );
        }
    }
}

/// Draw a rectangle border, growing inward by `thickness` pixels.
fn draw_box(canvas: &mut RgbImage, bbox: BoundingBox, color: Rgb<u8>, thickness: u32) {
    for t in 0..thickness as i32 {
        let x1 = bbox.x1 + t;
        let y1 = bbox.y1 + t;
        let x2 = bbox.x2 - t;
        let y2 = bbox.y2 - t;
        if x2 <= x1 || y2 <= y1 {
            break;
        }
        let rect = Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify, LabelPolicy};
    use crate::detect::Detection;

    fn blank_frame() -> Frame {
        Frame::from_rgb(vec![0u8; 200 * 120 * 3], 200, 120, 1).unwrap()
    }

    fn classification() -> FrameClassification {
        classify(
            vec![
                Detection::new("shirt", 0.9, BoundingBox::new(10, 50, 60, 100)),
                Detection::new("stain", 0.5, BoundingBox::new(70, 50, 120, 100)),
                Detection::new("dog", 0.8, BoundingBox::new(130, 50, 180, 100)),
            ],
            &LabelPolicy::default(),
        )
    }

    #[test]
    fn debug_mode_draws_every_box() {
        let frame = blank_frame();
        let canvas = Renderer::new().annotate(&frame, &classification(), Mode::Debug);

        assert_eq!(*canvas.get_pixel(10, 70), NORMAL_COLOR);
        assert_eq!(*canvas.get_pixel(70, 70), DEFECT_COLOR);
        assert_eq!(*canvas.get_pixel(73, 70), DEFECT_COLOR);
        assert_eq!(*canvas.get_pixel(130, 70), IGNORED_COLOR);
        assert_eq!(*canvas.get_pixel(131, 70), Rgb([0, 0, 0]));
    }

    #[test]
    fn filter_mode_hides_ignored_boxes() {
        let frame = blank_frame();
        let canvas = Renderer::new().annotate(&frame, &classification(), Mode::Filter);

        assert_eq!(*canvas.get_pixel(130, 70), Rgb([0, 0, 0]));
        assert_eq!(*canvas.get_pixel(10, 70), NORMAL_COLOR);
    }

    #[test]
    fn status_band_is_drawn_and_frame_untouched() {
        let frame = blank_frame();
        let canvas = Renderer::new().annotate(&frame, &FrameClassification::default(), Mode::Debug);

        assert_eq!(*canvas.get_pixel(5, 5), BAND_COLOR);
        assert_eq!(*canvas.get_pixel(5, STATUS_BAND_HEIGHT), Rgb([0, 0, 0]));
        assert_eq!(*frame.image().get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let frame = blank_frame();
        let classification = classify(
            vec![Detection::new("shirt", 0.9, BoundingBox::new(60, 60, 60, 90))],
            &LabelPolicy::default(),
        );
        let canvas = Renderer::new().annotate(&frame, &classification, Mode::Debug);
        assert_eq!(*canvas.get_pixel(60, 70), Rgb([0, 0, 0]));
    }

    #[test]
    fn default_renderer_has_no_font() {
        assert!(!Renderer::new().has_font());
    }

    #[test]
    fn missing_font_file_is_an_error() {
        assert!(Renderer::with_font_file(Path::new("/nonexistent/font.ttf")).is_err());
    }
}
