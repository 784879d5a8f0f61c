//! Bounding box and label drawing

use ab_glyph::{FontVec, PxScale};
use hemascope_core::AnnotationConfig;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::detection::Detection;
use crate::utils::panic_message;

const OUTLINE_WIDTH: i32 = 3;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const DEFAULT_COLOR: Rgb<u8> = Rgb([0x88, 0x88, 0x88]);

/// Fonts tried in order when no font path is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Outline color for a class label
pub fn class_color(class_name: &str) -> Rgb<u8> {
    match class_name {
        "Platelets" => Rgb([0xFF, 0xD7, 0x00]),
        "RBC" => Rgb([0xFF, 0x6B, 0x6B]),
        "WBC" => Rgb([0x4E, 0xCD, 0xC4]),
        _ => DEFAULT_COLOR,
    }
}

/// Tag text for a detection, e.g. `RBC: 87.3%`
pub fn label_text(detection: &Detection) -> String {
    format!(
        "{}: {:.1}%",
        detection.class_name,
        detection.confidence * 100.0
    )
}

/// Draws detections onto copies of frames
pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    pub fn new(config: &AnnotationConfig) -> Self {
        let font = match &config.font_path {
            Some(path) => load_font(path).or_else(|| {
                warn!("Could not load font {:?}; trying system fonts", path);
                load_system_font()
            }),
            None => load_system_font(),
        };

        if font.is_none() {
            warn!("No usable font found; labels will be drawn without text");
        }

        Self {
            font,
            scale: PxScale::from(config.font_size.max(1.0)),
        }
    }

    /// Annotator that draws label tags without text
    pub fn without_font(font_size: f32) -> Self {
        Self {
            font: None,
            scale: PxScale::from(font_size.max(1.0)),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw every detection onto a copy of `image`. Drawing failures fall
    /// back to an unmodified copy.
    pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut canvas = image.clone();
            for detection in detections {
                self.draw_detection(&mut canvas, detection);
            }
            canvas
        }));

        match outcome {
            Ok(canvas) => canvas,
            Err(payload) => {
                warn!("Error drawing detections: {}", panic_message(payload));
                image.clone()
            }
        }
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection) {
        let color = class_color(&detection.class_name);
        let [x1, y1, x2, y2] = detection.bbox.map(|v| v.round() as i32);

        for inset in 0..OUTLINE_WIDTH {
            let width = (x2 - x1 + 1 - 2 * inset).max(1) as u32;
            let height = (y2 - y1 + 1 - 2 * inset).max(1) as u32;
            let rect = Rect::at(x1 + inset, y1 + inset).of_size(width, height);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        let text = label_text(detection);
        let (text_w, text_h) = self.measure(&text);
        let tag = Rect::at(x1, y1 - text_h as i32 - 4).of_size(text_w + 8, text_h + 4);
        draw_filled_rect_mut(canvas, tag, color);

        if let Some(font) = &self.font {
            draw_text_mut(
                canvas,
                TEXT_COLOR,
                x1 + 4,
                y1 - text_h as i32 - 2,
                self.scale,
                font,
                &text,
            );
        }
    }

    /// Rendered text extent, approximated from the font size when no font
    /// is loaded. Never zero.
    fn measure(&self, text: &str) -> (u32, u32) {
        let (w, h) = match &self.font {
            Some(font) => text_size(self.scale, font, text),
            None => {
                let size = self.scale.y;
                ((text.chars().count() as f32 * size * 0.6) as u32, size as u32)
            }
        };
        (w.max(1), h.max(1))
    }
}

fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = std::fs::read(path).ok()?;
    match FontVec::try_from_vec(bytes) {
        Ok(font) => {
            debug!("Loaded annotation font {:?}", path);
            Some(font)
        }
        Err(e) => {
            warn!("Invalid font file {:?}: {}", path, e);
            None
        }
    }
}

fn load_system_font() -> Option<FontVec> {
    SYSTEM_FONTS
        .iter()
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .find_map(|p| load_font(&p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(bbox: [f32; 4], confidence: f32, class_name: &str) -> Detection {
        Detection {
            bbox,
            confidence,
            class_id: 1,
            class_name: class_name.to_string(),
        }
    }

    #[test]
    fn test_class_palette() {
        assert_eq!(class_color("Platelets"), Rgb([255, 215, 0]));
        assert_eq!(class_color("RBC"), Rgb([255, 107, 107]));
        assert_eq!(class_color("WBC"), Rgb([78, 205, 196]));
        assert_eq!(class_color("unknown"), DEFAULT_COLOR);
    }

    #[test]
    fn test_label_text_format() {
        let d = detection([0.0, 0.0, 1.0, 1.0], 0.8734, "RBC");
        assert_eq!(label_text(&d), "RBC: 87.3%");
    }

    #[test]
    fn test_annotate_does_not_modify_input() {
        let image = RgbImage::new(100, 100);
        let annotator = Annotator::without_font(16.0);
        let out = annotator.annotate(&image, &[detection([20.0, 40.0, 60.0, 80.0], 0.9, "WBC")]);

        assert_eq!(out.dimensions(), image.dimensions());
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
        assert_eq!(*out.get_pixel(20, 60), class_color("WBC"));
        assert_eq!(*out.get_pixel(22, 60), class_color("WBC"));
        assert_eq!(*out.get_pixel(40, 60), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotate_without_detections_is_copy() {
        let mut image = RgbImage::new(10, 10);
        image.put_pixel(3, 3, Rgb([9, 9, 9]));
        let out = Annotator::without_font(16.0).annotate(&image, &[]);
        assert_eq!(out, image);
    }

    #[test]
    fn test_degenerate_and_offscreen_boxes() {
        let image = RgbImage::new(50, 50);
        let annotator = Annotator::without_font(16.0);
        let detections = vec![
            detection([10.0, 10.0, 10.0, 10.0], 0.7, "RBC"),
            detection([40.0, 5.0, 200.0, 300.0], 0.7, "Platelets"),
            detection([-30.0, -30.0, -5.0, -5.0], 0.7, "bogus"),
        ];
        let out = annotator.annotate(&image, &detections);
        assert_eq!(out.dimensions(), (50, 50));
    }

    #[test]
    fn test_measure_never_zero() {
        let annotator = Annotator::without_font(0.0);
        let (w, h) = annotator.measure("");
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn test_missing_font_path_still_builds() {
        let config = AnnotationConfig {
            font_path: Some(PathBuf::from("/nonexistent/font.ttf")),
            font_size: 16.0,
        };
        let annotator = Annotator::new(&config);
        let out = annotator.annotate(
            &RgbImage::new(80, 80),
            &[detection([30.0, 30.0, 60.0, 60.0], 0.5, "RBC")],
        );
        assert_eq!(out.dimensions(), (80, 80));
    }
}
