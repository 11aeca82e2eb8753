//! Core data types shared by the engine, the session and the host surfaces

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Intrinsic page dimensions at scale 1, in PDF points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Scale and rotation applied to a page for rasterization
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub scale: f64,
    /// Rotation in degrees, normalized to 0, 90, 180 or 270
    pub rotation: u16,
    /// Output width in pixels (already rotated)
    pub width: f64,
    /// Output height in pixels (already rotated)
    pub height: f64,
}

impl Viewport {
    #[must_use]
    pub fn new(page: PageSize, scale: f64, rotation: i32) -> Self {
        let rotation = normalize_rotation(rotation);
        let (width, height) = if rotation % 180 == 0 {
            (page.width * scale, page.height * scale)
        } else {
            (page.height * scale, page.width * scale)
        };

        Self {
            scale,
            rotation,
            width,
            height,
        }
    }

    /// Pixel dimensions of the backing raster
    #[must_use]
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.floor().max(0.0) as u32,
            self.height.floor().max(0.0) as u32,
        )
    }
}

/// Snap an arbitrary angle to the nearest quarter turn in `0..360`
#[must_use]
pub fn normalize_rotation(degrees: i32) -> u16 {
    let quarter = ((degrees as f64) / 90.0).round() as i64;
    (quarter.rem_euclid(4) * 90) as u16
}

/// Rendered page pixels (packed RGB, row-major, no padding)
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Raster {
    /// A blank white raster of the given size
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0xFF; width as usize * height as usize * 3],
        }
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// What a render or annotation request is for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderIntent {
    Display,
    Print,
}

/// Where a link annotation points
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkTarget {
    /// Page inside the document (1-based)
    Page { number: usize },
    /// External URI
    Uri { uri: String },
}

/// Annotation rectangle in unscaled page space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotationRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl AnnotationRect {
    /// Rectangle in viewport pixels, rotated with the page (origin top-left,
    /// y growing downwards like the page's own coordinates)
    #[must_use]
    pub fn scaled(&self, viewport: &Viewport) -> Self {
        let s = viewport.scale;
        // Unrotated page extent in pixels
        let (w, h) = if viewport.rotation % 180 == 0 {
            (viewport.width, viewport.height)
        } else {
            (viewport.height, viewport.width)
        };

        let map = |x: f64, y: f64| match viewport.rotation {
            90 => (h - y * s, x * s),
            180 => (w - x * s, h - y * s),
            270 => (y * s, w - x * s),
            _ => (x * s, y * s),
        };
        let (ax, ay) = map(self.x0, self.y0);
        let (bx, by) = map(self.x1, self.y1);

        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationKind {
    Link(LinkTarget),
    Text { contents: String },
    Other { subtype: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub rect: AnnotationRect,
    pub kind: AnnotationKind,
}

/// Cooperative cancellation signal for a render operation.
///
/// Clones share the same flag. Engines poll [`CancelToken::is_cancelled`] and
/// fail with [`crate::pdf::EngineError::Cancelled`] once it trips.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_swaps_dimensions_on_quarter_turn() {
        let page = PageSize::new(400.0, 600.0);

        let upright = Viewport::new(page, 2.0, 0);
        assert_eq!((upright.width, upright.height), (800.0, 1200.0));

        let turned = Viewport::new(page, 2.0, 90);
        assert_eq!(turned.rotation, 90);
        assert_eq!((turned.width, turned.height), (1200.0, 800.0));
    }

    #[test]
    fn rotation_normalizes_negative_and_large_angles() {
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(360), 0);
        assert_eq!(normalize_rotation(180), 180);
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn annotation_rect_scales_and_orders_corners() {
        let rect = AnnotationRect {
            x0: 10.0,
            y0: 40.0,
            x1: 5.0,
            y1: 20.0,
        };
        let scaled = rect.scaled(&Viewport::new(PageSize::new(100.0, 100.0), 2.0, 0));
        assert_eq!(scaled.x0, 10.0);
        assert_eq!(scaled.y0, 40.0);
        assert_eq!(scaled.x1, 20.0);
        assert_eq!(scaled.y1, 80.0);
    }

    fn link_on_portrait_page(rotation: i32) -> AnnotationRect {
        let rect = AnnotationRect {
            x0: 10.0,
            y0: 10.0,
            x1: 50.0,
            y1: 20.0,
        };
        rect.scaled(&Viewport::new(PageSize::new(400.0, 600.0), 1.0, rotation))
    }

    #[test]
    fn annotation_rect_follows_quarter_turns() {
        let at = |r: AnnotationRect| (r.x0, r.y0, r.x1, r.y1);

        assert_eq!(at(link_on_portrait_page(0)), (10.0, 10.0, 50.0, 20.0));
        // 600x400 viewport: page top edge becomes the right edge
        assert_eq!(at(link_on_portrait_page(90)), (580.0, 10.0, 590.0, 50.0));
        assert_eq!(at(link_on_portrait_page(180)), (350.0, 580.0, 390.0, 590.0));
        // page top edge becomes the left edge
        assert_eq!(at(link_on_portrait_page(270)), (10.0, 350.0, 20.0, 390.0));
        assert_eq!(at(link_on_portrait_page(-90)), at(link_on_portrait_page(270)));
    }

    #[test]
    fn rotated_annotation_rect_scales_too() {
        let rect = AnnotationRect {
            x0: 10.0,
            y0: 10.0,
            x1: 50.0,
            y1: 20.0,
        };
        let scaled = rect.scaled(&Viewport::new(PageSize::new(400.0, 600.0), 2.0, 90));
        assert_eq!(
            (scaled.x0, scaled.y0, scaled.x1, scaled.y1),
            (1160.0, 20.0, 1180.0, 100.0)
        );
    }
}
