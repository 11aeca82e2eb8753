//! Host-side collaborators: drawing surface, annotation overlay, container
//! geometry and print frames.
//!
//! All methods take `&self`; implementations are handles onto host objects and
//! use interior mutability. Only the session worker mutates them.

use crate::notification::{Emitter, Event};

use super::types::{Annotation, LinkTarget, Raster, Viewport};
use super::zoom::ContainerMetrics;

/// The canvas pages are drawn into
pub trait Surface: Send + Sync {
    /// Width the surface is displayed at, in CSS pixels
    fn displayed_width(&self) -> f64;

    /// Size of the backing raster in pixels
    fn raster_size(&self) -> (u32, u32);

    fn device_pixel_ratio(&self) -> f64 {
        1.0
    }

    /// Whether the surface is part of the live host tree
    fn is_attached(&self) -> bool {
        true
    }

    /// Set the backing raster size (clears content)
    fn resize(&self, width: u32, height: u32);

    fn draw(&self, raster: &Raster);

    fn clear(&self);

    /// Drop the explicit raster size and content
    fn reset(&self);

    /// Set the height the surface is displayed at, in CSS pixels
    fn set_display_height(&self, height: f64);
}

/// Layer holding interactive annotations above the surface
pub trait Overlay: Send + Sync {
    fn clear(&self);

    fn set_visible(&self, visible: bool);

    fn render(&self, annotations: &[Annotation], viewport: &Viewport, links: &LinkService);
}

/// Supplies the geometry around the viewer
pub trait Container: Send + Sync {
    fn metrics(&self) -> ContainerMetrics;
}

/// Fixed geometry, for hosts whose layout does not change
impl Container for ContainerMetrics {
    fn metrics(&self) -> ContainerMetrics {
        *self
    }
}

/// Creates off-screen documents for printing
pub trait PrintHost: Send + Sync {
    fn create_frame(&self) -> Result<Box<dyn PrintFrame>, String>;
}

/// A hidden document that is filled with page rasters then printed
pub trait PrintFrame: Send {
    fn set_title(&mut self, title: &str);

    fn inject_style(&mut self, css: &str);

    fn append_page(&mut self, raster: Raster);

    fn print(&mut self) -> Result<(), String>;

    /// Detach the frame from the host
    fn remove(&mut self);
}

/// Handed to the overlay so link clicks reach the host
#[derive(Clone, Debug)]
pub struct LinkService {
    emitter: Emitter,
    page_count: usize,
}

impl LinkService {
    pub(crate) fn new(emitter: Emitter, page_count: usize) -> Self {
        Self {
            emitter,
            page_count,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Follow a link. Internal targets emit `link-clicked`; returns false for
    /// targets the host has to handle (external URIs, out of range pages).
    pub fn navigate(&self, target: &LinkTarget) -> bool {
        match target {
            LinkTarget::Page { number } if (1..=self.page_count).contains(number) => {
                self.emitter.emit(Event::LinkClicked(*number));
                true
            }
            LinkTarget::Page { number } => {
                log::warn!(
                    "link to page {number} outside document ({} pages)",
                    self.page_count
                );
                false
            }
            LinkTarget::Uri { uri } => {
                log::debug!("external link {uri} left to host");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_links_emit_page_number() {
        let emitter = Emitter::new();
        let rx = emitter.subscribe();
        let links = LinkService::new(emitter, 5);

        assert!(links.navigate(&LinkTarget::Page { number: 4 }));
        assert!(!links.navigate(&LinkTarget::Page { number: 9 }));
        assert!(!links.navigate(&LinkTarget::Uri {
            uri: "https://example.org".into()
        }));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::LinkClicked(4)));
    }
}
