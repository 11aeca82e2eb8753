//! Host objects that work without a display: an in-memory surface that can
//! be saved as PNG, an overlay that keeps the last annotation set, and a
//! print host that writes each printed page to a directory.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, anyhow};
use image::RgbImage;
use log::{debug, info};

use crate::pdf::{
    Annotation, AnnotationRect, LinkService, Overlay, PrintFrame, PrintHost, Raster, Surface,
    Viewport,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn save_png(raster: &Raster, path: &Path) -> Result<()> {
    let image = RgbImage::from_raw(raster.width, raster.height, raster.pixels.clone())
        .ok_or_else(|| anyhow!("raster buffer does not match {}x{}", raster.width, raster.height))?;
    image
        .save(path)
        .with_context(|| format!("writing {}", path.display()))
}

#[derive(Default)]
struct SurfaceState {
    raster: Option<Raster>,
    size: (u32, u32),
    display_height: f64,
}

/// Surface backed by a pixel buffer
pub struct ImageSurface {
    displayed_width: f64,
    pixel_ratio: f64,
    state: Mutex<SurfaceState>,
}

impl ImageSurface {
    /// A surface displayed `displayed_width` CSS pixels wide
    #[must_use]
    pub fn new(displayed_width: f64, pixel_ratio: f64) -> Self {
        Self {
            displayed_width,
            pixel_ratio,
            state: Mutex::new(SurfaceState::default()),
        }
    }

    pub fn raster(&self) -> Option<Raster> {
        lock(&self.state).raster.clone()
    }

    pub fn display_height(&self) -> f64 {
        lock(&self.state).display_height
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let raster = self.raster().context("nothing has been rendered")?;
        save_png(&raster, path)
    }
}

impl Surface for ImageSurface {
    fn displayed_width(&self) -> f64 {
        self.displayed_width
    }

    fn raster_size(&self) -> (u32, u32) {
        lock(&self.state).size
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    fn resize(&self, width: u32, height: u32) {
        let mut state = lock(&self.state);
        state.size = (width, height);
        state.raster = None;
    }

    fn draw(&self, raster: &Raster) {
        let mut state = lock(&self.state);
        state.size = (raster.width, raster.height);
        state.raster = Some(raster.clone());
    }

    fn clear(&self) {
        let mut state = lock(&self.state);
        let (width, height) = state.size;
        state.raster = Some(Raster::blank(width, height));
    }

    fn reset(&self) {
        *lock(&self.state) = SurfaceState::default();
    }

    fn set_display_height(&self, height: f64) {
        lock(&self.state).display_height = height;
    }
}

/// Overlay that keeps the annotations of the last rendered page, in viewport
/// pixels
#[derive(Default)]
pub struct AnnotationList {
    items: Mutex<Vec<(AnnotationRect, Annotation)>>,
    visible: Mutex<bool>,
}

impl AnnotationList {
    pub fn items(&self) -> Vec<(AnnotationRect, Annotation)> {
        lock(&self.items).clone()
    }

    pub fn is_visible(&self) -> bool {
        *lock(&self.visible)
    }
}

impl Overlay for AnnotationList {
    fn clear(&self) {
        lock(&self.items).clear();
    }

    fn set_visible(&self, visible: bool) {
        *lock(&self.visible) = visible;
    }

    fn render(&self, annotations: &[Annotation], viewport: &Viewport, _links: &LinkService) {
        let mut items = lock(&self.items);
        items.clear();
        items.extend(
            annotations
                .iter()
                .map(|a| (a.rect.scaled(viewport), a.clone())),
        );
        debug!("overlay holds {} annotations", items.len());
    }
}

/// Print host writing `page-NNN.png` files
pub struct PngPrintHost {
    dir: PathBuf,
}

impl PngPrintHost {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PrintHost for PngPrintHost {
    fn create_frame(&self) -> Result<Box<dyn PrintFrame>, String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("creating {}: {e}", self.dir.display()))?;
        Ok(Box::new(PngFrame {
            dir: self.dir.clone(),
            title: String::new(),
            style: String::new(),
            pages: Vec::new(),
        }))
    }
}

struct PngFrame {
    dir: PathBuf,
    title: String,
    style: String,
    pages: Vec<Raster>,
}

impl PrintFrame for PngFrame {
    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn inject_style(&mut self, css: &str) {
        self.style = css.to_string();
    }

    fn append_page(&mut self, raster: Raster) {
        self.pages.push(raster);
    }

    fn print(&mut self) -> Result<(), String> {
        for (index, raster) in self.pages.iter().enumerate() {
            let path = self.dir.join(format!("page-{:03}.png", index + 1));
            save_png(raster, &path).map_err(|e| format!("{e:#}"))?;
        }
        info!(
            "wrote {} pages to {} (title {:?})",
            self.pages.len(),
            self.dir.display(),
            self.title
        );
        Ok(())
    }

    fn remove(&mut self) {
        self.pages.clear();
        self.style.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_saves_last_raster() {
        let dir = tempfile::tempdir().unwrap();
        let surface = ImageSurface::new(100.0, 1.0);
        assert!(surface.save_png(&dir.path().join("none.png")).is_err());

        surface.resize(4, 2);
        surface.draw(&Raster::blank(4, 2));
        let path = dir.path().join("page.png");
        surface.save_png(&path).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 2));
    }

    #[test]
    fn reset_forgets_size() {
        let surface = ImageSurface::new(100.0, 1.0);
        surface.resize(10, 20);
        surface.reset();
        assert_eq!(surface.raster_size(), (0, 0));
        assert!(surface.raster().is_none());
    }

    #[test]
    fn print_host_writes_one_file_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let host = PngPrintHost::new(dir.path().join("out"));
        let mut frame = host.create_frame().unwrap();
        frame.append_page(Raster::blank(2, 2));
        frame.append_page(Raster::blank(2, 2));
        frame.print().unwrap();
        frame.remove();

        assert!(dir.path().join("out/page-001.png").exists());
        assert!(dir.path().join("out/page-002.png").exists());
    }
}
