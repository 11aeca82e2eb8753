//! MuPDF-backed engine
//!
//! `mupdf::Document` cannot cross threads, so documents keep their bytes (or
//! path) and open a fresh instance for every page operation.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use mupdf::{Colorspace, Document, Matrix, Page, Pixmap};

use super::engine::{EngineError, PdfDocument, PdfEngine, PdfPage};
use super::source::{DocumentSource, LoadingTask, PasswordReason};
use super::types::{
    Annotation, AnnotationKind, AnnotationRect, CancelToken, LinkTarget, PageSize, Raster,
    RenderIntent, Viewport,
};

const PDF_MIME: &str = "application/pdf";

fn pdf_error(e: mupdf::error::Error) -> EngineError {
    EngineError::generic(e.to_string())
}

#[derive(Clone)]
enum Backing {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl Backing {
    fn from_source(source: &DocumentSource) -> Result<Self, EngineError> {
        match source {
            DocumentSource::Data(data) => Ok(Self::Bytes(data.clone())),
            DocumentSource::Url(url) => {
                if let Some(path) = url.strip_prefix("file://") {
                    return Ok(Self::Path(PathBuf::from(path)));
                }
                if url.contains("://") {
                    return Err(EngineError::generic(format!(
                        "{url}: only local files can be opened"
                    )));
                }
                Ok(Self::Path(PathBuf::from(url)))
            }
        }
    }

    fn open(&self) -> Result<Document, EngineError> {
        match self {
            Self::Path(path) => Document::open(path.to_string_lossy().as_ref()).map_err(pdf_error),
            Self::Bytes(data) => Document::from_bytes(data, PDF_MIME).map_err(pdf_error),
        }
    }

    fn len(&self) -> u64 {
        match self {
            Self::Path(path) => std::fs::metadata(path).map_or(0, |m| m.len()),
            Self::Bytes(data) => data.len() as u64,
        }
    }
}

/// Engine opening local PDF files and in-memory buffers with MuPDF
#[derive(Debug, Default)]
pub struct MupdfEngine;

impl MupdfEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn unlock(doc: &mut Document, task: &LoadingTask) -> Result<Option<String>, EngineError> {
        if !doc.needs_password().map_err(pdf_error)? {
            return Ok(None);
        }

        let mut attempt = task.options().password.clone();
        let mut reason = PasswordReason::NeedPassword;
        loop {
            if let Some(password) = attempt.take() {
                if doc.authenticate(&password).map_err(pdf_error)? {
                    return Ok(Some(password));
                }
                reason = PasswordReason::IncorrectPassword;
            }
            attempt = Some(
                task.request_password(reason)
                    .ok_or(EngineError::PasswordRequired)?,
            );
        }
    }
}

impl PdfEngine for MupdfEngine {
    fn open(&self, task: &LoadingTask) -> Result<Arc<dyn PdfDocument>, EngineError> {
        let backing = Backing::from_source(task.source())?;
        let total = backing.len();

        let mut doc = backing.open()?;
        task.report_progress(total, total);
        let password = Self::unlock(&mut doc, task)?;

        let count = doc.page_count().map_err(pdf_error)?;
        let count = usize::try_from(count).unwrap_or(0);
        debug!("mupdf opened document with {count} pages");

        Ok(Arc::new(MupdfDocument {
            inner: Arc::new(Inner { backing, password }),
            page_count: count,
            destroyed: AtomicBool::new(false),
        }))
    }
}

struct Inner {
    backing: Backing,
    password: Option<String>,
}

impl Inner {
    fn open(&self) -> Result<Document, EngineError> {
        let mut doc = self.backing.open()?;
        if let Some(password) = &self.password {
            doc.authenticate(password).map_err(pdf_error)?;
        }
        Ok(doc)
    }

    fn with_page<R>(
        &self,
        number: usize,
        f: impl FnOnce(&Page) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let doc = self.open()?;
        let index = i32::try_from(number.saturating_sub(1))
            .map_err(|_| EngineError::generic(format!("page {number} out of range")))?;
        let page = doc.load_page(index).map_err(pdf_error)?;
        f(&page)
    }
}

pub struct MupdfDocument {
    inner: Arc<Inner>,
    page_count: usize,
    destroyed: AtomicBool,
}

impl PdfDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page(&self, number: usize) -> Result<Arc<dyn PdfPage>, EngineError> {
        if self.is_destroyed() {
            return Err(EngineError::Destroyed);
        }
        if number == 0 || number > self.page_count {
            return Err(EngineError::InvalidPage {
                number,
                count: self.page_count,
            });
        }

        let size = self.inner.with_page(number, |page| {
            let bounds = page.bounds().map_err(pdf_error)?;
            Ok(PageSize::new(
                f64::from(bounds.x1 - bounds.x0),
                f64::from(bounds.y1 - bounds.y0),
            ))
        })?;

        Ok(Arc::new(MupdfPage {
            inner: self.inner.clone(),
            number,
            size,
        }))
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

pub struct MupdfPage {
    inner: Arc<Inner>,
    number: usize,
    size: PageSize,
}

impl PdfPage for MupdfPage {
    fn number(&self) -> usize {
        self.number
    }

    fn size(&self) -> PageSize {
        self.size
    }

    fn render(
        &self,
        viewport: &Viewport,
        _intent: RenderIntent,
        cancel: &CancelToken,
    ) -> Result<Raster, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let scale = viewport.scale as f32;
        let mut transform = Matrix::new_scale(scale, scale);
        transform.pre_rotate(f32::from(viewport.rotation));

        let raster = self.inner.with_page(self.number, |page| {
            let rgb = Colorspace::device_rgb();
            let pixmap = page
                .to_pixmap(&transform, &rgb, false, false)
                .map_err(pdf_error)?;
            pixmap_to_raster(&pixmap)
        })?;

        // MuPDF cannot be interrupted mid-page
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(raster)
    }

    fn annotations(&self, _intent: RenderIntent) -> Result<Vec<Annotation>, EngineError> {
        self.inner.with_page(self.number, |page| Ok(extract_links(page)))
    }
}

fn pixmap_to_raster(pixmap: &Pixmap) -> Result<Raster, EngineError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(EngineError::generic(format!(
            "unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    if width == 0 || height == 0 {
        return Ok(Raster::blank(0, 0));
    }
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(EngineError::generic("pixmap buffer size mismatch"));
    }

    let mut pixels = Vec::with_capacity(width * height * 3);
    for row in samples.chunks(stride).take(height) {
        let row = &row[..row_bytes];
        if n == 3 {
            pixels.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                pixels.extend_from_slice(&px[..3]);
            }
        }
    }

    Ok(Raster {
        width: pixmap.width(),
        height: pixmap.height(),
        pixels,
    })
}

fn extract_links(page: &Page) -> Vec<Annotation> {
    let links = match page.links() {
        Ok(links) => links,
        Err(e) => {
            warn!("reading links failed: {e}");
            return Vec::new();
        }
    };

    links
        .filter_map(|link| {
            let target = if let Some(dest) = link.dest {
                LinkTarget::Page {
                    number: dest.loc.page_number as usize + 1,
                }
            } else if !link.uri.is_empty() {
                LinkTarget::Uri {
                    uri: link.uri.clone(),
                }
            } else {
                return None;
            };

            let rect = link.bounds;
            if rect.is_empty() {
                return None;
            }

            Some(Annotation {
                rect: AnnotationRect {
                    x0: f64::from(rect.x0),
                    y0: f64::from(rect.y0),
                    x1: f64::from(rect.x1),
                    y1: f64::from(rect.y1),
                },
                kind: AnnotationKind::Link(target),
            })
        })
        .collect()
}
