//! Print pipeline: rasterize selected pages at print resolution into a
//! temporary frame, then hand the frame to the host's print mechanism.

use std::ops::{Deref, DerefMut};

use rayon::prelude::*;

use super::engine::PdfDocument;
use super::request::ViewerError;
use super::surface::{PrintFrame, PrintHost};
use super::types::{CancelToken, PageSize, Raster, RenderIntent, Viewport};

pub const DEFAULT_PRINT_DPI: u32 = 150;

// 1in == 72pt == 96 CSS px
const POINTS_PER_INCH: f64 = 72.0;
const CSS_UNITS: f64 = 96.0 / 72.0;

/// Scale from PDF points to print pixels
#[must_use]
pub fn print_units(dpi: u32) -> f64 {
    f64::from(dpi) / POINTS_PER_INCH
}

/// Style sheet sizing printed pages after the first page of the document,
/// with the page's own rotation already applied
#[must_use]
pub fn page_style(first_page: PageSize, dpi: u32) -> String {
    let units = print_units(dpi);
    let width = first_page.width * units / CSS_UNITS;
    let height = first_page.height * units / CSS_UNITS;

    format!(
        "@supports ((size:A4) and (size:1pt 1pt)) {{\
            @page {{ margin: 1pt; size: {width}pt {height}pt; }}\
        }}\
        @media print {{\
            body {{ margin: 0 }}\
            canvas {{ page-break-before: avoid; page-break-after: always; page-break-inside: avoid }}\
        }}\
        @media screen {{\
            body {{ margin: 0 }}\
        }}"
    )
}

/// Pages to print, in document order. `None` selects every page; numbers
/// outside the document are ignored.
#[must_use]
pub fn selected_pages(page_count: usize, only: Option<&[usize]>) -> Vec<usize> {
    (1..=page_count)
        .filter(|n| only.is_none_or(|list| list.contains(n)))
        .collect()
}

/// Removes the frame from the host however printing ends
struct FrameGuard(Box<dyn PrintFrame>);

impl Deref for FrameGuard {
    type Target = dyn PrintFrame;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for FrameGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.0.remove();
    }
}

/// Print `pages` of `doc` at `dpi`. Returns the number of rasters printed.
pub fn print_document(
    doc: &dyn PdfDocument,
    host: &dyn PrintHost,
    dpi: u32,
    pages: Option<&[usize]>,
) -> Result<usize, ViewerError> {
    let mut frame = FrameGuard(host.create_frame().map_err(ViewerError::print_failure)?);
    frame.set_title("");

    let first = doc
        .page(1)
        .map_err(|e| ViewerError::print_failure(e.to_string()))?;
    let upright = Viewport::new(first.size(), 1.0, first.rotation());
    frame.inject_style(&page_style(
        PageSize::new(upright.width, upright.height),
        dpi,
    ));

    let units = print_units(dpi);
    let numbers = selected_pages(doc.page_count(), pages);
    log::debug!("printing pages {numbers:?} at {dpi} dpi");

    let rasters: Vec<Raster> = numbers
        .par_iter()
        .map(|&number| {
            let page = doc.page(number)?;
            let viewport = Viewport::new(page.size(), units, page.rotation());
            page.render(&viewport, RenderIntent::Print, &CancelToken::new())
        })
        .collect::<Result<_, _>>()
        .map_err(|e| ViewerError::print_failure(e.to_string()))?;

    let count = rasters.len();
    for raster in rasters {
        frame.append_page(raster);
    }
    frame.print().map_err(ViewerError::print_failure)?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_keeps_document_order_and_range() {
        assert_eq!(selected_pages(3, None), vec![1, 2, 3]);
        assert_eq!(selected_pages(3, Some(&[2])), vec![2]);
        assert_eq!(selected_pages(3, Some(&[3, 1, 7])), vec![1, 3]);
        assert!(selected_pages(0, None).is_empty());
    }

    #[test]
    fn style_sizes_pages_in_points() {
        // US letter at 72 dpi: 612x792pt scaled by 1 / (96/72)
        let css = page_style(PageSize::new(612.0, 792.0), 72);
        assert!(css.contains("size: 459pt 594pt"), "{css}");
        assert!(css.contains("page-break-after: always"));
    }

    #[test]
    fn print_units_follow_dpi() {
        assert_eq!(print_units(72), 1.0);
        assert_eq!(print_units(144), 2.0);
    }
}
