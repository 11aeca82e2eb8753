//! Scale descriptors and container-relative sizing
//!
//! A scale descriptor names how the page should be fitted into the hosting
//! container. The container geometry is passed in explicitly.

use serde::{Deserialize, Serialize};

use super::types::PageSize;

/// Fitting mode requested by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleAction {
    #[serde(rename = "page_scale_auto", alias = "auto")]
    Auto,
    #[serde(rename = "page_scale_actual", alias = "actual")]
    Actual,
    #[serde(rename = "page_scale_fit", alias = "fit")]
    Fit,
    #[serde(rename = "page_scale_width", alias = "width")]
    Width,
    #[serde(rename = "page_scale_percent", alias = "percent")]
    Percent,
}

/// Scale property value: an action plus the percentage for `Percent`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawScaleDescriptor", into = "RawScaleDescriptor")]
pub struct ScaleDescriptor {
    pub action: ScaleAction,
    pub percent: Option<f64>,
}

impl ScaleDescriptor {
    #[must_use]
    pub const fn new(action: ScaleAction) -> Self {
        Self {
            action,
            percent: None,
        }
    }

    #[must_use]
    pub const fn percent(percent: f64) -> Self {
        Self {
            action: ScaleAction::Percent,
            percent: Some(percent),
        }
    }

    #[must_use]
    pub const fn fit_width() -> Self {
        Self::new(ScaleAction::Width)
    }
}

#[derive(Serialize, Deserialize)]
struct RawScaleDescriptor {
    action: ScaleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<RawScaleArgs>,
}

#[derive(Serialize, Deserialize)]
struct RawScaleArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scale: Option<f64>,
}

impl From<RawScaleDescriptor> for ScaleDescriptor {
    fn from(raw: RawScaleDescriptor) -> Self {
        Self {
            action: raw.action,
            percent: raw.args.and_then(|a| a.scale),
        }
    }
}

impl From<ScaleDescriptor> for RawScaleDescriptor {
    fn from(desc: ScaleDescriptor) -> Self {
        Self {
            action: desc.action,
            args: desc.percent.map(|scale| RawScaleArgs { scale: Some(scale) }),
        }
    }
}

/// Geometry of the boxes around the drawing surface, in CSS pixels
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContainerMetrics {
    /// Width of the outer frame (dialog, pane) holding the viewer
    pub frame_width: f64,
    /// Height of the outer frame
    pub frame_height: f64,
    /// Offset of the viewer's content box inside the frame
    pub content_top: f64,
    /// Client width of the viewer's content box
    pub content_width: f64,
}

/// Width the page should be drawn at, or `None` when the descriptor or the
/// geometry cannot produce one.
#[must_use]
pub fn desired_width(
    descriptor: &ScaleDescriptor,
    page: PageSize,
    metrics: &ContainerMetrics,
    scroll_width: f64,
) -> Option<f64> {
    let width = match descriptor.action {
        ScaleAction::Auto | ScaleAction::Actual => metrics.frame_width - scroll_width,
        ScaleAction::Fit => {
            if page.height <= 0.0 {
                return None;
            }
            (metrics.frame_height - metrics.content_top) * page.width / page.height
        }
        ScaleAction::Width => metrics.content_width - scroll_width,
        ScaleAction::Percent => {
            let percent = descriptor.percent?;
            (metrics.content_width - scroll_width) * percent / 100.0
        }
    };

    (width.is_finite() && width > 0.0).then_some(width)
}

/// Scale factor that draws `page` at the descriptor's desired width
#[must_use]
pub fn scale_for(
    descriptor: &ScaleDescriptor,
    page: PageSize,
    metrics: &ContainerMetrics,
    scroll_width: f64,
) -> Option<f64> {
    if page.width <= 0.0 {
        return None;
    }
    desired_width(descriptor, page, metrics, scroll_width).map(|w| w / page.width)
}

/// Scale that fills `displayed_width` at the given device pixel ratio
#[must_use]
pub fn fit_displayed_width(displayed_width: f64, page: PageSize, pixel_ratio: f64) -> Option<f64> {
    if page.width <= 0.0 || displayed_width <= 0.0 {
        return None;
    }
    let ratio = if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 };
    Some(displayed_width / page.width * ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> ContainerMetrics {
        ContainerMetrics {
            frame_width: 1000.0,
            frame_height: 900.0,
            content_top: 100.0,
            content_width: 800.0,
        }
    }

    const PAGE: PageSize = PageSize::new(400.0, 800.0);

    #[test]
    fn width_fits_content_box() {
        let desc = ScaleDescriptor::fit_width();
        assert_eq!(scale_for(&desc, PAGE, &metrics(), 0.0), Some(2.0));
        assert_eq!(scale_for(&desc, PAGE, &metrics(), 10.0), Some(790.0 / 400.0));
    }

    #[test]
    fn auto_and_actual_fit_frame() {
        for action in [ScaleAction::Auto, ScaleAction::Actual] {
            let desc = ScaleDescriptor::new(action);
            assert_eq!(desired_width(&desc, PAGE, &metrics(), 10.0), Some(990.0));
        }
    }

    #[test]
    fn fit_uses_available_height() {
        let desc = ScaleDescriptor::new(ScaleAction::Fit);
        // 800px of height for a 1:2 page -> 400px wide
        assert_eq!(desired_width(&desc, PAGE, &metrics(), 10.0), Some(400.0));
        assert_eq!(scale_for(&desc, PAGE, &metrics(), 10.0), Some(1.0));
    }

    #[test]
    fn percent_scales_content_width() {
        let desc = ScaleDescriptor::percent(50.0);
        assert_eq!(desired_width(&desc, PAGE, &metrics(), 0.0), Some(400.0));

        let missing = ScaleDescriptor::new(ScaleAction::Percent);
        assert_eq!(desired_width(&missing, PAGE, &metrics(), 0.0), None);
    }

    #[test]
    fn degenerate_geometry_yields_nothing() {
        let desc = ScaleDescriptor::fit_width();
        assert_eq!(
            scale_for(&desc, PAGE, &ContainerMetrics::default(), 10.0),
            None
        );
        assert_eq!(scale_for(&desc, PageSize::new(0.0, 10.0), &metrics(), 0.0), None);
    }

    #[test]
    fn displayed_width_fit_honours_pixel_ratio() {
        assert_eq!(fit_displayed_width(400.0, PAGE, 2.0), Some(2.0));
        assert_eq!(fit_displayed_width(400.0, PAGE, 0.0), Some(1.0));
        assert_eq!(fit_displayed_width(0.0, PAGE, 1.0), None);
    }

    #[test]
    fn descriptor_deserializes_from_tagged_form() {
        let desc: ScaleDescriptor = serde_json::from_str(
            r#"{ "action": "page_scale_percent", "args": { "scale": 150 } }"#,
        )
        .unwrap();
        assert_eq!(desc, ScaleDescriptor::percent(150.0));

        let short: ScaleDescriptor = serde_json::from_str(r#"{ "action": "fit" }"#).unwrap();
        assert_eq!(short, ScaleDescriptor::new(ScaleAction::Fit));
    }
}
