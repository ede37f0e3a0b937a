use miette::Diagnostic;
use thiserror::Error;

use events_db::{PrDayCounts, TrendingEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartFormat {
    Png,
    Svg,
}

impl ChartFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "png" => Some(ChartFormat::Png),
            "svg" => Some(ChartFormat::Svg),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ChartFormat::Png => "image/png",
            ChartFormat::Svg => "image/svg+xml",
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ChartError {
    #[error("no chart renderer is configured for this deployment")]
    Unavailable,
}

pub struct RenderedChart {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// §4.G: given a trending or timeline result and a format tag, produce a
/// byte stream whose MIME type matches the format. The core carries no
/// rendering logic; a real implementation is a drop-in replacement for
/// `NullChartRenderer`.
pub trait ChartRenderer: Send + Sync {
    fn render_trending(
        &self,
        entries: &[TrendingEntry],
        format: ChartFormat,
    ) -> Result<RenderedChart, ChartError>;

    fn render_pr_timeline(
        &self,
        days: &[PrDayCounts],
        format: ChartFormat,
    ) -> Result<RenderedChart, ChartError>;
}

/// Default renderer shipped with this workspace: always reports
/// `ChartError::Unavailable`, keeping the route wired end-to-end without a
/// dependency on any imaging crate.
pub struct NullChartRenderer;

impl ChartRenderer for NullChartRenderer {
    fn render_trending(
        &self,
        _entries: &[TrendingEntry],
        _format: ChartFormat,
    ) -> Result<RenderedChart, ChartError> {
        Err(ChartError::Unavailable)
    }

    fn render_pr_timeline(
        &self,
        _days: &[PrDayCounts],
        _format: ChartFormat,
    ) -> Result<RenderedChart, ChartError> {
        Err(ChartError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_known_values_only() {
        assert_eq!(ChartFormat::parse("png"), Some(ChartFormat::Png));
        assert_eq!(ChartFormat::parse("svg"), Some(ChartFormat::Svg));
        assert_eq!(ChartFormat::parse("bmp"), None);
    }

    #[test]
    fn null_renderer_always_reports_unavailable() {
        let renderer = NullChartRenderer;
        let err = renderer.render_trending(&[], ChartFormat::Png).unwrap_err();
        assert!(matches!(err, ChartError::Unavailable));
    }
}
