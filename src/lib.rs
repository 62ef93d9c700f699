//! Pagediff Comparison Engine
//!
//! A visual-regression engine for paginated documents. It renders an
//! "actual" document and an "expected" baseline to per-page raster
//! images, caches the baseline pages under a content fingerprint so an
//! unchanged baseline is never re-rendered, and produces a per-page
//! difference ratio plus a visual diff artifact for every mismatching
//! page.
//!
//! # Features
//!
//! - **Fingerprinted baseline cache**: rendered baseline pages are
//!   reused across runs as long as the source bytes are unchanged
//! - **Tolerant diffing**: page-count and dimension mismatches degrade
//!   to proportionate difference ratios instead of hard failures
//! - **Overlapped I/O**: artifact writes are fire-and-forget tasks
//!   joined explicitly through [`Comparator::idle`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagediff::{CapabilityRegistry, Comparator, ComparisonOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> pagediff::Result<()> {
//! let registry = Arc::new(CapabilityRegistry::with_defaults());
//! let mut cmp = Comparator::new(
//!     registry,
//!     "baseline/report.png",
//!     "output/report.png",
//!     ComparisonOptions::default(),
//! );
//! let points = cmp.exec().await?;
//! cmp.idle().await?;
//! for point in &points {
//!     println!("{}: {:.4}", point.name, point.ratio);
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod hash;
pub use hash::Encoding;

pub mod capability;
pub use capability::{CapabilityRegistry, DocumentCapability, PngDocument};

pub mod pixel;

pub mod compare;
pub use compare::{compare_images, Comparison};

pub mod cache;
pub use cache::{CachedPage, PageCache};

pub mod comparator;
pub use comparator::{Comparator, ComparisonOptions};

pub mod batch;
pub use batch::{
    BatchComparator, BatchOptions, BatchProgress, BatchTask, TestCase, TestReport, TestStatus,
};

pub mod report;
pub use report::{JsonReportWriter, ReportWriter, ReportWriterRegistry};

/// An RGB color used when rendering diff images
pub type RgbColor = [u8; 3];

/// Configuration passed through to the pixel-diff primitive
///
/// `tolerance` is the document-level threshold over the per-page ratio;
/// everything else controls pixel-level comparison and diff-image
/// rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiffOptions {
    /// Image-level threshold over the difference ratio (0 to 1). Two
    /// documents match when every page's ratio stays at or below it.
    pub tolerance: f64,
    /// Pixel-level threshold (0 to 1). Smaller is more sensitive.
    pub sensitivity: f64,
    /// Disable detecting and ignoring anti-aliased pixels.
    #[serde(rename = "includeAA")]
    pub include_aa: bool,
    /// Blending factor of unchanged pixels in the diff output, from 0
    /// (pure white) to 1 (original brightness).
    pub alpha: f64,
    /// Color of anti-aliased pixels in the diff output.
    pub aa_color: RgbColor,
    /// Color of differing pixels in the diff output.
    pub diff_color: RgbColor,
    /// Alternative color for dark-on-light differences, to tell "added"
    /// apart from "removed". All differences use `diff_color` when unset.
    pub diff_color_alt: Option<RgbColor>,
    /// Draw the diff over a transparent background instead of over the
    /// blended expected image.
    pub diff_mask: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.001,
            sensitivity: 0.1,
            include_aa: false,
            alpha: 0.1,
            aa_color: [255, 255, 0],
            diff_color: [255, 0, 0],
            diff_color_alt: None,
            diff_mask: false,
        }
    }
}

/// Phase of a comparison run, reported through the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Rendering the baseline into the page cache (invalid cache only)
    Preparing,
    /// Copying baseline pages into the run's output directory
    Copying,
    /// Rendering actual pages into the run's output directory
    Converting,
    /// Comparing a page pair; may carry a per-page error
    Comparing,
}

/// Progress of one phase: 1-based counters plus an optional per-page error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub limit: usize,
    pub error: Option<String>,
}

impl Progress {
    pub fn at(current: usize, limit: usize) -> Self {
        Self {
            current,
            limit,
            error: None,
        }
    }
}

/// One page-level comparison result
///
/// `ratio` is mismatched pixels over the compared area, in `[0, 1]`.
/// `NaN` marks a per-page comparison failure; `1.0` marks a page present
/// on only one side. `diff` is set only when a diff artifact was written
/// (ratio above zero).
#[derive(Debug, Clone, Serialize)]
pub struct TestPoint {
    pub name: String,
    pub expected: PathBuf,
    pub actual: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<PathBuf>,
    pub ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_diff_options() {
        let options = DiffOptions::default();
        assert_eq!(options.tolerance, 0.001);
        assert_eq!(options.sensitivity, 0.1);
        assert!(!options.include_aa);
        assert_eq!(options.diff_color, [255, 0, 0]);
        assert!(options.diff_color_alt.is_none());
    }

    #[test]
    fn diff_options_deserialize_camel_case() {
        let options: DiffOptions =
            serde_json::from_str(r#"{"includeAA":true,"diffMask":true,"sensitivity":0.2}"#)
                .unwrap();
        assert!(options.include_aa);
        assert!(options.diff_mask);
        assert_eq!(options.sensitivity, 0.2);
        assert_eq!(options.tolerance, 0.001);
    }

    #[test]
    fn nan_ratio_serializes_as_null() {
        let point = TestPoint {
            name: "Page 1".into(),
            expected: "expected/0.png".into(),
            actual: "actual/0.png".into(),
            diff: None,
            ratio: f64::NAN,
        };
        let json = serde_json::to_value(&point).unwrap();
        assert!(json["ratio"].is_null());
        assert!(json.get("diff").is_none());
    }
}
