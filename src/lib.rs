// THEORY:
// This file is the main entry point for the `render_diff` library crate.
// It defines the public API consumed by test harnesses and by the
// `visual_tester` command-line front end.
//
// The primary export is `ImageComparator`: it owns a candidate and a baseline
// image, runs them through a fixed pipeline (channel reduction, blur,
// statistics, classification) and, when the images disagree, writes a
// visualized difference image next to them. Everything that touches pixels
// goes through the `ImagingBackend` trait in `core_modules`, so the
// comparator itself only carries policy: thresholds, naming, reporting.
//
// The `batch` module runs many independent comparators on a worker pool for
// suites with hundreds of reference images.

pub mod batch;
pub mod comparator;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod report;

pub use comparator::{ComparatorState, ImageComparator};
pub use config::{CompareOptions, ComparisonConfig};
pub use core_modules::backend::{
    Frame, ImageCrateBackend, ImagingBackend, MIN_BLUR_SIZE, SampleDepth, is_effective_blur,
};
pub use core_modules::colormap::Colormap;
pub use core_modules::statistics::ComparisonStatistics;
pub use error::{CompareError, ConfigError, Result};
pub use report::{FailedComparison, Outcome, format_report};
