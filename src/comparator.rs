// THEORY:
// The `comparator` module is the top-level API of the engine. An
// `ImageComparator` owns two image buffers, a candidate and a baseline, and
// runs them through a strictly linear pipeline:
//
//   load -> channel reduction -> geometry check -> blur -> statistics -> classify
//        -> (on failure) diff artifact -> report
//
// Stage 1, the blur, exists because renders carry sub-pixel jitter from
// antialiasing and sampling noise. That jitter is invisible but numerically
// large; a gaussian pre-filter suppresses it so the statistics measure
// structure, not noise.
//
// The buffers are replaced in place by each blur. Calling `compare` twice on
// one instance therefore blurs twice, and the second result describes the
// doubly blurred pair. `blur_passes` reports how many passes the buffers have
// received so callers can tell.
//
// A failed comparison is an ordinary outcome, not an error. Only when the
// caller asks for strict mode (`raise_on_failure`) is it converted into
// `CompareError::ImageDifference`.

use crate::config::{CompareOptions, ComparisonConfig};
use crate::core_modules::backend::{ImageCrateBackend, ImagingBackend, is_effective_blur};
use crate::core_modules::statistics::ComparisonStatistics;
use crate::error::{CompareError, Result};
use crate::report::{FailedComparison, Outcome, format_report};
use std::fs;
use std::path::{Path, PathBuf};

/// Lifecycle of a comparator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparatorState {
    /// Buffers loaded and reduced to RGB; nothing compared yet.
    Constructed,
    /// Buffers blurred; statistics not yet classified.
    Blurred,
    /// The last comparison had no failing samples.
    Passed,
    /// The last comparison had at least one failing sample.
    Failed,
}

/// Compares a candidate render against a baseline.
pub struct ImageComparator<B: ImagingBackend = ImageCrateBackend> {
    backend: B,
    config: ComparisonConfig,
    candidate: B::Buffer,
    baseline: B::Buffer,
    candidate_path: PathBuf,
    baseline_path: PathBuf,
    /// The candidate's extension including the leading dot, or empty.
    extension: String,
    statistics: ComparisonStatistics,
    state: ComparatorState,
    blur_passes: u32,
}

impl ImageComparator<ImageCrateBackend> {
    /// Loads both images with default thresholds.
    pub fn new(candidate: impl AsRef<Path>, baseline: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(candidate, baseline, ComparisonConfig::default())
    }

    pub fn with_config(
        candidate: impl AsRef<Path>,
        baseline: impl AsRef<Path>,
        config: ComparisonConfig,
    ) -> Result<Self> {
        Self::with_backend(ImageCrateBackend, candidate, baseline, config)
    }
}

impl<B: ImagingBackend> ImageComparator<B> {
    /// Loads both images through `backend` and strips every channel but R, G and B.
    pub fn with_backend(
        backend: B,
        candidate: impl AsRef<Path>,
        baseline: impl AsRef<Path>,
        config: ComparisonConfig,
    ) -> Result<Self> {
        let candidate_path = candidate.as_ref().to_path_buf();
        let baseline_path = baseline.as_ref().to_path_buf();

        if config.thresholds_inverted() {
            log::warn!(
                "warn threshold {} is above fail threshold {}; no sample can be a warning",
                config.warn_threshold,
                config.fail_threshold
            );
        }

        let candidate = backend.select_rgb(backend.load(&candidate_path)?);
        let baseline = backend.select_rgb(backend.load(&baseline_path)?);

        let extension = candidate_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        Ok(Self {
            backend,
            config,
            candidate,
            baseline,
            candidate_path,
            baseline_path,
            extension,
            statistics: ComparisonStatistics::default(),
            state: ComparatorState::Constructed,
            blur_passes: 0,
        })
    }

    /// Runs the comparison pipeline.
    ///
    /// Returns `Outcome::Passed` when no sample exceeds the fail threshold.
    /// Otherwise the diff image is written and the result is either
    /// `Outcome::Failed` or, with `raise_on_failure`, an
    /// `Err(CompareError::ImageDifference)` carrying the report.
    pub fn compare(&mut self, options: &CompareOptions) -> Result<Outcome> {
        // Stage 0: Geometry check, before anything touches the buffers
        let candidate_dims = self.backend.dimensions(&self.candidate);
        let baseline_dims = self.backend.dimensions(&self.baseline);
        if candidate_dims != baseline_dims {
            self.statistics = ComparisonStatistics::default();
            return Err(CompareError::DimensionMismatch {
                candidate: candidate_dims,
                baseline: baseline_dims,
            });
        }

        // Stage 1: Pre-filter
        self.blur_images(options.blur_size);

        // Stage 2: Statistics
        self.statistics = ComparisonStatistics::compute(
            self.backend.samples(&self.candidate),
            self.backend.samples(&self.baseline),
            candidate_dims.0,
            self.backend.channels(&self.candidate),
            self.config.fail_threshold,
            self.config.warn_threshold,
        );
        log::debug!(
            "{} vs {}: {} failures, {} warnings over {} samples",
            self.candidate_path.display(),
            self.baseline_path.display(),
            self.statistics.failures,
            self.statistics.warnings,
            self.statistics.samples
        );

        // Stage 3: Classification
        if self.statistics.passed() {
            self.state = ComparatorState::Passed;
            return Ok(Outcome::Passed(self.statistics.clone()));
        }
        self.state = ComparatorState::Failed;

        // Stage 4: Diff artifact
        let output_dir = self.output_dir(options.diff_output_dir.as_deref());
        fs::create_dir_all(&output_dir).map_err(|source| CompareError::OutputDirectory {
            path: output_dir.clone(),
            source,
        })?;
        let diff_path = self.artifact_path(&output_dir, "diff");
        let diff = self.render_diff();
        self.backend.write(&diff, &diff_path)?;

        if self.config.write_debug_images {
            let candidate_debug = self.artifact_path(&output_dir, "candidate_debug");
            let baseline_debug = self.artifact_path(&output_dir, "baseline_debug");
            self.backend.write(&self.candidate, &candidate_debug)?;
            self.backend.write(&self.baseline, &baseline_debug)?;
        }

        // Stage 5: Report
        let report = format_report(&self.statistics);
        if options.raise_on_failure {
            return Err(CompareError::ImageDifference {
                report,
                statistics: self.statistics.clone(),
                diff_path,
            });
        }
        log::info!(
            "{} differs from {}\n{}",
            self.candidate_path.display(),
            self.baseline_path.display(),
            report
        );
        Ok(Outcome::Failed(FailedComparison {
            statistics: self.statistics.clone(),
            report,
            diff_path,
        }))
    }

    /// Blurs both buffers in place.
    pub fn blur_images(&mut self, size: f32) {
        self.candidate = self.backend.blur(&self.candidate, size);
        self.baseline = self.backend.blur(&self.baseline, size);
        if is_effective_blur(size) {
            self.blur_passes += 1;
        }
        self.state = ComparatorState::Blurred;
    }

    /// |candidate - baseline|, colormapped, amplified and laid over the candidate.
    fn render_diff(&self) -> B::Buffer {
        let difference = self
            .backend
            .absolute_difference(&self.candidate, &self.baseline);
        let mapped = self.backend.colormap(&difference, self.config.colormap);
        let amplified = self
            .backend
            .multiply(&mapped, self.config.diff_amplification);
        self.backend.add(&self.candidate, &amplified)
    }

    fn output_dir(&self, requested: Option<&Path>) -> PathBuf {
        match requested {
            Some(dir) => dir.to_path_buf(),
            None => match self.candidate_path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        }
    }

    fn artifact_path(&self, dir: &Path, suffix: &str) -> PathBuf {
        let stem = self
            .candidate_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        dir.join(format!("{stem}_{suffix}{}", self.extension))
    }

    /// The path the diff image is written to for a given output directory.
    pub fn diff_path(&self, diff_output_dir: Option<&Path>) -> PathBuf {
        self.artifact_path(&self.output_dir(diff_output_dir), "diff")
    }

    /// Statistics of the most recent comparison.
    pub fn statistics(&self) -> &ComparisonStatistics {
        &self.statistics
    }

    pub fn state(&self) -> ComparatorState {
        self.state
    }

    /// How many non-trivial blurs the buffers have received.
    pub fn blur_passes(&self) -> u32 {
        self.blur_passes
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    pub fn candidate_path(&self) -> &Path {
        &self.candidate_path
    }

    pub fn baseline_path(&self) -> &Path {
        &self.baseline_path
    }

    pub fn candidate(&self) -> &B::Buffer {
        &self.candidate
    }

    pub fn baseline(&self) -> &B::Buffer {
        &self.baseline
    }
}
