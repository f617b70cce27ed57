use crate::core_modules::colormap::Colormap;
use crate::error::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_FAIL_THRESHOLD: f64 = 0.1;
pub const DEFAULT_WARN_THRESHOLD: f64 = 0.01;
pub const DEFAULT_DIFF_AMPLIFICATION: f32 = 5.0;
pub const DEFAULT_BLUR_SIZE: f32 = 10.0;

pub const ENV_FAIL_THRESHOLD: &str = "RENDER_DIFF_FAIL_THRESHOLD";
pub const ENV_WARN_THRESHOLD: &str = "RENDER_DIFF_WARN_THRESHOLD";
pub const ENV_AMPLIFICATION: &str = "RENDER_DIFF_AMPLIFICATION";

/// Construction-time configuration of an `ImageComparator`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonConfig {
    /// A sample whose absolute difference exceeds this value is a failure.
    pub fail_threshold: f64,
    /// A sample above this value but not above `fail_threshold` is a warning.
    pub warn_threshold: f64,
    /// Multiplier applied to the colormapped difference before it is blended
    /// onto the candidate.
    pub diff_amplification: f32,
    pub colormap: Colormap,
    /// Also write the blurred candidate and baseline next to the diff image.
    pub write_debug_images: bool,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            fail_threshold: DEFAULT_FAIL_THRESHOLD,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            diff_amplification: DEFAULT_DIFF_AMPLIFICATION,
            colormap: Colormap::default(),
            write_debug_images: false,
        }
    }
}

impl ComparisonConfig {
    pub fn with_fail_threshold(mut self, threshold: f64) -> Self {
        self.fail_threshold = threshold;
        self
    }

    pub fn with_warn_threshold(mut self, threshold: f64) -> Self {
        self.warn_threshold = threshold;
        self
    }

    pub fn with_diff_amplification(mut self, amplification: f32) -> Self {
        self.diff_amplification = amplification;
        self
    }

    pub fn with_colormap(mut self, colormap: Colormap) -> Self {
        self.colormap = colormap;
        self
    }

    pub fn with_debug_images(mut self, enabled: bool) -> Self {
        self.write_debug_images = enabled;
        self
    }

    /// Defaults overridden by `RENDER_DIFF_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by the `RENDER_DIFF_*` names.
    /// Blank values are ignored.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = parse_override(&lookup, ENV_FAIL_THRESHOLD)? {
            self.fail_threshold = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_WARN_THRESHOLD)? {
            self.warn_threshold = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_AMPLIFICATION)? {
            self.diff_amplification = value as f32;
        }
        Ok(self)
    }

    /// True when the warn threshold sits above the fail threshold, which
    /// makes the warning band empty.
    pub fn thresholds_inverted(&self) -> bool {
        self.warn_threshold > self.fail_threshold
    }
}

fn parse_override(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<f64>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

/// Per-call options for `ImageComparator::compare`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareOptions {
    /// Where the diff image goes. Defaults to the candidate's directory.
    pub diff_output_dir: Option<PathBuf>,
    /// Width in pixels of the gaussian pre-filter. Zero disables blurring.
    pub blur_size: f32,
    /// Turn a failed comparison into `CompareError::ImageDifference`.
    pub raise_on_failure: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            diff_output_dir: None,
            blur_size: DEFAULT_BLUR_SIZE,
            raise_on_failure: true,
        }
    }
}

impl CompareOptions {
    pub fn with_diff_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diff_output_dir = Some(dir.into());
        self
    }

    pub fn with_blur_size(mut self, size: f32) -> Self {
        self.blur_size = size;
        self
    }

    pub fn with_raise_on_failure(mut self, raise: bool) -> Self {
        self.raise_on_failure = raise;
        self
    }
}
