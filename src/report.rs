use crate::core_modules::statistics::ComparisonStatistics;
use std::path::PathBuf;

/// Details of a comparison that completed but did not satisfy the fail threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedComparison {
    pub statistics: ComparisonStatistics,
    /// The fixed-layout text report.
    pub report: String,
    /// Where the diff image was written.
    pub diff_path: PathBuf,
}

/// The primary output of `ImageComparator::compare`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed(ComparisonStatistics),
    Failed(FailedComparison),
}

impl Outcome {
    pub fn passed(&self) -> bool {
        matches!(self, Outcome::Passed(_))
    }

    pub fn statistics(&self) -> &ComparisonStatistics {
        match self {
            Outcome::Passed(statistics) => statistics,
            Outcome::Failed(failed) => &failed.statistics,
        }
    }

    pub fn diff_path(&self) -> Option<&PathBuf> {
        match self {
            Outcome::Passed(_) => None,
            Outcome::Failed(failed) => Some(&failed.diff_path),
        }
    }
}

/// Renders statistics into the fixed report layout.
pub fn format_report(statistics: &ComparisonStatistics) -> String {
    format!(
        "Failures:       {}\n\
         Warnings:       {}\n\
         Average error:  {}\n\
         RMS error:      {}\n\
         PSNR:           {}\n",
        statistics.failures,
        statistics.warnings,
        statistics.mean_error,
        statistics.rms_error,
        statistics.psnr,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_layout_is_fixed() {
        let statistics = ComparisonStatistics {
            failures: 10,
            warnings: 2,
            mean_error: 0.5,
            rms_error: 0.25,
            psnr: 12.5,
            ..ComparisonStatistics::default()
        };
        assert_eq!(
            format_report(&statistics),
            "Failures:       10\n\
             Warnings:       2\n\
             Average error:  0.5\n\
             RMS error:      0.25\n\
             PSNR:           12.5\n"
        );
    }

    #[test]
    fn identical_images_report_infinite_psnr() {
        let report = format_report(&ComparisonStatistics::default());
        assert!(report.starts_with("Failures:       0\n"));
        assert!(report.ends_with("PSNR:           inf\n"));
    }

    #[test]
    fn outcome_accessors() {
        let passed = Outcome::Passed(ComparisonStatistics::default());
        assert!(passed.passed());
        assert!(passed.diff_path().is_none());

        let failed = Outcome::Failed(FailedComparison {
            statistics: ComparisonStatistics {
                failures: 1,
                ..ComparisonStatistics::default()
            },
            report: String::new(),
            diff_path: PathBuf::from("a_diff.png"),
        });
        assert!(!failed.passed());
        assert_eq!(failed.statistics().failures, 1);
        assert_eq!(failed.diff_path(), Some(&PathBuf::from("a_diff.png")));
    }
}
