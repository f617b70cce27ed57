mod logger;
mod pairs;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use render_diff::batch::{BatchRunner, BatchSummary, ComparisonJob, JobResult};
use render_diff::{
    Colormap, CompareError, CompareOptions, ComparisonConfig, ComparisonStatistics,
    FailedComparison, ImageComparator, Outcome, format_report,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const EXIT_PASS: i32 = 0;
const EXIT_FAIL: i32 = 1;
const EXIT_ERROR: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "visual_tester",
    about = "Compare rendered images against baselines and write diff images for failures"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare one candidate image against one baseline
    Compare(CompareArgs),
    /// Compare every image under a directory against its baseline counterpart
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// The freshly rendered image
    candidate: PathBuf,

    /// The reference image
    baseline: PathBuf,

    #[command(flatten)]
    tuning: Tuning,

    /// Path to write the statistics as JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Directory of rendered images (searched recursively)
    #[arg(long)]
    candidates: PathBuf,

    /// Directory of reference images with the same relative layout
    #[arg(long)]
    baselines: PathBuf,

    #[command(flatten)]
    tuning: Tuning,

    /// Number of parallel comparisons. Defaults to the CPU count.
    #[arg(long)]
    jobs: Option<usize>,

    /// Path to write the batch report as JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ColormapArg {
    Inferno,
    Heat,
    Grayscale,
}

impl From<ColormapArg> for Colormap {
    fn from(arg: ColormapArg) -> Self {
        match arg {
            ColormapArg::Inferno => Colormap::Inferno,
            ColormapArg::Heat => Colormap::Heat,
            ColormapArg::Grayscale => Colormap::Grayscale,
        }
    }
}

/// Flags shared by `compare` and `batch`.
#[derive(Args, Debug)]
struct Tuning {
    /// Directory for diff images. Defaults to the candidate's directory.
    #[arg(long)]
    diff_dir: Option<PathBuf>,

    /// Gaussian pre-filter width in pixels (below 2 disables)
    #[arg(long, default_value_t = render_diff::config::DEFAULT_BLUR_SIZE)]
    blur: f32,

    /// Per-sample difference above which a sample fails. Defaults to
    /// RENDER_DIFF_FAIL_THRESHOLD or 0.1.
    #[arg(long)]
    fail_threshold: Option<f64>,

    /// Per-sample difference above which a sample warns. Defaults to
    /// RENDER_DIFF_WARN_THRESHOLD or 0.01.
    #[arg(long)]
    warn_threshold: Option<f64>,

    /// Multiplier for the colormapped difference. Defaults to
    /// RENDER_DIFF_AMPLIFICATION or 5.
    #[arg(long)]
    amplification: Option<f32>,

    #[arg(long, value_enum, default_value_t = ColormapArg::Inferno)]
    colormap: ColormapArg,

    /// Report failures but exit successfully
    #[arg(long)]
    no_raise: bool,

    /// Also write the blurred candidate and baseline next to each diff image
    #[arg(long)]
    debug_images: bool,
}

impl Tuning {
    fn config(&self) -> Result<ComparisonConfig> {
        let mut config = ComparisonConfig::from_env()?
            .with_colormap(self.colormap.into())
            .with_debug_images(self.debug_images);
        if let Some(threshold) = self.fail_threshold {
            config = config.with_fail_threshold(threshold);
        }
        if let Some(threshold) = self.warn_threshold {
            config = config.with_warn_threshold(threshold);
        }
        if let Some(amplification) = self.amplification {
            config = config.with_diff_amplification(amplification);
        }
        Ok(config)
    }

    /// Options for one comparison. `relative_dir` mirrors a batch entry's
    /// subdirectory under the diff directory.
    fn options(&self, relative_dir: Option<&Path>) -> CompareOptions {
        let diff_output_dir = match (&self.diff_dir, relative_dir) {
            (Some(dir), Some(relative)) => Some(dir.join(relative)),
            (Some(dir), None) => Some(dir.clone()),
            (None, _) => None,
        };
        CompareOptions {
            diff_output_dir,
            blur_size: self.blur,
            raise_on_failure: !self.no_raise,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum EntryStatus {
    Pass,
    Fail,
    MissingCandidate,
    MissingBaseline,
    Error,
}

impl EntryStatus {
    fn label(&self) -> &'static str {
        match self {
            EntryStatus::Pass => "PASS",
            EntryStatus::Fail => "FAIL",
            EntryStatus::MissingCandidate => "MISSING-CANDIDATE",
            EntryStatus::MissingBaseline => "MISSING-BASELINE",
            EntryStatus::Error => "ERROR",
        }
    }
}

#[derive(Serialize, Debug)]
struct EntryReport {
    name: String,
    status: EntryStatus,
    candidate: Option<String>,
    baseline: Option<String>,
    diff: Option<String>,
    statistics: Option<ComparisonStatistics>,
    error: Option<String>,
}

#[derive(Serialize, Debug, Default)]
struct Totals {
    passed: usize,
    failed: usize,
    errored: usize,
    missing: usize,
}

#[derive(Serialize, Debug)]
struct BatchReport {
    candidates: String,
    baselines: String,
    totals: Totals,
    results: Vec<EntryReport>,
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    match run(cli.command) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(EXIT_ERROR);
        }
    }
}

fn run(command: Command) -> Result<i32> {
    match command {
        Command::Compare(args) => run_compare(args),
        Command::Batch(args) => run_batch(args),
    }
}

/// Folds a strict-mode `ImageDifference` back into a failed outcome.
fn into_outcome(result: render_diff::Result<Outcome>) -> render_diff::Result<Outcome> {
    match result {
        Err(CompareError::ImageDifference {
            report,
            statistics,
            diff_path,
        }) => Ok(Outcome::Failed(FailedComparison {
            statistics,
            report,
            diff_path,
        })),
        other => other,
    }
}

fn run_compare(args: CompareArgs) -> Result<i32> {
    let config = args.tuning.config()?;
    let options = args.tuning.options(None);

    let mut comparator = ImageComparator::with_config(&args.candidate, &args.baseline, config)?;
    let outcome = into_outcome(comparator.compare(&options)).with_context(|| {
        format!(
            "comparing {} against {}",
            args.candidate.display(),
            args.baseline.display()
        )
    })?;

    let status = if outcome.passed() {
        EntryStatus::Pass
    } else {
        EntryStatus::Fail
    };
    println!("{} {}", status.label(), args.candidate.display());
    print!("{}", format_report(outcome.statistics()));
    if let Some(diff) = outcome.diff_path() {
        println!("Diff image:     {}", diff.display());
    }

    if let Some(json_path) = &args.json {
        let entry = EntryReport {
            name: args.candidate.display().to_string(),
            status,
            candidate: Some(args.candidate.display().to_string()),
            baseline: Some(args.baseline.display().to_string()),
            diff: outcome.diff_path().map(|p| p.display().to_string()),
            statistics: Some(outcome.statistics().clone()),
            error: None,
        };
        write_json(json_path, &entry)?;
    }

    Ok(exit_code(outcome.passed(), args.tuning.no_raise))
}

fn exit_code(all_passed: bool, no_raise: bool) -> i32 {
    if all_passed || no_raise {
        EXIT_PASS
    } else {
        EXIT_FAIL
    }
}

fn run_batch(args: BatchArgs) -> Result<i32> {
    let config = args.tuning.config()?;
    let pairs = pairs::discover(&args.candidates, &args.baselines)?;
    if pairs.is_empty() {
        log::warn!("no images found under {}", args.candidates.display());
    }

    let mut entries = Vec::with_capacity(pairs.len());
    let mut jobs = Vec::new();
    let mut job_names = Vec::new();
    for pair in pairs {
        let name = pair.relative.display().to_string();
        match (&pair.candidate, &pair.baseline) {
            (Some(candidate), Some(baseline)) => {
                let options = args.tuning.options(pair.relative.parent());
                jobs.push(
                    ComparisonJob::new(candidate, baseline)
                        .with_config(config.clone())
                        .with_options(options),
                );
                job_names.push(name);
            }
            (candidate, baseline) => {
                let status = if candidate.is_none() {
                    EntryStatus::MissingCandidate
                } else {
                    EntryStatus::MissingBaseline
                };
                entries.push(EntryReport {
                    name,
                    status,
                    candidate: candidate.as_ref().map(|p| p.display().to_string()),
                    baseline: baseline.as_ref().map(|p| p.display().to_string()),
                    diff: None,
                    statistics: None,
                    error: None,
                });
            }
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting the comparison runtime")?;
    let results = runtime.block_on(async {
        let runner = match args.jobs {
            Some(count) => BatchRunner::new(count),
            None => BatchRunner::with_cpu_count(),
        };
        runner.run(jobs).await
    });

    let summary = BatchSummary::from_results(&results);
    for (name, result) in job_names.into_iter().zip(results) {
        entries.push(entry_for(name, result));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut totals = Totals {
        passed: summary.passed,
        failed: summary.failed,
        errored: summary.errored,
        missing: 0,
    };
    for entry in &entries {
        if matches!(
            entry.status,
            EntryStatus::MissingCandidate | EntryStatus::MissingBaseline
        ) {
            totals.missing += 1;
        }
        match &entry.error {
            Some(error) => println!("{:<18} {} ({error})", entry.status.label(), entry.name),
            None => println!("{:<18} {}", entry.status.label(), entry.name),
        }
    }
    println!(
        "{} passed, {} failed, {} errors, {} missing",
        totals.passed, totals.failed, totals.errored, totals.missing
    );

    let all_passed = summary.all_passed() && totals.missing == 0;
    if let Some(json_path) = &args.json {
        let report = BatchReport {
            candidates: args.candidates.display().to_string(),
            baselines: args.baselines.display().to_string(),
            totals,
            results: entries,
        };
        write_json(json_path, &report)?;
    }

    Ok(exit_code(all_passed, args.tuning.no_raise))
}

fn entry_for(name: String, result: JobResult) -> EntryReport {
    let candidate = Some(result.candidate.display().to_string());
    let baseline = Some(result.baseline.display().to_string());
    match into_outcome(result.outcome) {
        Ok(outcome) => EntryReport {
            name,
            status: if outcome.passed() {
                EntryStatus::Pass
            } else {
                EntryStatus::Fail
            },
            candidate,
            baseline,
            diff: outcome.diff_path().map(|p| p.display().to_string()),
            statistics: Some(outcome.statistics().clone()),
            error: None,
        },
        Err(err) => EntryReport {
            name,
            status: EntryStatus::Error,
            candidate,
            baseline,
            diff: None,
            statistics: None,
            error: Some(err.to_string()),
        },
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning(diff_dir: Option<&str>) -> Tuning {
        Tuning {
            diff_dir: diff_dir.map(PathBuf::from),
            blur: 10.0,
            fail_threshold: Some(0.2),
            warn_threshold: None,
            amplification: Some(12.0),
            colormap: ColormapArg::Heat,
            no_raise: false,
            debug_images: true,
        }
    }

    #[test]
    fn flags_override_config() {
        let config = tuning(None).config().unwrap();
        assert_eq!(config.fail_threshold, 0.2);
        assert_eq!(config.diff_amplification, 12.0);
        assert_eq!(config.colormap, Colormap::Heat);
        assert!(config.write_debug_images);
    }

    #[test]
    fn batch_entries_mirror_their_subdirectory() {
        let options = tuning(Some("diffs")).options(Some(Path::new("suite/page")));
        assert_eq!(options.diff_output_dir, Some(PathBuf::from("diffs/suite/page")));
        assert!(options.raise_on_failure);

        let options = tuning(None).options(Some(Path::new("suite")));
        assert_eq!(options.diff_output_dir, None);
    }

    #[test]
    fn strict_failures_fold_into_outcomes() {
        let statistics = ComparisonStatistics {
            failures: 2,
            ..ComparisonStatistics::default()
        };
        let folded = into_outcome(Err(CompareError::ImageDifference {
            report: format_report(&statistics),
            statistics,
            diff_path: PathBuf::from("x_diff.png"),
        }))
        .unwrap();
        assert!(!folded.passed());
        assert_eq!(folded.statistics().failures, 2);

        let fault = into_outcome(Err(CompareError::Worker("gone".to_string())));
        assert!(fault.is_err());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(true, false), EXIT_PASS);
        assert_eq!(exit_code(false, false), EXIT_FAIL);
        assert_eq!(exit_code(false, true), EXIT_PASS);
    }

    #[test]
    fn cli_parses_compare_flags() {
        let cli = Cli::try_parse_from([
            "visual_tester",
            "-vv",
            "compare",
            "render.png",
            "reference.png",
            "--blur",
            "0",
            "--colormap",
            "grayscale",
            "--no-raise",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Compare(args) => {
                assert_eq!(args.candidate, PathBuf::from("render.png"));
                assert_eq!(args.tuning.blur, 0.0);
                assert!(args.tuning.no_raise);
                assert!(matches!(args.tuning.colormap, ColormapArg::Grayscale));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
