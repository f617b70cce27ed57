use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 9] = ["png", "jpg", "jpeg", "tif", "tiff", "exr", "bmp", "tga", "webp"];

/// A render and its reference, matched by path relative to their roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub relative: PathBuf,
    pub candidate: Option<PathBuf>,
    pub baseline: Option<PathBuf>,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Image files under `root`, keyed by their path relative to it.
fn collect(root: &Path) -> Result<BTreeMap<PathBuf, PathBuf>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?
            .to_path_buf();
        files.insert(relative, entry.path().to_path_buf());
    }
    Ok(files)
}

/// Matches every image under `candidates` with the same relative path under
/// `baselines`. Files present on only one side come back incomplete.
pub fn discover(candidates: &Path, baselines: &Path) -> Result<Vec<Pair>> {
    let mut candidate_files = collect(candidates)?;
    let baseline_files = collect(baselines)?;

    let mut pairs = Vec::with_capacity(candidate_files.len().max(baseline_files.len()));
    for (relative, baseline) in baseline_files {
        let candidate = candidate_files.remove(&relative);
        pairs.push(Pair {
            relative,
            candidate,
            baseline: Some(baseline),
        });
    }
    for (relative, candidate) in candidate_files {
        pairs.push(Pair {
            relative,
            candidate: Some(candidate),
            baseline: None,
        });
    }
    pairs.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn pairs_by_relative_path() {
        let root = TempDir::new().unwrap();
        let candidates = root.path().join("renders");
        let baselines = root.path().join("baselines");

        touch(&candidates.join("a.png"));
        touch(&baselines.join("a.png"));
        touch(&candidates.join("nested/b.PNG"));
        touch(&baselines.join("nested/b.PNG"));
        touch(&candidates.join("only_render.png"));
        touch(&baselines.join("only_reference.exr"));
        touch(&candidates.join("notes.txt"));

        let pairs = discover(&candidates, &baselines).unwrap();
        let names: Vec<_> = pairs.iter().map(|p| p.relative.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.png"),
                PathBuf::from("nested/b.PNG"),
                PathBuf::from("only_reference.exr"),
                PathBuf::from("only_render.png"),
            ]
        );
        assert!(pairs[0].candidate.is_some() && pairs[0].baseline.is_some());
        assert!(pairs[1].candidate.is_some() && pairs[1].baseline.is_some());
        assert!(pairs[2].candidate.is_none());
        assert!(pairs[3].baseline.is_none());
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = TempDir::new().unwrap();
        assert!(discover(&root.path().join("nope"), root.path()).is_err());
    }
}
