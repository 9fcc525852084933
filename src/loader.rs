//! Stub definition loading from a directory tree.
//!
//! Every regular file under the root is one stub definition. Bad files are
//! logged and skipped; they never stop the walk.

use crate::config::{LoaderSettings, Stub};
use crate::storage::StubRepository;
use globset::GlobSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a directory walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Stubs registered
    pub loaded: usize,
    /// Files that could not be read or parsed
    pub skipped: usize,
}

/// Walks a stub directory and registers what it finds.
pub struct StubLoader {
    exclude: GlobSet,
}

impl StubLoader {
    /// Create a loader from settings.
    pub fn new(settings: &LoaderSettings) -> anyhow::Result<Self> {
        Ok(Self {
            exclude: settings.exclude_set()?,
        })
    }

    /// Recursively load every stub file under `root` into the repository.
    ///
    /// Entries are visited in file-name order and a subdirectory is walked
    /// where it sorts, so `a_dir/x.json` registers before `b.json`.
    pub async fn load_dir(&self, root: &Path, repository: &StubRepository) -> LoadReport {
        let mut report = LoadReport::default();
        let mut stack = Vec::new();

        match read_dir_sorted(root).await {
            Ok(entries) => stack.push(entries.into_iter()),
            Err(e) => warn!(path = %root.display(), error = %e, "Can't read stub directory"),
        }

        while let Some(entries) = stack.last_mut() {
            let Some((path, is_dir)) = entries.next() else {
                stack.pop();
                continue;
            };

            if is_dir {
                match read_dir_sorted(&path).await {
                    Ok(entries) => stack.push(entries.into_iter()),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Can't read stub directory")
                    }
                }
                continue;
            }

            let relative = path.strip_prefix(root).unwrap_or(path.as_path());
            if self.exclude.is_match(relative) {
                debug!(path = %path.display(), "Excluded stub file");
                continue;
            }

            match read_stub(&path).await {
                Ok(stub) => {
                    debug!(
                        path = %path.display(),
                        service = %stub.service,
                        method = %stub.method,
                        "Loaded stub"
                    );
                    repository.register(stub);
                    report.loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Error when reading stub file, skipping");
                    report.skipped += 1;
                }
            }
        }

        info!(
            root = %root.display(),
            loaded = report.loaded,
            skipped = report.skipped,
            "Stub directory loaded"
        );
        report
    }
}

/// Directory entries sorted by file name, flagged when they are directories.
async fn read_dir_sorted(dir: &Path) -> std::io::Result<Vec<(PathBuf, bool)>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let is_dir = match entry.file_type().await {
            Ok(file_type) => file_type.is_dir(),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Can't stat stub entry");
                false
            }
        };
        entries.push((entry.path(), is_dir));
    }
    entries.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(entries)
}

/// Parse one stub file; YAML by extension, JSON otherwise.
async fn read_stub(path: &Path) -> anyhow::Result<Stub> {
    let content = tokio::fs::read_to_string(path).await?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let stub = if is_yaml {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    Ok(stub)
}
