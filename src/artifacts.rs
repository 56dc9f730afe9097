//! Diagnostic artifact capture.
//!
//! Failing steps persist whatever external state they managed to collect -
//! scaffolder task logs, pipeline pod logs, pod manifests - under a
//! directory keyed by the run identifier, so a failed scenario always points
//! at an artifact location rather than a bare stack trace. Writing an
//! artifact never fails the run: errors are logged and swallowed.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Sink for diagnostic artifacts of a single scenario run.
#[derive(Clone, Debug)]
pub struct ArtifactSink {
    root: PathBuf,
    run_id: String,
}

impl ArtifactSink {
    /// Create a sink rooted at `root/<run_id>`.
    pub fn new(root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            run_id: run_id.into(),
        }
    }

    /// Directory this sink writes into.
    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.run_id)
    }

    /// Write one artifact under `<dir>/<category>/<file_name>`.
    ///
    /// Returns the written path, or `None` if the write failed; failures are
    /// logged and never escalate to the caller.
    pub fn write(&self, category: &str, file_name: &str, contents: &str) -> Option<PathBuf> {
        let dir = self.dir().join(category);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "Failed to create artifact directory");
            return None;
        }

        let path = dir.join(file_name);
        match std::fs::write(&path, contents) {
            Ok(()) => {
                debug!(path = %path.display(), "Wrote diagnostic artifact");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to write diagnostic artifact");
                None
            }
        }
    }

    /// Whether any artifact was written for this run.
    pub fn has_artifacts(&self) -> bool {
        self.dir().is_dir()
    }

    /// Root directory of all runs, for reporting.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_artifact_keyed_by_run_and_category() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = ArtifactSink::new(tmp.path(), "a1b2c3-go");

        let path = sink
            .write("backstage-tasks-logs", "github-a1b2c3-go.log", "task failed: boom")
            .unwrap();

        assert_eq!(
            path,
            tmp.path()
                .join("a1b2c3-go")
                .join("backstage-tasks-logs")
                .join("github-a1b2c3-go.log")
        );
        assert_eq!(std::fs::read_to_string(path).unwrap(), "task failed: boom");
        assert!(sink.has_artifacts());
    }

    #[test]
    fn unwritable_destination_is_swallowed() {
        // A root that is a file, not a directory, makes create_dir_all fail.
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let sink = ArtifactSink::new(&blocker, "run");
        assert!(sink.write("cat", "f.log", "contents").is_none());
        assert!(!sink.has_artifacts());
    }
}
