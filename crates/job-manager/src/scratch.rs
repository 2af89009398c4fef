//! Job-scoped scratch storage: where the input is written, where the computation writes its
//! output, and how the output artifacts are found afterwards.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use error_stack::{Report, ResultExt};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{event, Level};

use crate::settings::ArtifactLayout;

const INPUT_DIR: &str = "input";
const OUTPUT_DIR: &str = "output";
const DEFAULT_INPUT_NAME: &str = "input";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScratchError {
    #[error("Failed to create scratch directory")]
    Create,
    #[error("Failed to write input file")]
    WriteInput,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("missing artifact: no output directory contains {0}")]
    MarkerNotFound(String),
    #[error("missing artifact: {0}")]
    MissingArtifact(String),
    #[error("failed to search for artifacts")]
    Search,
}

/// An isolated directory that belongs to a single job. It is deleted when the [Scratch] is
/// reclaimed or dropped, whichever happens first, and never more than once.
///
/// Dropping an unreclaimed [Scratch] also marks it abandoned, so that a [ScratchLease] held by
/// a computation that is still running can delete whatever that computation writes later.
#[derive(Debug)]
pub struct Scratch {
    dir: Option<TempDir>,
    root: PathBuf,
    abandoned: Arc<AtomicBool>,
}

impl Scratch {
    /// Create a fresh scratch directory inside `parent`, or inside the system temporary
    /// directory if `parent` is `None`.
    pub fn create(parent: Option<&Path>) -> Result<Self, Report<ScratchError>> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("stemsplit-");
        let dir = match parent {
            Some(parent) => builder
                .tempdir_in(parent)
                .change_context(ScratchError::Create)
                .attach_printable_lazy(|| parent.display().to_string())?,
            None => builder.tempdir().change_context(ScratchError::Create)?,
        };

        let root = dir.path().to_path_buf();
        for subdir in [INPUT_DIR, OUTPUT_DIR] {
            std::fs::create_dir(root.join(subdir))
                .change_context(ScratchError::Create)
                .attach_printable_lazy(|| format!("Failed to create {subdir} directory"))?;
        }

        Ok(Scratch {
            dir: Some(dir),
            root,
            abandoned: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A handle for whoever writes into this directory after the owner may have gone.
    pub fn lease(&self) -> ScratchLease {
        ScratchLease {
            root: self.root.clone(),
            abandoned: self.abandoned.clone(),
        }
    }

    /// The root of the scratch directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The directory the computation writes its output into. This is kept apart from the
    /// input so that an input file can never be mistaken for an artifact.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Write the input payload into the scratch directory and return its path. Only the final
    /// component of `name` is used.
    pub async fn materialize(
        &self,
        bytes: &[u8],
        name: &str,
    ) -> Result<PathBuf, Report<ScratchError>> {
        let path = self.root.join(INPUT_DIR).join(sanitize_file_name(name));
        tokio::fs::write(&path, bytes)
            .await
            .change_context(ScratchError::WriteInput)
            .attach_printable_lazy(|| path.display().to_string())?;

        Ok(path)
    }

    /// Delete the scratch directory now. Failures are logged and otherwise ignored, since
    /// there is nobody left to tell.
    pub async fn reclaim(mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        let root = self.root.clone();
        let result = tokio::task::spawn_blocking(move || dir.close()).await;
        match result {
            Ok(Ok(())) => event!(Level::DEBUG, root = %root.display(), "Reclaimed scratch"),
            Ok(Err(e)) => {
                event!(Level::WARN, root = %root.display(), error = %e, "Failed to reclaim scratch")
            }
            Err(e) => {
                event!(Level::WARN, root = %root.display(), error = %e, "Scratch cleanup task failed")
            }
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            // Set before deleting, so a lease that sees the flag unset was released before the
            // directory went away.
            self.abandoned.store(true, Ordering::SeqCst);
            if let Err(e) = dir.close() {
                event!(Level::WARN, root = %self.root.display(), error = %e, "Failed to reclaim scratch");
            } else {
                event!(Level::DEBUG, root = %self.root.display(), "Reclaimed scratch on drop");
            }
        }
    }
}

/// The writer's side of a [Scratch]. Once the writer is done, [ScratchLease::release] deletes
/// the directory again if its [Scratch] was dropped in the meantime.
#[derive(Debug)]
pub struct ScratchLease {
    root: PathBuf,
    abandoned: Arc<AtomicBool>,
}

impl ScratchLease {
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Call after the last write. Does nothing if the [Scratch] is still owned, since the
    /// owner reclaims it.
    pub async fn release(self) {
        if !self.is_abandoned() {
            return;
        }

        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                event!(Level::DEBUG, root = %self.root.display(), "Removed output of abandoned job")
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                event!(Level::WARN, root = %self.root.display(), error = %e, "Failed to remove output of abandoned job")
            }
        }
    }
}

/// Reduce an uploaded file name to something that is safe to create inside the input
/// directory.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "" | "." | ".." => DEFAULT_INPUT_NAME.to_string(),
        base => base.to_string(),
    }
}

/// The artifacts produced by a successful computation, keyed by logical name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl ArtifactSet {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.artifacts.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.artifacts
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
    }
}

impl IntoIterator for ArtifactSet {
    type Item = (String, Vec<u8>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.into_iter()
    }
}

impl FromIterator<(String, Vec<u8>)> for ArtifactSet {
    fn from_iter<T: IntoIterator<Item = (String, Vec<u8>)>>(iter: T) -> Self {
        Self {
            artifacts: iter.into_iter().collect(),
        }
    }
}

/// Search `output_dir` for the directory holding the layout's marker file, and read every
/// artifact from it.
pub async fn locate_outputs(
    output_dir: &Path,
    layout: &ArtifactLayout,
) -> Result<ArtifactSet, Report<LocateError>> {
    let output_dir = output_dir.to_path_buf();
    let layout = layout.clone();
    tokio::task::spawn_blocking(move || locate_outputs_blocking(&output_dir, &layout))
        .await
        .change_context(LocateError::Search)?
}

fn locate_outputs_blocking(
    output_dir: &Path,
    layout: &ArtifactLayout,
) -> Result<ArtifactSet, Report<LocateError>> {
    let artifact_dir = walkdir::WalkDir::new(output_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == layout.marker.as_str())
        .and_then(|entry| entry.path().parent().map(Path::to_path_buf))
        .ok_or_else(|| Report::new(LocateError::MarkerNotFound(layout.marker.clone())))?;

    event!(Level::DEBUG, dir = %artifact_dir.display(), "Found artifact directory");

    layout
        .names
        .iter()
        .map(|name| -> Result<(String, Vec<u8>), Report<LocateError>> {
            let path = artifact_dir.join(layout.file_name(name));
            let data = std::fs::read(&path)
                .change_context_lazy(|| LocateError::MissingArtifact(name.clone()))
                .attach_printable_lazy(|| path.display().to_string())?;
            Ok((name.clone(), data))
        })
        .collect()
}
