use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

/// How jobs are run and observed.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// How often a running job reports progress. This is also the longest a progress update
    /// can sit unobserved.
    pub poll_interval: Duration,
    /// The artifacts a successful computation must produce.
    pub layout: ArtifactLayout,
    /// Where scratch directories are created. Leave this as `None` to use the system default.
    pub scratch_root: Option<PathBuf>,
    /// The maximum number of computations to run at once. Jobs past the limit wait to start.
    /// Leave this as `None` to run them as fast as they arrive.
    pub max_concurrent_jobs: Option<NonZeroUsize>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            layout: ArtifactLayout::default(),
            scratch_root: None,
            max_concurrent_jobs: None,
        }
    }
}

/// The fixed set of files a computation writes on success. All of them live in the same
/// directory, somewhere under the output directory, and that directory is found by looking
/// for `marker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// The file name that identifies the artifact directory.
    pub marker: String,
    /// The logical name of each artifact. Artifact `name` is read from `{name}.{extension}`.
    pub names: Vec<String>,
    pub extension: String,
}

impl ArtifactLayout {
    /// Create a layout that uses the first artifact's file as the marker.
    pub fn new(
        names: impl IntoIterator<Item = impl Into<String>>,
        extension: impl Into<String>,
    ) -> Self {
        let names = names.into_iter().map(Into::into).collect::<Vec<_>>();
        let extension = extension.into();
        let marker = names
            .first()
            .map(|name| format!("{name}.{extension}"))
            .unwrap_or_default();

        Self {
            marker,
            names,
            extension,
        }
    }

    /// The file name that holds the artifact `name`.
    pub fn file_name(&self, name: &str) -> String {
        format!("{name}.{}", self.extension)
    }
}

impl Default for ArtifactLayout {
    /// The four stems that Demucs writes with `--mp3`.
    fn default() -> Self {
        Self::new(["vocals", "bass", "drums", "other"], "mp3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_demucs() {
        let layout = ArtifactLayout::default();
        assert_eq!(layout.marker, "vocals.mp3");
        assert_eq!(layout.names, ["vocals", "bass", "drums", "other"]);
        assert_eq!(layout.file_name("drums"), "drums.mp3");
    }

    #[test]
    fn marker_comes_from_first_name() {
        let layout = ArtifactLayout::new(["a", "b"], "wav");
        assert_eq!(layout.marker, "a.wav");
    }
}
