//! Artifact discovery inside the model directory

use std::path::{Path, PathBuf};

use crate::handler::LoadError;

/// Manifest that marks a directory as a saved model
pub const SAVED_MODEL_MANIFEST: &str = "saved_model.json";

/// All regular files in `dir` whose name ends with `suffix`, sorted by name.
pub fn find_artifacts(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let Some(dir_str) = dir.to_str() else {
        return Vec::new();
    };
    // Brackets and stars in either part are literal
    let pattern = format!(
        "{}{}*{}",
        glob::Pattern::escape(dir_str),
        std::path::MAIN_SEPARATOR,
        glob::Pattern::escape(suffix)
    );

    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map(|paths| paths.filter_map(|r| r.ok()).filter(|p| p.is_file()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

/// The artifact file to load: the first match by name.
///
/// Zero matches is [`LoadError::ArtifactNotFound`].
pub fn find_artifact(dir: &Path, suffix: &str) -> Result<PathBuf, LoadError> {
    let mut files = find_artifacts(dir, suffix);
    if files.is_empty() {
        return Err(LoadError::not_found(dir, format!("*{}", suffix)));
    }
    if files.len() > 1 {
        tracing::warn!(
            "Found {} files matching *{} in {}, using {}",
            files.len(),
            suffix,
            dir.display(),
            files[0].display()
        );
    }
    Ok(files.swap_remove(0))
}

/// Saved-model manifest in `dir`, if present
pub fn find_saved_model(dir: &Path) -> Option<PathBuf> {
    let manifest = dir.join(SAVED_MODEL_MANIFEST);
    manifest.is_file().then_some(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_artifact_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.model"), "{}").unwrap();
        fs::write(dir.path().join("a.model"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("dir.model")).unwrap();

        let found = find_artifacts(dir.path(), ".model");
        assert_eq!(found.len(), 2);

        let first = find_artifact(dir.path(), ".model").unwrap();
        assert_eq!(first.file_name().unwrap(), "a.model");
    }

    #[test]
    fn test_zero_matches_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.bin"), "").unwrap();

        let err = find_artifact(dir.path(), ".model").unwrap_err();
        assert!(matches!(err, LoadError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let err = find_artifact(Path::new("/nonexistent/servr/models"), ".json").unwrap_err();
        assert!(matches!(err, LoadError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_bracketed_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("run[1]");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("model.json"), "{}").unwrap();

        assert!(find_artifact(&nested, ".json").is_ok());
    }

    #[test]
    fn test_saved_model_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_saved_model(dir.path()).is_none());
        fs::write(dir.path().join(SAVED_MODEL_MANIFEST), "{}").unwrap();
        assert!(find_saved_model(dir.path()).is_some());
    }
}
