//! TOML-based group mapping file reader.
//!
//! Large directories have more group object IDs than fit comfortably in the
//! main configuration, so the lookup table can live in its own file:
//!
//! ```toml
//! [groups]
//! "6f1c2a9e-0000-0000-0000-000000000001" = "admin,editor"
//! "6f1c2a9e-0000-0000-0000-000000000002" = "writer"
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Wrapper around the TOML mapping file structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MappingFileData {
    /// The `[groups]` table mapping claim value -> comma-separated aliases.
    #[serde(default)]
    pub groups: HashMap<String, String>,
}

/// Loader for the group mapping file.
pub struct MappingFile;

impl MappingFile {
    /// Load the mapping file from disk and return the lookup table.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading group mapping file");

        if !path.exists() {
            return Err(ConfigError::MappingFileError {
                path: path.display().to_string(),
                detail: "file not found".into(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        let data: MappingFileData =
            toml::from_str(&contents).map_err(|e| ConfigError::MappingFileError {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;

        debug!(count = data.groups.len(), "loaded group mappings");
        Ok(data.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_mapping_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groups.toml");

        let content = r#"
[groups]
"eng" = "editor,translator"
"ops" = "admin"
"#;
        std::fs::write(&path, content).unwrap();

        let mappings = MappingFile::load(&path).unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings["eng"], "editor,translator");
    }

    #[test]
    fn test_load_nonexistent() {
        let result = MappingFile::load("/nonexistent/groups.toml");
        assert!(matches!(result, Err(ConfigError::MappingFileError { .. })));
    }

    #[test]
    fn test_load_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::write(&path, "").unwrap();

        let mappings = MappingFile::load(&path).unwrap();
        assert!(mappings.is_empty());
    }
}
