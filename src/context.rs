//! Context files attached to submitted chat messages.
//!
//! # Example
//!
//! ```
//! use cody_agent_rpc::context::ContextFile;
//!
//! let files = ContextFile::from_paths(["src/lib.rs"]);
//! assert_eq!(files[0].uri.path, "src/lib.rs");
//! assert!(files[0].uri.fs_path.ends_with("src/lib.rs"));
//! ```

use std::path::Path;

use serde::Serialize;

/// Uri of a local file, as the agent expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUri {
    /// Absolute path with forward slashes.
    pub fs_path: String,
    /// Path as given by the caller.
    pub path: String,
}

/// A `contextFiles` entry of a `chat/submitMessage` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextFile {
    /// Always `"file"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub uri: FileUri,
}

impl ContextFile {
    /// Build a context entry for a local path.
    ///
    /// Paths that do not exist are kept (the agent reports them) but logged.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("Context path {} does not exist", path.display());
        }

        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        Self {
            kind: "file",
            uri: FileUri {
                fs_path: absolute.to_string_lossy().replace('\\', "/"),
                path: path.to_string_lossy().into_owned(),
            },
        }
    }

    /// Build context entries for several paths, in order.
    pub fn from_paths<I, P>(paths: I) -> Vec<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths.into_iter().map(Self::from_path).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_shape() {
        let file = ContextFile {
            kind: "file",
            uri: FileUri {
                fs_path: "/repo/src/main.rs".to_string(),
                path: "src/main.rs".to_string(),
            },
        };

        assert_eq!(
            serde_json::to_value(&file).unwrap(),
            json!({"type": "file", "uri": {"fsPath": "/repo/src/main.rs", "path": "src/main.rs"}})
        );
    }

    #[test]
    fn test_from_path_is_absolute() {
        let file = ContextFile::from_path("Cargo.toml");

        assert_eq!(file.kind, "file");
        assert_eq!(file.uri.path, "Cargo.toml");
        assert!(Path::new(&file.uri.fs_path).is_absolute());
        assert!(file.uri.fs_path.ends_with("/Cargo.toml"));
    }

    #[test]
    fn test_missing_path_is_kept() {
        let files = ContextFile::from_paths(["does/not/exist.rs", "Cargo.toml"]);

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].uri.path, "does/not/exist.rs");
        assert_eq!(files[1].uri.path, "Cargo.toml");
    }
}
