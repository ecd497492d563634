//! Incremental update index collaborator.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::tool::{ToolError, ToolInvocation};

#[derive(Debug, thiserror::Error)]
pub enum IndexGenerationError {
    #[error("update index tool failed: {0}")]
    Tool(#[from] ToolError),

    #[error("artifact path has no file name: {}", .0.display())]
    BadArtifactPath(PathBuf),

    #[error("index tool reported success but {} was not created", .0.display())]
    NoOutput(PathBuf),
}

pub type IndexResult<T> = Result<T, IndexGenerationError>;

/// Builds a sidecar index for differential downloads of an artifact.
pub trait UpdateIndexGenerator {
    fn generate(&self, artifact: &Path) -> IndexResult<PathBuf>;
}

/// `<artifact>.zsync`
pub fn index_path_for(artifact: &Path) -> PathBuf {
    let mut path: OsString = artifact.as_os_str().to_os_string();
    path.push(".zsync");
    PathBuf::from(path)
}

/// Runs `zsyncmake -u <name> -o <artifact>.zsync <artifact>`.
///
/// The `-u` URL is the bare file name so the index resolves relative to
/// wherever it is published.
#[derive(Debug, Clone)]
pub struct ZsyncIndexGenerator {
    program: String,
}

impl ZsyncIndexGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn invocation(&self, artifact: &Path) -> IndexResult<ToolInvocation> {
        let name = artifact
            .file_name()
            .ok_or_else(|| IndexGenerationError::BadArtifactPath(artifact.to_path_buf()))?;

        Ok(ToolInvocation::new(&self.program)
            .arg("-u")
            .arg(name)
            .arg("-o")
            .arg(index_path_for(artifact))
            .arg(artifact))
    }
}

impl UpdateIndexGenerator for ZsyncIndexGenerator {
    fn generate(&self, artifact: &Path) -> IndexResult<PathBuf> {
        let index = index_path_for(artifact);
        info!(artifact = %artifact.display(), "Generating update index");

        self.invocation(artifact)?.run()?;

        if !index.is_file() {
            return Err(IndexGenerationError::NoOutput(index));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_path() {
        assert_eq!(
            index_path_for(Path::new("dist/App-1.0-x86_64.AppImage")),
            PathBuf::from("dist/App-1.0-x86_64.AppImage.zsync")
        );
    }

    #[test]
    fn test_command_line() {
        let tool = ZsyncIndexGenerator::new("zsyncmake")
            .invocation(Path::new("dist/App.AppImage"))
            .unwrap();
        assert_eq!(
            tool.command_line(),
            "zsyncmake -u App.AppImage -o dist/App.AppImage.zsync dist/App.AppImage"
        );
    }

    #[test]
    fn test_missing_tool() {
        let dir = tempfile::TempDir::new().unwrap();
        let artifact = dir.path().join("App.AppImage");
        std::fs::write(&artifact, b"bundle").unwrap();

        let result = ZsyncIndexGenerator::new("appimage-primer-no-zsyncmake").generate(&artifact);
        assert!(matches!(
            result,
            Err(IndexGenerationError::Tool(ToolError::Missing { .. }))
        ));
        assert_eq!(std::fs::read(&artifact).unwrap(), b"bundle");
    }
}
