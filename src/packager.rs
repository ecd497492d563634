//! Payload packaging collaborator.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::tool::{ToolError, ToolInvocation};

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("application directory not found: {}", .0.display())]
    AppDirMissing(PathBuf),

    #[error("mksquashfs failed: {0}")]
    Tool(#[from] ToolError),

    #[error("packager reported success but {} was not created", .0.display())]
    NoOutput(PathBuf),
}

pub type PackagingResult<T> = Result<T, PackagingError>;

/// Produces a compressed filesystem image from a prepared tree.
pub trait PayloadPackager {
    /// Build the image and return its path.
    fn package(&self, appdir: &Path) -> PackagingResult<PathBuf>;
}

/// `mksquashfs <appdir> <appdir>.squashfs -root-owned -noappend -reproducible -comp <c>`
#[derive(Debug, Clone)]
pub struct SquashfsPackager {
    program: String,
    compression: String,
}

impl SquashfsPackager {
    pub fn new(program: impl Into<String>, compression: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            compression: compression.into(),
        }
    }

    /// Image path written next to the tree
    pub fn output_path(appdir: &Path) -> PathBuf {
        let mut name: OsString = appdir
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("AppDir"));
        name.push(".squashfs");
        appdir.with_file_name(name)
    }

    fn invocation(&self, appdir: &Path, output: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.program)
            .arg(appdir)
            .arg(output)
            .args(["-root-owned", "-noappend", "-reproducible", "-comp"])
            .arg(&self.compression)
    }
}

impl PayloadPackager for SquashfsPackager {
    fn package(&self, appdir: &Path) -> PackagingResult<PathBuf> {
        if !appdir.is_dir() {
            return Err(PackagingError::AppDirMissing(appdir.to_path_buf()));
        }

        let output = Self::output_path(appdir);
        info!(
            appdir = %appdir.display(),
            compression = %self.compression,
            "Packaging payload"
        );
        self.invocation(appdir, &output).run()?;

        if !output.is_file() {
            return Err(PackagingError::NoOutput(output));
        }
        Ok(output)
    }
}
