//! Concatenates carrier and payload into the artifact.

use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("payload not found: {}", .0.display())]
    PayloadMissing(PathBuf),

    #[error("carrier not found: {}", .0.display())]
    CarrierMissing(PathBuf),

    #[error("I/O error while assembling {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type AssemblyResult<T> = Result<T, AssemblyError>;

/// Where the pieces ended up.
#[derive(Debug, Clone, Serialize)]
pub struct Assembled {
    pub artifact: PathBuf,
    pub carrier_len: u64,
    pub payload_len: u64,
}

impl Assembled {
    pub fn len(&self) -> u64 {
        self.carrier_len + self.payload_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> AssemblyError + '_ {
    move |source| AssemblyError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Copy `carrier` to `artifact`, append `payload` verbatim, then delete it.
///
/// The payload is removed only after a successful append. An existing
/// artifact is replaced. On failure a partial artifact may remain.
pub fn assemble(carrier: &Path, payload: &Path, artifact: &Path) -> AssemblyResult<Assembled> {
    if !payload.is_file() {
        return Err(AssemblyError::PayloadMissing(payload.to_path_buf()));
    }
    if !carrier.is_file() {
        return Err(AssemblyError::CarrierMissing(carrier.to_path_buf()));
    }

    if let Some(parent) = artifact.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let mut out = BufWriter::new(File::create(artifact).map_err(io_err(artifact))?);

    let mut input = BufReader::new(File::open(carrier).map_err(io_err(carrier))?);
    let carrier_len = io::copy(&mut input, &mut out).map_err(io_err(artifact))?;

    let mut input = BufReader::new(File::open(payload).map_err(io_err(payload))?);
    let payload_len = io::copy(&mut input, &mut out).map_err(io_err(artifact))?;

    out.flush().map_err(io_err(artifact))?;
    drop(out);

    fs::remove_file(payload).map_err(io_err(payload))?;

    info!(
        artifact = %artifact.display(),
        carrier_len,
        payload_len,
        "Assembled bundle"
    );

    Ok(Assembled {
        artifact: artifact.to_path_buf(),
        carrier_len,
        payload_len,
    })
}
