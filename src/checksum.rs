//! Single-pass digests over an assembled artifact.

use md5::Md5;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Chunk size used when streaming the artifact
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no digest algorithms requested")]
    NoAlgorithms,

    #[error("chunk size must be positive")]
    ZeroChunk,
}

pub type ChecksumResult<T> = Result<T, ChecksumError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            other => Err(format!("unsupported digest algorithm: {}", other)),
        }
    }
}

/// Raw digest bytes keyed by algorithm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestSet {
    digests: BTreeMap<DigestAlgorithm, Vec<u8>>,
}

impl DigestSet {
    pub fn get(&self, algorithm: DigestAlgorithm) -> Option<&[u8]> {
        self.digests.get(&algorithm).map(Vec::as_slice)
    }

    /// Lowercase hex of one digest
    pub fn hex(&self, algorithm: DigestAlgorithm) -> Option<String> {
        self.get(algorithm).map(hex::encode)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DigestAlgorithm, &[u8])> {
        self.digests.iter().map(|(a, d)| (*a, d.as_slice()))
    }
}

impl Serialize for DigestSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let hexed: BTreeMap<&str, String> = self
            .digests
            .iter()
            .map(|(a, d)| (a.as_str(), hex::encode(d)))
            .collect();
        hexed.serialize(serializer)
    }
}

enum Accumulator {
    Md5(Md5),
    Sha256(Sha256),
}

impl Accumulator {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Accumulator::Md5(Md5::new()),
            DigestAlgorithm::Sha256 => Accumulator::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Accumulator::Md5(h) => h.update(chunk),
            Accumulator::Sha256(h) => h.update(chunk),
        }
    }

    fn finish(self) -> Vec<u8> {
        match self {
            Accumulator::Md5(h) => h.finalize().to_vec(),
            Accumulator::Sha256(h) => h.finalize().to_vec(),
        }
    }
}

/// Streams a file once, feeding every requested digest per chunk.
#[derive(Debug, Clone)]
pub struct ChecksumEngine {
    chunk_size: usize,
}

impl Default for ChecksumEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecksumEngine {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(chunk_size: usize) -> ChecksumResult<Self> {
        if chunk_size == 0 {
            return Err(ChecksumError::ZeroChunk);
        }
        Ok(Self { chunk_size })
    }

    pub fn digest_file(&self, path: &Path, algorithms: &[DigestAlgorithm]) -> ChecksumResult<DigestSet> {
        let file = File::open(path)?;
        self.digest_reader(file, algorithms)
    }

    pub fn digest_reader<R: Read>(
        &self,
        mut reader: R,
        algorithms: &[DigestAlgorithm],
    ) -> ChecksumResult<DigestSet> {
        if algorithms.is_empty() {
            return Err(ChecksumError::NoAlgorithms);
        }

        let mut accumulators: BTreeMap<DigestAlgorithm, Accumulator> = algorithms
            .iter()
            .map(|a| (*a, Accumulator::new(*a)))
            .collect();

        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            for acc in accumulators.values_mut() {
                acc.update(&buf[..n]);
            }
        }

        Ok(DigestSet {
            digests: accumulators
                .into_iter()
                .map(|(a, acc)| (a, acc.finish()))
                .collect(),
        })
    }
}
