//! GnuPG-backed signer.

use std::path::PathBuf;

use super::{BundleSigner, SigningError, SigningResult};
use crate::tool::ToolInvocation;

/// Algorithm tag for armored OpenPGP detached signatures
pub const GPG_ALGORITHM: &str = "OpenPGP";

/// Runs `gpg` in batch mode for signing and key export.
#[derive(Debug, Clone)]
pub struct GpgSigner {
    program: String,
    home: Option<PathBuf>,
}

impl GpgSigner {
    pub fn new(program: impl Into<String>, home: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            home,
        }
    }

    fn invocation(&self) -> ToolInvocation {
        let tool = ToolInvocation::new(&self.program).arg("--batch");
        match &self.home {
            Some(home) => tool.arg("--homedir").arg(home),
            None => tool,
        }
    }
}

impl BundleSigner for GpgSigner {
    fn algorithm(&self) -> &'static str {
        GPG_ALGORITHM
    }

    fn sign(&self, digest_hex: &str, key_id: &str) -> SigningResult<Vec<u8>> {
        let output = self
            .invocation()
            .args(["--armor", "--detach-sign", "--local-user", key_id])
            .stdin(digest_hex)
            .run()?;

        if output.stdout.is_empty() {
            return Err(SigningError::EmptySignature(key_id.to_string()));
        }
        Ok(output.stdout)
    }

    fn export_key(&self, key_id: &str) -> SigningResult<Vec<u8>> {
        let output = self
            .invocation()
            .args(["--armor", "--export", key_id])
            .run()?;

        // gpg exits 0 with no output for keys it does not know.
        if output.stdout.is_empty() {
            return Err(SigningError::UnknownKey(key_id.to_string()));
        }
        Ok(output.stdout)
    }
}
