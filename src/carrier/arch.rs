//! Target architectures a runtime carrier exists for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of architectures AppImage runtimes are published for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Architecture {
    X86_64,
    I686,
    Aarch64,
    Armhf,
}

impl Architecture {
    pub const ALL: [Architecture; 4] = [
        Architecture::X86_64,
        Architecture::I686,
        Architecture::Aarch64,
        Architecture::Armhf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::I686 => "i686",
            Architecture::Aarch64 => "aarch64",
            Architecture::Armhf => "armhf",
        }
    }

    /// ELF `e_machine` value of binaries built for this architecture
    pub fn elf_machine(&self) -> u16 {
        match self {
            Architecture::X86_64 => 62,
            Architecture::I686 => 3,
            Architecture::Aarch64 => 183,
            Architecture::Armhf => 40,
        }
    }

    pub fn from_elf_machine(machine: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.elf_machine() == machine)
    }

    /// File name of the published runtime, also used as the cache key
    pub fn runtime_file_name(&self) -> String {
        format!("runtime-{}", self.as_str())
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "x86_64" | "amd64" => Ok(Architecture::X86_64),
            "i686" | "i386" => Ok(Architecture::I686),
            "aarch64" | "arm64" => Ok(Architecture::Aarch64),
            "armhf" | "gnueabihf" | "armv7l" => Ok(Architecture::Armhf),
            other => Err(format!("unknown architecture: {}", other)),
        }
    }
}

impl TryFrom<String> for Architecture {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Architecture> for String {
    fn from(arch: Architecture) -> Self {
        arch.as_str().to_string()
    }
}
