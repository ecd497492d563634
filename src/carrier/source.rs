//! Where carriers come from when the cache misses.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use super::{AcquireResult, AcquisitionError, Architecture};

/// Fetches the runtime for one architecture into a writer.
pub trait CarrierSource {
    /// Stream the carrier bytes for `arch` into `dest`, returning the count.
    fn fetch(&self, arch: Architecture, dest: &mut dyn Write) -> AcquireResult<u64>;

    /// Human-readable location for logs and errors
    fn describe(&self, arch: Architecture) -> String;
}

/// Downloads `<base>/runtime-<arch>` over HTTPS.
pub struct HttpCarrierSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpCarrierSource {
    pub fn new(base_url: impl Into<String>) -> AcquireResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("appimage-primer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AcquisitionError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn url_for(&self, arch: Architecture) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            arch.runtime_file_name()
        )
    }
}

impl CarrierSource for HttpCarrierSource {
    fn fetch(&self, arch: Architecture, dest: &mut dyn Write) -> AcquireResult<u64> {
        let url = self.url_for(arch);
        debug!(url = %url, "Fetching carrier");

        let mut response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| AcquisitionError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        response
            .copy_to(dest)
            .map_err(|e| AcquisitionError::Http(e.to_string()))
    }

    fn describe(&self, arch: Architecture) -> String {
        self.url_for(arch)
    }
}

/// Copies `runtime-<arch>` out of a local directory.
pub struct MirrorCarrierSource {
    dir: PathBuf,
}

impl MirrorCarrierSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, arch: Architecture) -> PathBuf {
        self.dir.join(arch.runtime_file_name())
    }
}

impl CarrierSource for MirrorCarrierSource {
    fn fetch(&self, arch: Architecture, dest: &mut dyn Write) -> AcquireResult<u64> {
        let path = self.path_for(arch);
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => AcquisitionError::NotPublished {
                arch,
                location: path.display().to_string(),
            },
            _ => AcquisitionError::Io(e),
        })?;
        Ok(io::copy(&mut file, dest)?)
    }

    fn describe(&self, arch: Architecture) -> String {
        self.path_for(arch).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::CarrierProvider;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use tempfile::TempDir;

    /// Answer one request on a loopback port with a canned response.
    ///
    /// Returns the base URL and a handle yielding the request line.
    fn serve_once(status: &'static str, body: &'static [u8]) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body).unwrap();

            let request = String::from_utf8_lossy(&request).into_owned();
            request.lines().next().unwrap_or_default().to_string()
        });

        (base, handle)
    }

    #[test]
    fn test_http_fetch_streams_body() {
        let (base, server) = serve_once("200 OK", b"\x7fELF runtime bytes");
        let source = HttpCarrierSource::new(base).unwrap();

        let mut out = Vec::new();
        let n = source.fetch(Architecture::X86_64, &mut out).unwrap();

        assert_eq!(n, 18);
        assert_eq!(out, b"\x7fELF runtime bytes");
        assert_eq!(server.join().unwrap(), "GET /runtime-x86_64 HTTP/1.1");
    }

    #[test]
    fn test_http_not_found_leaves_no_cache_entry() {
        let (base, server) = serve_once("404 Not Found", b"missing");
        let cache = TempDir::new().unwrap();
        let provider = CarrierProvider::new(
            cache.path().join("prime"),
            Box::new(HttpCarrierSource::new(base).unwrap()),
        );

        let result = provider.acquire(Architecture::Aarch64);

        assert!(matches!(
            result,
            Err(AcquisitionError::HttpStatus { status: 404, .. })
        ));
        assert!(!provider.cache_path(Architecture::Aarch64).exists());
        assert_eq!(server.join().unwrap(), "GET /runtime-aarch64 HTTP/1.1");
    }

    #[test]
    fn test_url_for_trims_trailing_slash() {
        let source = HttpCarrierSource::new("https://example.com/releases/").unwrap();
        assert_eq!(
            source.url_for(Architecture::Aarch64),
            "https://example.com/releases/runtime-aarch64"
        );
    }

    #[test]
    fn test_mirror_copies_runtime() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("runtime-i686"), b"\x7fELF-ish").unwrap();

        let source = MirrorCarrierSource::new(dir.path());
        let mut out = Vec::new();
        let n = source.fetch(Architecture::I686, &mut out).unwrap();

        assert_eq!(n, 8);
        assert_eq!(out, b"\x7fELF-ish");
    }

    #[test]
    fn test_mirror_missing_runtime() {
        let dir = TempDir::new().unwrap();
        let source = MirrorCarrierSource::new(dir.path());

        let result = source.fetch(Architecture::Armhf, &mut Vec::new());
        assert!(matches!(
            result,
            Err(AcquisitionError::NotPublished { arch: Architecture::Armhf, .. })
        ));
    }
}
