//! Remote resource retrieval used by the fetch directives.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::error::CompileError;

/// Capability to retrieve remote resources.
pub trait Fetcher {
    /// Retrieve the full body of `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, CompileError>;

    /// Retrieve `url` into the file at `dest`, returning the byte count.
    fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, CompileError> {
        let body = self.fetch(url)?;
        let mut file = File::create(dest).map_err(|e| CompileError::io_at(dest, e))?;
        file.write_all(&body)
            .and_then(|_| file.flush())
            .map_err(|e| CompileError::io_at(dest, e))?;
        Ok(body.len() as u64)
    }
}

/// Blocking HTTP(S) fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, CompileError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("toscafy/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CompileError::InvalidInput(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, CompileError> {
        let fail = |reason: String| CompileError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| fail(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(fail(format!("status {}", response.status())));
        }
        Ok(response)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, CompileError> {
        tracing::debug!(url = %url, "Fetching remote resource");
        let body = self.get(url)?.bytes().map_err(|e| CompileError::Fetch {
            url: url.to_string(),
            reason: format!("reading body: {}", e),
        })?;
        Ok(body.to_vec())
    }

    fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64, CompileError> {
        tracing::debug!(url = %url, dest = %dest.display(), "Fetching remote resource to file");
        let mut response = self.get(url)?;
        let mut file = File::create(dest).map_err(|e| CompileError::io_at(dest, e))?;
        let written = response.copy_to(&mut file).map_err(|e| CompileError::Fetch {
            url: url.to_string(),
            reason: format!("download stream error: {}", e),
        })?;
        file.flush().map_err(|e| CompileError::io_at(dest, e))?;
        Ok(written)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{SocketAddr, TcpListener};
    use std::thread;

    /// One-shot HTTP server answering every request with `content`.
    pub(crate) fn start_test_server(
        content: Vec<u8>,
        status: u16,
        requests: usize,
    ) -> (SocketAddr, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            for _ in 0..requests {
                let Ok((mut socket, _)) = listener.accept() else {
                    return;
                };
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf);

                let response = format!(
                    "HTTP/1.1 {} OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    content.len()
                );
                let _ = socket.write_all(response.as_bytes());
                let _ = socket.write_all(&content);
            }
        });

        (addr, handle)
    }

    #[test]
    fn fetches_body() {
        let (addr, server) = start_test_server(b"hello".to_vec(), 200, 1);
        let fetcher = HttpFetcher::new().unwrap();

        let body = fetcher.fetch(&format!("http://{}/x", addr)).unwrap();
        assert_eq!(body, b"hello");
        server.join().unwrap();
    }

    #[test]
    fn fetches_to_file() {
        let (addr, server) = start_test_server(vec![0u8, 1, 2, 3], 200, 1);
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("payload.bin");

        let written = HttpFetcher::new()
            .unwrap()
            .fetch_to(&format!("http://{}/payload", addr), &dest)
            .unwrap();
        assert_eq!(written, 4);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![0u8, 1, 2, 3]);
        server.join().unwrap();
    }

    #[test]
    fn non_success_status_is_fetch_error() {
        let (addr, server) = start_test_server(b"nope".to_vec(), 404, 1);
        let url = format!("http://{}/missing", addr);

        let err = HttpFetcher::new().unwrap().fetch(&url).unwrap_err();
        match err {
            CompileError::Fetch { url: u, reason } => {
                assert_eq!(u, url);
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
        server.join().unwrap();
    }
}
