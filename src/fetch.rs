//! HTTP fetcher with streaming download support
//! Pulls remote playlists and guides to disk in fixed-size chunks so memory
//! use stays flat regardless of file size.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::fsutil;

/// Chunk size for streaming response bodies to disk
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared HTTP client for all downloads in a cycle
pub struct Fetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl Fetcher {
    /// Create a fetcher with a bounded global timeout covering the whole
    /// request, connect included.
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .max_idle_connections(4)
            .max_idle_connections_per_host(2)
            .build()
            .new_agent();

        Self {
            agent,
            user_agent: user_agent.to_string(),
        }
    }

    /// Download `url` into `destination`, returning the number of bytes
    /// written. The body is streamed into a scratch file unique to this call
    /// and renamed onto the destination only on success, so a failed fetch
    /// never leaves a truncated file where a valid artifact is expected and
    /// two concurrent downloads of the same artifact cannot clobber each
    /// other's bytes mid-write.
    pub fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        // Dropped without persist on any error below, which removes it.
        let mut scratch = fsutil::scratch_for(destination)?;
        let written = stream_body(response, scratch.as_file_mut())?;
        scratch
            .persist(destination)
            .map_err(|e| FetchError::Io(e.error))?;
        Ok(written)
    }
}

fn stream_body(
    response: ureq::http::Response<ureq::Body>,
    file: &mut fs::File,
) -> Result<u64, FetchError> {
    let mut reader = response.into_body().into_reader();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                file.write_all(&buffer[..n])?;
                written += n as u64;
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Err(FetchError::Timeout),
            Err(e) => return Err(FetchError::Connection(e.to_string())),
        }
    }

    file.flush()?;
    Ok(written)
}

fn map_request_error(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(code) => FetchError::HttpStatus(code),
        ureq::Error::Timeout(_) => FetchError::Timeout,
        ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => FetchError::Timeout,
        other => FetchError::Connection(other.to_string()),
    }
}
