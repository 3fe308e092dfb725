// src/fetch.rs

//! Direct object fetches
//!
//! Loads single objects from a remote repository over `file://`, `http://`
//! or `https://` without a full pull. The HTTP session is built lazily on
//! first use and reused; `file://` reads go straight through the
//! filesystem.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::store::wire::ObjectType;
use std::cell::OnceCell;
use std::fs;
use std::time::Duration;
use tracing::{debug, warn};

/// Request and idle timeout of the HTTP session
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("capsule/", env!("CARGO_PKG_VERSION"));

/// How many body bytes to log when `OSTREE_DEBUG_HTTP` is set
const DEBUG_BODY_LIMIT: usize = 500;

/// Lazy single-object fetcher
#[derive(Default)]
pub struct Fetcher {
    session: OnceCell<reqwest::blocking::Client>,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> Result<&reqwest::blocking::Client> {
        if let Some(client) = self.session.get() {
            return Ok(client);
        }

        let mut builder = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .pool_idle_timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT);

        if let Ok(proxy) = std::env::var("http_proxy") {
            match reqwest::Proxy::all(&proxy) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(_) => warn!("Invalid proxy URI {proxy:?}"),
            }
        }

        let client = builder
            .build()
            .map_err(|e| Error::IoError(format!("Failed to create HTTP session: {e}")))?;
        let _ = self.session.set(client);
        Ok(self.session.get().expect("session just initialized"))
    }

    /// Fetch the contents of a URI. `file` URIs read the local path,
    /// `http`/`https` perform a GET; anything else is unsupported.
    pub fn load_uri(&self, uri: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
        cancel.check()?;

        if let Some(path) = uri.strip_prefix("file://") {
            debug!("Loading {uri} from the filesystem");
            return fs::read(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::NotFound(format!("{uri} not found")),
                _ => Error::IoError(format!("Failed to read {uri}: {e}")),
            });
        }

        if uri.starts_with("http://") || uri.starts_with("https://") {
            debug!("Loading {uri} over HTTP");
            let response = self
                .session()?
                .get(uri)
                .send()
                .map_err(|e| Error::IoError(format!("Failed to fetch {uri}: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let message = format!(
                    "Server returned status {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("unknown")
                );
                return Err(match status.as_u16() {
                    404 | 410 => Error::NotFound(message),
                    _ => Error::IoError(message),
                });
            }

            let bytes = response
                .bytes()
                .map_err(|e| Error::IoError(format!("Failed to read response from {uri}: {e}")))?
                .to_vec();

            if std::env::var_os("OSTREE_DEBUG_HTTP").is_some() {
                let shown = &bytes[..bytes.len().min(DEBUG_BODY_LIMIT)];
                debug!("Response body for {uri}: {:?}", String::from_utf8_lossy(shown));
            }

            debug!("Received {} bytes", bytes.len());
            return Ok(bytes);
        }

        let scheme = uri.split(':').next().unwrap_or(uri);
        Err(Error::Unsupported(format!("Unsupported uri scheme {scheme}")))
    }

    /// Fetch one object from a remote's object layout:
    /// `{base}/objects/{xx}/{yyyy…}.{type}`
    pub fn fetch_object(
        &self,
        base_url: &str,
        checksum: &str,
        object_type: ObjectType,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        if !crate::reference::is_valid_checksum(checksum) {
            return Err(Error::ParseError(format!(
                "Invalid object checksum {checksum:?}"
            )));
        }
        let (prefix, rest) = checksum.split_at(2);
        let url = format!(
            "{}/objects/{prefix}/{rest}.{}",
            base_url.trim_end_matches('/'),
            object_type.suffix()
        );
        self.load_uri(&url, cancel)
    }

    /// Fetch the checksum a remote ref points at (`{base}/refs/heads/{ref}`)
    pub fn fetch_ref(&self, base_url: &str, ref_name: &str, cancel: &CancelToken) -> Result<String> {
        let url = format!("{}/refs/heads/{ref_name}", base_url.trim_end_matches('/'));
        let data = self.load_uri(&url, cancel)?;
        let text = String::from_utf8(data)
            .map_err(|_| Error::ParseError(format!("Ref {ref_name} at {base_url} is not UTF-8")))?;
        let checksum = text.trim().to_string();
        if !crate::reference::is_valid_checksum(&checksum) {
            return Err(Error::ParseError(format!(
                "Ref {ref_name} at {base_url} does not name a commit"
            )));
        }
        Ok(checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_file_uri() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob");
        fs::write(&path, b"contents").unwrap();

        let fetcher = Fetcher::new();
        let uri = format!("file://{}", path.display());
        assert_eq!(fetcher.load_uri(&uri, &CancelToken::new()).unwrap(), b"contents");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let fetcher = Fetcher::new();
        let err = fetcher
            .load_uri("file:///no/such/file/anywhere", &CancelToken::new())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unsupported_scheme() {
        let fetcher = Fetcher::new();
        let err = fetcher
            .load_uri("ftp://example.com/obj", &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_cancelled_before_io() {
        let fetcher = Fetcher::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            fetcher.load_uri("file:///etc/hostname", &cancel),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_object_url_layout() {
        let tmp = TempDir::new().unwrap();
        let checksum = "ab".repeat(32);
        let objects = tmp.path().join("objects").join("ab");
        fs::create_dir_all(&objects).unwrap();
        fs::write(objects.join(format!("{}.commit", &checksum[2..])), b"raw").unwrap();

        let fetcher = Fetcher::new();
        let base = format!("file://{}", tmp.path().display());
        let data = fetcher
            .fetch_object(&base, &checksum, ObjectType::Commit, &CancelToken::new())
            .unwrap();
        assert_eq!(data, b"raw");
    }

    #[test]
    fn test_fetch_ref() {
        let tmp = TempDir::new().unwrap();
        let heads = tmp.path().join("refs").join("heads").join("app/org.x.App/x86_64");
        fs::create_dir_all(&heads).unwrap();
        fs::write(heads.join("stable"), format!("{}\n", "cd".repeat(32))).unwrap();

        let fetcher = Fetcher::new();
        let base = format!("file://{}", tmp.path().display());
        let checksum = fetcher
            .fetch_ref(&base, "app/org.x.App/x86_64/stable", &CancelToken::new())
            .unwrap();
        assert_eq!(checksum, "cd".repeat(32));
    }
}
