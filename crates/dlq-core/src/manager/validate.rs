//! Create-time checks on user input.

use std::path::Path;
use url::Url;

use super::ManagerError;

/// `source` must be an absolute http(s) URL with a host.
pub fn source_url(source: &str) -> Result<Url, ManagerError> {
    let invalid = |reason: String| ManagerError::InvalidSource {
        url: source.to_string(),
        reason,
    };
    let url = Url::parse(source.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// `destination` must be an existing directory. Writability is checked by
/// the executor right before the job starts.
pub fn destination_dir(destination: &Path) -> Result<(), ManagerError> {
    let invalid = |reason: &str| ManagerError::InvalidDestination {
        path: destination.to_path_buf(),
        reason: reason.to_string(),
    };
    if destination.as_os_str().is_empty() {
        return Err(invalid("empty path"));
    }
    match destination.metadata() {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(invalid("not a directory")),
        Err(_) => Err(invalid("does not exist")),
    }
}
