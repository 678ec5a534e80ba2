//! Typed errors for the loaders, collaborators, and emitters.
//!
//! Orchestration code (`pipeline`, the `epgh` binary) wraps these in
//! `anyhow` with context. The loaders themselves never let an expected
//! condition (missing file, empty input) escape: they log and return an
//! empty collection, so most variants only reach callers through the
//! `try_*` entry points.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing a file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A document could not be parsed as XML.
    #[error("malformed xml in {path}: {message}")]
    Xml { path: String, message: String },
    /// An input file or directory does not exist or is empty.
    #[error("input not found: {0}")]
    MissingInput(PathBuf),
    /// A remote source could not be retrieved.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },
    /// A compressed payload could not be decoded.
    #[error("decompression failed: {0}")]
    Decompress(String),
    /// A CSV report could not be encoded.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// Configuration or source-file content is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn xml(path: impl Into<String>, message: impl ToString) -> Self {
        Error::Xml {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_path() {
        let err = Error::io(
            "/tmp/guide.xml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/guide.xml"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn xml_error_carries_message() {
        let err = Error::xml("guide_UK.xml", "unexpected end of file");
        assert!(err.to_string().contains("malformed xml in guide_UK.xml"));
        assert!(err.to_string().contains("unexpected end of file"));
    }

    #[test]
    fn csv_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::WriteZero, "full");
        let err: Error = csv::Error::from(io).into();
        assert!(matches!(err, Error::Csv(_)));
        assert!(err.to_string().starts_with("csv error"));
    }

    #[test]
    fn fetch_error_names_url() {
        let err = Error::Fetch {
            url: "http://example/a.xml".into(),
            message: "timed out".into(),
        };
        assert!(err.to_string().contains("http://example/a.xml"));
    }
}
