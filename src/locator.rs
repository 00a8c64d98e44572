//! Transfer endpoint classification.
//!
//! Every user-supplied endpoint string is classified exactly once into a
//! [`Locator`]; downstream code matches on the variant instead of re-testing
//! string prefixes.

use std::fmt;
use std::path::Path;

const OBJECT_STORAGE_SCHEME: &str = "s3://";
const REMOTE_SCHEMES: [&str; 2] = ["http://", "https://"];

/// A transfer endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// A path on the local filesystem.
    Local(String),
    /// An object-storage URI (`s3://bucket/key`).
    ObjectStorage(String),
    /// An HTTP(S) URL that has to be downloaded before use.
    Remote(String),
}

/// Returns true if `raw` starts with `scheme`, ignoring ASCII case.
fn has_scheme(raw: &str, scheme: &str) -> bool {
    raw.get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

impl Locator {
    /// Classifies a raw endpoint string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if has_scheme(raw, OBJECT_STORAGE_SCHEME) {
            Self::ObjectStorage(raw.to_string())
        } else if REMOTE_SCHEMES.iter().any(|scheme| has_scheme(raw, scheme)) {
            Self::Remote(raw.to_string())
        } else {
            Self::Local(raw.to_string())
        }
    }

    /// Returns the locator exactly as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Local(s) | Self::ObjectStorage(s) | Self::Remote(s) => s,
        }
    }

    /// Returns true for `s3://` locators.
    #[must_use]
    pub const fn is_object_storage(&self) -> bool {
        matches!(self, Self::ObjectStorage(_))
    }

    /// Returns the local filesystem path, if this is a local locator.
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Local(s) => Some(Path::new(s)),
            Self::ObjectStorage(_) | Self::Remote(_) => None,
        }
    }

    /// Returns true if the locator ends with a path separator.
    #[must_use]
    pub fn has_trailing_separator(&self) -> bool {
        match self {
            Self::Local(s) => s.ends_with(std::path::is_separator),
            Self::ObjectStorage(s) | Self::Remote(s) => s.ends_with('/'),
        }
    }

    /// Returns the final path segment.
    ///
    /// Remote URLs ignore their query string and fragment. A locator ending
    /// in a separator has an empty base name.
    #[must_use]
    pub fn base_name(&self) -> String {
        match self {
            Self::Local(s) => s
                .rsplit(std::path::is_separator)
                .next()
                .unwrap_or_default()
                .to_string(),
            Self::ObjectStorage(s) => s.rsplit('/').next().unwrap_or_default().to_string(),
            Self::Remote(s) => reqwest::Url::parse(s).map_or_else(
                |_| {
                    let path = s.split(['?', '#']).next().unwrap_or_default();
                    path.rsplit('/').next().unwrap_or_default().to_string()
                },
                |url| {
                    url.path_segments()
                        .and_then(|mut segments| segments.next_back())
                        .unwrap_or_default()
                        .to_string()
                },
            ),
        }
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Joins a destination directory and a file name with a single `/`.
#[must_use]
pub fn join_destination(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}
