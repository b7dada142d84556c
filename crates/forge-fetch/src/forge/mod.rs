//! Forge strategies
//!
//! Each supported forge implements [`Forge`]: host defaults, auth header
//! construction, ref-to-revision resolution and archive URL construction.
//!
//! ## Supported forges
//!
//! - `github:` - [`GitHub`], default host `github.com`
//! - `gitlab:` - [`GitLab`], default host `gitlab.com`
//! - `sourcehut:` - [`SourceHut`], default host `git.sr.ht`

mod github;
mod gitlab;
mod sourcehut;

pub use github::GitHub;
pub use gitlab::GitLab;
pub use sourcehut::SourceHut;

use crate::config::FetchSettings;
use crate::error::FetchError;
use crate::git::{CloneTarget, GitClient};
use crate::hash::GitHash;
use crate::locator::Locator;
use crate::transport::{read_metadata, HttpHeader, Transport};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// The closed set of forge types, keyed by their locator scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ForgeKind {
    GitHub,
    GitLab,
    SourceHut,
}

impl ForgeKind {
    pub const ALL: [ForgeKind; 3] = [ForgeKind::GitHub, ForgeKind::GitLab, ForgeKind::SourceHut];

    /// The `type` attribute and URL scheme
    pub fn scheme(self) -> &'static str {
        match self {
            ForgeKind::GitHub => "github",
            ForgeKind::GitLab => "gitlab",
            ForgeKind::SourceHut => "sourcehut",
        }
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.scheme() == scheme)
    }
}

impl fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Result of resolving a ref on the forge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionInfo {
    pub rev: GitHash,
    /// Tree hash reported by the forge, when its API exposes one
    pub tree_hash: Option<GitHash>,
}

/// Where to download an archive from, and with which headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub url: String,
    pub headers: Vec<HttpHeader>,
}

/// Collaborators a forge needs to talk to the network
#[derive(Clone, Copy)]
pub struct FetchContext<'a> {
    pub transport: &'a dyn Transport,
    pub settings: &'a FetchSettings,
}

/// Capability set implemented once per forge
pub trait Forge: Send + Sync {
    fn kind(&self) -> ForgeKind;

    fn default_host(&self) -> &'static str;

    /// Translate a configured access token into this forge's auth header
    fn access_header_from_token(&self, token: &str) -> Option<HttpHeader>;

    /// Resolve the locator's ref (or `HEAD`) with one metadata request
    fn get_rev_from_ref(
        &self,
        cx: FetchContext<'_>,
        locator: &Locator,
    ) -> Result<RevisionInfo, FetchError>;

    /// Archive URL for a locator pinned to a revision
    fn download_url(
        &self,
        cx: FetchContext<'_>,
        locator: &Locator,
    ) -> Result<DownloadDescriptor, FetchError>;

    /// Plain git URL of the repository
    fn clone_url(&self, locator: &Locator) -> String;

    fn host(&self, locator: &Locator) -> String {
        locator.host().unwrap_or(self.default_host()).to_string()
    }

    /// Headers carrying the access token configured for `host`, if any
    fn auth_headers(&self, settings: &FetchSettings, host: &str) -> Vec<HttpHeader> {
        let mut headers = Vec::new();
        if let Some(token) = settings.access_token(host) {
            match self.access_header_from_token(token) {
                Some(header) => headers.push(header),
                None => warn!("Unrecognized access token for host '{}'", host),
            }
        }
        headers
    }

    /// Fallback: clone the repository with the git protocol
    fn clone_into(
        &self,
        git: &dyn GitClient,
        locator: &Locator,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let target = CloneTarget {
            reference: locator.ref_name().map(String::from),
            rev: locator.rev(),
        };
        git.clone_repo(&self.clone_url(locator), &target, dest)
            .map_err(|source| FetchError::Clone {
                input: locator.to_string(),
                source,
            })
    }
}

/// The ref a resolution should look up
pub(crate) fn requested_ref(locator: &Locator) -> &str {
    locator.ref_name().unwrap_or("HEAD")
}

/// The pinned revision of a locator about to be downloaded
pub(crate) fn pinned_rev(locator: &Locator) -> Result<GitHash, FetchError> {
    locator
        .rev()
        .ok_or_else(|| FetchError::MissingAttribute("rev".into()))
}

/// GET a small metadata document as text
pub(crate) fn fetch_text(
    cx: FetchContext<'_>,
    locator: &Locator,
    url: &str,
    headers: &[HttpHeader],
) -> Result<String, FetchError> {
    let transport_error = |source| FetchError::Transport {
        input: locator.to_string(),
        source,
    };
    let mut body = cx.transport.fetch(url, headers).map_err(transport_error)?;
    read_metadata(&mut body).map_err(transport_error)
}

/// GET and decode a JSON metadata document
pub(crate) fn fetch_json<T: DeserializeOwned>(
    cx: FetchContext<'_>,
    locator: &Locator,
    url: &str,
    headers: &[HttpHeader],
) -> Result<T, FetchError> {
    let text = fetch_text(cx, locator, url, headers)?;
    serde_json::from_str(&text).map_err(|e| FetchError::Response {
        input: locator.to_string(),
        reference: requested_ref(locator).to_string(),
        reason: e.to_string(),
    })
}

/// Parse an object id taken from a forge response
pub(crate) fn response_hash(locator: &Locator, value: &str) -> Result<GitHash, FetchError> {
    GitHash::parse(value).map_err(|e| FetchError::Response {
        input: locator.to_string(),
        reference: requested_ref(locator).to_string(),
        reason: e.to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_round_trip() {
        for kind in ForgeKind::ALL {
            assert_eq!(ForgeKind::from_scheme(kind.scheme()), Some(kind));
        }
        assert_eq!(ForgeKind::from_scheme("git"), None);
    }

    #[test]
    fn test_auth_headers_use_effective_host() {
        let settings = FetchSettings::default().with_access_token("github.com", "secret");
        let forge = GitHub;
        assert_eq!(
            forge.auth_headers(&settings, "github.com"),
            vec![HttpHeader::new("Authorization", "token secret")]
        );
        assert!(forge.auth_headers(&settings, "github.example.com").is_empty());
    }
}
