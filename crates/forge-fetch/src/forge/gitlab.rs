//! GitLab (gitlab.com and self-hosted instances)

use super::{
    fetch_json, pinned_rev, requested_ref, response_hash, DownloadDescriptor, FetchContext, Forge,
    ForgeKind, RevisionInfo,
};
use crate::error::FetchError;
use crate::locator::Locator;
use crate::transport::HttpHeader;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_HOST: &str = "gitlab.com";

/// One element of `GET /projects/:id/repository/commits`
#[derive(Debug, Deserialize)]
struct CommitEntry {
    id: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GitLab;

impl GitLab {
    /// `owner%2Frepo`, the URL-encoded project path the v4 API expects
    fn project_id(locator: &Locator) -> String {
        format!("{}%2F{}", locator.owner(), locator.repo())
    }
}

impl Forge for GitLab {
    fn kind(&self) -> ForgeKind {
        ForgeKind::GitLab
    }

    fn default_host(&self) -> &'static str {
        DEFAULT_HOST
    }

    /// Tokens are written `<TYPE>:<VALUE>` with TYPE `OAuth2` or `PAT`. Any
    /// other TYPE is used verbatim as the header name.
    fn access_header_from_token(&self, token: &str) -> Option<HttpHeader> {
        match token.split_once(':') {
            Some(("OAuth2", value)) => Some(HttpHeader::new("Authorization", format!("Bearer {value}"))),
            Some(("PAT", value)) => Some(HttpHeader::new("Private-token", value)),
            Some((kind, value)) => {
                warn!("Unrecognized GitLab token type {}", kind);
                Some(HttpHeader::new(kind, value))
            }
            None => {
                warn!("GitLab token has no '<TYPE>:' prefix");
                None
            }
        }
    }

    fn get_rev_from_ref(
        &self,
        cx: FetchContext<'_>,
        locator: &Locator,
    ) -> Result<RevisionInfo, FetchError> {
        let host = self.host(locator);
        let reference = requested_ref(locator);
        let url = format!(
            "https://{host}/api/v4/projects/{}/repository/commits?ref_name={}",
            Self::project_id(locator),
            urlencoding::encode(reference)
        );

        let headers = self.auth_headers(cx.settings, &host);
        let commits: Vec<CommitEntry> = fetch_json(cx, locator, &url, &headers)?;
        let first = commits.first().ok_or_else(|| FetchError::RefNotFound {
            input: locator.to_string(),
            reference: reference.to_string(),
        })?;

        Ok(RevisionInfo {
            rev: response_hash(locator, &first.id)?,
            tree_hash: None,
        })
    }

    // The archive endpoint is rate limited per IP (10 req/s on gitlab.com);
    // there is no unauthenticated alternative.
    fn download_url(
        &self,
        cx: FetchContext<'_>,
        locator: &Locator,
    ) -> Result<DownloadDescriptor, FetchError> {
        let host = self.host(locator);
        let rev = pinned_rev(locator)?;
        let url = format!(
            "https://{host}/api/v4/projects/{}/repository/archive.tar.gz?sha={rev}",
            Self::project_id(locator)
        );
        let headers = self.auth_headers(cx.settings, &host);
        Ok(DownloadDescriptor { url, headers })
    }

    fn clone_url(&self, locator: &Locator) -> String {
        format!(
            "https://{}/{}/{}.git",
            self.host(locator),
            locator.owner(),
            locator.repo()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchSettings;
    use crate::forge::testing::CannedTransport;

    const REV: &str = "fedcba9876543210fedcba9876543210fedcba98";

    #[test]
    fn test_oauth2_token() {
        assert_eq!(
            GitLab.access_header_from_token("OAuth2:abc"),
            Some(HttpHeader::new("Authorization", "Bearer abc"))
        );
    }

    #[test]
    fn test_pat_token() {
        assert_eq!(
            GitLab.access_header_from_token("PAT:xyz"),
            Some(HttpHeader::new("Private-token", "xyz"))
        );
    }

    #[test]
    fn test_unrecognized_token_type_is_passed_through() {
        assert_eq!(
            GitLab.access_header_from_token("Foo:bar"),
            Some(HttpHeader::new("Foo", "bar"))
        );
    }

    #[test]
    fn test_token_without_type() {
        assert_eq!(GitLab.access_header_from_token("bare"), None);
    }

    #[test]
    fn test_get_rev_from_ref() {
        let transport = CannedTransport::default().with(
            "https://gitlab.com/api/v4/projects/group%2Fproj/repository/commits?ref_name=HEAD",
            &format!(r#"[{{"id":"{REV}","title":"latest"}},{{"id":"{}"}}]"#, "0".repeat(40)),
        );
        let settings = FetchSettings::default();
        let cx = FetchContext {
            transport: &transport,
            settings: &settings,
        };
        let locator = Locator::parse("gitlab:group/proj?ref=HEAD").unwrap();

        let info = GitLab.get_rev_from_ref(cx, &locator).unwrap();
        assert_eq!(info.rev.to_hex(), REV);
        assert_eq!(info.tree_hash, None);
    }

    #[test]
    fn test_empty_commit_list_is_ref_not_found() {
        let transport = CannedTransport::default().with(
            "https://gitlab.com/api/v4/projects/group%2Fproj/repository/commits?ref_name=gone",
            "[]",
        );
        let settings = FetchSettings::default();
        let cx = FetchContext {
            transport: &transport,
            settings: &settings,
        };
        let locator = Locator::parse("gitlab:group/proj/gone").unwrap();

        let err = GitLab.get_rev_from_ref(cx, &locator).unwrap_err();
        assert!(matches!(err, FetchError::RefNotFound { ref reference, .. } if reference == "gone"));
    }

    #[test]
    fn test_download_url() {
        let transport = CannedTransport::default();
        let settings = FetchSettings::default().with_access_token("git.corp", "PAT:xyz");
        let cx = FetchContext {
            transport: &transport,
            settings: &settings,
        };
        let locator = Locator::parse(&format!("gitlab:group/proj/{REV}?host=git.corp")).unwrap();

        let download = GitLab.download_url(cx, &locator).unwrap();
        assert_eq!(
            download.url,
            format!("https://git.corp/api/v4/projects/group%2Fproj/repository/archive.tar.gz?sha={REV}")
        );
        assert_eq!(download.headers, vec![HttpHeader::new("Private-token", "xyz")]);
    }
}
