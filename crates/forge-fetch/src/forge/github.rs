//! GitHub and GitHub Enterprise

use super::{
    fetch_json, pinned_rev, requested_ref, response_hash, DownloadDescriptor, FetchContext, Forge,
    ForgeKind, RevisionInfo,
};
use crate::error::FetchError;
use crate::locator::Locator;
use crate::transport::HttpHeader;
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "github.com";

/// `GET /repos/{owner}/{repo}/commits/{ref}`, trimmed to what we read
#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    tree: TreeRef,
}

#[derive(Debug, Deserialize)]
struct TreeRef {
    sha: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GitHub;

impl Forge for GitHub {
    fn kind(&self) -> ForgeKind {
        ForgeKind::GitHub
    }

    fn default_host(&self) -> &'static str {
        DEFAULT_HOST
    }

    // Personal access and OAuth tokens both go in as `token <t>`; HTTP Basic
    // with the token as password also works but is not used here.
    fn access_header_from_token(&self, token: &str) -> Option<HttpHeader> {
        Some(HttpHeader::new("Authorization", format!("token {token}")))
    }

    fn get_rev_from_ref(
        &self,
        cx: FetchContext<'_>,
        locator: &Locator,
    ) -> Result<RevisionInfo, FetchError> {
        let host = self.host(locator);
        let reference = requested_ref(locator);
        let url = if host == DEFAULT_HOST {
            format!(
                "https://api.{host}/repos/{}/{}/commits/{reference}",
                locator.owner(),
                locator.repo()
            )
        } else {
            format!(
                "https://{host}/api/v3/repos/{}/{}/commits/{reference}",
                locator.owner(),
                locator.repo()
            )
        };

        let headers = self.auth_headers(cx.settings, &host);
        let commit: CommitResponse = fetch_json(cx, locator, &url, &headers)?;

        Ok(RevisionInfo {
            rev: response_hash(locator, &commit.sha)?,
            tree_hash: Some(response_hash(locator, &commit.commit.tree.sha)?),
        })
    }

    fn download_url(
        &self,
        cx: FetchContext<'_>,
        locator: &Locator,
    ) -> Result<DownloadDescriptor, FetchError> {
        let host = self.host(locator);
        let rev = pinned_rev(locator)?;
        let headers = self.auth_headers(cx.settings, &host);
        let (owner, repo) = (locator.owner(), locator.repo());

        // Anonymous downloads use the public archive URL, which is not subject
        // to the API rate limit.
        let url = if host != DEFAULT_HOST {
            format!("https://{host}/api/v3/repos/{owner}/{repo}/tarball/{rev}")
        } else if headers.is_empty() {
            format!("https://{host}/{owner}/{repo}/archive/{rev}.tar.gz")
        } else {
            format!("https://api.{host}/repos/{owner}/{repo}/tarball/{rev}")
        };

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

    const REV: &str = "0123456789abcdef0123456789abcdef01234567";
    const TREE: &str = "89abcdef0123456789abcdef0123456789abcdef";

    fn commit_json() -> String {
        format!(r#"{{"sha":"{REV}","commit":{{"tree":{{"sha":"{TREE}"}},"message":"m"}}}}"#)
    }

    #[test]
    fn test_access_header() {
        assert_eq!(
            GitHub.access_header_from_token("abc"),
            Some(HttpHeader::new("Authorization", "token abc"))
        );
    }

    #[test]
    fn test_get_rev_from_ref_public_host() {
        let transport = CannedTransport::default().with(
            "https://api.github.com/repos/nixos/nix/commits/master",
            &commit_json(),
        );
        let settings = FetchSettings::default();
        let cx = FetchContext {
            transport: &transport,
            settings: &settings,
        };
        let locator = Locator::parse("github:nixos/nix/master").unwrap();

        let info = GitHub.get_rev_from_ref(cx, &locator).unwrap();
        assert_eq!(info.rev.to_hex(), REV);
        assert_eq!(info.tree_hash.unwrap().to_hex(), TREE);
    }

    #[test]
    fn test_get_rev_from_ref_enterprise_host() {
        let transport = CannedTransport::default().with(
            "https://ghe.corp/api/v3/repos/team/tool/commits/release/2.0",
            &commit_json(),
        );
        let settings = FetchSettings::default().with_access_token("ghe.corp", "t0k");
        let cx = FetchContext {
            transport: &transport,
            settings: &settings,
        };
        let locator = Locator::parse("github:team/tool/release/2.0?host=ghe.corp").unwrap();

        GitHub.get_rev_from_ref(cx, &locator).unwrap();
        let requests = transport.requests.lock();
        assert_eq!(requests[0].1, vec![HttpHeader::new("Authorization", "token t0k")]);
    }

    #[test]
    fn test_malformed_response() {
        let transport = CannedTransport::default().with(
            "https://api.github.com/repos/o/r/commits/main",
            r#"{"message":"Not Found"}"#,
        );
        let settings = FetchSettings::default();
        let cx = FetchContext {
            transport: &transport,
            settings: &settings,
        };
        let locator = Locator::parse("github:o/r/main").unwrap();

        let err = GitHub.get_rev_from_ref(cx, &locator).unwrap_err();
        assert!(matches!(err, FetchError::Response { ref reference, .. } if reference == "main"));
    }

    #[test]
    fn test_download_url_variants() {
        let transport = CannedTransport::default();
        let anonymous = FetchSettings::default();
        let authed = FetchSettings::default().with_access_token("github.com", "t");
        let locator = Locator::parse(&format!("github:o/r/{REV}")).unwrap();

        let cx = FetchContext {
            transport: &transport,
            settings: &anonymous,
        };
        let public = GitHub.download_url(cx, &locator).unwrap();
        assert_eq!(public.url, format!("https://github.com/o/r/archive/{REV}.tar.gz"));
        assert!(public.headers.is_empty());

        let cx = FetchContext {
            transport: &transport,
            settings: &authed,
        };
        let api = GitHub.download_url(cx, &locator).unwrap();
        assert_eq!(api.url, format!("https://api.github.com/repos/o/r/tarball/{REV}"));
        assert_eq!(api.headers.len(), 1);

        let enterprise = Locator::parse(&format!("github:o/r/{REV}?host=ghe.corp")).unwrap();
        let ghe = GitHub.download_url(cx, &enterprise).unwrap();
        assert_eq!(ghe.url, format!("https://ghe.corp/api/v3/repos/o/r/tarball/{REV}"));
    }

    #[test]
    fn test_clone_url() {
        let locator = Locator::parse("github:o/r/main").unwrap();
        assert_eq!(GitHub.clone_url(&locator), "https://github.com/o/r.git");
    }
}
