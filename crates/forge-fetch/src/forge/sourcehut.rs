//! SourceHut (git.sr.ht)
//!
//! git.sr.ht has no anonymous commit API, so refs are resolved from the dumb
//! HTTP protocol files: `HEAD` for the default branch and `info/refs` for the
//! full listing.

use super::{
    fetch_text, pinned_rev, requested_ref, response_hash, DownloadDescriptor, FetchContext, Forge,
    ForgeKind, RevisionInfo,
};
use crate::error::FetchError;
use crate::hash::GitHash;
use crate::locator::{is_rev, Locator};
use crate::transport::HttpHeader;
use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_HOST: &str = "git.sr.ht";

static LS_REMOTE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(ref: *)?([^\s]+)(?:\t+(.*))?$").expect("valid ls-remote regex")
});

/// One line of `git ls-remote`-style output
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteLine<'a> {
    pub symbolic: bool,
    pub target: &'a str,
    pub reference: Option<&'a str>,
}

pub(crate) fn parse_ls_remote_line(line: &str) -> Option<RemoteLine<'_>> {
    let captures = LS_REMOTE_LINE.captures(line)?;
    Some(RemoteLine {
        symbolic: captures.get(1).is_some(),
        target: captures.get(2)?.as_str(),
        reference: captures.get(3).map(|m| m.as_str()),
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SourceHut;

impl SourceHut {
    fn base_url(&self, locator: &Locator) -> String {
        format!(
            "https://{}/{}/{}",
            self.host(locator),
            locator.owner(),
            locator.repo()
        )
    }
}

impl Forge for SourceHut {
    fn kind(&self) -> ForgeKind {
        ForgeKind::SourceHut
    }

    fn default_host(&self) -> &'static str {
        DEFAULT_HOST
    }

    // Accepts both personal access and OAuth2 tokens. Archive downloads of
    // private repositories do not honour it yet.
    fn access_header_from_token(&self, token: &str) -> Option<HttpHeader> {
        Some(HttpHeader::new("Authorization", format!("Bearer {token}")))
    }

    fn get_rev_from_ref(
        &self,
        cx: FetchContext<'_>,
        locator: &Locator,
    ) -> Result<RevisionInfo, FetchError> {
        let reference = requested_ref(locator);
        let base_url = self.base_url(locator);
        let headers = self.auth_headers(cx.settings, &self.host(locator));
        let not_found = || FetchError::RefNotFound {
            input: locator.to_string(),
            reference: reference.to_string(),
        };

        let pattern = if reference == "HEAD" {
            let head = fetch_text(cx, locator, &format!("{base_url}/HEAD"), &headers)?;
            let line = head.lines().next().unwrap_or_default();
            let head = parse_ls_remote_line(line).ok_or_else(not_found)?;
            // Detached HEAD: the file holds the commit itself
            if !head.symbolic && is_rev(head.target) {
                return Ok(RevisionInfo {
                    rev: response_hash(locator, head.target)?,
                    tree_hash: None,
                });
            }
            format!("^{}$", regex::escape(head.target))
        } else {
            format!("^refs/(heads|tags)/{}$", regex::escape(reference))
        };
        let matcher = Regex::new(&pattern).map_err(|e| FetchError::Response {
            input: locator.to_string(),
            reference: reference.to_string(),
            reason: e.to_string(),
        })?;

        let refs = fetch_text(cx, locator, &format!("{base_url}/info/refs"), &headers)?;
        let id = refs
            .lines()
            .filter_map(parse_ls_remote_line)
            .find(|line| line.reference.is_some_and(|name| matcher.is_match(name)))
            .map(|line| line.target)
            .ok_or_else(not_found)?;

        Ok(RevisionInfo {
            rev: response_hash(locator, id)?,
            tree_hash: None,
        })
    }

    fn download_url(
        &self,
        cx: FetchContext<'_>,
        locator: &Locator,
    ) -> Result<DownloadDescriptor, FetchError> {
        let rev: GitHash = pinned_rev(locator)?;
        let url = format!("{}/archive/{rev}.tar.gz", self.base_url(locator));
        let headers = self.auth_headers(cx.settings, &self.host(locator));
        Ok(DownloadDescriptor { url, headers })
    }

    fn clone_url(&self, locator: &Locator) -> String {
        self.base_url(locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchSettings;
    use crate::forge::testing::CannedTransport;

    const MASTER: &str = "1111111111111111111111111111111111111111";
    const DEVELOP: &str = "2222222222222222222222222222222222222222";
    const TAG: &str = "3333333333333333333333333333333333333333";

    fn info_refs() -> String {
        format!(
            "{DEVELOP}\trefs/heads/develop\n{MASTER}\trefs/heads/master\n{TAG}\trefs/tags/v1.0\n"
        )
    }

    fn resolve(transport: &CannedTransport, url: &str) -> Result<RevisionInfo, FetchError> {
        let settings = FetchSettings::default();
        let cx = FetchContext {
            transport,
            settings: &settings,
        };
        SourceHut.get_rev_from_ref(cx, &Locator::parse(url).unwrap())
    }

    #[test]
    fn test_parse_ls_remote_line() {
        assert_eq!(
            parse_ls_remote_line("ref: refs/heads/master"),
            Some(RemoteLine {
                symbolic: true,
                target: "refs/heads/master",
                reference: None,
            })
        );
        assert_eq!(
            parse_ls_remote_line(&format!("{MASTER}\trefs/heads/master")),
            Some(RemoteLine {
                symbolic: false,
                target: MASTER,
                reference: Some("refs/heads/master"),
            })
        );
        assert_eq!(parse_ls_remote_line(""), None);
    }

    #[test]
    fn test_resolve_head_through_symbolic_ref() {
        let transport = CannedTransport::default()
            .with("https://git.sr.ht/~sir/hut/HEAD", "ref: refs/heads/master\n")
            .with("https://git.sr.ht/~sir/hut/info/refs", &info_refs());

        let info = resolve(&transport, "sourcehut:~sir/hut/HEAD").unwrap();
        assert_eq!(info.rev.to_hex(), MASTER);
        assert_eq!(transport.requests.lock().len(), 2);
    }

    #[test]
    fn test_resolve_branch_and_tag() {
        let transport =
            CannedTransport::default().with("https://git.sr.ht/~sir/hut/info/refs", &info_refs());

        assert_eq!(
            resolve(&transport, "sourcehut:~sir/hut/develop").unwrap().rev.to_hex(),
            DEVELOP
        );
        assert_eq!(
            resolve(&transport, "sourcehut:~sir/hut/v1.0").unwrap().rev.to_hex(),
            TAG
        );
    }

    #[test]
    fn test_ref_name_is_not_a_pattern() {
        let transport =
            CannedTransport::default().with("https://git.sr.ht/~sir/hut/info/refs", &info_refs());

        // `.` must not match arbitrary characters
        let err = resolve(&transport, "sourcehut:~sir/hut/v1x0").unwrap_err();
        assert!(matches!(err, FetchError::RefNotFound { .. }));
    }

    #[test]
    fn test_missing_ref() {
        let transport =
            CannedTransport::default().with("https://git.sr.ht/~sir/hut/info/refs", &info_refs());

        let err = resolve(&transport, "sourcehut:~sir/hut/nope").unwrap_err();
        assert_eq!(
            err.to_string(),
            "in 'sourcehut:~sir/hut/nope', couldn't find ref 'nope'"
        );
    }

    #[test]
    fn test_download_and_clone_urls() {
        let transport = CannedTransport::default();
        let settings = FetchSettings::default();
        let cx = FetchContext {
            transport: &transport,
            settings: &settings,
        };
        let locator = Locator::parse(&format!("sourcehut:~sir/hut/{MASTER}")).unwrap();

        assert_eq!(
            SourceHut.download_url(cx, &locator).unwrap().url,
            format!("https://git.sr.ht/~sir/hut/archive/{MASTER}.tar.gz")
        );
        assert_eq!(SourceHut.clone_url(&locator), "https://git.sr.ht/~sir/hut");
    }
}
