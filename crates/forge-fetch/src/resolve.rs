//! Ref to revision resolution

use crate::error::FetchError;
use crate::forge::{FetchContext, Forge};
use crate::hash::GitHash;
use crate::locator::Locator;
use tracing::debug;

/// A locator pinned to a concrete revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Input with `ref` replaced by `rev`
    pub locator: Locator,
    pub rev: GitHash,
    /// Tree hash the forge reported for `rev`, if it reports one
    pub upstream_tree_hash: Option<GitHash>,
}

/// Pin `locator` to a revision. Already pinned locators are returned as is,
/// without touching the network; otherwise the ref (`HEAD` if absent) is
/// looked up with a single request.
pub fn resolve(
    forge: &dyn Forge,
    cx: FetchContext<'_>,
    locator: &Locator,
) -> Result<Resolved, FetchError> {
    if let Some(rev) = locator.rev() {
        return Ok(Resolved {
            locator: locator.clone(),
            rev,
            upstream_tree_hash: None,
        });
    }

    let input = match locator.ref_name() {
        Some(_) => locator.clone(),
        None => locator.apply_overrides(Some("HEAD"), None)?,
    };
    let info = forge.get_rev_from_ref(cx, &input)?;
    debug!(
        "resolved '{}' to revision {}",
        input.ref_name().unwrap_or("HEAD"),
        info.rev
    );

    Ok(Resolved {
        locator: input.pin(info.rev),
        rev: info.rev,
        upstream_tree_hash: info.tree_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchSettings;
    use crate::forge::testing::CannedTransport;
    use crate::forge::GitHub;

    const REV: &str = "0123456789abcdef0123456789abcdef01234567";
    const TREE: &str = "89abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_pinned_locator_is_not_resolved() {
        let transport = CannedTransport::default();
        let settings = FetchSettings::default();
        let cx = FetchContext {
            transport: &transport,
            settings: &settings,
        };
        let locator = Locator::parse(&format!("github:o/r/{REV}")).unwrap();

        let resolved = resolve(&GitHub, cx, &locator).unwrap();
        assert_eq!(resolved.locator, locator);
        assert_eq!(resolved.upstream_tree_hash, None);
        assert!(transport.requests.lock().is_empty());
    }

    #[test]
    fn test_missing_ref_defaults_to_head() {
        let body = format!(r#"{{"sha":"{REV}","commit":{{"tree":{{"sha":"{TREE}"}}}}}}"#);
        let transport = CannedTransport::default()
            .with("https://api.github.com/repos/o/r/commits/HEAD", &body);
        let settings = FetchSettings::default();
        let cx = FetchContext {
            transport: &transport,
            settings: &settings,
        };
        let mut attrs = crate::locator::Attrs::new();
        attrs.insert("type".into(), "github".into());
        attrs.insert("owner".into(), "o".into());
        attrs.insert("repo".into(), "r".into());
        let locator = Locator::from_attrs(attrs).unwrap();

        let resolved = resolve(&GitHub, cx, &locator).unwrap();
        assert_eq!(resolved.rev.to_hex(), REV);
        assert_eq!(resolved.upstream_tree_hash.unwrap().to_hex(), TREE);
        assert_eq!(resolved.locator.ref_name(), None);
        assert_eq!(resolved.locator.rev(), Some(resolved.rev));
        assert_eq!(transport.requests.lock().len(), 1);
    }
}
