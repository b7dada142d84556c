//! Locators
//!
//! A locator is the normalized attribute set that names a repository on a
//! forge, optionally pinned to a branch/tag (`ref`) or a commit (`rev`). It can
//! be built from the compact URL form
//!
//! ```text
//! <scheme>:<owner>/<repo>[/<ref-or-rev>][?ref=<ref>][&rev=<rev>][&host=<host>]
//! ```
//!
//! or from a raw attribute map (e.g. a lockfile entry). Every constructor and
//! transition goes through [`Locator::checked`], which is the one place the
//! `ref`/`rev` exclusivity invariant is enforced.

use crate::error::FetchError;
use crate::forge::ForgeKind;
use crate::hash::GitHash;
use crate::store::TarballInfo;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Attribute names a locator may carry
pub const ALLOWED_ATTRS: [&str; 9] = [
    "type",
    "owner",
    "repo",
    "ref",
    "rev",
    "narHash",
    "lastModified",
    "host",
    "treeHash",
];

static REV_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("valid rev regex"));

static REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9@][a-zA-Z0-9_./@+-]*$").expect("valid ref regex")
});

// Names git itself refuses (git check-ref-format)
static BAD_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"//|^[./]|/\.|\.\.|@\{|\.lock$|\.lock/|[/.]$|^@$").expect("valid bad-ref regex")
});

static HOST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9.-]+$").expect("valid host regex"));

/// A scalar attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attr {
    Int(u64),
    String(String),
}

impl Attr {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attr::String(s) => Some(s),
            Attr::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            Attr::Int(n) => Some(*n),
            Attr::String(_) => None,
        }
    }
}

impl From<&str> for Attr {
    fn from(s: &str) -> Self {
        Attr::String(s.to_string())
    }
}

impl From<String> for Attr {
    fn from(s: String) -> Self {
        Attr::String(s)
    }
}

impl From<u64> for Attr {
    fn from(n: u64) -> Self {
        Attr::Int(n)
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attr::Int(n) => write!(f, "{n}"),
            Attr::String(s) => f.write_str(s),
        }
    }
}

/// Ordered attribute map
pub type Attrs = BTreeMap<String, Attr>;

/// True if `s` is a full 40 character hex revision
pub fn is_rev(s: &str) -> bool {
    REV_REGEX.is_match(s)
}

/// True if `s` is acceptable as a branch or tag name
pub fn is_ref_name(s: &str) -> bool {
    REF_REGEX.is_match(s) && !BAD_REF_REGEX.is_match(s)
}

/// True if `s` is acceptable as a forge hostname
pub fn is_host(s: &str) -> bool {
    HOST_REGEX.is_match(s)
}

/// A validated forge locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    kind: ForgeKind,
    attrs: Attrs,
}

impl Locator {
    /// Parse the compact URL form
    pub fn parse(input: &str) -> Result<Self, FetchError> {
        let url = url::Url::parse(input)
            .map_err(|e| FetchError::BadUrl(format!("'{input}' is not a valid URL: {e}")))?;
        let kind = ForgeKind::from_scheme(url.scheme())
            .ok_or_else(|| FetchError::UnknownForge(url.scheme().to_string()))?;
        Self::from_url(kind, &url)
    }

    /// Parse an already split URL whose scheme names `kind`
    pub fn from_url(kind: ForgeKind, url: &url::Url) -> Result<Self, FetchError> {
        let input = url.as_str();
        let path = url
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|s| s.into_owned())
                    .map_err(|_| FetchError::BadUrl(format!("URL '{input}' is not valid UTF-8")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if path.len() < 2 {
            return Err(FetchError::BadUrl(format!("URL '{input}' is invalid")));
        }

        let mut rev: Option<GitHash> = None;
        let mut reference: Option<String> = None;
        let mut host: Option<String> = None;

        match path.len() {
            2 => {}
            3 => {
                let segment = &path[2];
                if is_rev(segment) {
                    rev = Some(GitHash::parse(segment)?);
                } else if is_ref_name(segment) {
                    reference = Some(segment.clone());
                } else {
                    return Err(FetchError::BadUrl(format!(
                        "in URL '{input}', '{segment}' is not a commit hash or branch/tag name"
                    )));
                }
            }
            _ => {
                let joined = path[2..].join("/");
                if !is_ref_name(&joined) {
                    return Err(FetchError::BadUrl(format!(
                        "in URL '{input}', '{joined}' is not a branch/tag name"
                    )));
                }
                reference = Some(joined);
            }
        }

        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "rev" => {
                    if rev.is_some() {
                        return Err(FetchError::BadUrl(format!(
                            "URL '{input}' contains multiple commit hashes"
                        )));
                    }
                    rev = Some(GitHash::parse(&value)?);
                }
                "ref" => {
                    if !is_ref_name(&value) {
                        return Err(FetchError::BadUrl(format!(
                            "URL '{input}' contains an invalid branch/tag name"
                        )));
                    }
                    if reference.is_some() {
                        return Err(FetchError::BadUrl(format!(
                            "URL '{input}' contains multiple branch/tag names"
                        )));
                    }
                    reference = Some(value.into_owned());
                }
                "host" => {
                    if !is_host(&value) {
                        return Err(FetchError::BadUrl(format!(
                            "URL '{input}' contains an invalid instance host"
                        )));
                    }
                    if host.is_some() {
                        return Err(FetchError::BadUrl(format!(
                            "URL '{input}' contains multiple instance hosts"
                        )));
                    }
                    host = Some(value.into_owned());
                }
                other => {
                    return Err(FetchError::BadUrl(format!(
                        "URL '{input}' contains unsupported parameter '{other}'"
                    )));
                }
            }
        }

        if path.len() == 2 && reference.is_none() && rev.is_none() {
            return Err(FetchError::BadUrl(format!(
                "URL '{input}' must name a branch/tag or commit hash"
            )));
        }

        let mut attrs = Attrs::new();
        attrs.insert("type".into(), kind.scheme().into());
        attrs.insert("owner".into(), path[0].clone().into());
        attrs.insert("repo".into(), path[1].clone().into());
        if let Some(rev) = rev {
            attrs.insert("rev".into(), rev.to_hex().into());
        }
        if let Some(reference) = reference {
            attrs.insert("ref".into(), reference.into());
        }
        if let Some(host) = host {
            attrs.insert("host".into(), host.into());
        }

        Self::checked(kind, attrs)
    }

    /// Validate a raw attribute map
    pub fn from_attrs(attrs: Attrs) -> Result<Self, FetchError> {
        let tag = match attrs.get("type") {
            Some(Attr::String(tag)) => tag.as_str(),
            Some(Attr::Int(_)) => {
                return Err(FetchError::AttributeType {
                    name: "type".into(),
                    expected: "a string",
                })
            }
            None => return Err(FetchError::MissingAttribute("type".into())),
        };
        let kind = ForgeKind::from_scheme(tag).ok_or_else(|| FetchError::UnknownForge(tag.to_string()))?;

        if let Some(name) = attrs.keys().find(|name| !ALLOWED_ATTRS.contains(&name.as_str())) {
            return Err(FetchError::UnsupportedAttribute(name.clone()));
        }

        Self::checked(kind, attrs)
    }

    /// The single invariant-checking constructor behind every transition
    fn checked(kind: ForgeKind, attrs: Attrs) -> Result<Self, FetchError> {
        for name in ["owner", "repo"] {
            match attrs.get(name) {
                Some(Attr::String(_)) => {}
                Some(Attr::Int(_)) => {
                    return Err(FetchError::AttributeType {
                        name: name.into(),
                        expected: "a string",
                    })
                }
                None => return Err(FetchError::MissingAttribute(name.into())),
            }
        }
        for name in ["ref", "rev", "host", "narHash", "treeHash"] {
            if matches!(attrs.get(name), Some(Attr::Int(_))) {
                return Err(FetchError::AttributeType {
                    name: name.into(),
                    expected: "a string",
                });
            }
        }
        if matches!(attrs.get("lastModified"), Some(Attr::String(_))) {
            return Err(FetchError::AttributeType {
                name: "lastModified".into(),
                expected: "an integer",
            });
        }
        for name in ["rev", "treeHash"] {
            if let Some(value) = attrs.get(name).and_then(Attr::as_str) {
                GitHash::parse(value)?;
            }
        }
        if let Some(host) = attrs.get("host").and_then(Attr::as_str) {
            if !is_host(host) {
                return Err(FetchError::InvalidAttribute {
                    name: "host".into(),
                    value: host.to_string(),
                });
            }
        }

        let locator = Self { kind, attrs };
        if let (Some(reference), Some(rev)) = (locator.ref_name(), locator.str_attr("rev")) {
            return Err(FetchError::RefAndRev {
                input: format!("{}:{}/{}", kind.scheme(), locator.owner(), locator.repo()),
                reference: reference.to_string(),
                rev: rev.to_string(),
            });
        }
        Ok(locator)
    }

    /// Canonical compact URL; renders at most one of `ref`/`rev`
    pub fn to_url(&self) -> String {
        let reference = self.ref_name();
        let rev = self.rev();
        debug_assert!(!(reference.is_some() && rev.is_some()));

        // Segments are decoded on parse, so owner and repo are re-encoded here
        let mut url = format!(
            "{}:{}/{}",
            self.kind.scheme(),
            urlencoding::encode(self.owner()),
            urlencoding::encode(self.repo())
        );
        if let Some(reference) = reference {
            url.push('/');
            url.push_str(reference);
        } else if let Some(rev) = rev {
            url.push('/');
            url.push_str(&rev.to_hex());
        }
        if let Some(host) = self.host() {
            url.push_str("?host=");
            url.push_str(host);
        }
        url
    }

    /// Replace the ref or rev; supplying one clears the other
    pub fn apply_overrides(
        &self,
        reference: Option<&str>,
        rev: Option<GitHash>,
    ) -> Result<Self, FetchError> {
        if let (Some(reference), Some(rev)) = (reference, rev) {
            return Err(FetchError::ConflictingOverrides {
                input: self.to_url(),
                reference: reference.to_string(),
                rev: rev.to_hex(),
            });
        }

        let mut attrs = self.attrs.clone();
        if let Some(rev) = rev {
            attrs.insert("rev".into(), rev.to_hex().into());
            attrs.remove("ref");
        }
        if let Some(reference) = reference {
            if !is_ref_name(reference) {
                return Err(FetchError::InvalidAttribute {
                    name: "ref".into(),
                    value: reference.to_string(),
                });
            }
            attrs.insert("ref".into(), reference.into());
            attrs.remove("rev");
        }
        Self::checked(self.kind, attrs)
    }

    /// Pin to a resolved revision, dropping the symbolic ref
    pub(crate) fn pin(&self, rev: GitHash) -> Self {
        let mut attrs = self.attrs.clone();
        attrs.remove("ref");
        attrs.insert("rev".into(), rev.to_hex().into());
        Self {
            kind: self.kind,
            attrs,
        }
    }

    /// Fold post-fetch facts back into the locator
    pub(crate) fn with_tarball_info(&self, info: &TarballInfo) -> Self {
        let mut attrs = self.attrs.clone();
        attrs.insert("treeHash".into(), info.tree_hash.to_hex().into());
        attrs.insert("lastModified".into(), info.last_modified.into());
        Self {
            kind: self.kind,
            attrs,
        }
    }

    /// True iff a concrete revision is present
    pub fn is_locked(&self) -> bool {
        self.rev().is_some()
    }

    pub fn kind(&self) -> ForgeKind {
        self.kind
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn into_attrs(self) -> Attrs {
        self.attrs
    }

    pub fn owner(&self) -> &str {
        self.str_attr("owner").unwrap_or_default()
    }

    pub fn repo(&self) -> &str {
        self.str_attr("repo").unwrap_or_default()
    }

    pub fn host(&self) -> Option<&str> {
        self.str_attr("host")
    }

    pub fn ref_name(&self) -> Option<&str> {
        self.str_attr("ref")
    }

    pub fn rev(&self) -> Option<GitHash> {
        self.str_attr("rev").and_then(|rev| GitHash::parse(rev).ok())
    }

    /// Tree identity recorded by a previous fetch; used for lock comparison only
    pub fn tree_hash(&self) -> Option<GitHash> {
        self.str_attr("treeHash")
            .and_then(|hash| GitHash::parse(hash).ok())
    }

    pub fn nar_hash(&self) -> Option<&str> {
        self.str_attr("narHash")
    }

    pub fn last_modified(&self) -> Option<u64> {
        self.attrs.get("lastModified").and_then(Attr::as_int)
    }

    fn str_attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Attr::as_str)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

impl std::str::FromStr for Locator {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
