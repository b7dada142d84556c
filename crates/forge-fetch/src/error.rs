//! Errors surfaced to callers of the fetcher

use crate::facts::FactCacheError;
use crate::git::GitError;
use crate::hash::HashParseError;
use crate::store::StoreError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors that can occur while parsing, resolving or fetching a locator
#[derive(Debug, Error)]
pub enum FetchError {
    /// Malformed compact locator
    #[error("{0}")]
    BadUrl(String),

    /// Attribute outside the fixed allow-list
    #[error("unsupported input attribute '{0}'")]
    UnsupportedAttribute(String),

    /// Mandatory attribute absent
    #[error("input attribute '{0}' is missing")]
    MissingAttribute(String),

    /// Attribute present with the wrong scalar type
    #[error("input attribute '{name}' must be {expected}")]
    AttributeType { name: String, expected: &'static str },

    /// Attribute value fails its pattern
    #[error("input attribute '{name}' has invalid value '{value}'")]
    InvalidAttribute { name: String, value: String },

    /// `ref` and `rev` both present
    #[error("input '{input}' contains both a commit hash ({rev}) and a branch/tag name ('{reference}')")]
    RefAndRev {
        input: String,
        reference: String,
        rev: String,
    },

    /// Both overrides supplied at once
    #[error("cannot apply both a commit hash ({rev}) and a branch/tag name ('{reference}') to input '{input}'")]
    ConflictingOverrides {
        input: String,
        reference: String,
        rev: String,
    },

    /// Invalid object id
    #[error(transparent)]
    InvalidHash(#[from] HashParseError),

    /// Locator type with no registered forge
    #[error("input type '{0}' is not supported")]
    UnknownForge(String),

    /// Network failure or non-success HTTP status
    #[error("unable to fetch '{input}': {source}")]
    Transport {
        input: String,
        #[source]
        source: TransportError,
    },

    /// Forge answered with something we cannot interpret
    #[error("unexpected response from forge for '{input}' (ref '{reference}'): {reason}")]
    Response {
        input: String,
        reference: String,
        reason: String,
    },

    /// No reference on the forge matches the requested ref
    #[error("in '{input}', couldn't find ref '{reference}'")]
    RefNotFound { input: String, reference: String },

    /// Tree hash differs from a previously locked value
    #[error("Git tree hash mismatch in input '{input}', expected '{expected}'")]
    TreeHashMismatch { input: String, expected: String },

    /// Other locked attribute differs
    #[error("'{attribute}' mismatch in input '{input}', expected '{expected}', got '{actual}'")]
    LockMismatch {
        input: String,
        attribute: &'static str,
        expected: String,
        actual: String,
    },

    /// Tree store failure
    #[error("unable to import '{input}': {source}")]
    Store {
        input: String,
        #[source]
        source: StoreError,
    },

    /// Fact cache failure
    #[error("Fact cache error: {0}")]
    Facts(#[from] FactCacheError),

    /// Fallback clone failure
    #[error("unable to clone '{input}': {source}")]
    Clone {
        input: String,
        #[source]
        source: GitError,
    },
}
