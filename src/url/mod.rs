//! URL handling module for Sumi-Crawl
//!
//! This module provides URL canonicalization, link filtering, scope checks
//! and the host keys used by the politeness layer.

mod domain;
mod matcher;
mod normalize;
mod scope;

pub use domain::{extract_domain, host_key, registrable_domain};
pub use matcher::matches_wildcard;
pub use normalize::{canonicalize, normalize, normalize_url, CanonicalUrl, Rejection};
pub use scope::{in_scope, in_scope_any};
