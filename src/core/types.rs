//! core::types
//!
//! Strong types for pool domain concepts.
//!
//! # Types
//!
//! - [`NamespacePath`] - Ordered list of namespace segments
//! - [`StoreKey`] - Encoded, collision-free map key for a path
//! - [`ConsumerId`] - Counter-derived consumer session identifier
//! - [`SubscriptionId`] - Monotonic change-subscription identifier
//!
//! # Examples
//!
//! ```
//! use statepool::core::types::{NamespacePath, StoreKey};
//!
//! let path = NamespacePath::from(["App", "Users", "Create", "Permitted"]);
//! let key = StoreKey::encode(&path);
//!
//! assert_eq!(key.path(), &path);
//! assert_eq!(StoreKey::parse(key.as_str()).unwrap(), key);
//! assert_eq!(path.to_string(), "App->Users->Create->Permitted");
//! ```

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::codec::{self, KeyError};

/// An ordered path of namespace segments, e.g. `["App", "Users", "Permitted"]`.
///
/// Segment order is significant and segments are opaque: any string,
/// including the empty string, is a valid segment. The empty path is the
/// root namespace and is used as the prefix for top-level queries.
///
/// Paths order lexicographically by segment, giving a total order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespacePath(Vec<String>);

impl NamespacePath {
    /// Create a path from any sequence of segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The root (empty) path.
    pub fn root() -> Self {
        Self::default()
    }

    /// The segments of this path.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// The path without its last segment, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, rest)| Self(rest.to_vec()))
    }

    /// The last segment, if any.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Whether `prefix` is a segment-wise prefix of this path.
    pub fn starts_with(&self, prefix: &NamespacePath) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for NamespacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("->"))
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for NamespacePath {
    fn from(segments: [S; N]) -> Self {
        Self::new(segments)
    }
}

impl From<Vec<String>> for NamespacePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&NamespacePath> for NamespacePath {
    fn from(path: &NamespacePath) -> Self {
        path.clone()
    }
}

impl<S: Into<String>> FromIterator<S> for NamespacePath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// The encoded map key for a [`NamespacePath`].
///
/// Equality, ordering and hashing use only the encoded string, so a
/// `BTreeMap<StoreKey, _>` can be range-scanned with `&str` bounds. The
/// decoded path is carried alongside so it never has to be re-parsed.
#[derive(Debug, Clone)]
pub struct StoreKey {
    encoded: String,
    path: NamespacePath,
}

impl StoreKey {
    /// Encode a path into its key.
    pub fn encode(path: &NamespacePath) -> Self {
        Self {
            encoded: codec::encode(path.segments()),
            path: path.clone(),
        }
    }

    /// Parse an already-encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the string is not a canonical encoding.
    pub fn parse(encoded: impl Into<String>) -> Result<Self, KeyError> {
        let encoded = encoded.into();
        let path = NamespacePath::from(codec::decode(&encoded)?);
        Ok(Self { encoded, path })
    }

    /// The encoded form.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// The decoded path.
    pub fn path(&self) -> &NamespacePath {
        &self.path
    }

    /// The last path segment, i.e. the bare field name under its namespace.
    pub fn field(&self) -> Option<&str> {
        self.path.last()
    }

    /// Whether this key lies at or below `prefix`.
    pub fn is_under(&self, prefix: &StoreKey) -> bool {
        codec::is_under(&prefix.encoded, &self.encoded)
    }
}

impl PartialEq for StoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for StoreKey {}

impl PartialOrd for StoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.encoded.cmp(&other.encoded)
    }
}

impl Hash for StoreKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded.hash(state);
    }
}

impl Borrow<str> for StoreKey {
    fn borrow(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}

impl From<&NamespacePath> for StoreKey {
    fn from(path: &NamespacePath) -> Self {
        Self::encode(path)
    }
}

/// Identifier of a consumer session.
///
/// Issued from a per-pool counter, so ids are unique within a pool and
/// ordered by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsumerId(u64);

impl ConsumerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer#{}", self.0)
    }
}

/// Identifier returned by `subscribe_to_changes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn child_and_parent_are_inverse() {
        let app = NamespacePath::from(["App"]);
        let users = app.child("Users");
        assert_eq!(users.segments(), ["App", "Users"]);
        assert_eq!(users.parent(), Some(app));
        assert_eq!(NamespacePath::root().parent(), None);
    }

    #[test]
    fn reversed_paths_are_distinct() {
        let forward = NamespacePath::from(["App", "Users", "Create", "Permitted"]);
        let reverse: NamespacePath = forward.segments().iter().rev().cloned().collect();
        assert_ne!(forward, reverse);
        assert_ne!(StoreKey::encode(&forward), StoreKey::encode(&reverse));
    }

    #[test]
    fn starts_with_is_segment_wise() {
        let path = NamespacePath::from(["App", "Users"]);
        assert!(path.starts_with(&NamespacePath::from(["App"])));
        assert!(path.starts_with(&NamespacePath::root()));
        assert!(!path.starts_with(&NamespacePath::from(["Ap"])));
    }

    #[test]
    fn display_joins_with_arrows() {
        let path = NamespacePath::from(["Snackbar", "open"]);
        assert_eq!(path.to_string(), "Snackbar->open");
        assert_eq!(StoreKey::encode(&path).to_string(), "Snackbar->open");
    }

    #[test]
    fn key_field_is_last_segment() {
        let key = StoreKey::encode(&NamespacePath::from(["Dialog", "state"]));
        assert_eq!(key.field(), Some("state"));
        assert_eq!(StoreKey::encode(&NamespacePath::root()).field(), None);
    }

    #[test]
    fn parse_rejects_non_canonical_keys() {
        assert!(StoreKey::parse("3:App").is_ok());
        assert!(StoreKey::parse("03:App").is_err());
        assert!(StoreKey::parse("3:Ap").is_err());
    }

    #[test]
    fn keys_can_be_looked_up_by_encoded_str() {
        let key = StoreKey::encode(&NamespacePath::from(["A", "v"]));
        let mut map = BTreeMap::new();
        map.insert(key.clone(), 1);
        assert_eq!(map.get(key.as_str()), Some(&1));
    }

    #[test]
    fn path_serializes_as_array() {
        let path = NamespacePath::from(["A", "v"]);
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, r#"["A","v"]"#);
        let parsed: NamespacePath = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, path);
    }

    #[test]
    fn ids_display_with_kind() {
        assert_eq!(ConsumerId::new(3).to_string(), "consumer#3");
        assert_eq!(SubscriptionId::new(0).to_string(), "subscription#0");
    }
}
