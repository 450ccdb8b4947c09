//! Core type definitions for BlobIO
//!
//! This module defines the fundamental identifiers used throughout the
//! system: namespace ids, blob ids, locators, ref names and digests.

use chrono::{DateTime, TimeZone, Utc};
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a blob metadata record.
///
/// Blob ids are UUIDv7 values: the top 48 bits are the creation time in
/// Unix milliseconds, followed by a monotonic counter. Byte order equals
/// creation order, and ids are never reused — the garbage collector's
/// correctness rests on both properties.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Into,
)]
pub struct BlobId(Uuid);

impl BlobId {
    /// Create from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Get as raw bytes (big-endian, sorts by creation time).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Reconstruct from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Creation time embedded in the id, at millisecond resolution.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        let b = self.0.as_bytes();
        let millis = ((b[0] as u64) << 40)
            | ((b[1] as u64) << 32)
            | ((b[2] as u64) << 24)
            | ((b[3] as u64) << 16)
            | ((b[4] as u64) << 8)
            | (b[5] as u64);
        Utc.timestamp_millis_opt(millis as i64).unwrap()
    }

    /// The smallest id any record created at or after `time` can have.
    ///
    /// Used as an exclusive range bound, this selects exactly the records
    /// created strictly before `time` (up to millisecond resolution).
    #[must_use]
    pub fn floor_at(time: DateTime<Utc>) -> Self {
        let millis = time.timestamp_millis().max(0) as u64;
        let mut bytes = [0u8; 16];
        bytes[0] = (millis >> 40) as u8;
        bytes[1] = (millis >> 32) as u8;
        bytes[2] = (millis >> 24) as u8;
        bytes[3] = (millis >> 16) as u8;
        bytes[4] = (millis >> 8) as u8;
        bytes[5] = millis as u8;
        bytes[6] = 0x70; // version 7, zero counter
        bytes[8] = 0x80; // RFC 4122 variant, zero remainder
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for BlobId {
    /// The nil id, which sorts before every allocated id.
    fn default() -> Self {
        Self(Uuid::nil())
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a storage namespace.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct NamespaceId(String);

impl NamespaceId {
    /// Create a new namespace id (validates naming rules).
    pub fn new(name: impl Into<String>) -> Result<Self, NamespaceIdError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Create without validation (internal use only).
    #[must_use]
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the namespace id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), NamespaceIdError> {
        if name.is_empty() {
            return Err(NamespaceIdError::Empty);
        }
        if name.len() > 64 {
            return Err(NamespaceIdError::TooLong);
        }

        let first = name.chars().next().unwrap();
        if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
            return Err(NamespaceIdError::InvalidStartChar);
        }

        for c in name.chars() {
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '_' && c != '.' {
                return Err(NamespaceIdError::InvalidChar(c));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamespaceId({})", self.0)
    }
}

impl FromStr for NamespaceId {
    type Err = NamespaceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Validation errors for namespace ids
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamespaceIdError {
    #[error("namespace id cannot be empty")]
    Empty,
    #[error("namespace id exceeds 64 characters")]
    TooLong,
    #[error("namespace id must start with a lowercase letter or digit")]
    InvalidStartChar,
    #[error("invalid character in namespace id: {0:?}")]
    InvalidChar(char),
}

/// Name of a ref: a named pointer to a blob within a namespace.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct RefName(String);

impl RefName {
    /// Create a new ref name (validates naming rules).
    pub fn new(name: impl Into<String>) -> Result<Self, RefNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RefNameError::Empty);
        }
        if name.len() > 250 {
            return Err(RefNameError::TooLong);
        }
        for c in name.chars() {
            if c.is_whitespace() || c.is_control() {
                return Err(RefNameError::InvalidChar(c));
            }
        }
        Ok(Self(name))
    }

    /// Create without validation (internal use only).
    #[must_use]
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the ref name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefName({})", self.0)
    }
}

impl FromStr for RefName {
    type Err = RefNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Validation errors for ref names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefNameError {
    #[error("ref name cannot be empty")]
    Empty,
    #[error("ref name exceeds 250 characters")]
    TooLong,
    #[error("invalid character in ref name: {0:?}")]
    InvalidChar(char),
}

/// Opaque path-like identifier for a stored blob within a namespace.
///
/// A locator may carry a fragment (`base#fragment`) addressing a node
/// inside the blob; only the base part identifies the stored object.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct Locator(String);

impl Locator {
    /// Create a locator from its string form.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Allocate a fresh, unique locator, optionally below a prefix.
    #[must_use]
    pub fn unique(prefix: Option<&str>) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        match prefix {
            Some(prefix) if !prefix.is_empty() => Self(format!("{}/{token}", prefix.trim_end_matches('/'))),
            _ => Self(token),
        }
    }

    /// Combine a base locator with a fragment.
    #[must_use]
    pub fn with_fragment(base: &str, fragment: &str) -> Self {
        if fragment.is_empty() {
            Self(base.to_string())
        } else {
            Self(format!("{base}#{fragment}"))
        }
    }

    /// The base part, without any fragment.
    #[must_use]
    pub fn base(&self) -> &str {
        match self.0.split_once('#') {
            Some((base, _)) => base,
            None => &self.0,
        }
    }

    /// The fragment part, empty if none.
    #[must_use]
    pub fn fragment(&self) -> &str {
        match self.0.split_once('#') {
            Some((_, fragment)) => fragment,
            None => "",
        }
    }

    /// Full string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({})", self.0)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Content digest attached to a ref.
///
/// The digest is opaque to the storage engine: callers compute it over the
/// payload they store and get it back verbatim when reading the ref.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    /// All-zero digest.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(self.0))
    }
}

impl FromStr for Digest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_blob_id_floor_ordering() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap();
        let floor0 = BlobId::floor_at(t0);
        let floor1 = BlobId::floor_at(t1);
        assert!(floor0 < floor1);
        assert_eq!(floor0.timestamp(), t0);
        assert!(BlobId::default() < floor0);
    }

    #[test]
    fn test_namespace_id_validation() {
        assert!(NamespaceId::new("default").is_ok());
        assert!(NamespaceId::new("my-ns.v2_test").is_ok());
        assert_eq!(NamespaceId::new(""), Err(NamespaceIdError::Empty));
        assert_eq!(
            NamespaceId::new("-leading"),
            Err(NamespaceIdError::InvalidStartChar)
        );
        assert_eq!(
            NamespaceId::new("Upper"),
            Err(NamespaceIdError::InvalidStartChar)
        );
        assert_eq!(
            NamespaceId::new("a b"),
            Err(NamespaceIdError::InvalidChar(' '))
        );
    }

    #[test]
    fn test_ref_name_validation() {
        assert!(RefName::new("builds/main/latest").is_ok());
        assert_eq!(RefName::new(""), Err(RefNameError::Empty));
        assert_eq!(RefName::new("a b"), Err(RefNameError::InvalidChar(' ')));
    }

    #[test]
    fn test_locator_fragments() {
        let plain = Locator::new("pkg/abc123");
        assert_eq!(plain.base(), "pkg/abc123");
        assert_eq!(plain.fragment(), "");

        let with_fragment = Locator::with_fragment("pkg/abc123", "node/4");
        assert_eq!(with_fragment.base(), "pkg/abc123");
        assert_eq!(with_fragment.fragment(), "node/4");
        assert_eq!(with_fragment.as_str(), "pkg/abc123#node/4");
    }

    #[test]
    fn test_locator_unique_prefix() {
        let a = Locator::unique(Some("uploads"));
        let b = Locator::unique(Some("uploads"));
        assert!(a.as_str().starts_with("uploads/"));
        assert_ne!(a, b);

        let bare = Locator::unique(None);
        assert!(!bare.as_str().contains('/'));
    }

    #[test]
    fn test_digest_hex_round_trip() {
        let digest = Digest::from_bytes([0xab; 32]);
        let text = digest.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<Digest>().unwrap(), digest);
        assert!("zz".parse::<Digest>().is_err());
    }
}
