//! Node identities.
//!
//! Identities travel in a fixed 16-byte field, so a [`NodeId`] is a string of
//! at most [`MAX_ID_LEN`] bytes. Over-length identities are rejected at
//! construction; truncation only happens through [`NodeId::truncating`].

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

/// Width of the identity field on the wire, in bytes.
pub const MAX_ID_LEN: usize = 16;

/// Reasons an identity cannot be used on the mesh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("node identity is empty")]
    Empty,

    #[error("node identity is {len} bytes (max {MAX_ID_LEN})")]
    TooLong { len: usize },

    #[error("node identity contains a NUL byte")]
    ContainsNul,
}

/// Unique identity of a mesh participant.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Validate and wrap an identity.
    pub fn new(id: impl Into<String>) -> Result<Self, IdentityError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdentityError::Empty);
        }
        if id.len() > MAX_ID_LEN {
            return Err(IdentityError::TooLong { len: id.len() });
        }
        if id.contains('\0') {
            return Err(IdentityError::ContainsNul);
        }
        Ok(NodeId(id))
    }

    /// Build an identity from the longest prefix of `id` that fits the wire
    /// field, cutting on a char boundary.
    pub fn truncating(id: &str) -> Result<Self, IdentityError> {
        let mut end = id.len().min(MAX_ID_LEN);
        while !id.is_char_boundary(end) {
            end -= 1;
        }
        Self::new(&id[..end])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl TryFrom<&str> for NodeId {
    type Error = IdentityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl std::str::FromStr for NodeId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::new(s)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}
