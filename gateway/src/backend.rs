//! Collaborator interface
//! ----------------------
//!
//! The gateway core never talks to remote storage itself. Listing the
//! namespace, authorizing callers, fetching metadata and object bytes all
//! go through a [`Backend`] implementation supplied by the embedding
//! program. The core calls these hooks from the protocol handlers and
//! owns nothing about transport, authentication or retry policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::Node;
use crate::tree::Vfs;

/// One row of a backend listing: a bucket, an object key, or a key prefix.
/// Matches the JSON shape the metadata service returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>, bytes: u64) -> Self {
        ObjectMeta {
            name: name.into(),
            bytes,
            last_modified: None,
        }
    }
}

/// Remote-storage collaborator consumed by the protocol handlers.
pub trait Backend {
    /// Lists the remote namespace and builds the published tree. Called
    /// once, when the session starts.
    fn build_filesystem(&self) -> Result<Vfs>;

    /// Decides whether the calling process may open files. Rejections
    /// surface to the caller as a canceled open.
    fn authorize_open(&self, pid: u32) -> bool;

    /// Deferred metadata retrieval, run exactly once per node on its
    /// first open. May rewrite the node's size. Failures are the
    /// implementation's to log; the gate does not re-arm.
    fn fetch_metadata(&self, node: &mut Node, path: &str);

    /// Reads up to `buf.len()` bytes of `path` starting at `offset`.
    ///
    /// Returns the number of bytes written into `buf` (possibly fewer
    /// than requested, signalling end of data), `-1` for a general
    /// fault, `-2` when the store rejected access, and any other
    /// negative value for an I/O error. The numeric convention is the
    /// remote client's; the handlers map it to protocol codes.
    fn fetch_bytes(&self, node: &Node, path: &str, buf: &mut [u8], offset: u64) -> i64;

    /// Blocks until no background work started by this backend still
    /// references the tree. Runs before teardown releases the nodes.
    fn wait_for_quiescence(&self);
}
