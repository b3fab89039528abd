//! Core of the data gateway: a read-only virtual filesystem over remote
//! object storage.
//!
//! The crate keeps an in-memory tree of the remote namespace, resolves
//! slash-separated paths against it with ordered lookup, and implements
//! the kernel filesystem protocol on top, deferring all metadata and
//! content retrieval to a [`Backend`] collaborator until first access.
//!
//! Building and querying a namespace without mounting anything:
//!
//! ```
//! use gateway::{ObjectMeta, VfsBuilder};
//!
//! let mut builder = VfsBuilder::new();
//! let root = builder.root();
//! let bucket = builder.add_directory(root, &ObjectMeta::new("sensors", 0));
//! let file = builder
//!     .add_object_key(bucket, &ObjectMeta::new("2024/temp.csv", 512))
//!     .unwrap();
//! let vfs = builder.finish();
//!
//! assert_eq!(vfs.resolve("/sensors/2024/temp.csv").unwrap(), file);
//! assert_eq!(vfs.node(file).size, 512);
//! ```
//!
//! Mounting is the blocking entry point: hand a [`Backend`] to
//! [`Gateway::new`] and pass it to [`mount::mount`]; the call returns
//! when the filesystem is unmounted.

pub mod backend;
pub mod error;
pub mod fuse;
pub mod mount;
pub mod node;
pub mod tree;

pub use backend::{Backend, ObjectMeta};
pub use error::{Error, Result};
pub use fuse::Gateway;
pub use mount::{mount, MAX_READ};
pub use node::{FetchState, Node, NodeId, NodeKind};
pub use tree::{Vfs, VfsBuilder, ROOT_INO};
