//! Filesystem-protocol handlers
//! ----------------------------
//!
//! [`Gateway`] bridges kernel filesystem calls into tree lookups and
//! on-demand retrieval through the [`Backend`] collaborator. The handler
//! logic lives in plain methods returning [`Result`] so the operation
//! contracts can be exercised directly; the `fuser::Filesystem` impl at
//! the bottom only translates errors into negative protocol codes.
//!
//! The session loop dispatches one call at a time on the mounting thread
//! (the handlers take `&mut self`), which is what makes the per-node
//! one-shot fetch gate safe without locking.

use std::ffi::OsStr;
use std::time::Duration;

use fuser::{
    FileAttr, FileType, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry,
    ReplyOpen, Request,
};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::mount::MAX_READ;
use crate::node::{NodeId, NodeKind};
use crate::tree::Vfs;

const TTL: Duration = Duration::from_secs(1);

pub struct Gateway<B> {
    backend: B,
    vfs: Option<Vfs>,
}

impl<B: Backend> Gateway<B> {
    pub fn new(backend: B) -> Self {
        Gateway { backend, vfs: None }
    }

    /// The published tree, once [`Gateway::start`] has run.
    pub fn vfs(&self) -> Option<&Vfs> {
        self.vfs.as_ref()
    }

    /// Builds the tree through the collaborator and captures the
    /// mounting identity. Runs once, when the kernel session starts.
    pub fn start(&mut self) -> Result<()> {
        log::info!("Initializing in-memory gateway database");
        let mut vfs = self.backend.build_filesystem()?;
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        vfs.set_owner(uid, gid);
        log::info!("Gateway database completed, {} entries", vfs.len());
        self.vfs = Some(vfs);
        Ok(())
    }

    /// Teardown: waits for background work referencing the tree to
    /// finish, then releases the whole tree in one pass. Runs after the
    /// session loop has stopped dispatching.
    pub fn shutdown(&mut self) {
        self.backend.wait_for_quiescence();
        self.vfs = None;
    }

    fn tree(&self) -> Result<&Vfs> {
        self.vfs.as_ref().ok_or(Error::Fault)
    }

    fn resolve_handle(vfs: &Vfs, ino: u64) -> Result<NodeId> {
        vfs.by_ino(ino)
            .ok_or_else(|| Error::NotFound(format!("inode {ino}")))
    }

    /// Single-segment resolution for the kernel's path walk.
    pub fn lookup_entry(&self, parent: u64, name: &str) -> Result<FileAttr> {
        let vfs = self.tree()?;
        let dir = Self::resolve_handle(vfs, parent)?;
        let child = vfs.lookup_child(dir, name).ok_or_else(|| {
            let mut path = vfs.path_of(dir);
            if !path.ends_with('/') {
                path.push('/');
            }
            path.push_str(name);
            Error::NotFound(path)
        })?;
        Ok(node_attr(vfs, child))
    }

    /// Opens a file: authorization first, then type check, then the
    /// one-shot metadata fetch. The returned handle is the node's
    /// identifier.
    pub fn open_node(&mut self, pid: u32, ino: u64) -> Result<u64> {
        if !self.backend.authorize_open(pid) {
            return Err(Error::Canceled);
        }
        let vfs = self.vfs.as_mut().ok_or(Error::Fault)?;
        let id = Self::resolve_handle(vfs, ino)?;
        if vfs.node(id).is_dir() {
            return Err(Error::IsDirectory(vfs.path_of(id)));
        }

        let path = vfs.backend_path(id);
        let node = vfs.node_mut(id);
        if node.mark_fetched() {
            log::debug!("First open of {path}, fetching metadata");
            self.backend.fetch_metadata(node, &path);
        }
        Ok(ino)
    }

    /// Delegates a byte range to the fetch collaborator and maps its
    /// numeric result. A short read signals end of data; no retries
    /// happen here.
    pub fn read_node(&self, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>> {
        let vfs = self.tree()?;
        let id = Self::resolve_handle(vfs, fh)?;
        let path = vfs.backend_path(id);
        let node = vfs.node(id);

        let mut buf = vec![0u8; size as usize];
        let offset = u64::try_from(offset).unwrap_or(0);
        match self.backend.fetch_bytes(node, &path, &mut buf, offset) {
            n if n >= 0 => {
                buf.truncate(n as usize);
                Ok(buf)
            }
            -1 => Err(Error::Fault),
            -2 => Err(Error::AccessDenied),
            code => Err(Error::Io(code)),
        }
    }

    /// Opens a directory; the handle is the node's identifier.
    pub fn open_dir(&self, ino: u64) -> Result<u64> {
        let vfs = self.tree()?;
        let id = Self::resolve_handle(vfs, ino)?;
        if !vfs.node(id).is_dir() {
            return Err(Error::NotADirectory(vfs.path_of(id)));
        }
        Ok(ino)
    }

    /// Emits `.` and `..` first, then the children in tree order,
    /// hiding empty subdirectories. `emit` returning true means the
    /// destination is full: enumeration stops and that is success, since
    /// the kernel resumes with a new call at the entry offsets we hand
    /// out.
    pub fn list_dir(
        &self,
        fh: u64,
        offset: i64,
        emit: &mut dyn FnMut(u64, i64, NodeKind, &str) -> bool,
    ) -> Result<()> {
        let vfs = self.tree()?;
        let id = Self::resolve_handle(vfs, fh)?;
        let node = vfs.node(id);
        let parent_ino = node.parent.map(|p| vfs.node(p).ino).unwrap_or(node.ino);

        let mut entries: Vec<(u64, NodeKind, &str)> = Vec::with_capacity(node.children.len() + 2);
        entries.push((node.ino, NodeKind::Directory, "."));
        entries.push((parent_ino, NodeKind::Directory, ".."));
        for &child in &node.children {
            let child = vfs.node(child);
            if child.is_dir() && child.children.is_empty() {
                continue;
            }
            entries.push((child.ino, child.kind, child.name.as_str()));
        }

        for (i, (ino, kind, name)) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            if emit(*ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        Ok(())
    }

    /// Attribute copy with every time role set to the node's single
    /// timestamp and ownership overridden with the mounting identity.
    pub fn getattr_node(&self, ino: u64) -> Result<FileAttr> {
        let vfs = self.tree()?;
        let id = Self::resolve_handle(vfs, ino)?;
        Ok(node_attr(vfs, id))
    }
}

fn node_attr(vfs: &Vfs, id: NodeId) -> FileAttr {
    let node = vfs.node(id);
    let (uid, gid) = vfs.owner();
    let (kind, nlink) = match node.kind {
        NodeKind::Directory => (FileType::Directory, 2 + node.children.len() as u32),
        NodeKind::File => (FileType::RegularFile, 1),
    };
    FileAttr {
        ino: node.ino,
        size: node.size,
        blocks: 0,
        atime: node.last_modified,
        mtime: node.last_modified,
        ctime: node.last_modified,
        crtime: node.last_modified,
        kind,
        perm: 0o444,
        nlink,
        uid,
        gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

impl<B: Backend> fuser::Filesystem for Gateway<B> {
    fn init(
        &mut self,
        _req: &Request<'_>,
        config: &mut KernelConfig,
    ) -> std::result::Result<(), libc::c_int> {
        config.set_max_readahead(MAX_READ).ok();
        config.set_max_write(MAX_READ).ok();
        self.start().map_err(|err| {
            log::error!("Could not initialize the gateway: {err}");
            libc::EIO
        })
    }

    fn destroy(&mut self) {
        log::info!("Unmounting data gateway");
        self.shutdown();
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.getattr_node(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.open_node(req.pid(), ino) {
            Ok(fh) => reply.opened(fh, 0),
            Err(err) => {
                log::debug!("Open of inode {ino} refused: {err}");
                reply.error(err.errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_node(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(err) => {
                log::error!("Read of inode {ino} failed: {err}");
                reply.error(err.errno());
            }
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.open_dir(ino) {
            Ok(fh) => reply.opened(fh, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let result = self.list_dir(fh, offset, &mut |ino, entry_offset, kind, name| {
            reply.add(ino, entry_offset, file_type(kind), name)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }
}
