//! Protocol-contract tests driven through a scripted in-memory backend.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::UNIX_EPOCH;

use gateway::{
    Backend, Error, FetchState, Gateway, Node, ObjectMeta, Result, Vfs, VfsBuilder, ROOT_INO,
};

#[derive(Default)]
struct MockState {
    metadata_fetches: Vec<String>,
    reads: Vec<(String, u64, usize)>,
    quiesced: bool,
    reject_open: bool,
    forced_read_code: Option<i64>,
    metadata_size: Option<u64>,
    objects: HashMap<String, Vec<u8>>,
}

#[derive(Clone)]
struct MockBackend {
    state: Rc<RefCell<MockState>>,
}

impl MockBackend {
    fn new() -> Self {
        let mut objects = HashMap::new();
        objects.insert("a/c".to_string(), b"0123456789".to_vec());
        objects.insert("b/inner.bin".to_string(), b"xyz".to_vec());
        MockBackend {
            state: Rc::new(RefCell::new(MockState {
                objects,
                ..MockState::default()
            })),
        }
    }
}

impl Backend for MockBackend {
    fn build_filesystem(&self) -> Result<Vfs> {
        let mut builder = VfsBuilder::new();
        let root = builder.root();
        let a = builder.add_directory(root, &ObjectMeta::new("a", 0));
        builder.add_file(a, &ObjectMeta::new("c", 10));
        builder.add_directory(a, &ObjectMeta::new("empty", 0));
        let b = builder.add_directory(root, &ObjectMeta::new("b", 0));
        builder.add_file(b, &ObjectMeta::new("inner.bin", 3));
        Ok(builder.finish())
    }

    fn authorize_open(&self, _pid: u32) -> bool {
        !self.state.borrow().reject_open
    }

    fn fetch_metadata(&self, node: &mut Node, path: &str) {
        let mut state = self.state.borrow_mut();
        state.metadata_fetches.push(path.to_string());
        if let Some(size) = state.metadata_size {
            node.size = size;
        }
    }

    fn fetch_bytes(&self, _node: &Node, path: &str, buf: &mut [u8], offset: u64) -> i64 {
        let mut state = self.state.borrow_mut();
        state.reads.push((path.to_string(), offset, buf.len()));
        if let Some(code) = state.forced_read_code {
            return code;
        }
        let Some(data) = state.objects.get(path) else {
            return -1;
        };
        let start = (offset as usize).min(data.len());
        let n = (data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&data[start..start + n]);
        n as i64
    }

    fn wait_for_quiescence(&self) {
        self.state.borrow_mut().quiesced = true;
    }
}

fn started_gateway() -> (Gateway<MockBackend>, Rc<RefCell<MockState>>) {
    let backend = MockBackend::new();
    let state = backend.state.clone();
    let mut gateway = Gateway::new(backend);
    gateway.start().unwrap();
    (gateway, state)
}

fn ino_of(gateway: &Gateway<MockBackend>, path: &str) -> u64 {
    let vfs = gateway.vfs().unwrap();
    vfs.node(vfs.resolve(path).unwrap()).ino
}

#[test]
fn test_open_file_returns_node_identifier_as_handle() {
    let (mut gateway, _) = started_gateway();
    let ino = ino_of(&gateway, "/a/c");
    assert_eq!(gateway.open_node(1000, ino).unwrap(), ino);
}

#[test]
fn test_open_directory_is_rejected() {
    let (mut gateway, _) = started_gateway();
    let ino = ino_of(&gateway, "/a");
    assert!(matches!(
        gateway.open_node(1000, ino),
        Err(Error::IsDirectory(_))
    ));
}

#[test]
fn test_open_unknown_handle_is_not_found() {
    let (mut gateway, _) = started_gateway();
    assert!(matches!(
        gateway.open_node(1000, 9999),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_open_rejected_by_authorization_is_canceled() {
    let (mut gateway, state) = started_gateway();
    state.borrow_mut().reject_open = true;
    let ino = ino_of(&gateway, "/a/c");
    assert!(matches!(gateway.open_node(1000, ino), Err(Error::Canceled)));
    // The authorization check runs before resolution and the fetch gate.
    assert!(state.borrow().metadata_fetches.is_empty());
}

#[test]
fn test_metadata_fetch_fires_exactly_once() {
    let (mut gateway, state) = started_gateway();
    let ino = ino_of(&gateway, "/a/c");

    for _ in 0..4 {
        gateway.open_node(1000, ino).unwrap();
    }

    assert_eq!(state.borrow().metadata_fetches, vec!["a/c".to_string()]);
    let vfs = gateway.vfs().unwrap();
    let node = vfs.node(vfs.resolve("/a/c").unwrap());
    assert_eq!(node.fetch_state, FetchState::Ready);
}

#[test]
fn test_metadata_fetch_may_rewrite_size() {
    let (mut gateway, state) = started_gateway();
    state.borrow_mut().metadata_size = Some(9);
    let ino = ino_of(&gateway, "/a/c");

    assert_eq!(gateway.getattr_node(ino).unwrap().size, 10);
    gateway.open_node(1000, ino).unwrap();
    assert_eq!(gateway.getattr_node(ino).unwrap().size, 9);
}

#[test]
fn test_read_reports_collaborator_byte_count() {
    let (mut gateway, state) = started_gateway();
    let ino = ino_of(&gateway, "/a/c");
    let fh = gateway.open_node(1000, ino).unwrap();

    let data = gateway.read_node(fh, 0, 4).unwrap();
    assert_eq!(data, b"0123");

    // Short read near the end of the object signals end of data.
    let tail = gateway.read_node(fh, 8, 4).unwrap();
    assert_eq!(tail, b"89");

    let state = state.borrow();
    assert_eq!(state.reads[0], ("a/c".to_string(), 0, 4));
    assert_eq!(state.reads[1], ("a/c".to_string(), 8, 4));
}

#[test]
fn test_read_error_code_mapping() {
    let (mut gateway, state) = started_gateway();
    let ino = ino_of(&gateway, "/a/c");
    let fh = gateway.open_node(1000, ino).unwrap();

    state.borrow_mut().forced_read_code = Some(-1);
    assert!(matches!(gateway.read_node(fh, 0, 4), Err(Error::Fault)));

    state.borrow_mut().forced_read_code = Some(-2);
    assert!(matches!(
        gateway.read_node(fh, 0, 4),
        Err(Error::AccessDenied)
    ));

    state.borrow_mut().forced_read_code = Some(-5);
    assert!(matches!(gateway.read_node(fh, 0, 4), Err(Error::Io(-5))));
}

#[test]
fn test_opendir_on_file_is_rejected() {
    let (gateway, _) = started_gateway();
    let ino = ino_of(&gateway, "/a/c");
    assert!(matches!(
        gateway.open_dir(ino),
        Err(Error::NotADirectory(_))
    ));
}

fn collect_dir(gateway: &Gateway<MockBackend>, fh: u64, offset: i64) -> Vec<String> {
    let mut names = Vec::new();
    gateway
        .list_dir(fh, offset, &mut |_ino, _offset, _kind, name| {
            names.push(name.to_string());
            false
        })
        .unwrap();
    names
}

#[test]
fn test_readdir_yields_dot_entries_then_children() {
    let (gateway, _) = started_gateway();
    let fh = gateway.open_dir(ino_of(&gateway, "/b")).unwrap();
    assert_eq!(collect_dir(&gateway, fh, 0), [".", "..", "inner.bin"]);
}

#[test]
fn test_readdir_hides_empty_directories() {
    let (gateway, _) = started_gateway();
    let fh = gateway.open_dir(ino_of(&gateway, "/a")).unwrap();
    // `empty` has zero children and is filtered from the listing.
    assert_eq!(collect_dir(&gateway, fh, 0), [".", "..", "c"]);
}

#[test]
fn test_readdir_stops_when_destination_is_full_and_resumes() {
    let (gateway, _) = started_gateway();
    let fh = gateway.open_dir(ino_of(&gateway, "/")).unwrap();

    let mut first_batch = Vec::new();
    let mut resume_offset = 0;
    gateway
        .list_dir(fh, 0, &mut |_ino, offset, _kind, name| {
            first_batch.push(name.to_string());
            resume_offset = offset;
            first_batch.len() >= 2
        })
        .unwrap();
    assert_eq!(first_batch, [".", ".."]);

    // A full destination is success; the caller comes back with the
    // offset of the last delivered entry.
    assert_eq!(collect_dir(&gateway, fh, resume_offset), ["a", "b"]);
}

#[test]
fn test_getattr_flattens_time_roles_and_overrides_ownership() {
    let (gateway, _) = started_gateway();
    let attr = gateway.getattr_node(ino_of(&gateway, "/a/c")).unwrap();

    assert_eq!(attr.atime, attr.mtime);
    assert_eq!(attr.mtime, attr.ctime);
    assert_eq!(attr.ctime, attr.crtime);
    assert_eq!(attr.atime, UNIX_EPOCH);
    assert_eq!(attr.perm, 0o444);
    assert_eq!(attr.nlink, 1);
    assert_eq!(attr.uid, unsafe { libc::getuid() });
    assert_eq!(attr.gid, unsafe { libc::getgid() });
}

#[test]
fn test_getattr_directory_link_count() {
    let (gateway, _) = started_gateway();
    let attr = gateway.getattr_node(ino_of(&gateway, "/a")).unwrap();
    assert_eq!(attr.nlink, 4); // 2 + children, hidden or not
    assert_eq!(attr.kind, fuser::FileType::Directory);
}

#[test]
fn test_lookup_walks_one_segment() {
    let (gateway, _) = started_gateway();
    let root_attr = gateway.getattr_node(ROOT_INO).unwrap();
    assert_eq!(root_attr.ino, ROOT_INO);

    let a = gateway.lookup_entry(ROOT_INO, "a").unwrap();
    let c = gateway.lookup_entry(a.ino, "c").unwrap();
    assert_eq!(c.ino, ino_of(&gateway, "/a/c"));
    assert!(matches!(
        gateway.lookup_entry(a.ino, "z"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_shutdown_waits_for_quiescence_then_drops_tree() {
    let (mut gateway, state) = started_gateway();
    assert!(gateway.vfs().is_some());

    gateway.shutdown();

    assert!(state.borrow().quiesced);
    assert!(gateway.vfs().is_none());
}
