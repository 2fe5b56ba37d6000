//! In-memory host with the full capability surface.
//!
//! Backs the operation-engine tests on platforms where the native host
//! cannot express BSD flags, trash or xattrs. Locked-item semantics follow
//! BSD: mutating a node whose flags carry `UF_IMMUTABLE` fails with EPERM
//! until the flag is cleared.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{VfsError, VfsResult};
use crate::file::{OpenFlags, SeekWhence, VfsFile};
use crate::host::{DirEnt, DirEntType, Flags, HostFeatures, SetTimes, VfsHost};
use crate::stat::{file_flags, mode, StatMeaning, TimeSpec, VfsStat};

#[cfg(target_os = "macos")]
const ENOATTR: i32 = libc::ENOATTR;
#[cfg(not(target_os = "macos"))]
const ENOATTR: i32 = libc::ENODATA;

#[derive(Debug, Clone)]
enum Payload {
    File { content: Vec<u8>, xattrs: Vec<(String, Vec<u8>)> },
    Directory { entries: Vec<(String, usize)> },
    Symlink { value: String },
}

#[derive(Debug, Clone)]
struct Node {
    payload: Payload,
    mode: u16,
    uid: u32,
    gid: u32,
    flags: u32,
    mtime: TimeSpec,
    atime: TimeSpec,
    btime: TimeSpec,
    inode: u64,
}

impl Node {
    fn kind_bits(&self) -> u16 {
        match self.payload {
            Payload::File { .. } => mode::S_IFREG,
            Payload::Directory { .. } => mode::S_IFDIR,
            Payload::Symlink { .. } => mode::S_IFLNK,
        }
    }

    fn is_locked(&self) -> bool {
        self.flags & file_flags::UF_IMMUTABLE != 0
    }
}

struct State {
    nodes: Vec<Node>,
    trashed: Vec<String>,
    faults: HashMap<(String, String), VfsError>,
    next_inode: u64,
}

struct Inner {
    state: Mutex<State>,
    case_sensitive: bool,
    features: Mutex<HostFeatures>,
}

const FULL_FEATURES: HostFeatures = HostFeatures::SET_TIMES
    .union(HostFeatures::SET_OWNERSHIP)
    .union(HostFeatures::SET_PERMISSIONS)
    .union(HostFeatures::SET_FLAGS)
    .union(HostFeatures::TRASH)
    .union(HostFeatures::XATTRS);

/// An in-memory filesystem host rooted at "/".
pub struct MemHost {
    inner: Arc<Inner>,
}

const ROOT: usize = 0;

impl MemHost {
    pub fn new() -> Arc<Self> {
        Self::with_case_sensitivity(true)
    }

    pub fn new_case_insensitive() -> Arc<Self> {
        Self::with_case_sensitivity(false)
    }

    fn with_case_sensitivity(case_sensitive: bool) -> Arc<Self> {
        let root = Node {
            payload: Payload::Directory { entries: Vec::new() },
            mode: 0o755,
            uid: 0,
            gid: 0,
            flags: 0,
            mtime: TimeSpec::default(),
            atime: TimeSpec::default(),
            btime: TimeSpec::default(),
            inode: 1,
        };
        Arc::new(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    nodes: vec![root],
                    trashed: Vec::new(),
                    faults: HashMap::new(),
                    next_inode: 2,
                }),
                case_sensitive,
                features: Mutex::new(FULL_FEATURES),
            }),
        })
    }

    /// Overrides the advertised capability set, e.g. to model a volume
    /// without xattr storage or with non-empty rmdir support.
    pub fn set_features(&self, features: HostFeatures) {
        *self.inner.features.lock().unwrap() = features;
    }

    /// Queues a one-shot error for the next `op` call on `path`.
    pub fn fail_once(&self, op: &str, path: &str, err: VfsError) {
        let mut state = self.inner.state.lock().unwrap();
        state.faults.insert((op.to_string(), path.to_string()), err);
    }

    /// Paths moved to the trash, in trashing order.
    pub fn trashed_paths(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().trashed.clone()
    }
}

impl Inner {
    fn take_fault(&self, state: &mut State, op: &str, path: &str) -> VfsResult<()> {
        if let Some(err) = state.faults.remove(&(op.to_string(), path.to_string())) {
            return Err(err);
        }
        Ok(())
    }

    fn names_equal(&self, lhs: &str, rhs: &str) -> bool {
        if self.case_sensitive {
            lhs == rhs
        } else {
            crate::host::lowercase_equal(lhs, rhs)
        }
    }

    fn components(path: &str) -> Vec<&str> {
        path.split('/').filter(|c| !c.is_empty()).collect()
    }

    fn lookup(&self, state: &State, path: &str) -> Option<usize> {
        let mut current = ROOT;
        for comp in Self::components(path) {
            let Payload::Directory { entries } = &state.nodes[current].payload else {
                return None;
            };
            current = entries
                .iter()
                .find(|(name, _)| self.names_equal(name, comp))
                .map(|(_, id)| *id)?;
        }
        Some(current)
    }

    fn lookup_parent<'p>(&self, state: &State, path: &'p str) -> Option<(usize, &'p str)> {
        let comps = Self::components(path);
        let (last, dirs) = comps.split_last()?;
        let mut current = ROOT;
        for comp in dirs {
            let Payload::Directory { entries } = &state.nodes[current].payload else {
                return None;
            };
            current = entries
                .iter()
                .find(|(name, _)| self.names_equal(name, comp))
                .map(|(_, id)| *id)?;
        }
        Some((current, last))
    }

    fn stat_of(node: &Node) -> VfsStat {
        let size = match &node.payload {
            Payload::File { content, .. } => content.len() as u64,
            Payload::Symlink { value } => value.len() as u64,
            Payload::Directory { .. } => 0,
        };
        VfsStat {
            mode: node.kind_bits() | (node.mode & mode::PERM_MASK),
            size,
            uid: node.uid,
            gid: node.gid,
            dev: 1,
            inode: node.inode,
            flags: node.flags,
            atime: node.atime,
            mtime: node.mtime,
            ctime: node.mtime,
            btime: node.btime,
            meaning: StatMeaning::all(),
        }
    }

    fn insert_node(
        &self,
        state: &mut State,
        path: &str,
        payload: Payload,
        mode_bits: u16,
    ) -> VfsResult<usize> {
        let (parent, name) = self
            .lookup_parent(state, path)
            .ok_or(VfsError::posix(libc::ENOENT))?;
        let exists = match &state.nodes[parent].payload {
            Payload::Directory { entries } => entries.iter().any(|(n, _)| self.names_equal(n, name)),
            _ => return Err(VfsError::posix(libc::ENOTDIR)),
        };
        if exists {
            return Err(VfsError::posix(libc::EEXIST));
        }
        let inode = state.next_inode;
        state.next_inode += 1;
        state.nodes.push(Node {
            payload,
            mode: mode_bits,
            uid: 0,
            gid: 0,
            flags: 0,
            mtime: TimeSpec::default(),
            atime: TimeSpec::default(),
            btime: TimeSpec::default(),
            inode,
        });
        let id = state.nodes.len() - 1;
        let name = name.to_string();
        if let Payload::Directory { entries } = &mut state.nodes[parent].payload {
            entries.push((name, id));
        }
        Ok(id)
    }

    fn remove_entry(&self, state: &mut State, path: &str, want_dir: Option<bool>) -> VfsResult<usize> {
        let (parent, name) = self
            .lookup_parent(state, path)
            .ok_or(VfsError::posix(libc::ENOENT))?;
        let name = name.to_string();
        let id = {
            let Payload::Directory { entries } = &state.nodes[parent].payload else {
                return Err(VfsError::posix(libc::ENOTDIR));
            };
            entries
                .iter()
                .find(|(n, _)| self.names_equal(n, &name))
                .map(|(_, id)| *id)
                .ok_or(VfsError::posix(libc::ENOENT))?
        };
        if state.nodes[id].is_locked() {
            return Err(VfsError::posix(libc::EPERM));
        }
        match (&state.nodes[id].payload, want_dir) {
            (Payload::Directory { entries }, Some(true)) => {
                if !entries.is_empty() {
                    return Err(VfsError::posix(libc::ENOTEMPTY));
                }
            }
            (Payload::Directory { .. }, Some(false)) => return Err(VfsError::posix(libc::EISDIR)),
            (_, Some(true)) => return Err(VfsError::posix(libc::ENOTDIR)),
            _ => {}
        }
        if let Payload::Directory { entries } = &mut state.nodes[parent].payload {
            entries.retain(|(_, e)| *e != id);
        }
        Ok(id)
    }
}

impl VfsHost for MemHost {
    fn tag(&self) -> &str {
        "mem"
    }

    fn stat(&self, path: &str, flags: Flags) -> VfsResult<VfsStat> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "stat", path)?;
        let id = inner.lookup(&state, path).ok_or(VfsError::posix(libc::ENOENT))?;
        let node = &state.nodes[id];
        if let (false, Payload::Symlink { value }) = (flags.contains(Flags::NO_FOLLOW), &node.payload) {
            let value = value.clone();
            let target = inner
                .lookup(&state, &value)
                .ok_or(VfsError::posix(libc::ENOENT))?;
            return Ok(Inner::stat_of(&state.nodes[target]));
        }
        Ok(Inner::stat_of(node))
    }

    fn iterate_directory_listing(
        &self,
        path: &str,
        cb: &mut dyn FnMut(&DirEnt) -> bool,
    ) -> VfsResult<()> {
        let entries = {
            let inner = &self.inner;
            let mut state = inner.state.lock().unwrap();
            inner.take_fault(&mut state, "readdir", path)?;
            let id = inner.lookup(&state, path).ok_or(VfsError::posix(libc::ENOENT))?;
            let Payload::Directory { entries } = &state.nodes[id].payload else {
                return Err(VfsError::posix(libc::ENOTDIR));
            };
            entries
                .iter()
                .map(|(name, id)| {
                    let kind = match state.nodes[*id].payload {
                        Payload::File { .. } => DirEntType::Regular,
                        Payload::Directory { .. } => DirEntType::Directory,
                        Payload::Symlink { .. } => DirEntType::Symlink,
                    };
                    DirEnt { name: name.clone(), kind }
                })
                .collect::<Vec<_>>()
        };
        for entry in &entries {
            if !cb(entry) {
                break;
            }
        }
        Ok(())
    }

    fn create_file(&self, path: &str) -> VfsResult<Box<dyn VfsFile>> {
        Ok(Box::new(MemFile {
            inner: Arc::clone(&self.inner),
            path: path.to_string(),
            content: Vec::new(),
            pos: 0,
            opened: false,
            writable: false,
            xattrs: Vec::new(),
        }))
    }

    fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "rename", src)?;
        let src_id = inner.lookup(&state, src).ok_or(VfsError::posix(libc::ENOENT))?;
        if state.nodes[src_id].is_locked() {
            return Err(VfsError::posix(libc::EPERM));
        }
        if let Some(dst_id) = inner.lookup(&state, dst) {
            if dst_id != src_id {
                inner.remove_entry(&mut state, dst, None)?;
            }
        }
        let id = inner.remove_entry(&mut state, src, None)?;
        let (parent, name) = inner
            .lookup_parent(&state, dst)
            .ok_or(VfsError::posix(libc::ENOENT))?;
        let name = name.to_string();
        if let Payload::Directory { entries } = &mut state.nodes[parent].payload {
            entries.push((name, id));
        }
        Ok(())
    }

    fn unlink(&self, path: &str) -> VfsResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "unlink", path)?;
        inner.remove_entry(&mut state, path, Some(false)).map(|_| ())
    }

    fn trash(&self, path: &str) -> VfsResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "trash", path)?;
        let id = inner.lookup(&state, path).ok_or(VfsError::posix(libc::ENOENT))?;
        if state.nodes[id].is_locked() {
            return Err(VfsError::posix(libc::EPERM));
        }
        inner.remove_entry(&mut state, path, None)?;
        state.trashed.push(path.to_string());
        Ok(())
    }

    fn create_directory(&self, path: &str, mode_bits: u16) -> VfsResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "mkdir", path)?;
        inner
            .insert_node(
                &mut state,
                path,
                Payload::Directory { entries: Vec::new() },
                mode_bits & mode::PERM_MASK,
            )
            .map(|_| ())
    }

    fn remove_directory(&self, path: &str) -> VfsResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "rmdir", path)?;
        inner.remove_entry(&mut state, path, Some(true)).map(|_| ())
    }

    fn create_symlink(&self, path: &str, value: &str) -> VfsResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "symlink", path)?;
        inner
            .insert_node(
                &mut state,
                path,
                Payload::Symlink { value: value.to_string() },
                0o777,
            )
            .map(|_| ())
    }

    fn read_symlink(&self, path: &str) -> VfsResult<String> {
        let inner = &self.inner;
        let state = inner.state.lock().unwrap();
        let id = inner.lookup(&state, path).ok_or(VfsError::posix(libc::ENOENT))?;
        match &state.nodes[id].payload {
            Payload::Symlink { value } => Ok(value.clone()),
            _ => Err(VfsError::posix(libc::EINVAL)),
        }
    }

    fn set_permissions(&self, path: &str, mode_bits: u16) -> VfsResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "chmod", path)?;
        let id = inner.lookup(&state, path).ok_or(VfsError::posix(libc::ENOENT))?;
        state.nodes[id].mode = mode_bits & mode::PERM_MASK;
        Ok(())
    }

    fn set_ownership(&self, path: &str, uid: u32, gid: u32) -> VfsResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "chown", path)?;
        let id = inner.lookup(&state, path).ok_or(VfsError::posix(libc::ENOENT))?;
        state.nodes[id].uid = uid;
        state.nodes[id].gid = gid;
        Ok(())
    }

    fn set_flags(&self, path: &str, flags: u32, _vfs_flags: Flags) -> VfsResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "chflags", path)?;
        let id = inner.lookup(&state, path).ok_or(VfsError::posix(libc::ENOENT))?;
        state.nodes[id].flags = flags;
        Ok(())
    }

    fn set_times(&self, path: &str, times: SetTimes) -> VfsResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "settimes", path)?;
        let id = inner.lookup(&state, path).ok_or(VfsError::posix(libc::ENOENT))?;
        let node = &mut state.nodes[id];
        if let Some(mtime) = times.mtime {
            node.mtime = TimeSpec::new(mtime, 0);
        }
        if let Some(atime) = times.atime {
            node.atime = TimeSpec::new(atime, 0);
        }
        if let Some(btime) = times.btime {
            node.btime = TimeSpec::new(btime, 0);
        }
        Ok(())
    }

    fn is_native_fs(&self) -> bool {
        // The mem host stands in for the native filesystem in tests that
        // exercise native-only behaviour (locked items, trash, sidecars).
        true
    }

    fn is_case_sensitive_at(&self, _path: &str) -> bool {
        self.inner.case_sensitive
    }

    fn features(&self) -> HostFeatures {
        *self.inner.features.lock().unwrap()
    }
}

struct MemFile {
    inner: Arc<Inner>,
    path: String,
    content: Vec<u8>,
    pos: usize,
    opened: bool,
    writable: bool,
    xattrs: Vec<(String, Vec<u8>)>,
}

impl VfsFile for MemFile {
    fn open(&mut self, flags: OpenFlags) -> VfsResult<()> {
        let inner = Arc::clone(&self.inner);
        let mut state = inner.state.lock().unwrap();
        inner.take_fault(&mut state, "open", &self.path)?;
        match inner.lookup(&state, &self.path) {
            Some(id) => {
                if flags.contains(OpenFlags::EXCL) {
                    return Err(VfsError::posix(libc::EEXIST));
                }
                let node = &state.nodes[id];
                if node.is_locked() && flags.contains(OpenFlags::WRITE) {
                    return Err(VfsError::posix(libc::EPERM));
                }
                match &node.payload {
                    Payload::File { content, xattrs } => {
                        self.content = content.clone();
                        self.xattrs = xattrs.clone();
                    }
                    _ => return Err(VfsError::posix(libc::EISDIR)),
                }
                if flags.contains(OpenFlags::TRUNCATE) {
                    self.content.clear();
                }
            }
            None => {
                if !flags.contains(OpenFlags::CREATE) {
                    return Err(VfsError::posix(libc::ENOENT));
                }
                let path = self.path.clone();
                let mode_bits = flags.creation_mode();
                inner.insert_node(
                    &mut state,
                    &path,
                    Payload::File { content: Vec::new(), xattrs: Vec::new() },
                    if mode_bits == 0 { 0o644 } else { mode_bits },
                )?;
                self.content = Vec::new();
            }
        }
        self.pos = if flags.contains(OpenFlags::APPEND) { self.content.len() } else { 0 };
        self.writable = flags.contains(OpenFlags::WRITE);
        self.opened = true;
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn close(&mut self) -> VfsResult<()> {
        if self.opened && self.writable {
            let inner = Arc::clone(&self.inner);
            let mut state = inner.state.lock().unwrap();
            if let Some(id) = inner.lookup(&state, &self.path) {
                state.nodes[id].payload = Payload::File {
                    content: std::mem::take(&mut self.content),
                    xattrs: std::mem::take(&mut self.xattrs),
                };
            }
        }
        self.opened = false;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        if !self.opened {
            return Err(VfsError::invalid_call());
        }
        let n = buf.len().min(self.content.len().saturating_sub(self.pos));
        buf[..n].copy_from_slice(&self.content[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        if !self.opened || !self.writable {
            return Err(VfsError::invalid_call());
        }
        if self.pos + buf.len() > self.content.len() {
            self.content.resize(self.pos + buf.len(), 0);
        }
        self.content[self.pos..self.pos + buf.len()].copy_from_slice(buf);
        self.pos += buf.len();
        Ok(buf.len())
    }

    fn seek(&mut self, offset: i64, whence: SeekWhence) -> VfsResult<u64> {
        let base = match whence {
            SeekWhence::Set => 0i64,
            SeekWhence::Current => self.pos as i64,
            SeekWhence::End => self.content.len() as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(VfsError::posix(libc::EINVAL));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    fn pos(&self) -> u64 {
        self.pos as u64
    }

    fn size(&self) -> u64 {
        self.content.len() as u64
    }

    fn preferred_io_size(&self) -> usize {
        16 * 1024
    }

    fn xattr_count(&self) -> usize {
        self.xattrs.len()
    }

    fn xattr_get(&self, name: &str, buf: &mut [u8]) -> VfsResult<usize> {
        let Some((_, value)) = self.xattrs.iter().find(|(n, _)| n == name) else {
            return Err(VfsError::posix(ENOATTR));
        };
        let n = value.len().min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(n)
    }

    fn xattr_iterate_names(&self, cb: &mut dyn FnMut(&str) -> bool) {
        for (name, _) in &self.xattrs {
            if !cb(name) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_file(host: &Arc<MemHost>, path: &str, content: &[u8]) {
        let mut file = host.create_file(path).unwrap();
        file.open(OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
        file.write(content).unwrap();
        file.close().unwrap();
    }

    #[test]
    fn builds_and_lists_a_tree() {
        let host = MemHost::new();
        host.create_directory("/dir", 0o755).unwrap();
        make_file(&host, "/dir/a", b"aaa");
        make_file(&host, "/dir/b", b"bb");

        let mut names = Vec::new();
        host.iterate_directory_listing("/dir", &mut |e| {
            names.push(e.name.clone());
            true
        })
        .unwrap();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(host.stat("/dir/a", Flags::empty()).unwrap().size, 3);
    }

    #[test]
    fn locked_node_rejects_unlink_until_unlocked() {
        let host = MemHost::new();
        make_file(&host, "/f", b"x");
        host.set_flags("/f", file_flags::UF_IMMUTABLE, Flags::NO_FOLLOW).unwrap();
        let err = host.unlink("/f").unwrap_err();
        assert!(err.is_posix(libc::EPERM));
        host.set_flags("/f", 0, Flags::NO_FOLLOW).unwrap();
        host.unlink("/f").unwrap();
    }

    #[test]
    fn trash_moves_aside_and_records_order() {
        let host = MemHost::new();
        make_file(&host, "/a", b"1");
        make_file(&host, "/b", b"2");
        host.trash("/b").unwrap();
        host.trash("/a").unwrap();
        assert!(!host.exists("/a") && !host.exists("/b"));
        assert_eq!(host.trashed_paths(), vec!["/b", "/a"]);
    }

    #[test]
    fn case_insensitive_lookup_preserves_stored_name() {
        let host = MemHost::new_case_insensitive();
        host.create_directory("/Dir", 0o755).unwrap();
        assert!(host.exists("/dir"));
        assert!(!host.is_case_sensitive_at("/"));
        let a = host.stat("/Dir", Flags::empty()).unwrap();
        let b = host.stat("/DIR", Flags::empty()).unwrap();
        assert_eq!(a.inode, b.inode);
    }

    #[test]
    fn fault_injection_fires_once() {
        let host = MemHost::new();
        make_file(&host, "/f", b"x");
        host.fail_once("unlink", "/f", VfsError::posix(libc::EIO));
        assert!(host.unlink("/f").unwrap_err().is_posix(libc::EIO));
        host.unlink("/f").unwrap();
    }

    #[test]
    fn rename_replaces_existing_destination() {
        let host = MemHost::new();
        make_file(&host, "/a", b"aaa");
        make_file(&host, "/b", b"bbb");
        host.rename("/a", "/b").unwrap();
        assert!(!host.exists("/a"));
        let mut file = host.create_file("/b").unwrap();
        file.open(OpenFlags::READ).unwrap();
        let mut buf = [0u8; 8];
        let n = file.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"aaa");
    }
}
