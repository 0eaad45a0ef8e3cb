//! rfuse3 adapter: kernel filesystem calls onto the path-based core.
//!
//! The kernel speaks inodes; the core speaks paths. Non-root node ids are
//! the stable path hash, recorded in a table on lookup/readdir so later
//! calls can resolve them back. File handles wrap buffered handles behind a
//! lock, since the kernel may drive one handle from several contexts.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::stream;
use log::{debug, info};
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, FileAttr, ReplyAttr, ReplyCreated, ReplyData,
    ReplyDirectory, ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs, ReplyWrite,
};
use rfuse3::raw::{Filesystem, Request};
use rfuse3::{Errno, FileType, SetAttr, Timestamp};
use tokio::sync::{Mutex, RwLock};

use crate::cadapter::client::ObjectBackend;
use crate::vfs::attr::{Attributes, FileKind};
use crate::vfs::handle::BufferedHandle;
use crate::vfs::{Vfs, path_ino};

const TTL: Duration = Duration::from_secs(1);
/// Entries are enumerated as directories by design; attributes must not be
/// cached off that, so readdirplus hands out a zero attribute ttl.
const ATTR_TTL_ZERO: Duration = Duration::from_secs(0);
const BLOCK_SIZE: u32 = 4096;
const MAX_WRITE: u32 = 1024 * 1024;

/// The kernel's fixed id for the mount root.
const ROOT_INODE: u64 = 1;

/// node id → path registry. Ids are content-free hashes, so registration is
/// idempotent and entries stay valid for the lifetime of the mount.
struct InodeTable {
    paths: RwLock<HashMap<u64, String>>,
}

impl InodeTable {
    fn new() -> Self {
        Self {
            paths: RwLock::new(HashMap::new()),
        }
    }

    async fn register(&self, path: &str) -> u64 {
        if path.is_empty() {
            return ROOT_INODE;
        }
        let ino = path_ino(path);
        self.paths.write().await.insert(ino, path.to_string());
        ino
    }

    async fn path_of(&self, ino: u64) -> Option<String> {
        if ino == ROOT_INODE {
            return Some(String::new());
        }
        self.paths.read().await.get(&ino).cloned()
    }
}

pub struct FuseFs<B: ObjectBackend> {
    vfs: Arc<Vfs<B>>,
    inodes: InodeTable,
    handles: RwLock<HashMap<u64, Arc<Mutex<BufferedHandle<B>>>>>,
    next_fh: AtomicU64,
}

impl<B: ObjectBackend> FuseFs<B> {
    pub fn new(vfs: Vfs<B>) -> Self {
        Self {
            vfs: Arc::new(vfs),
            inodes: InodeTable::new(),
            handles: RwLock::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    fn alloc_fh(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }

    async fn resolve(&self, ino: u64) -> rfuse3::Result<String> {
        self.inodes
            .path_of(ino)
            .await
            .ok_or_else(|| Errno::from(libc::ENOENT))
    }

    async fn child_path(&self, parent: u64, name: &OsStr) -> rfuse3::Result<String> {
        let name = name.to_str().ok_or_else(|| Errno::from(libc::EINVAL))?;
        let parent_path = self.resolve(parent).await?;
        Ok(join_path(&parent_path, name))
    }

    async fn handle_of(&self, fh: u64) -> rfuse3::Result<Arc<Mutex<BufferedHandle<B>>>> {
        self.handles
            .read()
            .await
            .get(&fh)
            .cloned()
            .ok_or_else(|| Errno::from(libc::EBADF))
    }

    async fn insert_handle(&self, handle: BufferedHandle<B>) -> u64 {
        let fh = self.alloc_fh();
        self.handles
            .write()
            .await
            .insert(fh, Arc::new(Mutex::new(handle)));
        fh
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn parent_ino(path: &str) -> u64 {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => path_ino(parent),
        // Root's parent is root; a bucket's parent is the mount root.
        _ => ROOT_INODE,
    }
}

fn timestamp(time: Option<SystemTime>) -> Timestamp {
    match time.and_then(|t| t.duration_since(UNIX_EPOCH).ok()) {
        Some(elapsed) => Timestamp::new(elapsed.as_secs() as i64, elapsed.subsec_nanos()),
        None => Timestamp::new(0, 0),
    }
}

fn to_file_attr(req: &Request, attrs: &Attributes) -> FileAttr {
    let ts = timestamp(attrs.mtime);
    let (kind, nlink) = match attrs.kind {
        FileKind::Directory => (FileType::Directory, 2),
        FileKind::File => (FileType::RegularFile, 1),
    };
    FileAttr {
        ino: attrs.ino,
        size: attrs.size,
        blocks: attrs.size.div_ceil(512),
        atime: ts,
        mtime: ts,
        ctime: ts,
        kind,
        perm: attrs.perm,
        nlink,
        uid: req.uid,
        gid: req.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
    }
}

fn synthesized_dir_attr(req: &Request, ino: u64) -> FileAttr {
    to_file_attr(
        req,
        &Attributes {
            ino,
            kind: FileKind::Directory,
            size: 0,
            perm: 0o755,
            mtime: None,
        },
    )
}

fn file_attr_now(req: &Request, ino: u64) -> FileAttr {
    to_file_attr(
        req,
        &Attributes {
            ino,
            kind: FileKind::File,
            size: 0,
            perm: 0o777,
            mtime: Some(SystemTime::now()),
        },
    )
}

impl<B: ObjectBackend + 'static> Filesystem for FuseFs<B> {
    type DirEntryStream<'a> = stream::Iter<std::vec::IntoIter<rfuse3::Result<DirectoryEntry>>>;
    type DirEntryPlusStream<'a> =
        stream::Iter<std::vec::IntoIter<rfuse3::Result<DirectoryEntryPlus>>>;

    async fn init(&self, _req: Request) -> rfuse3::Result<ReplyInit> {
        info!("filesystem mounted");
        Ok(ReplyInit {
            max_write: NonZeroU32::new(MAX_WRITE).unwrap(),
        })
    }

    async fn destroy(&self, _req: Request) {
        info!("filesystem unmounted");
    }

    async fn lookup(&self, req: Request, parent: u64, name: &OsStr) -> rfuse3::Result<ReplyEntry> {
        let path = self.child_path(parent, name).await?;
        let attrs = self.vfs.getattr(&path).await.map_err(Errno::from)?;
        self.inodes.register(&path).await;
        Ok(ReplyEntry {
            ttl: TTL,
            attr: to_file_attr(&req, &attrs),
            generation: 0,
        })
    }

    async fn getattr(
        &self,
        req: Request,
        inode: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> rfuse3::Result<ReplyAttr> {
        let path = self.resolve(inode).await?;
        let attrs = self.vfs.getattr(&path).await.map_err(Errno::from)?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: to_file_attr(&req, &attrs),
        })
    }

    async fn setattr(
        &self,
        req: Request,
        inode: u64,
        fh: Option<u64>,
        set_attr: SetAttr,
    ) -> rfuse3::Result<ReplyAttr> {
        let path = self.resolve(inode).await?;
        debug!("setattr path={path} size={:?}", set_attr.size);

        if set_attr.size.is_some() {
            // Truncation is always a full discard, whatever the size asked
            // for; with no handle open the object itself becomes empty.
            match fh {
                Some(fh) => {
                    let handle = self.handle_of(fh).await?;
                    let mut handle = handle.lock().await;
                    handle.truncate().await.map_err(Errno::from)?;
                }
                None => self.vfs.truncate_object(&path).await.map_err(Errno::from)?,
            }
        }

        if set_attr.atime.is_some() || set_attr.mtime.is_some() {
            self.vfs.utimens(&path).await.map_err(Errno::from)?;
        }

        let attrs = self.vfs.getattr(&path).await.map_err(Errno::from)?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: to_file_attr(&req, &attrs),
        })
    }

    async fn mkdir(
        &self,
        req: Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
    ) -> rfuse3::Result<ReplyEntry> {
        let path = self.child_path(parent, name).await?;
        self.vfs.mkdir(&path).await.map_err(Errno::from)?;
        let ino = self.inodes.register(&path).await;
        Ok(ReplyEntry {
            ttl: TTL,
            attr: synthesized_dir_attr(&req, ino),
            generation: 0,
        })
    }

    async fn unlink(&self, _req: Request, parent: u64, name: &OsStr) -> rfuse3::Result<()> {
        let path = self.child_path(parent, name).await?;
        self.vfs.unlink(&path).await.map_err(Errno::from)
    }

    async fn rmdir(&self, _req: Request, parent: u64, name: &OsStr) -> rfuse3::Result<()> {
        let path = self.child_path(parent, name).await?;
        self.vfs.rmdir(&path).await.map_err(Errno::from)
    }

    async fn rename(
        &self,
        _req: Request,
        parent: u64,
        name: &OsStr,
        new_parent: u64,
        new_name: &OsStr,
    ) -> rfuse3::Result<()> {
        let old_path = self.child_path(parent, name).await?;
        let new_path = self.child_path(new_parent, new_name).await?;
        self.vfs.rename(&old_path, &new_path).await.map_err(Errno::from)?;
        self.inodes.register(&new_path).await;
        Ok(())
    }

    async fn open(&self, _req: Request, inode: u64, _flags: u32) -> rfuse3::Result<ReplyOpen> {
        let path = self.resolve(inode).await?;
        let handle = self.vfs.open(&path).await.map_err(Errno::from)?;
        let fh = self.insert_handle(handle).await;
        Ok(ReplyOpen { fh, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> rfuse3::Result<ReplyData> {
        let handle = self.handle_of(fh).await?;
        let handle = handle.lock().await;
        let data = handle
            .read(offset, size as usize)
            .await
            .map_err(Errno::from)?;
        Ok(ReplyData {
            data: Bytes::from(data),
        })
    }

    async fn write(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        offset: u64,
        data: &[u8],
        _write_flags: u32,
        _flags: u32,
    ) -> rfuse3::Result<ReplyWrite> {
        let handle = self.handle_of(fh).await?;
        let mut handle = handle.lock().await;
        let written = handle.write(data, offset).await.map_err(Errno::from)?;
        Ok(ReplyWrite {
            written: written as u32,
        })
    }

    async fn flush(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        _lock_owner: u64,
    ) -> rfuse3::Result<()> {
        let handle = self.handle_of(fh).await?;
        let mut handle = handle.lock().await;
        handle.flush().await.map_err(Errno::from)
    }

    async fn fsync(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _datasync: bool,
    ) -> rfuse3::Result<()> {
        // Durability is the flush path's job; fsync is accepted as-is.
        Ok(())
    }

    async fn release(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> rfuse3::Result<()> {
        if let Some(handle) = self.handles.write().await.remove(&fh) {
            handle.lock().await.release();
        }
        Ok(())
    }

    async fn create(
        &self,
        req: Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _flags: u32,
    ) -> rfuse3::Result<ReplyCreated> {
        let path = self.child_path(parent, name).await?;
        let handle = self.vfs.create(&path).await.map_err(Errno::from)?;
        let ino = self.inodes.register(&path).await;
        let fh = self.insert_handle(handle).await;
        Ok(ReplyCreated {
            ttl: TTL,
            attr: file_attr_now(&req, ino),
            generation: 0,
            fh,
            flags: 0,
        })
    }

    async fn access(&self, _req: Request, inode: u64, _mask: u32) -> rfuse3::Result<()> {
        let path = self.resolve(inode).await?;
        self.vfs.access(&path).await.map_err(Errno::from)
    }

    async fn opendir(&self, _req: Request, inode: u64, _flags: u32) -> rfuse3::Result<ReplyOpen> {
        let path = self.resolve(inode).await?;
        let attrs = self.vfs.getattr(&path).await.map_err(Errno::from)?;
        if attrs.kind == FileKind::File {
            return Err(Errno::from(libc::ENOTDIR));
        }
        Ok(ReplyOpen {
            fh: self.alloc_fh(),
            flags: 0,
        })
    }

    async fn readdir(
        &self,
        _req: Request,
        parent: u64,
        _fh: u64,
        offset: i64,
    ) -> rfuse3::Result<ReplyDirectory<Self::DirEntryStream<'_>>> {
        let path = self.resolve(parent).await?;
        let children = self.vfs.list_children(&path).await.map_err(Errno::from)?;

        let mut entries = vec![
            DirectoryEntry {
                inode: parent,
                kind: FileType::Directory,
                name: ".".into(),
                offset: 1,
            },
            DirectoryEntry {
                inode: parent_ino(&path),
                kind: FileType::Directory,
                name: "..".into(),
                offset: 2,
            },
        ];
        for (idx, child) in children.iter().enumerate() {
            self.inodes.register(&join_path(&path, &child.name)).await;
            entries.push(DirectoryEntry {
                inode: child.ino,
                kind: FileType::Directory,
                name: child.name.clone().into(),
                offset: (idx + 3) as i64,
            });
        }

        let entries: Vec<rfuse3::Result<DirectoryEntry>> = entries
            .into_iter()
            .skip(offset as usize)
            .map(Ok)
            .collect();
        Ok(ReplyDirectory {
            entries: stream::iter(entries),
        })
    }

    async fn readdirplus(
        &self,
        req: Request,
        parent: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> rfuse3::Result<ReplyDirectoryPlus<Self::DirEntryPlusStream<'_>>> {
        let path = self.resolve(parent).await?;
        let children = self.vfs.list_children(&path).await.map_err(Errno::from)?;

        let mut entries = vec![
            DirectoryEntryPlus {
                inode: parent,
                generation: 0,
                kind: FileType::Directory,
                name: ".".into(),
                offset: 1,
                attr: synthesized_dir_attr(&req, parent),
                entry_ttl: TTL,
                attr_ttl: ATTR_TTL_ZERO,
            },
            DirectoryEntryPlus {
                inode: parent_ino(&path),
                generation: 0,
                kind: FileType::Directory,
                name: "..".into(),
                offset: 2,
                attr: synthesized_dir_attr(&req, parent_ino(&path)),
                entry_ttl: TTL,
                attr_ttl: ATTR_TTL_ZERO,
            },
        ];
        for (idx, child) in children.iter().enumerate() {
            self.inodes.register(&join_path(&path, &child.name)).await;
            entries.push(DirectoryEntryPlus {
                inode: child.ino,
                generation: 0,
                kind: FileType::Directory,
                name: child.name.clone().into(),
                offset: (idx + 3) as i64,
                attr: synthesized_dir_attr(&req, child.ino),
                entry_ttl: TTL,
                attr_ttl: ATTR_TTL_ZERO,
            });
        }

        let entries: Vec<rfuse3::Result<DirectoryEntryPlus>> = entries
            .into_iter()
            .skip(offset as usize)
            .map(Ok)
            .collect();
        Ok(ReplyDirectoryPlus {
            entries: stream::iter(entries),
        })
    }

    async fn releasedir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
    ) -> rfuse3::Result<()> {
        Ok(())
    }

    async fn fallocate(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _offset: u64,
        _length: u64,
        _mode: u32,
    ) -> rfuse3::Result<()> {
        // Space is the store's concern; preallocation is accepted as-is.
        Ok(())
    }

    async fn statfs(&self, _req: Request, _inode: u64) -> rfuse3::Result<ReplyStatFs> {
        // The store exposes no capacity; report a fixed, roomy shape.
        Ok(ReplyStatFs {
            blocks: 1024 * 1024,
            bfree: 1024 * 1024,
            bavail: 1024 * 1024,
            files: 1024 * 1024,
            ffree: 1024 * 1024,
            bsize: BLOCK_SIZE,
            namelen: 255,
            frsize: BLOCK_SIZE,
        })
    }
}
