//! The path layer: hierarchical path resolution and the metadata-consistent
//! mutating operations of the storage API.
//!
//! Every operation resolves from the persisted root on each call; there is
//! no per-file handle state. Mutators keep the image consistent by ordering
//! effects (directory entries are removed before the resources they name are
//! released) and by rolling back their most recent allocation when a later
//! step fails. The image is flushed after structurally material operations:
//! creation, root initialization and `rmdir`.

use imgfs_api::fs::{BlockSupport, DirectorySupport, FileSysSupport, InodeSupport, PathSupport};
use imgfs_api::pager::ImagePager;
use imgfs_api::types::{
    Block, DirEntry, Geometry, Inode, BLOCK_SIZE, DEFAULT_NBLOCKS, DIRENTRY_SIZE, INODE_COUNT,
    S_IFDIR,
};
use log::debug;
use std::path::Path;

use super::dir_support::DirLayerFS;
use super::error_fs::{DirLayerError, PathLayerError};
use super::inode_support::unix_now;

/// Filesystem with the full path-addressed storage surface
#[derive(Debug)]
pub struct PathFS {
    dir_fs: DirLayerFS,
}

impl PathFS {
    /// The region table of the mounted image
    pub fn geo(&self) -> &Geometry {
        self.dir_fs.geo()
    }

    /// Open the image at `path`, creating a fresh `DEFAULT_NBLOCKS`-block
    /// image when the file does not exist yet. The block count of an
    /// existing image is derived from its file size. Either way the root
    /// directory is validated and rebuilt if needed.
    pub fn init<P: AsRef<Path>>(path: P) -> Result<PathFS, PathLayerError> {
        let path = path.as_ref();
        if path.exists() {
            Self::mountfs(ImagePager::open(path)?)
        } else {
            Self::mkfs(path, &Geometry::for_image(DEFAULT_NBLOCKS))
        }
    }

    /// Split an absolute path into its parent path and basename.
    /// The parent of a top-level name is "/"; an empty basename (including
    /// the path "/") is rejected.
    fn split_path(path: &str) -> Result<(&str, &str), PathLayerError> {
        if !path.starts_with('/') {
            return Err(PathLayerError::InvalidArgument("path must be absolute"));
        }
        let cut = path.rfind('/').unwrap_or(0);
        let (parent, base) = path.split_at(cut);
        let base = &base[1..];
        if base.is_empty() {
            return Err(PathLayerError::InvalidArgument("empty basename"));
        }
        let parent = if parent.is_empty() { "/" } else { parent };
        Ok((parent, base))
    }

    /// Look up `name` in the directory `dir`, turning a missing entry into
    /// the path-level not-found error.
    fn lookup_in(&self, dir: &Inode, name: &str) -> Result<u64, PathLayerError> {
        match self.dir_fs.dir_lookup(dir, name) {
            Ok(inum) => Ok(inum),
            Err(DirLayerError::EntryNotFound(_)) => Err(PathLayerError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Does the directory `dir` carry a live entry named `name`?
    fn contains(&self, dir: &Inode, name: &str) -> Result<bool, PathLayerError> {
        match self.dir_fs.dir_lookup(dir, name) {
            Ok(_) => Ok(true),
            Err(DirLayerError::EntryNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate the persisted root inode and rebuild it when invalid.
    ///
    /// The slot is trusted when it is in range and names a record that is
    /// allocated (`refs > 0`) and a directory; a fresh image fails this and
    /// gets a new root with "." and ".." pointing at itself.
    fn ensure_root(&mut self) -> Result<(), PathLayerError> {
        let slot = self.root_get()?;
        if slot < INODE_COUNT {
            let node = self.i_get(slot)?;
            if node.refs > 0 && node.is_dir() {
                return Ok(());
            }
        }

        let inum = self.i_alloc()?;
        let mut node = self.i_get(inum)?;
        node.mode = S_IFDIR | 0o755;
        node.block = self.b_alloc()? as u32;

        //The root is its own parent
        let mut block = self.b_get(node.block as u64)?;
        DirEntry::new(".", inum as u32).write_at(&mut block, 0)?;
        DirEntry::new("..", inum as u32).write_at(&mut block, 1)?;
        self.b_put(&block)?;

        node.size = (2 * DIRENTRY_SIZE) as u32;
        self.i_put(&node)?;
        self.root_put(inum)?;
        self.flush()?;
        debug!("initialized root directory: {}", node);
        Ok(())
    }

    /// Walk `path` from the root, creating every missing component as a
    /// directory with the given mode; returns the inum of the final
    /// component. Components that already exist are accepted as long as
    /// they are directories.
    pub fn mkdir_p(&mut self, path: &str, mode: u32) -> Result<u64, PathLayerError> {
        if !path.starts_with('/') {
            return Err(PathLayerError::InvalidArgument("path must be absolute"));
        }
        let mut cur = self.root_get()?;
        for comp in path.split('/').filter(|c| !c.is_empty()) {
            let node = self.i_get(cur)?;
            if !node.is_dir() {
                return Err(PathLayerError::NotADirectory);
            }
            cur = match self.dir_fs.dir_lookup(&node, comp) {
                Ok(next) => next,
                Err(DirLayerError::EntryNotFound(_)) => self.mkdir_at(cur, comp, mode)?,
                Err(e) => return Err(e.into()),
            };
        }
        Ok(cur)
    }
}

impl FileSysSupport for PathFS {
    type Error = PathLayerError;

    fn geometry_valid(geo: &Geometry) -> bool {
        DirLayerFS::geometry_valid(geo)
    }

    fn mkfs<P: AsRef<Path>>(path: P, geo: &Geometry) -> Result<Self, Self::Error> {
        let mut fs = PathFS {
            dir_fs: DirLayerFS::mkfs(path, geo)?,
        };
        fs.ensure_root()?;
        Ok(fs)
    }

    fn mountfs(pager: ImagePager) -> Result<Self, Self::Error> {
        let mut fs = PathFS {
            dir_fs: DirLayerFS::mountfs(pager)?,
        };
        fs.ensure_root()?;
        Ok(fs)
    }

    fn unmountfs(self) -> ImagePager {
        self.dir_fs.unmountfs()
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(self.dir_fs.flush()?)
    }
}

impl BlockSupport for PathFS {
    fn b_get(&self, i: u64) -> Result<Block, Self::Error> {
        Ok(self.dir_fs.b_get(i)?)
    }

    fn b_put(&mut self, b: &Block) -> Result<(), Self::Error> {
        Ok(self.dir_fs.b_put(b)?)
    }

    fn b_zero(&mut self, i: u64) -> Result<(), Self::Error> {
        Ok(self.dir_fs.b_zero(i)?)
    }

    fn b_alloc(&mut self) -> Result<u64, Self::Error> {
        Ok(self.dir_fs.b_alloc()?)
    }

    fn b_free(&mut self, i: u64) -> Result<(), Self::Error> {
        Ok(self.dir_fs.b_free(i)?)
    }

    fn root_get(&self) -> Result<u64, Self::Error> {
        Ok(self.dir_fs.root_get()?)
    }

    fn root_put(&mut self, inum: u64) -> Result<(), Self::Error> {
        Ok(self.dir_fs.root_put(inum)?)
    }
}

impl InodeSupport for PathFS {
    fn i_get(&self, i: u64) -> Result<Inode, Self::Error> {
        Ok(self.dir_fs.i_get(i)?)
    }

    fn i_put(&mut self, ino: &Inode) -> Result<(), Self::Error> {
        Ok(self.dir_fs.i_put(ino)?)
    }

    fn i_alloc(&mut self) -> Result<u64, Self::Error> {
        Ok(self.dir_fs.i_alloc()?)
    }

    fn i_free(&mut self, i: u64) -> Result<(), Self::Error> {
        Ok(self.dir_fs.i_free(i)?)
    }
}

impl DirectorySupport for PathFS {
    fn dir_lookup(&self, dir: &Inode, name: &str) -> Result<u64, Self::Error> {
        Ok(self.dir_fs.dir_lookup(dir, name)?)
    }

    fn dir_put(&mut self, dir: &mut Inode, name: &str, inum: u64) -> Result<(), Self::Error> {
        Ok(self.dir_fs.dir_put(dir, name, inum)?)
    }

    fn dir_delete(&mut self, dir: &mut Inode, name: &str) -> Result<(), Self::Error> {
        Ok(self.dir_fs.dir_delete(dir, name)?)
    }

    fn dir_list(&self, dir: &Inode) -> Result<Vec<String>, Self::Error> {
        Ok(self.dir_fs.dir_list(dir)?)
    }
}

impl PathSupport for PathFS {
    fn resolve_path(&self, path: &str) -> Result<u64, Self::Error> {
        if !path.starts_with('/') {
            return Err(PathLayerError::InvalidArgument("path must be absolute"));
        }
        let mut cur = self.root_get()?;
        for comp in path.split('/').filter(|c| !c.is_empty()) {
            let node = self.i_get(cur)?;
            if !node.is_dir() {
                return Err(PathLayerError::NotADirectory);
            }
            cur = self.lookup_in(&node, comp)?;
        }
        Ok(cur)
    }

    fn mknod(&mut self, path: &str, mode: u32) -> Result<u64, Self::Error> {
        debug!("mknod({}, {:04o})", path, mode);
        let (parent_path, name) = Self::split_path(path)?;
        let parent = self.resolve_path(parent_path)?;
        self.mknod_at(parent, name, mode)
    }

    fn mknod_at(&mut self, parent: u64, name: &str, mode: u32) -> Result<u64, Self::Error> {
        let parent_node = self.i_get(parent)?;
        if !parent_node.is_dir() {
            return Err(PathLayerError::NotADirectory);
        }
        if name.is_empty() {
            return Err(PathLayerError::InvalidArgument("empty name"));
        }
        if self.contains(&parent_node, name)? {
            return Err(PathLayerError::AlreadyExists);
        }

        let inum = match self.i_alloc() {
            Ok(i) => i,
            Err(_) => return Err(PathLayerError::NoSpace),
        };
        let mut node = self.i_get(inum)?;
        node.mode = mode;
        node.size = 0;
        match self.b_alloc() {
            Ok(b) => node.block = b as u32,
            Err(_) => {
                //Roll back the inode before reporting the exhaustion
                self.i_free(inum)?;
                return Err(PathLayerError::NoSpace);
            }
        }
        self.i_put(&node)?;

        let mut parent_node = self.i_get(parent)?;
        if let Err(e) = self.dir_put(&mut parent_node, name, inum) {
            //The original error wins over a failing rollback
            let _ = self.i_free(inum);
            return Err(e);
        }
        Ok(inum)
    }

    fn mkdir(&mut self, path: &str, mode: u32) -> Result<u64, Self::Error> {
        debug!("mkdir({}, {:04o})", path, mode);
        let (parent_path, name) = Self::split_path(path)?;
        let parent = self.resolve_path(parent_path)?;
        self.mkdir_at(parent, name, mode)
    }

    fn mkdir_at(&mut self, parent: u64, name: &str, mode: u32) -> Result<u64, Self::Error> {
        let parent_node = self.i_get(parent)?;
        if !parent_node.is_dir() {
            return Err(PathLayerError::NotADirectory);
        }
        if name.is_empty() {
            return Err(PathLayerError::InvalidArgument("empty name"));
        }
        if self.contains(&parent_node, name)? {
            return Err(PathLayerError::AlreadyExists);
        }

        let inum = match self.i_alloc() {
            Ok(i) => i,
            Err(_) => return Err(PathLayerError::NoSpace),
        };
        let mut node = self.i_get(inum)?;
        node.mode = S_IFDIR | (mode & 0o777);
        match self.b_alloc() {
            Ok(b) => node.block = b as u32,
            Err(_) => {
                self.i_free(inum)?;
                return Err(PathLayerError::NoSpace);
            }
        }

        //Fresh directories start with their two self-links
        let mut block = self.b_get(node.block as u64)?;
        DirEntry::new(".", inum as u32).write_at(&mut block, 0)?;
        DirEntry::new("..", parent as u32).write_at(&mut block, 1)?;
        self.b_put(&block)?;
        node.size = (2 * DIRENTRY_SIZE) as u32;
        self.i_put(&node)?;

        let mut parent_node = self.i_get(parent)?;
        if let Err(e) = self.dir_put(&mut parent_node, name, inum) {
            //The original error wins over a failing rollback
            let _ = self.i_free(inum);
            return Err(e);
        }
        Ok(inum)
    }

    fn unlink(&mut self, path: &str) -> Result<(), Self::Error> {
        debug!("unlink({})", path);
        let (parent_path, name) = Self::split_path(path)?;
        let parent = self.resolve_path(parent_path)?;
        let mut parent_node = self.i_get(parent)?;
        if !parent_node.is_dir() {
            return Err(PathLayerError::NotADirectory);
        }

        let target = self.lookup_in(&parent_node, name)?;
        let node = self.i_get(target)?;
        if node.is_dir() {
            return Err(PathLayerError::IsADirectory);
        }

        //Entry removal comes first: a failure below cannot leave a dangling
        //name behind
        self.dir_delete(&mut parent_node, name)?;
        self.i_free(target)?;

        let mut parent_node = self.i_get(parent)?;
        parent_node.mtime = unix_now();
        parent_node.ctime = parent_node.mtime;
        self.i_put(&parent_node)?;
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> Result<(), Self::Error> {
        debug!("rmdir({})", path);
        let target = self.resolve_path(path)?;
        let node = self.i_get(target)?;
        if !node.is_dir() {
            return Err(PathLayerError::NotADirectory);
        }
        if !self.dir_list(&node)?.is_empty() {
            return Err(PathLayerError::NotEmpty);
        }

        let (parent_path, name) = Self::split_path(path)?;
        let parent = self.resolve_path(parent_path)?;
        let mut parent_node = self.i_get(parent)?;
        self.dir_delete(&mut parent_node, name)?;
        self.i_free(target)?;
        self.flush()?;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), Self::Error> {
        debug!("rename({} -> {})", from, to);
        if !from.starts_with('/') || !to.starts_with('/') {
            return Err(PathLayerError::InvalidArgument("paths must be absolute"));
        }
        let from_inum = self.resolve_path(from)?;
        let (from_parent_path, from_name) = Self::split_path(from)?;
        let (to_parent_path, to_name) = Self::split_path(to)?;
        let from_parent = self.resolve_path(from_parent_path)?;
        let to_parent = self.resolve_path(to_parent_path)?;

        let mut to_parent_node = self.i_get(to_parent)?;
        if self.contains(&to_parent_node, to_name)? {
            return Err(PathLayerError::AlreadyExists);
        }

        //Insert under the new name first, then drop the old entry; undoing
        //the insert on a failed delete restores the original state
        self.dir_put(&mut to_parent_node, to_name, from_inum)?;
        let mut from_parent_node = self.i_get(from_parent)?;
        if let Err(e) = self.dir_delete(&mut from_parent_node, from_name) {
            let mut undo = self.i_get(to_parent)?;
            let _ = self.dir_delete(&mut undo, to_name);
            return Err(e);
        }
        Ok(())
    }

    fn read(&mut self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, Self::Error> {
        let inum = self.resolve_path(path)?;
        let mut node = self.i_get(inum)?;
        if !node.is_reg() {
            return Err(PathLayerError::IsADirectory);
        }

        let size = node.size as u64;
        if offset >= size {
            return Ok(0);
        }
        let mut n = buf.len() as u64;
        if offset + n > size {
            n = size - offset;
        }
        //A file owns a single block; never read past it
        if offset + n > BLOCK_SIZE {
            n = BLOCK_SIZE.saturating_sub(offset);
        }
        if n == 0 {
            return Ok(0);
        }

        let block = self.b_get(node.block as u64)?;
        block.copy_out(offset, &mut buf[..n as usize])?;

        node.atime = unix_now();
        self.i_put(&node)?;
        Ok(n as usize)
    }

    fn write(&mut self, path: &str, buf: &[u8], offset: u64) -> Result<usize, Self::Error> {
        debug!("write({}, {} bytes @{})", path, buf.len(), offset);
        let inum = self.resolve_path(path)?;
        let mut node = self.i_get(inum)?;
        if !node.is_reg() {
            return Err(PathLayerError::IsADirectory);
        }
        let end = offset + buf.len() as u64;
        if end > BLOCK_SIZE {
            //Files own a single block
            return Err(PathLayerError::NoSpace);
        }

        let mut block = self.b_get(node.block as u64)?;
        block.copy_in(offset, buf)?;
        self.b_put(&block)?;

        if end > node.size as u64 {
            node.size = end as u32;
            self.i_put(&node)?;
        }
        Ok(buf.len())
    }

    fn truncate(&mut self, path: &str, size: u64) -> Result<(), Self::Error> {
        debug!("truncate({}, {})", path, size);
        if size > BLOCK_SIZE {
            return Err(PathLayerError::InvalidArgument(
                "size exceeds the single owned block",
            ));
        }
        let inum = self.resolve_path(path)?;
        let mut node = self.i_get(inum)?;
        //No blocks move: the size field is all that changes
        node.size = size as u32;
        self.i_put(&node)?;
        Ok(())
    }

    fn set_times(&mut self, path: &str) -> Result<(), Self::Error> {
        let inum = self.resolve_path(path)?;
        let mut node = self.i_get(inum)?;
        node.atime = unix_now();
        node.mtime = node.atime;
        self.i_put(&node)?;
        Ok(())
    }
}
