//! The directory layer: a directory is the single data block named by its
//! inode's `block` field, viewed as a packed array of 64-byte entries.
//!
//! Only the live prefix (`size / DIRENTRY_SIZE` slots) is ever inspected.
//! Deletion compacts the prefix, so "first name byte is NUL" stays a
//! reliable liveness test; insertion still reuses such a slot when one
//! exists inside the prefix (possible when an entry was cleared in place by
//! something other than `dir_delete`).

use imgfs_api::fs::{BlockSupport, DirectorySupport, FileSysSupport, InodeSupport};
use imgfs_api::pager::ImagePager;
use imgfs_api::types::{
    Block, DirEntry, Geometry, Inode, DIRENTRY_SIZE, DIR_ENTRIES_PER_BLOCK, DIR_NAME_SIZE,
};
use std::path::Path;

use super::error_fs::DirLayerError;
use super::inode_support::{unix_now, InodeLayerFS};

/// Filesystem with block, inode and directory support
#[derive(Debug)]
pub struct DirLayerFS {
    inode_fs: InodeLayerFS,
}

impl DirLayerFS {
    /// The region table of the mounted image
    pub fn geo(&self) -> &Geometry {
        self.inode_fs.geo()
    }
}

impl FileSysSupport for DirLayerFS {
    type Error = DirLayerError;

    fn geometry_valid(geo: &Geometry) -> bool {
        InodeLayerFS::geometry_valid(geo)
    }

    fn mkfs<P: AsRef<Path>>(path: P, geo: &Geometry) -> Result<Self, Self::Error> {
        Ok(DirLayerFS {
            inode_fs: InodeLayerFS::mkfs(path, geo)?,
        })
    }

    fn mountfs(pager: ImagePager) -> Result<Self, Self::Error> {
        Ok(DirLayerFS {
            inode_fs: InodeLayerFS::mountfs(pager)?,
        })
    }

    fn unmountfs(self) -> ImagePager {
        self.inode_fs.unmountfs()
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(self.inode_fs.flush()?)
    }
}

impl BlockSupport for DirLayerFS {
    fn b_get(&self, i: u64) -> Result<Block, Self::Error> {
        Ok(self.inode_fs.b_get(i)?)
    }

    fn b_put(&mut self, b: &Block) -> Result<(), Self::Error> {
        Ok(self.inode_fs.b_put(b)?)
    }

    fn b_zero(&mut self, i: u64) -> Result<(), Self::Error> {
        Ok(self.inode_fs.b_zero(i)?)
    }

    fn b_alloc(&mut self) -> Result<u64, Self::Error> {
        Ok(self.inode_fs.b_alloc()?)
    }

    fn b_free(&mut self, i: u64) -> Result<(), Self::Error> {
        Ok(self.inode_fs.b_free(i)?)
    }

    fn root_get(&self) -> Result<u64, Self::Error> {
        Ok(self.inode_fs.root_get()?)
    }

    fn root_put(&mut self, inum: u64) -> Result<(), Self::Error> {
        Ok(self.inode_fs.root_put(inum)?)
    }
}

impl InodeSupport for DirLayerFS {
    fn i_get(&self, i: u64) -> Result<Inode, Self::Error> {
        Ok(self.inode_fs.i_get(i)?)
    }

    fn i_put(&mut self, ino: &Inode) -> Result<(), Self::Error> {
        Ok(self.inode_fs.i_put(ino)?)
    }

    fn i_alloc(&mut self) -> Result<u64, Self::Error> {
        Ok(self.inode_fs.i_alloc()?)
    }

    fn i_free(&mut self, i: u64) -> Result<(), Self::Error> {
        Ok(self.inode_fs.i_free(i)?)
    }
}

impl DirectorySupport for DirLayerFS {
    fn dir_lookup(&self, dir: &Inode, name: &str) -> Result<u64, Self::Error> {
        if !dir.is_dir() {
            return Err(DirLayerError::NotADirectory(dir.inum as u64));
        }
        let block = self.b_get(dir.block as u64)?;
        for slot in 0..dir.entry_count() {
            let de = DirEntry::read_at(&block, slot)?;
            if !de.is_free() && de.name_str() == name {
                return Ok(de.inum as u64);
            }
        }
        Err(DirLayerError::EntryNotFound(name.to_string()))
    }

    fn dir_put(&mut self, dir: &mut Inode, name: &str, inum: u64) -> Result<(), Self::Error> {
        if !dir.is_dir() {
            return Err(DirLayerError::NotADirectory(dir.inum as u64));
        }
        let mut block = self.b_get(dir.block as u64)?;
        let count = dir.entry_count();
        let de = DirEntry::new(name, inum as u32);

        //Reuse a tombstone slot inside the live prefix when there is one
        for slot in 0..count {
            if DirEntry::read_at(&block, slot)?.is_free() {
                de.write_at(&mut block, slot)?;
                self.b_put(&block)?;
                dir.mtime = unix_now();
                self.i_put(dir)?;
                return Ok(());
            }
        }

        if count >= DIR_ENTRIES_PER_BLOCK {
            return Err(DirLayerError::DirectoryFull);
        }
        de.write_at(&mut block, count)?;
        self.b_put(&block)?;
        dir.size += DIRENTRY_SIZE as u32;
        dir.mtime = unix_now();
        self.i_put(dir)?;
        Ok(())
    }

    fn dir_delete(&mut self, dir: &mut Inode, name: &str) -> Result<(), Self::Error> {
        if !dir.is_dir() {
            return Err(DirLayerError::NotADirectory(dir.inum as u64));
        }
        let mut block = self.b_get(dir.block as u64)?;
        let count = dir.entry_count();
        for slot in 0..count {
            let de = DirEntry::read_at(&block, slot)?;
            if !de.is_free() && de.name_str() == name {
                //Clear the name, shift the tail left one slot and zero the
                //vacated final slot, keeping the live prefix packed
                let mut cleared = de;
                cleared.name = [0; DIR_NAME_SIZE];
                cleared.write_at(&mut block, slot)?;
                for j in slot..count - 1 {
                    DirEntry::read_at(&block, j + 1)?.write_at(&mut block, j)?;
                }
                DirEntry::default().write_at(&mut block, count - 1)?;
                self.b_put(&block)?;

                dir.size -= DIRENTRY_SIZE as u32;
                dir.mtime = unix_now();
                self.i_put(dir)?;
                return Ok(());
            }
        }
        Err(DirLayerError::EntryNotFound(name.to_string()))
    }

    fn dir_list(&self, dir: &Inode) -> Result<Vec<String>, Self::Error> {
        if !dir.is_dir() {
            return Err(DirLayerError::NotADirectory(dir.inum as u64));
        }
        let block = self.b_get(dir.block as u64)?;
        let mut names = Vec::new();
        for slot in 0..dir.entry_count() {
            let de = DirEntry::read_at(&block, slot)?;
            if de.is_free() {
                continue;
            }
            let name = de.name_str();
            if name != "." && name != ".." {
                names.push(name);
            }
        }
        Ok(names)
    }
}
