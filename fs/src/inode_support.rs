//! The inode layer: the fixed-width record table in the blocks after the
//! header, and the inode allocator driven by the bitmap in the header block.
//!
//! Inode `n` lives at block `inodestart + n / inodes_per_block`, offset
//! `(n % inodes_per_block) * INODE_SIZE`. An all-zero record decodes as a
//! free inode (`refs == 0`), so a fresh image needs no initialization pass
//! over the table.

use imgfs_api::fs::{BlockSupport, FileSysSupport, InodeSupport};
use imgfs_api::pager::ImagePager;
use imgfs_api::types::{Block, Geometry, Inode, INODE_BITMAP_START, INODE_SIZE};
use log::trace;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::bitmap::{bit_get, bit_put};
use super::block_support::BlockLayerFS;
use super::error_fs::InodeLayerError;

/// Current wall-clock time in whole seconds since the epoch
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Filesystem with block and inode support
#[derive(Debug)]
pub struct InodeLayerFS {
    block_fs: BlockLayerFS,
}

impl InodeLayerFS {
    /// The region table of the mounted image
    pub fn geo(&self) -> &Geometry {
        self.block_fs.geo()
    }

    /// Table position of inode `i`: (block index, byte offset within it)
    fn inode_pos(&self, i: u64) -> (u64, u64) {
        let geo = self.geo();
        (
            geo.inodestart + i / geo.inodes_per_block,
            (i % geo.inodes_per_block) * *INODE_SIZE,
        )
    }
}

impl FileSysSupport for InodeLayerFS {
    type Error = InodeLayerError;

    fn geometry_valid(geo: &Geometry) -> bool {
        BlockLayerFS::geometry_valid(geo)
    }

    fn mkfs<P: AsRef<Path>>(path: P, geo: &Geometry) -> Result<Self, Self::Error> {
        let block_fs = BlockLayerFS::mkfs(path, geo)?;
        Ok(InodeLayerFS { block_fs })
    }

    fn mountfs(pager: ImagePager) -> Result<Self, Self::Error> {
        let block_fs = BlockLayerFS::mountfs(pager)?;
        Ok(InodeLayerFS { block_fs })
    }

    fn unmountfs(self) -> ImagePager {
        self.block_fs.unmountfs()
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(self.block_fs.flush()?)
    }
}

impl BlockSupport for InodeLayerFS {
    fn b_get(&self, i: u64) -> Result<Block, Self::Error> {
        Ok(self.block_fs.b_get(i)?)
    }

    fn b_put(&mut self, b: &Block) -> Result<(), Self::Error> {
        Ok(self.block_fs.b_put(b)?)
    }

    fn b_zero(&mut self, i: u64) -> Result<(), Self::Error> {
        Ok(self.block_fs.b_zero(i)?)
    }

    fn b_alloc(&mut self) -> Result<u64, Self::Error> {
        Ok(self.block_fs.b_alloc()?)
    }

    fn b_free(&mut self, i: u64) -> Result<(), Self::Error> {
        Ok(self.block_fs.b_free(i)?)
    }

    fn root_get(&self) -> Result<u64, Self::Error> {
        Ok(self.block_fs.root_get()?)
    }

    fn root_put(&mut self, inum: u64) -> Result<(), Self::Error> {
        Ok(self.block_fs.root_put(inum)?)
    }
}

impl InodeSupport for InodeLayerFS {
    fn i_get(&self, i: u64) -> Result<Inode, Self::Error> {
        if i >= self.geo().ninodes {
            return Err(InodeLayerError::InodeOutOfRange(i));
        }
        let (block_no, offset) = self.inode_pos(i);
        let block = self.b_get(block_no)?;
        let mut node = block.decode::<Inode>(offset)?;
        //Records are addressed by table position; the stored field is
        //informative only and rewritten here
        node.inum = i as u32;
        Ok(node)
    }

    fn i_put(&mut self, ino: &Inode) -> Result<(), Self::Error> {
        let i = ino.inum as u64;
        if i >= self.geo().ninodes {
            return Err(InodeLayerError::InodeOutOfRange(i));
        }
        let (block_no, offset) = self.inode_pos(i);
        let mut block = self.b_get(block_no)?;
        block.encode(ino, offset)?;
        self.b_put(&block)?;
        Ok(())
    }

    fn i_alloc(&mut self) -> Result<u64, Self::Error> {
        let mut header = self.b_get(0)?;
        for n in 0..self.geo().ninodes {
            if !bit_get(&header, INODE_BITMAP_START, n)? {
                bit_put(&mut header, INODE_BITMAP_START, n, true)?;
                self.b_put(&header)?;

                let now = unix_now();
                let node = Inode {
                    inum: n as u32,
                    refs: 1,
                    mode: 0,
                    size: 0,
                    block: 0,
                    atime: now,
                    mtime: now,
                    ctime: now,
                };
                self.i_put(&node)?;
                trace!("i_alloc -> {}", n);
                return Ok(n);
            }
        }
        Err(InodeLayerError::NoFreeInodes)
    }

    fn i_free(&mut self, i: u64) -> Result<(), Self::Error> {
        if i >= self.geo().ninodes {
            return Err(InodeLayerError::InodeOutOfRange(i));
        }
        let mut header = self.b_get(0)?;
        if !bit_get(&header, INODE_BITMAP_START, i)? {
            return Err(InodeLayerError::InodeNotAllocated(i));
        }
        bit_put(&mut header, INODE_BITMAP_START, i, false)?;
        self.b_put(&header)?;

        let node = self.i_get(i)?;
        if node.block != 0 {
            self.b_free(node.block as u64)?;
        }
        trace!("i_free({})", i);
        Ok(())
    }
}
