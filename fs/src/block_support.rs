//! The block layer: block access, the block bitmap with its first-fit
//! allocator, and the root inode slot, all kept in the header block.
//!
//! `mkfs` pre-sets the bitmap bits of the header block and the inode-table
//! blocks; those bits are never cleared again, so a first-fit scan can only
//! ever hand out blocks from the data area. Allocator indices are raw image
//! indices.

use imgfs_api::fs::{BlockSupport, FileSysSupport};
use imgfs_api::pager::ImagePager;
use imgfs_api::types::{
    Block, Geometry, BLOCK_BITMAP_START, BLOCK_SIZE, INODE_COUNT, MAX_NBLOCKS, ROOT_SLOT_START,
};
use log::trace;
use std::path::Path;

use super::bitmap::{bit_get, bit_put};
use super::error_fs::BlockLayerError;

/// Filesystem with block-level support
#[derive(Debug)]
pub struct BlockLayerFS {
    geo: Geometry,
    pager: ImagePager,
}

impl BlockLayerFS {
    /// The region table of the mounted image
    pub fn geo(&self) -> &Geometry {
        &self.geo
    }
}

impl FileSysSupport for BlockLayerFS {
    type Error = BlockLayerError;

    fn geometry_valid(geo: &Geometry) -> bool {
        geo.block_size == BLOCK_SIZE
            && geo.ninodes == INODE_COUNT
            && geo.inodestart == 1
            && geo.datastart == geo.inodestart + geo.inode_blocks
            && geo.nblocks > geo.datastart
            && geo.nblocks <= MAX_NBLOCKS
    }

    fn mkfs<P: AsRef<Path>>(path: P, geo: &Geometry) -> Result<Self, Self::Error> {
        if !Self::geometry_valid(geo) {
            return Err(BlockLayerError::BadGeometry(
                "refusing to create an image with this geometry",
            ));
        }
        let pager = ImagePager::create(path, geo.nblocks)?;
        let mut fs = BlockLayerFS { geo: *geo, pager };

        //Reserve the header and the inode table; these bits never clear
        let mut header = fs.b_get(0)?;
        for i in 0..fs.geo.datastart {
            bit_put(&mut header, BLOCK_BITMAP_START, i, true)?;
        }
        fs.b_put(&header)?;
        fs.flush()?;
        Ok(fs)
    }

    fn mountfs(pager: ImagePager) -> Result<Self, Self::Error> {
        let geo = Geometry::for_image(pager.block_count());
        if !Self::geometry_valid(&geo) {
            return Err(BlockLayerError::BadGeometry("image too small or too large"));
        }
        Ok(BlockLayerFS { geo, pager })
    }

    fn unmountfs(self) -> ImagePager {
        self.pager
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(self.pager.flush()?)
    }
}

impl BlockSupport for BlockLayerFS {
    fn b_get(&self, i: u64) -> Result<Block, Self::Error> {
        if i >= self.geo.nblocks {
            return Err(BlockLayerError::BlockOutOfRange(i));
        }
        Ok(self.pager.read(i)?)
    }

    fn b_put(&mut self, b: &Block) -> Result<(), Self::Error> {
        Ok(self.pager.write(b)?)
    }

    fn b_zero(&mut self, i: u64) -> Result<(), Self::Error> {
        if i >= self.geo.nblocks {
            return Err(BlockLayerError::BlockOutOfRange(i));
        }
        if i < self.geo.datastart {
            return Err(BlockLayerError::ReservedBlock(i));
        }
        Ok(self.pager.zero(i)?)
    }

    fn b_alloc(&mut self) -> Result<u64, Self::Error> {
        let mut header = self.b_get(0)?;
        for i in 0..self.geo.nblocks {
            if !bit_get(&header, BLOCK_BITMAP_START, i)? {
                bit_put(&mut header, BLOCK_BITMAP_START, i, true)?;
                self.b_put(&header)?;
                self.b_zero(i)?;
                trace!("b_alloc -> {}", i);
                return Ok(i);
            }
        }
        Err(BlockLayerError::NoFreeBlocks)
    }

    fn b_free(&mut self, i: u64) -> Result<(), Self::Error> {
        if i >= self.geo.nblocks {
            return Err(BlockLayerError::BlockOutOfRange(i));
        }
        if i < self.geo.datastart {
            return Err(BlockLayerError::ReservedBlock(i));
        }
        let mut header = self.b_get(0)?;
        if !bit_get(&header, BLOCK_BITMAP_START, i)? {
            return Err(BlockLayerError::BlockNotAllocated(i));
        }
        bit_put(&mut header, BLOCK_BITMAP_START, i, false)?;
        self.b_put(&header)?;
        trace!("b_free({})", i);
        Ok(())
    }

    fn root_get(&self) -> Result<u64, Self::Error> {
        let header = self.b_get(0)?;
        let mut raw = [0u8; 4];
        header.copy_out(ROOT_SLOT_START, &mut raw)?;
        Ok(u32::from_le_bytes(raw) as u64)
    }

    fn root_put(&mut self, inum: u64) -> Result<(), Self::Error> {
        let mut header = self.b_get(0)?;
        header.copy_in(ROOT_SLOT_START, &(inum as u32).to_le_bytes())?;
        self.b_put(&header)
    }
}
