//! The image pager: the backing file, memory-mapped, carved into
//! `BLOCK_SIZE`-byte blocks.
//!
//! The pager is the only code that touches the backing file. It always deals
//! in whole blocks of the one fixed size the image format uses; the block
//! count is not configured anywhere but read off the file itself, so an
//! image carries its own geometry. Reads hand out owned [`Block`] copies and
//! writes copy a block back into the mapping; [`flush`](ImagePager::flush)
//! makes the mapping durable. The backing file is not locked, so an image
//! must not be opened twice at the same time.

use super::error;
use super::error::ImageError;
use super::types::{Block, BLOCK_SIZE};
use memmap::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// A mounted image file.
#[derive(Debug)]
pub struct ImagePager {
    path: PathBuf,
    map: MmapMut,
    nblocks: u64,
}

impl ImagePager {
    /// Create a fresh image of `nblocks` zero-filled blocks at `path`.
    /// Refuses to overwrite: fails if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P, nblocks: u64) -> error::Result<ImagePager> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(nblocks * BLOCK_SIZE)?;
        let map = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(ImagePager {
            path: path.as_ref().to_path_buf(),
            map,
            nblocks,
        })
    }

    /// Map an existing image at `path`, taking the block count from the
    /// file size. A file that is empty or not a whole number of blocks is
    /// not an image.
    pub fn open<P: AsRef<Path>>(path: P) -> error::Result<ImagePager> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        if len == 0 || len % BLOCK_SIZE != 0 {
            return Err(ImageError::Pager(
                "file size is not a whole number of blocks",
            ));
        }
        let map = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(ImagePager {
            path: path.as_ref().to_path_buf(),
            map,
            nblocks: len / BLOCK_SIZE,
        })
    }

    /// Number of blocks in the image
    pub fn block_count(&self) -> u64 {
        self.nblocks
    }

    /// Path of the backing image file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte range of block `index` inside the mapping
    fn span(&self, index: u64) -> error::Result<Range<usize>> {
        if index >= self.nblocks {
            return Err(ImageError::Pager("block index past the end of the image"));
        }
        let start = (index * BLOCK_SIZE) as usize;
        Ok(start..start + BLOCK_SIZE as usize)
    }

    /// Read block `index` into an owned copy
    pub fn read(&self, index: u64) -> error::Result<Block> {
        let span = self.span(index)?;
        Ok(Block::from_bytes(index, self.map[span].into()))
    }

    /// Copy `block` back into the mapping at its own index
    pub fn write(&mut self, block: &Block) -> error::Result<()> {
        if block.size() != BLOCK_SIZE {
            return Err(ImageError::Pager("block does not match the image block size"));
        }
        let span = self.span(block.index())?;
        self.map[span].copy_from_slice(block.bytes());
        Ok(())
    }

    /// Wipe block `index` to all zeroes, directly in the mapping
    pub fn zero(&mut self, index: u64) -> error::Result<()> {
        let span = self.span(index)?;
        for byte in &mut self.map[span] {
            *byte = 0;
        }
        Ok(())
    }

    /// Synchronize the mapping with the backing file
    pub fn flush(&mut self) -> error::Result<()> {
        self.map.flush()?;
        Ok(())
    }
}

impl Drop for ImagePager {
    /// Best-effort flush; the backing file may already be gone
    fn drop(&mut self) {
        let _ = self.map.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::ImagePager;
    use crate::types::{Block, BLOCK_SIZE};
    use std::fs;
    use std::path::PathBuf;

    //One directory per test so the suite can run in parallel; cleanup
    //removes the image and the directory again
    fn scratch(name: &str) -> PathBuf {
        let mut p = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        p.push(format!("pager-{}", name));
        fs::create_dir_all(&p).unwrap();
        p.push("image");
        if p.exists() {
            fs::remove_file(&p).unwrap();
        }
        p
    }

    fn cleanup(p: &PathBuf) {
        if p.exists() {
            fs::remove_file(p).unwrap();
        }
        fs::remove_dir(p.parent().unwrap()).unwrap();
    }

    #[test]
    fn blocks_round_trip_through_the_file() {
        let path = scratch("roundtrip");
        let mut pager = ImagePager::create(&path, 4).unwrap();
        assert_eq!(pager.block_count(), 4);

        //A fresh image reads back as zeroes
        assert!(pager.read(2).unwrap().bytes().iter().all(|&b| b == 0));

        //A patterned block survives write, flush and reopen
        let mut blk = Block::zeroed(1, BLOCK_SIZE);
        blk.copy_in(17, b"persisted").unwrap();
        pager.write(&blk).unwrap();
        pager.flush().unwrap();
        drop(pager);

        let pager = ImagePager::open(&path).unwrap();
        assert_eq!(pager.block_count(), 4);
        assert_eq!(pager.read(1).unwrap(), blk);

        drop(pager);
        cleanup(&path);
    }

    #[test]
    fn zero_wipes_a_block() {
        let path = scratch("zero");
        let mut pager = ImagePager::create(&path, 4).unwrap();

        let mut blk = Block::zeroed(3, BLOCK_SIZE);
        blk.copy_in(100, &[0xff; 64]).unwrap();
        pager.write(&blk).unwrap();

        pager.zero(3).unwrap();
        assert!(pager.read(3).unwrap().bytes().iter().all(|&b| b == 0));

        drop(pager);
        cleanup(&path);
    }

    #[test]
    fn misuse_is_refused() {
        let path = scratch("misuse");
        let mut pager = ImagePager::create(&path, 4).unwrap();

        //Creating over an existing image would destroy it
        assert!(ImagePager::create(&path, 4).is_err());

        //Indices past the end and blocks of the wrong size
        assert!(pager.read(4).is_err());
        assert!(pager.zero(4).is_err());
        assert!(pager.write(&Block::zeroed(0, BLOCK_SIZE - 1)).is_err());

        drop(pager);
        cleanup(&path);

        //Opening an image that is not there
        assert!(ImagePager::open(&path).is_err());
    }

    #[test]
    fn partial_files_are_not_images() {
        let path = scratch("partial");
        fs::write(&path, vec![0u8; BLOCK_SIZE as usize + 1]).unwrap();
        assert!(ImagePager::open(&path).is_err());

        fs::write(&path, Vec::new()).unwrap();
        assert!(ImagePager::open(&path).is_err());

        cleanup(&path);
    }
}
