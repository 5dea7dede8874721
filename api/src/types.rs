//! On-disk types and layout constants.
//!
//! The image is a sequence of `BLOCK_SIZE`-byte blocks:
//!
//! \[header block | inode table | data blocks\]
//!
//! Block 0 is the header. It holds, at fixed offsets, the block bitmap
//! (`BLOCK_BITMAP_START`, one bit per image block, LSB-first within each
//! byte), the inode bitmap (`INODE_BITMAP_START`) and the persisted root
//! inode number (`ROOT_SLOT_START`, u32 little-endian). The inode table
//! starts at block 1 and packs fixed-width [`Inode`] records; everything
//! after it is the data area. Directories occupy exactly one data block and
//! regular files own at most one.

use super::error;
use super::error::ImageError;
use lazy_static::lazy_static;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Size of an image block, in bytes
pub const BLOCK_SIZE: u64 = 4096;
/// Number of inode records the image keeps track of
pub const INODE_COUNT: u64 = 256;
/// Number of blocks in an image created from scratch
pub const DEFAULT_NBLOCKS: u64 = 256;

/// Byte offset of the block bitmap inside the header block
pub const BLOCK_BITMAP_START: u64 = 0;
/// Byte offset of the inode bitmap inside the header block
pub const INODE_BITMAP_START: u64 = 32;
/// Byte offset of the persisted root inode number (u32 little-endian)
pub const ROOT_SLOT_START: u64 = 64;
/// Largest number of blocks the block bitmap region can describe
pub const MAX_NBLOCKS: u64 = (INODE_BITMAP_START - BLOCK_BITMAP_START) * 8;

/// Width of a directory entry name field; names are NUL-terminated, so at
/// most `DIR_NAME_SIZE - 1` bytes of a name are significant
pub const DIR_NAME_SIZE: usize = 48;
/// On-disk width of a directory entry
pub const DIRENTRY_SIZE: u64 = 64;
/// Number of directory entries a single block can hold
pub const DIR_ENTRIES_PER_BLOCK: u64 = BLOCK_SIZE / DIRENTRY_SIZE;

/// Mask of the file-type bits in an inode mode
pub const S_IFMT: u32 = 0o170_000;
/// Directory file type
pub const S_IFDIR: u32 = 0o040_000;
/// Regular file type
pub const S_IFREG: u32 = 0o100_000;

/// An owned copy of one image block, tagged with its index.
///
/// All structured access to the image goes through this type: raw byte
/// ranges via [`copy_in`](Block::copy_in)/[`copy_out`](Block::copy_out),
/// bincode records via [`encode`](Block::encode)/[`decode`](Block::decode).
/// Every accessor addresses bytes by offset from the start of the block and
/// refuses ranges that leave it. Mutations land on the image once the block
/// is written back through the pager.
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    index: u64,
    data: Box<[u8]>,
}

impl Block {
    /// An all-zero block of `size` bytes for image index `index`
    pub fn zeroed(index: u64, size: u64) -> Block {
        Block {
            index,
            data: vec![0; size as usize].into_boxed_slice(),
        }
    }

    /// A block for image index `index` owning the given bytes
    pub fn from_bytes(index: u64, data: Box<[u8]>) -> Block {
        Block { index, data }
    }

    /// The image index this block was read from and writes back to
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Length of the block contents in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Borrow the whole block contents
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// The in-bounds byte range `[offset, offset + len)`, if there is one
    fn span(&self, offset: u64, len: usize) -> error::Result<Range<usize>> {
        let end = offset + len as u64;
        if end > self.data.len() as u64 {
            return Err(ImageError::Bounds("byte range leaves the block"));
        }
        Ok(offset as usize..end as usize)
    }

    /// Fill `out` from the block, starting at byte `offset`
    pub fn copy_out(&self, offset: u64, out: &mut [u8]) -> error::Result<()> {
        let span = self.span(offset, out.len())?;
        out.copy_from_slice(&self.data[span]);
        Ok(())
    }

    /// Copy `src` into the block, starting at byte `offset`
    pub fn copy_in(&mut self, offset: u64, src: &[u8]) -> error::Result<()> {
        let span = self.span(offset, src.len())?;
        self.data[span].copy_from_slice(src);
        Ok(())
    }

    /// Decode a bincode record of type `S` starting at byte `offset`
    pub fn decode<S>(&self, offset: u64) -> error::Result<S>
    where
        S: DeserializeOwned,
    {
        if offset > self.data.len() as u64 {
            return Err(ImageError::Bounds("record offset leaves the block"));
        }
        Ok(bincode::deserialize(&self.data[offset as usize..])?)
    }

    /// Encode `record` into the block at byte `offset`. The record must fit
    /// inside the block; a record spilling over the end is refused rather
    /// than truncated.
    pub fn encode<S>(&mut self, record: &S, offset: u64) -> error::Result<()>
    where
        S: Serialize,
    {
        let raw = bincode::serialize(record)?;
        self.copy_in(offset, &raw)
    }
}

/// Region table of an image, derived from its block count.
///
/// Unlike a classic superblock this is not persisted: block 0 carries only
/// the bitmaps and the root slot, and every other field below follows from
/// `nblocks` and the fixed constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Block size in bytes; always `BLOCK_SIZE`
    pub block_size: u64,
    /// Total number of blocks in the image
    pub nblocks: u64,
    /// Number of inode records; always `INODE_COUNT`
    pub ninodes: u64,
    /// First block of the inode table; always 1
    pub inodestart: u64,
    /// Number of inode records that fit in one block
    pub inodes_per_block: u64,
    /// Number of blocks the inode table occupies
    pub inode_blocks: u64,
    /// First block of the data area
    pub datastart: u64,
}

impl Geometry {
    /// Compute the region table for an image of `nblocks` blocks
    pub fn for_image(nblocks: u64) -> Geometry {
        let inodes_per_block = BLOCK_SIZE / *INODE_SIZE;
        let inode_blocks = (INODE_COUNT + inodes_per_block - 1) / inodes_per_block;
        Geometry {
            block_size: BLOCK_SIZE,
            nblocks,
            ninodes: INODE_COUNT,
            inodestart: 1,
            inodes_per_block,
            inode_blocks,
            datastart: 1 + inode_blocks,
        }
    }
}

/// Fixed-width inode record.
///
/// Serialized with bincode's legacy config (little-endian, fixed-width
/// integers), so the on-disk width is the plain sum of the field widths and
/// an all-zero record decodes as a free inode (`refs == 0`). `block` is the
/// single data block of the file or directory, 0 when none is attached.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    /// Inode number; rewritten from the table position on every read
    pub inum: u32,
    /// Number of directory entries referencing this inode
    pub refs: u32,
    /// File type bits plus nine permission bits
    pub mode: u32,
    /// Size in bytes; for directories a multiple of `DIRENTRY_SIZE`
    pub size: u32,
    /// Index of the owned data block, or 0
    pub block: u32,
    /// Last access time, seconds since the epoch
    pub atime: i64,
    /// Last modification time, seconds since the epoch
    pub mtime: i64,
    /// Creation / status change time, seconds since the epoch
    pub ctime: i64,
}

impl Inode {
    /// Is this inode a directory?
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Is this inode a regular file?
    pub fn is_reg(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Number of live directory entries, for directory inodes
    pub fn entry_count(&self) -> u64 {
        self.size as u64 / DIRENTRY_SIZE
    }
}

impl fmt::Display for Inode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "inode{{inum: {}, refs: {}, mode: {:04o}, size: {}, block: {}}}",
            self.inum, self.refs, self.mode, self.size, self.block
        )
    }
}

lazy_static! {
    /// On-disk width of an [`Inode`] record, in bytes.
    /// Determined at runtime from the serializer, like all record sizes.
    pub static ref INODE_SIZE: u64 =
        bincode::serialize(&Inode::default()).unwrap().len() as u64;
}

/// A directory entry: a name and the inode number it references.
///
/// The on-disk form is bit-exact and hand-packed rather than serialized:
/// 48 bytes of NUL-padded name, the inode number as a u32 little-endian, and
/// 12 zero bytes of padding, 64 bytes in total. An entry whose first name
/// byte is NUL is free (a tombstone when it lies inside the live prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    /// NUL-padded entry name
    pub name: [u8; DIR_NAME_SIZE],
    /// Referenced inode number
    pub inum: u32,
}

impl Default for DirEntry {
    fn default() -> DirEntry {
        DirEntry {
            name: [0; DIR_NAME_SIZE],
            inum: 0,
        }
    }
}

impl DirEntry {
    /// Build an entry for `name` -> `inum`. The name is truncated to
    /// `DIR_NAME_SIZE - 1` bytes so the NUL terminator always fits.
    pub fn new(name: &str, inum: u32) -> DirEntry {
        let mut de = DirEntry {
            name: [0; DIR_NAME_SIZE],
            inum,
        };
        let bytes = name.as_bytes();
        let n = bytes.len().min(DIR_NAME_SIZE - 1);
        de.name[..n].copy_from_slice(&bytes[..n]);
        de
    }

    /// The entry name, up to its NUL terminator
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(DIR_NAME_SIZE);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Whether this slot holds no entry (first name byte is NUL)
    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    /// Pack the entry into its 64-byte on-disk form
    pub fn to_bytes(&self) -> [u8; DIRENTRY_SIZE as usize] {
        let mut raw = [0u8; DIRENTRY_SIZE as usize];
        raw[..DIR_NAME_SIZE].copy_from_slice(&self.name);
        raw[DIR_NAME_SIZE..DIR_NAME_SIZE + 4].copy_from_slice(&self.inum.to_le_bytes());
        raw
    }

    /// Unpack an entry from its 64-byte on-disk form
    pub fn from_bytes(raw: &[u8; DIRENTRY_SIZE as usize]) -> DirEntry {
        let mut name = [0u8; DIR_NAME_SIZE];
        name.copy_from_slice(&raw[..DIR_NAME_SIZE]);
        let mut inum = [0u8; 4];
        inum.copy_from_slice(&raw[DIR_NAME_SIZE..DIR_NAME_SIZE + 4]);
        DirEntry {
            name,
            inum: u32::from_le_bytes(inum),
        }
    }

    /// Read the entry in slot `slot` of a directory block
    pub fn read_at(block: &Block, slot: u64) -> error::Result<DirEntry> {
        let mut raw = [0u8; DIRENTRY_SIZE as usize];
        block.copy_out(slot * DIRENTRY_SIZE, &mut raw)?;
        Ok(DirEntry::from_bytes(&raw))
    }

    /// Write this entry into slot `slot` of a directory block
    pub fn write_at(&self, block: &mut Block, slot: u64) -> error::Result<()> {
        block.copy_in(slot * DIRENTRY_SIZE, &self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_copy_bounds() {
        let mut b = Block::zeroed(7, 128);
        assert_eq!(b.index(), 7);
        assert_eq!(b.size(), 128);

        b.copy_in(120, &[1; 8]).unwrap();
        let mut out = [0u8; 10];
        b.copy_out(118, &mut out).unwrap();
        assert_eq!(out, [0, 0, 1, 1, 1, 1, 1, 1, 1, 1]);

        //One byte over the end, in either direction
        assert!(b.copy_in(121, &[1; 8]).is_err());
        assert!(b.copy_out(128, &mut out[..1]).is_err());
        //An empty copy at the boundary is a no-op, not an error
        assert!(b.copy_in(128, &[]).is_ok());

        //Failed copies leave the contents alone
        assert_eq!(&b.bytes()[..118], &vec![0u8; 118][..]);
    }

    #[test]
    fn inode_record_width() {
        //Five u32 fields and three i64 fields, fixed-width encoding
        assert_eq!(*INODE_SIZE, 44);
        let n1 = Inode::default();
        let n2 = Inode {
            inum: 7,
            refs: 1,
            mode: S_IFREG | 0o644,
            size: 42,
            block: 9,
            atime: 1,
            mtime: 2,
            ctime: 3,
        };
        assert_eq!(
            bincode::serialize(&n1).unwrap().len(),
            bincode::serialize(&n2).unwrap().len()
        );

        //Records round-trip through a block, at any slot offset
        let mut b = Block::zeroed(1, BLOCK_SIZE);
        b.encode(&n2, 3 * *INODE_SIZE).unwrap();
        assert_eq!(b.decode::<Inode>(3 * *INODE_SIZE).unwrap(), n2);

        //A record spilling over the end of the block is refused
        assert!(b.encode(&n2, BLOCK_SIZE - *INODE_SIZE + 1).is_err());
        assert!(b.encode(&n2, BLOCK_SIZE - *INODE_SIZE).is_ok());
    }

    #[test]
    fn direntry_layout() {
        let de = DirEntry::new("hello.txt", 0x0102_0304);
        let raw = de.to_bytes();
        assert_eq!(&raw[..9], b"hello.txt");
        assert_eq!(raw[9], 0);
        //Inode number sits at byte 48, little-endian
        assert_eq!(&raw[48..52], &[0x04, 0x03, 0x02, 0x01]);
        //Padding is zero
        assert_eq!(&raw[52..], &[0u8; 12]);
        assert_eq!(DirEntry::from_bytes(&raw), de);

        //Names longer than 47 bytes are truncated, keeping the terminator
        let long = "x".repeat(60);
        let de = DirEntry::new(&long, 1);
        assert_eq!(de.name_str().len(), DIR_NAME_SIZE - 1);
        assert_eq!(de.name[DIR_NAME_SIZE - 1], 0);

        assert!(DirEntry::default().is_free());
        assert!(!de.is_free());
    }

    #[test]
    fn direntry_slots() {
        let mut b = Block::zeroed(0, BLOCK_SIZE);
        DirEntry::new("first", 1).write_at(&mut b, 0).unwrap();
        DirEntry::new("last", 2)
            .write_at(&mut b, DIR_ENTRIES_PER_BLOCK - 1)
            .unwrap();

        assert_eq!(DirEntry::read_at(&b, 0).unwrap().name_str(), "first");
        assert_eq!(
            DirEntry::read_at(&b, DIR_ENTRIES_PER_BLOCK - 1).unwrap().inum,
            2
        );
        //Slot 1 was never written and reads back free
        assert!(DirEntry::read_at(&b, 1).unwrap().is_free());
        //There is no slot past the last one
        assert!(DirEntry::new("over", 3)
            .write_at(&mut b, DIR_ENTRIES_PER_BLOCK)
            .is_err());
    }

    #[test]
    fn geometry_regions() {
        let geo = Geometry::for_image(DEFAULT_NBLOCKS);
        assert_eq!(geo.inodes_per_block, 93);
        assert_eq!(geo.inode_blocks, 3);
        assert_eq!(geo.datastart, 4);
        assert!(geo.nblocks <= MAX_NBLOCKS);
    }

    #[test]
    fn mode_bits() {
        let mut n = Inode::default();
        n.mode = S_IFDIR | 0o755;
        assert!(n.is_dir());
        assert!(!n.is_reg());
        n.mode = S_IFREG | 0o644;
        assert!(n.is_reg());
        n.size = 128;
        assert_eq!(n.entry_count(), 2);
    }
}
