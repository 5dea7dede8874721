use imgfs::error_fs::InodeLayerError;
use imgfs::inode_support::InodeLayerFS;
use imgfs_api::fs::{BlockSupport, FileSysSupport, InodeSupport};
use imgfs_api::pager::ImagePager;
use imgfs_api::types::{Geometry, INODE_COUNT, S_IFREG};
use std::path::PathBuf;

#[path = "utils.rs"]
mod utils;

static NBLOCKS: u64 = 16;

fn disk_prep_path(name: &str) -> PathBuf {
    utils::disk_prep_path(&("images-inode-".to_string() + name), "img")
}

fn fresh_fs(name: &str) -> (PathBuf, InodeLayerFS) {
    let path = disk_prep_path(name);
    let fs = InodeLayerFS::mkfs(&path, &Geometry::for_image(NBLOCKS)).unwrap();
    (path, fs)
}

#[test]
fn alloc_basics() {
    let (_path, mut fs) = fresh_fs("alloc");

    //First fit, starting at inode 0
    assert_eq!(fs.i_alloc().unwrap(), 0);
    assert_eq!(fs.i_alloc().unwrap(), 1);

    let node = fs.i_get(0).unwrap();
    assert_eq!(node.inum, 0);
    assert_eq!(node.refs, 1);
    assert_eq!(node.mode, 0);
    assert_eq!(node.size, 0);
    assert_eq!(node.block, 0);
    assert!(node.atime > 0);
    assert_eq!(node.atime, node.mtime);
    assert_eq!(node.atime, node.ctime);

    //Freed numbers are handed out again before higher ones
    fs.i_free(0).unwrap();
    assert_eq!(fs.i_alloc().unwrap(), 0);

    //Never-allocated inodes cannot be freed, out-of-range ones not read
    assert!(matches!(
        fs.i_free(5),
        Err(InodeLayerError::InodeNotAllocated(5))
    ));
    assert!(matches!(
        fs.i_get(INODE_COUNT),
        Err(InodeLayerError::InodeOutOfRange(_))
    ));

    utils::disk_destruct(fs.unmountfs());
}

#[test]
fn put_roundtrip() {
    let (path, mut fs) = fresh_fs("roundtrip");

    let inum = fs.i_alloc().unwrap();
    let mut node = fs.i_get(inum).unwrap();
    node.mode = S_IFREG | 0o644;
    node.size = 10;
    fs.i_put(&node).unwrap();
    assert_eq!(fs.i_get(inum).unwrap(), node);

    //The record survives a remount
    drop(fs.unmountfs());
    let fs = InodeLayerFS::mountfs(ImagePager::open(&path).unwrap()).unwrap();
    assert_eq!(fs.i_get(inum).unwrap(), node);

    utils::disk_destruct(fs.unmountfs());
}

#[test]
fn free_releases_data_block() {
    let (_path, mut fs) = fresh_fs("release");

    let inum = fs.i_alloc().unwrap();
    let block = fs.b_alloc().unwrap();
    let mut node = fs.i_get(inum).unwrap();
    node.mode = S_IFREG | 0o644;
    node.block = block as u32;
    fs.i_put(&node).unwrap();

    //Freeing the inode frees its block too: the next block allocation
    //reuses the same index
    fs.i_free(inum).unwrap();
    assert_eq!(fs.b_alloc().unwrap(), block);

    //Double free is refused
    assert!(fs.i_free(inum).is_err());

    utils::disk_destruct(fs.unmountfs());
}

#[test]
fn table_exhaustion() {
    let (_path, mut fs) = fresh_fs("exhaustion");

    for n in 0..INODE_COUNT {
        assert_eq!(fs.i_alloc().unwrap(), n);
    }
    assert!(matches!(fs.i_alloc(), Err(InodeLayerError::NoFreeInodes)));

    fs.i_free(100).unwrap();
    assert_eq!(fs.i_alloc().unwrap(), 100);

    utils::disk_destruct(fs.unmountfs());
}
