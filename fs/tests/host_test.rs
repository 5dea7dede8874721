use imgfs::host::HostFs;
use imgfs_api::fs::{FileSysSupport, InodeSupport, PathSupport};
use imgfs_api::types::{S_IFDIR, S_IFMT, S_IFREG};
use std::path::PathBuf;

#[path = "utils.rs"]
mod utils;

fn disk_prep_path(name: &str) -> PathBuf {
    utils::disk_prep_path(&("images-host-".to_string() + name), "img")
}

fn fresh_host(name: &str) -> (PathBuf, HostFs) {
    utils::log_init();
    let path = disk_prep_path(name);
    let host = HostFs::init(&path).unwrap();
    (path, host)
}

fn teardown(mut host: HostFs, path: &PathBuf) {
    host.storage().flush().unwrap();
    drop(host);
    utils::disk_unprep_path(path);
}

#[test]
fn getattr_and_nlink() {
    let (path, mut host) = fresh_host("getattr");

    let st = host.getattr("/").unwrap();
    assert_eq!(st.mode & S_IFMT, S_IFDIR);
    assert_eq!(st.nlink, 2);
    assert_eq!(st.ino, 0);
    assert_eq!(st.uid, unsafe { libc::getuid() });

    //Each child directory contributes a ".." link to its parent
    host.mkdir("/d", 0o755).unwrap();
    host.mkdir("/e", 0o755).unwrap();
    host.mknod("/f", S_IFREG | 0o644).unwrap();
    let st = host.getattr("/").unwrap();
    assert_eq!(st.nlink, 4);

    let st = host.getattr("/f").unwrap();
    assert_eq!(st.mode & S_IFMT, S_IFREG);
    assert_eq!(st.nlink, 1);
    assert_eq!(st.size, 0);

    assert_eq!(host.getattr("/ghost"), Err(-libc::ENOENT));

    teardown(host, &path);
}

#[test]
fn readdir_lists_dot_entries() {
    let (path, mut host) = fresh_host("readdir");

    assert_eq!(host.readdir("/").unwrap(), vec![".", ".."]);

    host.mkdir("/d", 0o755).unwrap();
    host.mknod("/d/f", S_IFREG | 0o644).unwrap();
    assert_eq!(host.readdir("/d").unwrap(), vec![".", "..", "f"]);

    assert_eq!(host.readdir("/d/f"), Err(-libc::ENOTDIR));
    assert_eq!(host.readdir("/missing"), Err(-libc::ENOENT));

    teardown(host, &path);
}

#[test]
fn open_checks_write_bits() {
    let (path, mut host) = fresh_host("open");

    host.mknod("/ro", S_IFREG | 0o444).unwrap();
    host.mknod("/rw", S_IFREG | 0o644).unwrap();

    assert_eq!(host.open("/ro", libc::O_RDONLY), Ok(()));
    assert_eq!(host.open("/ro", libc::O_WRONLY), Err(-libc::EACCES));
    assert_eq!(host.open("/ro", libc::O_RDWR), Err(-libc::EACCES));
    assert_eq!(host.open("/rw", libc::O_WRONLY), Ok(()));
    assert_eq!(host.open("/nope", libc::O_RDONLY), Err(-libc::ENOENT));

    teardown(host, &path);
}

#[test]
fn file_io_round_trip() {
    let (path, mut host) = fresh_host("io");

    host.mknod("/data", S_IFREG | 0o644).unwrap();
    assert_eq!(host.write("/data", b"hello", 0), Ok(5));

    let mut buf = [0u8; 16];
    assert_eq!(host.read("/data", &mut buf, 0), Ok(5));
    assert_eq!(&buf[..5], b"hello");
    assert_eq!(host.getattr("/data").unwrap().size, 5);

    host.truncate("/data", 2).unwrap();
    assert_eq!(host.getattr("/data").unwrap().size, 2);

    assert_eq!(host.access("/data", 0), Ok(()));
    assert_eq!(host.access("/gone", 0), Err(-libc::ENOENT));

    teardown(host, &path);
}

#[test]
fn errno_mapping() {
    let (path, mut host) = fresh_host("errno");

    host.mkdir("/d", 0o755).unwrap();
    host.mknod("/d/f", S_IFREG | 0o644).unwrap();

    assert_eq!(host.mknod("/d/f", S_IFREG | 0o644), Err(-libc::EEXIST));
    assert_eq!(host.rmdir("/d"), Err(-libc::ENOTEMPTY));
    assert_eq!(host.unlink("/d"), Err(-libc::EISDIR));
    assert_eq!(host.mknod("relative", S_IFREG | 0o644), Err(-libc::EINVAL));
    assert_eq!(
        host.rename("/d/f", "/d/f"),
        Err(-libc::EEXIST) //destination already carries the name
    );

    host.unlink("/d/f").unwrap();
    host.rmdir("/d").unwrap();
    assert_eq!(host.rmdir("/d"), Err(-libc::ENOENT));

    teardown(host, &path);
}

#[test]
fn utimens_stamps_now() {
    let (path, mut host) = fresh_host("utimens");

    host.mknod("/t", S_IFREG | 0o644).unwrap();
    host.utimens("/t").unwrap();

    let fs = host.storage();
    let inum = fs.resolve_path("/t").unwrap();
    let node = fs.i_get(inum).unwrap();
    assert!(node.atime > 0);
    assert_eq!(node.atime, node.mtime);

    teardown(host, &path);
}

#[test]
fn unsupported_callbacks() {
    let (path, mut host) = fresh_host("stubs");

    host.mknod("/f", S_IFREG | 0o644).unwrap();
    assert_eq!(host.link("/f", "/g"), Err(-libc::EPERM));
    assert_eq!(host.chmod("/f", 0o600), Err(-libc::EPERM));
    assert_eq!(host.ioctl("/f", 42), Err(-libc::EPERM));

    //None of the stubs touched the file
    assert_eq!(host.getattr("/f").unwrap().mode, S_IFREG | 0o644);

    teardown(host, &path);
}
