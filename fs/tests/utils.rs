#![allow(dead_code)]

//Shared helpers for the integration tests. Every test works on its own
//image file in its own directory, so the suite can run in parallel.
use imgfs_api::pager::ImagePager;
use std::fs::{create_dir_all, remove_dir, remove_file};
use std::path::{Path, PathBuf};

//Create the directory 'name' under the crate root and return the path of
//the image file 'img_name' inside it, removing a stale image if one is
//left over from an earlier run
pub fn disk_prep_path(name: &str, img_name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push(name);
    path.push(img_name);

    if path.exists() {
        remove_file(&path).unwrap();
    }
    {
        let prefix = path.parent().unwrap();
        create_dir_all(prefix).unwrap();
    }

    path
}

//Remove the image file and its parent directory
pub fn disk_unprep_path(path: &Path) {
    remove_file(path).unwrap();

    let parent = path.parent().unwrap();
    remove_dir(parent).unwrap(); //only removes an empty directory
}

//Tear down a pager together with its image file and directory
pub fn disk_destruct(pager: ImagePager) {
    let path = pager.path().to_owned();
    drop(pager); //the pager holds the mapping over this file
    disk_unprep_path(&path);
}

//Route log output through the test harness
pub fn log_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
