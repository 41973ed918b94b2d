//! File-system integration over throwaway disk images.

mod common;

use std::rc::Rc;

use common::{open_disk, TempImage};
use tinix::fs_defs::{
    DIRECT_BLOCKS, DIRENT_SIZE, MAX_DATA_BLOCKS, MAX_FILE_SIZE, ROOT_INODE, T_DIRECTORY,
};
use tinix::{FileSystem, FsError};

fn fresh_fs(tag: &str) -> (TempImage, FileSystem) {
    let image = TempImage::new(tag);
    let disk = open_disk(&image);
    let mut fs = FileSystem::new(disk);
    fs.format().expect("format");
    (image, fs)
}

#[test]
fn mount_rejects_a_blank_image() {
    let image = TempImage::new("blank");
    let disk = open_disk(&image);
    let mut fs = FileSystem::new(disk);
    assert_eq!(fs.mount(), Err(FsError::BadMagic));
    assert!(!fs.is_mounted());
}

#[test]
fn mount_rejects_a_layout_mismatch() {
    let image = TempImage::new("layout");
    let disk = open_disk(&image);

    {
        let mut fs = FileSystem::new(Rc::clone(&disk));
        fs.format().unwrap();
    }

    // Corrupt the recorded block total; the magic stays valid.
    let mut block = vec![0u8; 4096];
    disk.read_block(0, &mut block).unwrap();
    let total = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    block[4..8].copy_from_slice(&(total + 1).to_le_bytes());
    disk.write_block(0, &block).unwrap();

    let mut fs = FileSystem::new(disk);
    assert_eq!(fs.mount(), Err(FsError::LayoutMismatch));
}

#[test]
fn superblock_is_little_endian_at_fixed_offsets() {
    let (image, fs) = fresh_fs("endian");
    let disk = open_disk(&image);

    let mut block = vec![0u8; 4096];
    disk.read_block(0, &mut block).unwrap();

    // magic, then total_blocks, total_inodes, free_blocks, free_inodes.
    assert_eq!(&block[0..4], &0x5449_4E58_u32.to_le_bytes());
    let sb = fs.superblock();
    assert_eq!(&block[4..8], &sb.total_blocks.to_le_bytes());
    assert_eq!(&block[8..12], &sb.total_inodes.to_le_bytes());
    assert_eq!(&block[12..16], &sb.free_blocks.to_le_bytes());
    assert_eq!(&block[16..20], &sb.free_inodes.to_le_bytes());
}

#[test]
fn format_then_mount_round_trips_the_superblock() {
    let image = TempImage::new("roundtrip");
    let disk = open_disk(&image);

    let mut fs = FileSystem::new(Rc::clone(&disk));
    fs.format().unwrap();
    let written = *fs.superblock();

    let mut remounted = FileSystem::new(disk);
    remounted.mount().unwrap();
    assert_eq!(*remounted.superblock(), written);
}

#[test]
fn root_directory_starts_with_dot_and_dotdot() {
    let (_image, fs) = fresh_fs("root");

    let root = fs.read_inode(ROOT_INODE).unwrap();
    assert_eq!(root.itype, T_DIRECTORY);
    assert_eq!(root.size, 2 * DIRENT_SIZE as u32);
    assert_eq!(root.blocks_used, 1);

    assert_eq!(fs.lookup("/."), Some(ROOT_INODE));
    assert_eq!(fs.lookup("/.."), Some(ROOT_INODE));
}

#[test]
fn write_then_read_returns_the_same_bytes() {
    let (_image, mut fs) = fresh_fs("hello");

    fs.create_directory("/a").unwrap();
    fs.create_file("/a/b").unwrap();

    let fd = fs.open_file("/a/b").unwrap();
    assert_eq!(fs.write_file(fd, b"hello").unwrap(), 5);
    fs.close_file(fd);

    let fd = fs.open_file("/a/b").unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(fs.read_file(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
    // EOF afterwards
    assert_eq!(fs.read_file(fd, &mut buf).unwrap(), 0);
    fs.close_file(fd);
}

#[test]
fn partial_block_writes_preserve_surrounding_bytes() {
    let (_image, mut fs) = fresh_fs("rmw");
    fs.create_file("/f").unwrap();

    let fd = fs.open_file("/f").unwrap();
    fs.write_file(fd, b"aaaaaaaa").unwrap();
    fs.close_file(fd);

    // Overwrite the middle through a fresh handle at offset 0.
    let fd = fs.open_file("/f").unwrap();
    fs.write_file(fd, b"bb").unwrap();
    fs.close_file(fd);

    let fd = fs.open_file("/f").unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(fs.read_file(fd, &mut buf).unwrap(), 8);
    assert_eq!(&buf, b"bbaaaaaa");
    fs.close_file(fd);
}

#[test]
fn file_growth_stops_at_ten_direct_blocks() {
    let (_image, mut fs) = fresh_fs("cap");
    fs.create_file("/big").unwrap();

    let fd = fs.open_file("/big").unwrap();
    let payload = vec![0x5a_u8; MAX_FILE_SIZE + 1000];
    assert_eq!(fs.write_file(fd, &payload).unwrap(), MAX_FILE_SIZE);

    let inode = fs.read_inode(fs.lookup("/big").unwrap()).unwrap();
    assert_eq!(inode.size as usize, MAX_FILE_SIZE);
    assert_eq!(inode.blocks_used as usize, DIRECT_BLOCKS);

    // The file is full: further writes land nothing.
    assert_eq!(fs.write_file(fd, b"x").unwrap(), 0);
    fs.close_file(fd);
}

#[test]
fn open_file_offsets_stay_within_the_file() {
    let (_image, mut fs) = fresh_fs("offsets");
    fs.create_file("/f").unwrap();

    let fd = fs.open_file("/f").unwrap();
    assert_eq!(fs.open_file_info(fd).unwrap().offset, 0);

    fs.write_file(fd, b"0123456789").unwrap();
    let info = fs.open_file_info(fd).unwrap();
    let size = fs.read_inode(info.inode_num).unwrap().size as usize;
    assert!(info.offset <= size);
    fs.close_file(fd);
}

#[test]
fn create_errors_are_distinguished() {
    let (_image, mut fs) = fresh_fs("errors");

    fs.create_file("/f").unwrap();
    assert_eq!(fs.create_file("/f"), Err(FsError::AlreadyExists));
    assert_eq!(fs.create_file("/missing/f"), Err(FsError::NotFound));
    assert_eq!(fs.open_file("/nope"), Err(FsError::NotFound));

    fs.create_directory("/d").unwrap();
    assert_eq!(fs.create_directory("/d"), Err(FsError::AlreadyExists));
    assert_eq!(fs.open_file("/d"), Err(FsError::NotAFile));
    assert_eq!(fs.remove_file("/d"), Err(FsError::NotAFile));
    assert_eq!(fs.change_directory("/f"), Err(FsError::NotADirectory));
}

#[test]
fn remove_returns_blocks_and_inode_to_the_allocators() {
    let (_image, mut fs) = fresh_fs("remove");

    fs.create_file("/f").unwrap();
    let fd = fs.open_file("/f").unwrap();
    fs.write_file(fd, &vec![1u8; 2 * 4096]).unwrap();
    fs.close_file(fd);

    let before = *fs.superblock();
    fs.remove_file("/f").unwrap();
    let after = *fs.superblock();

    assert_eq!(after.free_blocks, before.free_blocks + 2);
    assert_eq!(after.free_inodes, before.free_inodes + 1);
    assert_eq!(fs.lookup("/f"), None);

    // Data-bitmap accounting stays balanced.
    assert_eq!(
        fs.block_manager().used_data_blocks() as u32 + after.free_blocks,
        MAX_DATA_BLOCKS
    );
}

#[test]
fn removed_entry_slot_is_reused() {
    let (_image, mut fs) = fresh_fs("tombstone");

    fs.create_file("/a").unwrap();
    fs.create_file("/b").unwrap();
    fs.remove_file("/a").unwrap();
    fs.create_file("/c").unwrap();

    // The tombstoned slot took /c; the root grew no extra block.
    let root = fs.read_inode(ROOT_INODE).unwrap();
    assert_eq!(root.blocks_used, 1);
    assert!(fs.lookup("/c").is_some());
    assert!(fs.lookup("/a").is_none());
}

#[test]
fn nested_directories_resolve_by_walking_components() {
    let (_image, mut fs) = fresh_fs("nested");

    fs.create_directory("/a").unwrap();
    fs.create_directory("/a/b").unwrap();
    fs.create_file("/a/b/c").unwrap();

    assert!(fs.lookup("/a/b/c").is_some());
    assert_eq!(fs.lookup("/a/x/c"), None);
    // A file used as a directory component fails the walk.
    assert_eq!(fs.lookup("/a/b/c/d"), None);
}

#[test]
fn change_directory_makes_relative_paths_work() {
    let (_image, mut fs) = fresh_fs("cwd");

    fs.create_directory("/a").unwrap();
    fs.change_directory("/a").unwrap();
    assert_eq!(fs.current_dir(), "/a");

    fs.create_file("f").unwrap();
    assert!(fs.lookup("/a/f").is_some());

    fs.change_directory("..").unwrap();
    assert_eq!(fs.current_dir(), "/");
}

#[test]
fn subdirectory_dotdot_points_at_the_parent() {
    let (_image, mut fs) = fresh_fs("dotdot");

    fs.create_directory("/a").unwrap();
    fs.create_directory("/a/b").unwrap();

    let a = fs.lookup("/a").unwrap();
    let b = fs.lookup("/a/b").unwrap();
    assert_eq!(fs.lookup("/a/b/."), Some(b));
    assert_eq!(fs.lookup("/a/b/.."), Some(a));
}

#[test]
fn state_survives_a_remount() {
    let image = TempImage::new("persist");
    let disk = open_disk(&image);

    {
        let mut fs = FileSystem::new(Rc::clone(&disk));
        fs.format().unwrap();
        fs.create_directory("/boot").unwrap();
        fs.create_file("/boot/cfg").unwrap();
        let fd = fs.open_file("/boot/cfg").unwrap();
        fs.write_file(fd, b"persisted").unwrap();
        fs.close_file(fd);
    }

    let mut fs = FileSystem::new(disk);
    fs.mount().unwrap();
    let fd = fs.open_file("/boot/cfg").unwrap();
    let mut buf = [0u8; 9];
    assert_eq!(fs.read_file(fd, &mut buf).unwrap(), 9);
    assert_eq!(&buf, b"persisted");
    fs.close_file(fd);
}

#[test]
fn close_is_idempotent_and_stale_fds_are_rejected() {
    let (_image, mut fs) = fresh_fs("stale");
    fs.create_file("/f").unwrap();

    let fd = fs.open_file("/f").unwrap();
    fs.close_file(fd);
    fs.close_file(fd);

    let mut buf = [0u8; 1];
    assert_eq!(fs.read_file(fd, &mut buf), Err(FsError::BadDescriptor));
    assert_eq!(fs.write_file(fd, b"x"), Err(FsError::BadDescriptor));
}
