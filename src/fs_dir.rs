//! Directory manager: path normalisation and resolution, directory entry
//! add/remove, directory creation and listing.

use std::rc::Rc;

use datablock::DataBlock;
use log::{info, warn};

use crate::disk::DiskDevice;
use crate::error::{DiskError, FsError};
use crate::fs_alloc::{BlockManager, InodeManager};
use crate::fs_defs::*;

pub struct DirectoryManager {
    disk: Rc<DiskDevice>,
    inodes: InodeManager,
}

/// Join `path` to `current_dir` and reduce `.`, `..`, and duplicate
/// separators. The result is absolute with no trailing slash; `..` from the
/// root stays at the root.
pub fn normalize_path(path: &str, current_dir: &str) -> String {
    let abs = if path.is_empty() {
        if current_dir.is_empty() { "/".to_string() } else { current_dir.to_string() }
    } else if path.starts_with('/') {
        path.to_string()
    } else if current_dir.is_empty() || current_dir == "/" {
        format!("/{}", path)
    } else {
        format!("{}/{}", current_dir, path)
    };

    let mut stack: Vec<&str> = Vec::new();
    for part in abs.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(part),
        }
    }

    if stack.is_empty() {
        return "/".to_string();
    }

    let mut out = String::new();
    for seg in stack {
        out.push('/');
        out.push_str(seg);
    }
    out
}

/// Split a normalised path into parent and final component.
/// `"/a/b/c"` -> (`"/a/b"`, `"c"`); `"/x"` -> (`"/"`, `"x"`).
pub fn split_path(path: &str) -> (String, String) {
    match path.rfind('/') {
        None => (".".to_string(), path.to_string()),
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(pos) => (path[..pos].to_string(), path[pos + 1..].to_string()),
    }
}

impl DirectoryManager {
    pub fn new(disk: Rc<DiskDevice>) -> DirectoryManager {
        let inodes = InodeManager::new(Rc::clone(&disk));
        DirectoryManager { disk, inodes }
    }

    /// Resolve a path to an inode number by walking components from the
    /// root. `None` on any missing component or when a non-terminal
    /// component is not a directory.
    pub fn lookup_path(&self, path: &str, current_dir: &str) -> Option<u32> {
        let norm = normalize_path(path, current_dir);
        if norm == "/" {
            return Some(ROOT_INODE);
        }

        let mut current = ROOT_INODE;
        for component in norm[1..].split('/') {
            if component.is_empty() || component == "." {
                continue;
            }
            current = self.lookup_in_directory(current, component)?;
        }
        Some(current)
    }

    /// Scan one directory's data blocks for `name`.
    pub fn lookup_in_directory(&self, dir_inode: u32, name: &str) -> Option<u32> {
        let inode = self.inodes.read_inode(dir_inode).ok()?;
        if inode.itype != T_DIRECTORY {
            return None;
        }

        let mut block = vec![0u8; BLOCK_SIZE];
        for i in 0..inode.blocks_used as usize {
            if self.disk.read_block(inode.direct_blocks[i] as usize, &mut block).is_err() {
                continue;
            }

            for j in 0..DIRENTS_PER_BLOCK {
                let slot = &block[j * DIRENT_SIZE..(j + 1) * DIRENT_SIZE];
                let mut entry = DirectoryEntry::new();
                if entry.extract_from(slot).is_err() {
                    continue;
                }
                if entry.is_valid() && entry.name() == name {
                    return Some(entry.inode_num);
                }
            }
        }
        None
    }

    /// Link `name -> inode_num` into a directory: reuse the first free slot
    /// or append a fresh data block once the existing ones are full.
    pub fn add_directory_entry(
        &self,
        dir_inode: u32,
        name: &str,
        inode_num: u32,
        blocks: &mut BlockManager,
    ) -> Result<(), FsError> {
        let mut inode = self.inodes.read_inode(dir_inode)?;

        let mut block = vec![0u8; BLOCK_SIZE];
        for i in 0..inode.blocks_used as usize {
            let block_id = inode.direct_blocks[i] as usize;
            if self.disk.read_block(block_id, &mut block).is_err() {
                continue;
            }

            for j in 0..DIRENTS_PER_BLOCK {
                let slot = j * DIRENT_SIZE;
                let mut entry = DirectoryEntry::new();
                entry
                    .extract_from(&block[slot..slot + DIRENT_SIZE])
                    .map_err(|_| FsError::Disk(DiskError::Io))?;
                if entry.is_valid() {
                    continue;
                }

                let entry = DirectoryEntry::with_name(name, inode_num);
                entry
                    .dump_into(&mut block[slot..slot + DIRENT_SIZE])
                    .map_err(|_| FsError::Disk(DiskError::Io))?;
                self.disk.write_block(block_id, &block)?;

                inode.size += DIRENT_SIZE as u32;
                self.inodes.write_inode(dir_inode, &inode)?;
                return Ok(());
            }
        }

        // No free slot: grow the directory by one data block.
        if inode.blocks_used as usize >= DIRECT_BLOCKS {
            warn!("[FS] Directory full");
            return Err(FsError::DirectoryFull);
        }

        let new_block = blocks.alloc_block().ok_or(FsError::NoSpace)?;

        let mut fresh = vec![0u8; BLOCK_SIZE];
        let entry = DirectoryEntry::with_name(name, inode_num);
        entry
            .dump_into(&mut fresh[..DIRENT_SIZE])
            .map_err(|_| FsError::Disk(DiskError::Io))?;
        mark_free_slots(&mut fresh[DIRENT_SIZE..]);
        self.disk.write_block(new_block as usize, &fresh)?;

        inode.direct_blocks[inode.blocks_used as usize] = new_block;
        inode.blocks_used += 1;
        inode.size += DIRENT_SIZE as u32;
        self.inodes.write_inode(dir_inode, &inode)?;
        Ok(())
    }

    /// Tombstone the entry for `name`. The slot's inode number becomes
    /// `INVALID_INODE`; the data block is not reclaimed.
    pub fn remove_directory_entry(&self, dir_inode: u32, name: &str) -> Result<(), FsError> {
        let mut inode = self.inodes.read_inode(dir_inode)?;

        let mut block = vec![0u8; BLOCK_SIZE];
        for i in 0..inode.blocks_used as usize {
            let block_id = inode.direct_blocks[i] as usize;
            if self.disk.read_block(block_id, &mut block).is_err() {
                continue;
            }

            for j in 0..DIRENTS_PER_BLOCK {
                let slot = j * DIRENT_SIZE;
                let mut entry = DirectoryEntry::new();
                entry
                    .extract_from(&block[slot..slot + DIRENT_SIZE])
                    .map_err(|_| FsError::Disk(DiskError::Io))?;
                if !entry.is_valid() || entry.name() != name {
                    continue;
                }

                entry.inode_num = INVALID_INODE;
                entry
                    .dump_into(&mut block[slot..slot + DIRENT_SIZE])
                    .map_err(|_| FsError::Disk(DiskError::Io))?;
                self.disk.write_block(block_id, &block)?;

                inode.size -= DIRENT_SIZE as u32;
                self.inodes.write_inode(dir_inode, &inode)?;
                return Ok(());
            }
        }
        Err(FsError::NotFound)
    }

    /// Create a directory at `path`: a fresh inode, one data block holding
    /// `.` and `..`, and a link from the parent.
    pub fn create_directory(
        &self,
        path: &str,
        current_dir: &str,
        blocks: &mut BlockManager,
    ) -> Result<u32, FsError> {
        let (parent_path, dir_name) = split_path(&normalize_path(path, current_dir));

        let parent_inode = self
            .lookup_path(&parent_path, current_dir)
            .ok_or(FsError::NotFound)?;
        if self.lookup_in_directory(parent_inode, &dir_name).is_some() {
            warn!("[FS] Directory already exists: {}", path);
            return Err(FsError::AlreadyExists);
        }

        let new_inode = blocks.alloc_inode().ok_or(FsError::NoSpace)?;
        let data_block = match blocks.alloc_block() {
            Some(block) => block,
            None => {
                blocks.free_inode(new_inode);
                return Err(FsError::NoSpace);
            }
        };

        let mut inode = Inode::new();
        inode.itype = T_DIRECTORY;
        inode.size = 2 * DIRENT_SIZE as u32;
        inode.blocks_used = 1;
        inode.direct_blocks[0] = data_block;

        let mut block = vec![0u8; BLOCK_SIZE];
        let dot = DirectoryEntry::with_name(".", new_inode);
        let dotdot = DirectoryEntry::with_name("..", parent_inode);
        dot.dump_into(&mut block[..DIRENT_SIZE])
            .map_err(|_| FsError::Disk(DiskError::Io))?;
        dotdot
            .dump_into(&mut block[DIRENT_SIZE..2 * DIRENT_SIZE])
            .map_err(|_| FsError::Disk(DiskError::Io))?;
        mark_free_slots(&mut block[2 * DIRENT_SIZE..]);

        self.disk.write_block(data_block as usize, &block)?;
        self.inodes.write_inode(new_inode, &inode)?;

        if let Err(e) = self.add_directory_entry(parent_inode, &dir_name, new_inode, blocks) {
            blocks.free_block(data_block);
            blocks.free_inode(new_inode);
            return Err(e);
        }

        info!("[FS] Created directory: {} (inode={})", path, new_inode);
        Ok(new_inode)
    }

    /// Print one directory's live entries to stdout.
    pub fn list_directory(&self, path: &str, current_dir: &str) -> Result<(), FsError> {
        let dir_inode = self.lookup_path(path, current_dir).ok_or(FsError::NotFound)?;
        let inode = self.inodes.read_inode(dir_inode)?;
        if inode.itype != T_DIRECTORY {
            warn!("[FS] Not a directory: {}", path);
            return Err(FsError::NotADirectory);
        }

        println!("Contents of {}:", normalize_path(path, current_dir));
        let mut block = vec![0u8; BLOCK_SIZE];
        for i in 0..inode.blocks_used as usize {
            if self.disk.read_block(inode.direct_blocks[i] as usize, &mut block).is_err() {
                continue;
            }

            for j in 0..DIRENTS_PER_BLOCK {
                let slot = &block[j * DIRENT_SIZE..(j + 1) * DIRENT_SIZE];
                let mut entry = DirectoryEntry::new();
                if entry.extract_from(slot).is_err() {
                    continue;
                }
                if !entry.is_valid() || entry.name().is_empty() {
                    continue;
                }

                let entry_inode = self.inodes.read_inode(entry.inode_num)?;
                let kind = if entry_inode.itype == T_DIRECTORY { 'd' } else { '-' };
                println!(
                    "  {} {} (inode={}, size={})",
                    kind,
                    entry.name(),
                    entry.inode_num,
                    entry_inode.size
                );
            }
        }
        Ok(())
    }

    pub fn inodes(&self) -> &InodeManager {
        &self.inodes
    }
}

/// Stamp `INVALID_INODE` into every 32-byte slot of a fresh directory
/// block so unused slots read back as free.
fn mark_free_slots(buf: &mut [u8]) {
    let free = DirectoryEntry::new();
    for chunk in buf.chunks_exact_mut(DIRENT_SIZE) {
        let _ = free.dump_into(chunk);
    }
}
