//! File system facade: format/mount plus the POSIX-flavored operations the
//! simulated processes and the shell drive.

use std::rc::Rc;

use datablock::DataBlock;
use log::{info, warn};

use crate::disk::DiskDevice;
use crate::error::{DiskError, FsError};
use crate::fs_alloc::BlockManager;
use crate::fs_defs::*;
use crate::fs_dir::{normalize_path, split_path, DirectoryManager};
use crate::fs_fd::{FileDescriptorTable, OpenFile};

pub struct FileSystem {
    disk: Rc<DiskDevice>,
    superblock: SuperBlock,
    mounted: bool,
    current_dir: String,
    blocks: BlockManager,
    dirs: DirectoryManager,
    fds: FileDescriptorTable,
}

impl FileSystem {
    pub fn new(disk: Rc<DiskDevice>) -> FileSystem {
        FileSystem {
            blocks: BlockManager::new(Rc::clone(&disk)),
            dirs: DirectoryManager::new(Rc::clone(&disk)),
            fds: FileDescriptorTable::new(),
            superblock: SuperBlock::new(),
            mounted: false,
            current_dir: "/".to_string(),
            disk,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn current_dir(&self) -> &str {
        &self.current_dir
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn block_manager(&self) -> &BlockManager {
        &self.blocks
    }

    pub fn open_count(&self) -> usize {
        self.fds.open_count()
    }

    pub fn lookup(&self, path: &str) -> Option<u32> {
        self.dirs.lookup_path(path, &self.current_dir)
    }

    pub fn read_inode(&self, inum: u32) -> Result<Inode, FsError> {
        self.dirs.inodes().read_inode(inum)
    }

    /// Lay down a fresh file system: zeroed then populated superblock,
    /// bitmaps with only the root inode and root data block taken, a zeroed
    /// inode table, and a root directory holding `.` and `..`.
    pub fn format(&mut self) -> Result<(), FsError> {
        info!("[FS] Formatting file system...");

        let zero = vec![0u8; BLOCK_SIZE];
        self.disk.write_block(SUPERBLOCK_BLOCK as usize, &zero)?;

        for i in 0..INODE_TABLE_BLOCKS {
            self.disk.write_block((INODE_TABLE_START + i) as usize, &zero)?;
        }

        // Fresh bitmaps: root inode taken, data bitmap empty until the root
        // directory block is drawn from the allocator below.
        self.disk.write_block(DATA_BITMAP_BLOCK as usize, &zero)?;
        let mut inode_bitmap = zero.clone();
        inode_bitmap[0] = 0x01;
        self.disk.write_block(INODE_BITMAP_BLOCK as usize, &inode_bitmap)?;

        self.blocks = BlockManager::new(Rc::clone(&self.disk));
        self.blocks.load_bitmaps()?;
        self.init_root_directory()?;
        self.blocks.save_bitmaps()?;

        self.superblock = SuperBlock {
            magic: FS_MAGIC,
            total_blocks: TOTAL_FS_BLOCKS,
            total_inodes: MAX_INODES,
            free_blocks: 0,
            free_inodes: 0,
            inode_bitmap_block: INODE_BITMAP_BLOCK,
            data_bitmap_block: DATA_BITMAP_BLOCK,
            inode_table_start: INODE_TABLE_START,
            inode_table_blocks: INODE_TABLE_BLOCKS,
            data_blocks_start: DATA_BLOCKS_START,
        };
        self.sync_free_counts();
        self.save_superblock()?;

        self.mounted = true;
        self.current_dir = "/".to_string();

        info!(
            "[FS] Format complete: {} blocks, {} inodes",
            self.superblock.total_blocks, self.superblock.total_inodes
        );
        Ok(())
    }

    /// Attach to an already-formatted image. Rejects a foreign magic and a
    /// layout that disagrees with the build-time constants.
    pub fn mount(&mut self) -> Result<(), FsError> {
        info!("[FS] Mounting file system...");

        self.load_superblock()?;

        if self.superblock.magic != FS_MAGIC {
            warn!(
                "[FS] Mount failed: magic mismatch (expected {:#x}, got {:#x})",
                FS_MAGIC, self.superblock.magic
            );
            return Err(FsError::BadMagic);
        }
        if self.superblock.total_blocks != TOTAL_FS_BLOCKS
            || self.superblock.total_inodes != MAX_INODES
        {
            warn!("[FS] Mount failed: layout mismatch, re-format required");
            return Err(FsError::LayoutMismatch);
        }

        self.blocks.load_bitmaps()?;
        self.mounted = true;
        self.current_dir = "/".to_string();

        info!(
            "[FS] Mounted: {} free blocks, {} free inodes",
            self.superblock.free_blocks, self.superblock.free_inodes
        );
        Ok(())
    }

    fn init_root_directory(&mut self) -> Result<(), FsError> {
        let root_block = self.blocks.alloc_block().ok_or(FsError::NoSpace)?;

        let mut inode = Inode::new();
        inode.itype = T_DIRECTORY;
        inode.size = 2 * DIRENT_SIZE as u32;
        inode.blocks_used = 1;
        inode.direct_blocks[0] = root_block;

        let mut block = vec![0u8; BLOCK_SIZE];
        let dot = DirectoryEntry::with_name(".", ROOT_INODE);
        let dotdot = DirectoryEntry::with_name("..", ROOT_INODE);
        dot.dump_into(&mut block[..DIRENT_SIZE])
            .map_err(|_| FsError::Disk(DiskError::Io))?;
        dotdot
            .dump_into(&mut block[DIRENT_SIZE..2 * DIRENT_SIZE])
            .map_err(|_| FsError::Disk(DiskError::Io))?;
        let free = DirectoryEntry::new();
        for chunk in block[2 * DIRENT_SIZE..].chunks_exact_mut(DIRENT_SIZE) {
            free.dump_into(chunk).map_err(|_| FsError::Disk(DiskError::Io))?;
        }

        self.disk.write_block(root_block as usize, &block)?;
        self.dirs.inodes().write_inode(ROOT_INODE, &inode)?;

        info!("[FS] Root directory created (inode={}, block={})", ROOT_INODE, root_block);
        Ok(())
    }

    fn load_superblock(&mut self) -> Result<(), FsError> {
        let mut block = vec![0u8; BLOCK_SIZE];
        self.disk.read_block(SUPERBLOCK_BLOCK as usize, &mut block)?;
        self.superblock
            .extract_from(&block[..SUPERBLOCK_DISK_SIZE])
            .map_err(|_| FsError::Disk(DiskError::Io))?;
        Ok(())
    }

    fn save_superblock(&self) -> Result<(), FsError> {
        let mut block = vec![0u8; BLOCK_SIZE];
        self.superblock
            .dump_into(&mut block[..SUPERBLOCK_DISK_SIZE])
            .map_err(|_| FsError::Disk(DiskError::Io))?;
        self.disk.write_block(SUPERBLOCK_BLOCK as usize, &block)?;
        Ok(())
    }

    /// The free counters are derived from the bitmaps, so the superblock
    /// can never disagree with the allocator state it summarises.
    fn sync_free_counts(&mut self) {
        self.superblock.free_blocks = MAX_DATA_BLOCKS - self.blocks.used_data_blocks() as u32;
        self.superblock.free_inodes = MAX_INODES - self.blocks.used_inodes() as u32;
    }

    fn persist_metadata(&mut self) -> Result<(), FsError> {
        self.sync_free_counts();
        self.save_superblock()?;
        self.blocks.save_bitmaps()?;
        Ok(())
    }

    fn check_mounted(&self) -> Result<(), FsError> {
        if self.mounted {
            Ok(())
        } else {
            warn!("[FS] File system not mounted");
            Err(FsError::NotMounted)
        }
    }

    pub fn create_directory(&mut self, path: &str) -> Result<(), FsError> {
        self.check_mounted()?;
        self.dirs.create_directory(path, &self.current_dir, &mut self.blocks)?;
        self.persist_metadata()?;
        Ok(())
    }

    pub fn list_directory(&self, path: &str) -> Result<(), FsError> {
        self.check_mounted()?;
        self.dirs.list_directory(path, &self.current_dir)
    }

    pub fn change_directory(&mut self, path: &str) -> Result<(), FsError> {
        self.check_mounted()?;

        let inode_num = self
            .dirs
            .lookup_path(path, &self.current_dir)
            .ok_or(FsError::NotFound)?;
        let inode = self.dirs.inodes().read_inode(inode_num)?;
        if inode.itype != T_DIRECTORY {
            warn!("[FS] Not a directory: {}", path);
            return Err(FsError::NotADirectory);
        }

        self.current_dir = normalize_path(path, &self.current_dir);
        info!("[FS] Changed directory to: {}", self.current_dir);
        Ok(())
    }

    pub fn create_file(&mut self, path: &str) -> Result<(), FsError> {
        self.check_mounted()?;

        let (parent_path, file_name) = split_path(&normalize_path(path, &self.current_dir));
        let parent_inode = self
            .dirs
            .lookup_path(&parent_path, &self.current_dir)
            .ok_or(FsError::NotFound)?;

        if self.dirs.lookup_in_directory(parent_inode, &file_name).is_some() {
            warn!("[FS] File already exists: {}", path);
            return Err(FsError::AlreadyExists);
        }

        let new_inode = self.blocks.alloc_inode().ok_or(FsError::NoSpace)?;

        let mut inode = Inode::new();
        inode.itype = T_REGULAR;
        self.dirs.inodes().write_inode(new_inode, &inode)?;

        if let Err(e) =
            self.dirs
                .add_directory_entry(parent_inode, &file_name, new_inode, &mut self.blocks)
        {
            self.blocks.free_inode(new_inode);
            return Err(e);
        }

        self.persist_metadata()?;
        info!("[FS] Created file: {} (inode={})", path, new_inode);
        Ok(())
    }

    /// Unlink a regular file and free its inode and data blocks.
    /// Directories are not removed by this path.
    pub fn remove_file(&mut self, path: &str) -> Result<(), FsError> {
        self.check_mounted()?;

        let (parent_path, file_name) = split_path(&normalize_path(path, &self.current_dir));
        let parent_inode = self
            .dirs
            .lookup_path(&parent_path, &self.current_dir)
            .ok_or(FsError::NotFound)?;
        let file_inode = self
            .dirs
            .lookup_in_directory(parent_inode, &file_name)
            .ok_or_else(|| {
                warn!("[FS] File not found: {}", path);
                FsError::NotFound
            })?;

        let inode = self.dirs.inodes().read_inode(file_inode)?;
        if inode.itype != T_REGULAR {
            warn!("[FS] Not a regular file: {}", path);
            return Err(FsError::NotAFile);
        }

        for i in 0..inode.blocks_used as usize {
            self.blocks.free_block(inode.direct_blocks[i]);
        }
        self.blocks.free_inode(file_inode);
        self.dirs.remove_directory_entry(parent_inode, &file_name)?;

        self.persist_metadata()?;
        info!("[FS] Removed file: {}", path);
        Ok(())
    }

    pub fn open_file(&mut self, path: &str) -> Result<i32, FsError> {
        self.check_mounted()?;

        let inode_num = self
            .dirs
            .lookup_path(path, &self.current_dir)
            .ok_or_else(|| {
                warn!("[FS] File not found: {}", path);
                FsError::NotFound
            })?;

        let inode = self.dirs.inodes().read_inode(inode_num)?;
        if inode.itype != T_REGULAR {
            warn!("[FS] Not a regular file: {}", path);
            return Err(FsError::NotAFile);
        }

        let fd = self.fds.alloc_fd(inode_num);
        info!("[FS] Opened file: {} (fd={})", path, fd);
        Ok(fd)
    }

    pub fn close_file(&mut self, fd: i32) {
        if self.fds.free_fd(fd) {
            info!("[FS] Closed file (fd={})", fd);
        }
    }

    /// Read up to `buf.len()` bytes at the handle's offset. Returns the
    /// byte count; 0 means end of file.
    pub fn read_file(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, FsError> {
        let file = match self.fds.get(fd) {
            Some(file) => *file,
            None => {
                warn!("[FS] Invalid file descriptor: {}", fd);
                return Err(FsError::BadDescriptor);
            }
        };

        let inode = self.dirs.inodes().read_inode(file.inode_num)?;
        let available = (inode.size as usize).saturating_sub(file.offset);
        let to_read = buf.len().min(available);

        let mut offset = file.offset;
        let mut bytes_read = 0;
        let mut block = vec![0u8; BLOCK_SIZE];
        while bytes_read < to_read {
            let block_idx = offset / BLOCK_SIZE;
            let block_offset = offset % BLOCK_SIZE;
            if block_idx >= inode.blocks_used as usize {
                break;
            }

            if self
                .disk
                .read_block(inode.direct_blocks[block_idx] as usize, &mut block)
                .is_err()
            {
                break;
            }

            let chunk = (to_read - bytes_read).min(BLOCK_SIZE - block_offset);
            buf[bytes_read..bytes_read + chunk]
                .copy_from_slice(&block[block_offset..block_offset + chunk]);
            bytes_read += chunk;
            offset += chunk;
        }

        if let Some(file) = self.fds.get(fd) {
            file.offset = offset;
        }
        Ok(bytes_read)
    }

    /// Write `buf` at the handle's offset, growing the file block by block
    /// up to the ten direct pointers. Hitting the cap is a partial success;
    /// the returned count is what actually landed.
    pub fn write_file(&mut self, fd: i32, buf: &[u8]) -> Result<usize, FsError> {
        let file = match self.fds.get(fd) {
            Some(file) => *file,
            None => {
                warn!("[FS] Invalid file descriptor: {}", fd);
                return Err(FsError::BadDescriptor);
            }
        };

        let mut inode = self.dirs.inodes().read_inode(file.inode_num)?;
        let mut offset = file.offset;
        let mut bytes_written = 0;
        let mut block = vec![0u8; BLOCK_SIZE];

        while bytes_written < buf.len() {
            let block_idx = offset / BLOCK_SIZE;
            let block_offset = offset % BLOCK_SIZE;

            if block_idx >= inode.blocks_used as usize {
                if block_idx >= DIRECT_BLOCKS {
                    warn!("[FS] File size limit reached");
                    break;
                }
                let new_block = match self.blocks.alloc_block() {
                    Some(block) => block,
                    None => break,
                };
                inode.direct_blocks[block_idx] = new_block;
                inode.blocks_used += 1;
            }

            let block_id = inode.direct_blocks[block_idx] as usize;
            let chunk = (buf.len() - bytes_written).min(BLOCK_SIZE - block_offset);

            // Partial-block writes preserve the surrounding bytes.
            if block_offset != 0 || chunk < BLOCK_SIZE {
                self.disk.read_block(block_id, &mut block)?;
            }
            block[block_offset..block_offset + chunk]
                .copy_from_slice(&buf[bytes_written..bytes_written + chunk]);
            self.disk.write_block(block_id, &block)?;

            bytes_written += chunk;
            offset += chunk;
            if offset > inode.size as usize {
                inode.size = offset as u32;
            }
        }

        self.dirs.inodes().write_inode(file.inode_num, &inode)?;
        self.persist_metadata()?;

        if let Some(file) = self.fds.get(fd) {
            file.offset = offset;
        }
        Ok(bytes_written)
    }

    pub fn open_file_info(&mut self, fd: i32) -> Option<OpenFile> {
        self.fds.get(fd).map(|f| *f)
    }

    pub fn print_superblock(&self) {
        println!("========== SuperBlock ==========");
        println!("Magic: {:#x}", self.superblock.magic);
        println!("Total blocks: {}", self.superblock.total_blocks);
        println!("Total inodes: {}", self.superblock.total_inodes);
        println!("Free blocks: {}", self.superblock.free_blocks);
        println!("Free inodes: {}", self.superblock.free_inodes);
        println!("Data blocks start: {}", self.superblock.data_blocks_start);
        println!("================================");
    }

    pub fn print_inode(&self, inum: u32) {
        let inode = match self.dirs.inodes().read_inode(inum) {
            Ok(inode) => inode,
            Err(e) => {
                println!("Cannot read inode {}: {}", inum, e);
                return;
            }
        };

        println!("========== Inode {} ==========", inum);
        println!(
            "Type: {}",
            if inode.itype == T_DIRECTORY { "Directory" } else { "File" }
        );
        println!("Size: {} bytes", inode.size);
        println!("Blocks used: {}", inode.blocks_used);
        print!("Direct blocks:");
        for i in 0..inode.blocks_used.min(DIRECT_BLOCKS as u32) as usize {
            print!(" {}", inode.direct_blocks[i]);
        }
        println!();
        println!("==============================");
    }
}
