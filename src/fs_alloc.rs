//! Bitmap-backed allocators over the FS region, plus inode-table access.
//!
//! Both bitmaps are single blocks shadowed in memory; a `dirty` flag marks
//! unsaved mutations and `save_bitmaps` writes both blocks back.

use std::rc::Rc;

use datablock::DataBlock;
use log::warn;

use crate::disk::DiskDevice;
use crate::error::{DiskError, FsError};
use crate::fs_defs::*;

pub struct BlockManager {
    disk: Rc<DiskDevice>,
    inode_bitmap: Vec<u8>,
    data_bitmap: Vec<u8>,
    dirty: bool,
}

fn bit_is_set(bitmap: &[u8], bit: usize) -> bool {
    bitmap[bit / 8] & (1 << (bit % 8)) != 0
}

fn set_bit(bitmap: &mut [u8], bit: usize) {
    bitmap[bit / 8] |= 1 << (bit % 8);
}

fn clear_bit(bitmap: &mut [u8], bit: usize) {
    bitmap[bit / 8] &= !(1 << (bit % 8));
}

impl BlockManager {
    pub fn new(disk: Rc<DiskDevice>) -> BlockManager {
        BlockManager {
            disk,
            inode_bitmap: vec![0; BLOCK_SIZE],
            data_bitmap: vec![0; BLOCK_SIZE],
            dirty: false,
        }
    }

    pub fn load_bitmaps(&mut self) -> Result<(), FsError> {
        self.disk
            .read_block(INODE_BITMAP_BLOCK as usize, &mut self.inode_bitmap)?;
        self.disk
            .read_block(DATA_BITMAP_BLOCK as usize, &mut self.data_bitmap)?;
        self.dirty = false;
        Ok(())
    }

    pub fn save_bitmaps(&mut self) -> Result<(), FsError> {
        self.disk
            .write_block(INODE_BITMAP_BLOCK as usize, &self.inode_bitmap)?;
        self.disk
            .write_block(DATA_BITMAP_BLOCK as usize, &self.data_bitmap)?;
        self.dirty = false;
        Ok(())
    }

    pub fn is_bitmap_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_bitmap_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Lowest clear bit in the data bitmap, returned as an absolute block
    /// id. `None` when every data block is taken.
    pub fn alloc_block(&mut self) -> Option<u32> {
        for bit in 0..MAX_DATA_BLOCKS as usize {
            if !bit_is_set(&self.data_bitmap, bit) {
                set_bit(&mut self.data_bitmap, bit);
                self.dirty = true;
                return Some(DATA_BLOCKS_START + bit as u32);
            }
        }
        warn!("[FS] No free data blocks");
        None
    }

    /// Clear the bit for `block_id`; freeing a free block is a no-op.
    pub fn free_block(&mut self, block_id: u32) {
        if block_id < DATA_BLOCKS_START || block_id >= TOTAL_FS_BLOCKS {
            return;
        }
        clear_bit(&mut self.data_bitmap, (block_id - DATA_BLOCKS_START) as usize);
        self.dirty = true;
    }

    pub fn alloc_inode(&mut self) -> Option<u32> {
        for bit in 0..MAX_INODES as usize {
            if !bit_is_set(&self.inode_bitmap, bit) {
                set_bit(&mut self.inode_bitmap, bit);
                self.dirty = true;
                return Some(bit as u32);
            }
        }
        warn!("[FS] No free inodes");
        None
    }

    pub fn free_inode(&mut self, inum: u32) {
        if inum >= MAX_INODES {
            return;
        }
        clear_bit(&mut self.inode_bitmap, inum as usize);
        self.dirty = true;
    }

    pub fn used_data_blocks(&self) -> usize {
        (0..MAX_DATA_BLOCKS as usize)
            .filter(|&bit| bit_is_set(&self.data_bitmap, bit))
            .count()
    }

    pub fn used_inodes(&self) -> usize {
        (0..MAX_INODES as usize)
            .filter(|&bit| bit_is_set(&self.inode_bitmap, bit))
            .count()
    }
}

/// Read/write access to the fixed 128-byte inode records. Each access is a
/// read-modify-write of the containing table block.
pub struct InodeManager {
    disk: Rc<DiskDevice>,
}

impl InodeManager {
    pub fn new(disk: Rc<DiskDevice>) -> InodeManager {
        InodeManager { disk }
    }

    pub fn read_inode(&self, inum: u32) -> Result<Inode, FsError> {
        if inum >= MAX_INODES {
            return Err(FsError::NotFound);
        }

        let mut block = vec![0u8; BLOCK_SIZE];
        self.disk.read_block(inode_block(inum) as usize, &mut block)?;

        let offset = inode_offset(inum);
        let mut inode = Inode::new();
        inode
            .extract_from(&block[offset..offset + INODE_SIZE])
            .map_err(|_| FsError::Disk(DiskError::Io))?;
        Ok(inode)
    }

    pub fn write_inode(&self, inum: u32, inode: &Inode) -> Result<(), FsError> {
        if inum >= MAX_INODES {
            return Err(FsError::NotFound);
        }

        let block_id = inode_block(inum) as usize;
        let mut block = vec![0u8; BLOCK_SIZE];
        self.disk.read_block(block_id, &mut block)?;

        let offset = inode_offset(inum);
        inode
            .dump_into(&mut block[offset..offset + INODE_SIZE])
            .map_err(|_| FsError::Disk(DiskError::Io))?;
        self.disk.write_block(block_id, &block)?;
        Ok(())
    }
}
