//! Block device backed by a single image file.
//!
//! The image is a flat array of `DISK_NUM_BLOCKS` blocks of
//! `DISK_BLOCK_SIZE` bytes. Blocks below `SWAP_START_BLOCK` belong to the
//! file system; the tail of the image is the swap region.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use log::info;

use crate::config::{DISK_BLOCK_SIZE, DISK_NUM_BLOCKS};
use crate::error::DiskError;

pub struct DiskDevice {
    file: File,
    num_blocks: usize,
    block_size: usize,
}

impl DiskDevice {
    /// Open the disk image, creating and pre-zeroing it when absent.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<DiskDevice> {
        let path = path.as_ref();
        if !path.exists() {
            info!(
                "[Disk] Creating new disk image: {} ({} KB)",
                path.display(),
                DISK_NUM_BLOCKS * DISK_BLOCK_SIZE / 1024
            );
            let file = File::create(path)?;
            file.set_len((DISK_NUM_BLOCKS * DISK_BLOCK_SIZE) as u64)?;
        }

        info!("[Disk] Opening disk image: {}", path.display());
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(DiskDevice {
            file,
            num_blocks: DISK_NUM_BLOCKS,
            block_size: DISK_BLOCK_SIZE,
        })
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Read one block. A block index past the end of the image is a kernel
    /// bug and aborts the simulation.
    pub fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        if block_id >= self.num_blocks {
            panic!("read error: block {} out of range", block_id);
        }
        assert_eq!(buf.len(), self.block_size);

        self.file
            .read_exact_at(buf, (block_id * self.block_size) as u64)
            .map_err(|_| DiskError::Io)
    }

    /// Write one block. The backing `File` is unbuffered, so the data has
    /// reached the OS before this returns.
    pub fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DiskError> {
        if block_id >= self.num_blocks {
            panic!("write error: block {} out of range", block_id);
        }
        assert_eq!(buf.len(), self.block_size);

        self.file
            .write_all_at(buf, (block_id * self.block_size) as u64)
            .map_err(|_| DiskError::Io)
    }
}
