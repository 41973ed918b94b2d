//! Build-time configuration for the simulated machine.

// Physical memory
pub const PAGE_FRAMES: usize = 8;
pub const PAGE_SIZE: usize = 0x1000;
pub const DEFAULT_VIRTUAL_PAGES: usize = 64;

// Disk
pub const DISK_BLOCK_SIZE: usize = 0x1000;
pub const DISK_NUM_BLOCKS: usize = 1024;

// Swap region: [SWAP_START_BLOCK, DISK_NUM_BLOCKS)
pub const SWAP_RESERVED_BLOCKS: usize = 128;
pub const SWAP_START_BLOCK: usize = DISK_NUM_BLOCKS - SWAP_RESERVED_BLOCKS;

// Scheduling
pub const DEFAULT_TIME_SLICE: i32 = 3;

// Scripted file I/O
pub const MAX_IO_BYTES: usize = 0x1000;
pub const FILE_FILL_BYTE: u8 = 0x41;
pub const SWAP_FILL_BYTE: u8 = 0xAA;
