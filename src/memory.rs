//! Memory manager: address translation, demand paging, Clock replacement,
//! and swap-out/in through the tail of the disk image.

use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::config::{DISK_NUM_BLOCKS, PAGE_SIZE, SWAP_FILL_BYTE, SWAP_START_BLOCK};
use crate::disk::DiskDevice;
use crate::error::MemError;
use crate::page_table::PageTable;
use crate::pmem::{PhysicalMemory, Pid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub page_faults: usize,
    pub memory_accesses: usize,
}

pub struct MemoryManager {
    physical_memory: PhysicalMemory,
    page_tables: BTreeMap<Pid, PageTable>,
    process_stats: BTreeMap<Pid, MemoryStats>,
    stats: MemoryStats,
    disk: Rc<DiskDevice>,

    page_size: usize,
    // Clock hand and swap cursor are durable across faults and processes.
    clock_ptr: usize,
    next_swap_block: usize,
}

impl MemoryManager {
    pub fn new(num_frames: usize, disk: Rc<DiskDevice>) -> MemoryManager {
        MemoryManager {
            physical_memory: PhysicalMemory::new(num_frames),
            page_tables: BTreeMap::new(),
            process_stats: BTreeMap::new(),
            stats: MemoryStats::default(),
            disk,
            page_size: PAGE_SIZE,
            clock_ptr: 0,
            next_swap_block: SWAP_START_BLOCK,
        }
    }

    /// Install a zeroed page table of `num_pages` entries for a new process.
    pub fn create_process_memory(&mut self, pid: Pid, num_pages: usize) {
        self.page_tables.insert(pid, PageTable::new(num_pages));
        self.process_stats.insert(pid, MemoryStats::default());
        info!("[Memory] Created page table for PID {} ({} pages)", pid, num_pages);
    }

    /// Drop the page table and every frame it holds. A PID without a page
    /// table here is a kernel bug.
    pub fn free_process_memory(&mut self, pid: Pid) {
        let table = match self.page_tables.remove(&pid) {
            Some(table) => table,
            None => panic!("no page table for PID {}", pid),
        };

        for entry in table.iter() {
            if entry.present {
                self.physical_memory.free_frame(entry.frame_number);
            }
        }
        self.process_stats.remove(&pid);
        info!("[Memory] Freed memory for PID {}", pid);
    }

    pub fn has_process_memory(&self, pid: Pid) -> bool {
        self.page_tables.contains_key(&pid)
    }

    /// Translate one virtual access, faulting the page in when needed.
    pub fn access_memory(&mut self, pid: Pid, virtual_addr: u64, access: Access) -> Result<(), MemError> {
        let table = match self.page_tables.get(&pid) {
            Some(table) => table,
            None => panic!("no page table for PID {}", pid),
        };

        let page_number = virtual_addr as usize / self.page_size;
        let offset = virtual_addr as usize % self.page_size;

        if page_number >= table.len() {
            warn!("[Memory] Invalid address: page {} out of range", page_number);
            return Err(MemError::InvalidAddress);
        }

        self.stats.memory_accesses += 1;
        if let Some(stats) = self.process_stats.get_mut(&pid) {
            stats.memory_accesses += 1;
        }

        if !self.page_tables[&pid][page_number].present {
            self.stats.page_faults += 1;
            if let Some(stats) = self.process_stats.get_mut(&pid) {
                stats.page_faults += 1;
            }
            info!(
                "[PageFault] PID={}, VPage={}, VAddr={:#x}",
                pid, page_number, virtual_addr
            );
            self.handle_page_fault(pid, page_number, access)?;
        }

        let entry = &mut self.page_tables.get_mut(&pid).unwrap()[page_number];
        entry.referenced = true;
        if access == Access::Write {
            entry.dirty = true;
        }

        let physical_addr = entry.frame_number * self.page_size + offset;
        debug!(
            "[Memory] PID={}, VAddr={:#x} -> PAddr={:#x}, Frame={}",
            pid, virtual_addr, physical_addr, entry.frame_number
        );
        Ok(())
    }

    /// Bring `(pid, page_number)` into a frame: reuse a free frame when one
    /// exists, otherwise run Clock second-chance over the frame array.
    fn handle_page_fault(&mut self, pid: Pid, page_number: usize, access: Access) -> Result<(), MemError> {
        let entry = self.page_tables[&pid][page_number];
        if entry.on_disk {
            info!(
                "[Swap] Reading PID={} VPage={} from Disk Block {}",
                pid, page_number, entry.swap_block
            );
            // Page contents are modelled; the read itself is the observable
            // side effect.
            let mut scratch = vec![0u8; self.page_size];
            self.disk.read_block(entry.swap_block, &mut scratch)?;
        }

        let frame_number = match self.physical_memory.allocate_frame(pid, page_number) {
            Some(frame) => frame,
            None => self.evict_frame(pid, page_number)?,
        };

        let entry = &mut self.page_tables.get_mut(&pid).unwrap()[page_number];
        entry.present = true;
        entry.frame_number = frame_number;
        entry.referenced = true;
        entry.dirty = access == Access::Write;

        info!(
            "[PageFault] Allocated Frame {} for PID={}, VPage={}",
            frame_number, pid, page_number
        );
        Ok(())
    }

    /// Clock replacement. The hand sweeps the frame array clearing
    /// `referenced` bits; the first unreferenced frame is the victim. With
    /// every frame occupied the sweep terminates within two passes.
    fn evict_frame(&mut self, pid: Pid, page_number: usize) -> Result<usize, MemError> {
        let total_frames = self.physical_memory.total_frames();

        loop {
            let frame_info = *self.physical_memory.frame_info(self.clock_ptr);
            if !frame_info.allocated {
                panic!("clock pointer points to free frame {}", self.clock_ptr);
            }
            let victim_pid = frame_info.owner_pid.unwrap();
            let victim_vpage = frame_info.page_number;

            let victim_table = match self.page_tables.get_mut(&victim_pid) {
                Some(table) => table,
                None => panic!("no page table for victim PID {}", victim_pid),
            };
            let victim_entry = &mut victim_table[victim_vpage];

            if victim_entry.referenced {
                // Second chance.
                victim_entry.referenced = false;
                self.clock_ptr = (self.clock_ptr + 1) % total_frames;
                continue;
            }

            info!(
                "[Evict] Replacing Frame {} from PID={}, VPage={}",
                self.clock_ptr, victim_pid, victim_vpage
            );

            if victim_entry.dirty {
                if !victim_entry.on_disk {
                    if self.next_swap_block >= DISK_NUM_BLOCKS {
                        warn!("[Swap] Out of swap blocks");
                        return Err(MemError::OutOfSwap);
                    }
                    victim_entry.swap_block = self.next_swap_block;
                    victim_entry.on_disk = true;
                    self.next_swap_block += 1;
                }

                info!(
                    "[Swap] Writing PID={} VPage={} to Disk Block {}",
                    victim_pid, victim_vpage, victim_entry.swap_block
                );
                let swap_block = victim_entry.swap_block;
                let page = vec![SWAP_FILL_BYTE; self.page_size];
                self.disk.write_block(swap_block, &page)?;
            }

            let victim_entry = &mut self.page_tables.get_mut(&victim_pid).unwrap()[victim_vpage];
            victim_entry.clear();

            let frame_number = self.clock_ptr;
            self.physical_memory.assign_frame(frame_number, pid, page_number);
            self.clock_ptr = (self.clock_ptr + 1) % total_frames;
            return Ok(frame_number);
        }
    }

    pub fn stats(&self) -> MemoryStats {
        self.stats
    }

    pub fn process_stats(&self, pid: Pid) -> MemoryStats {
        self.process_stats.get(&pid).copied().unwrap_or_default()
    }

    pub fn reset_stats(&mut self) {
        self.stats = MemoryStats::default();
        self.process_stats.clear();
    }

    pub fn page_table(&self, pid: Pid) -> Option<&PageTable> {
        self.page_tables.get(&pid)
    }

    pub fn physical_memory(&self) -> &PhysicalMemory {
        &self.physical_memory
    }

    pub fn dump_page_table(&self, pid: Pid) {
        let table = match self.page_tables.get(&pid) {
            Some(table) => table,
            None => {
                println!("PID {} has no page table", pid);
                return;
            }
        };

        println!("=== Page Table for PID {} ===", pid);
        println!("VPage | Present | Frame | Dirty | Ref | OnDisk");
        println!("------|---------|-------|-------|-----|-------");
        for (i, entry) in table.iter().enumerate() {
            let frame = if entry.present {
                format!("{:5}", entry.frame_number)
            } else {
                "  -  ".to_string()
            };
            println!(
                "{:5} |    {}    | {} |   {}   |  {}  |   {}",
                i,
                entry.present as u8,
                frame,
                entry.dirty as u8,
                entry.referenced as u8,
                entry.on_disk as u8
            );
        }

        let stats = self.process_stats(pid);
        println!(
            "\nStats: {} page faults, {} accesses",
            stats.page_faults, stats.memory_accesses
        );
    }

    pub fn dump_physical_memory(&self) {
        self.physical_memory.dump();
    }
}
