//! Kernel bootstrap: opens the disk image, wires the engines together, and
//! mounts the file system (formatting a blank or foreign image).

use std::path::Path;
use std::rc::Rc;

use log::info;

use crate::config::PAGE_FRAMES;
use crate::device::DeviceManager;
use crate::disk::DiskDevice;
use crate::fs::FileSystem;
use crate::memory::MemoryManager;
use crate::scheduler::ProcessManager;

pub struct Kernel {
    pm: ProcessManager,
}

impl Kernel {
    pub fn boot<P: AsRef<Path>>(image_path: P) -> Result<Kernel, String> {
        let disk = DiskDevice::open(image_path.as_ref())
            .map_err(|e| format!("cannot open disk image: {}", e))?;
        let disk = Rc::new(disk);

        let memory = MemoryManager::new(PAGE_FRAMES, Rc::clone(&disk));
        let mut fs = FileSystem::new(Rc::clone(&disk));

        if fs.mount().is_err() {
            info!("[Kernel] File system not found, formatting...");
            fs.format().map_err(|e| format!("format failed: {}", e))?;
        }

        Ok(Kernel {
            pm: ProcessManager::new(memory, DeviceManager::new(), fs),
        })
    }

    pub fn process_manager(&self) -> &ProcessManager {
        &self.pm
    }

    pub fn process_manager_mut(&mut self) -> &mut ProcessManager {
        &mut self.pm
    }
}
