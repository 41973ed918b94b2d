//! Shared scaffolding: every test gets its own throwaway disk image.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tinix::config::PAGE_FRAMES;
use tinix::{DeviceManager, DiskDevice, FileSystem, MemoryManager, ProcessManager};

static NEXT_IMAGE: AtomicUsize = AtomicUsize::new(0);

pub struct TempImage {
    path: PathBuf,
}

impl TempImage {
    pub fn new(tag: &str) -> TempImage {
        let n = NEXT_IMAGE.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tinix-{}-{}-{}.img",
            tag,
            std::process::id(),
            n
        ));
        let _ = std::fs::remove_file(&path);
        TempImage { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn open_disk(image: &TempImage) -> Rc<DiskDevice> {
    Rc::new(DiskDevice::open(image.path()).expect("open disk image"))
}

/// A process manager over a freshly formatted image.
pub fn fresh_pm(tag: &str) -> (TempImage, ProcessManager) {
    let image = TempImage::new(tag);
    let disk = open_disk(&image);

    let memory = MemoryManager::new(PAGE_FRAMES, Rc::clone(&disk));
    let mut fs = FileSystem::new(Rc::clone(&disk));
    fs.format().expect("format");

    (image, ProcessManager::new(memory, DeviceManager::new(), fs))
}
