//! Physical memory: a fixed array of page frames.

pub type Pid = i32;

/// Ownership record for one frame. `allocated` holds exactly when
/// `owner_pid` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInfo {
    pub allocated: bool,
    pub owner_pid: Option<Pid>,
    pub page_number: usize,
}

pub struct PhysicalMemory {
    frames: Vec<FrameInfo>,
}

impl PhysicalMemory {
    pub fn new(num_frames: usize) -> PhysicalMemory {
        PhysicalMemory {
            frames: vec![FrameInfo::default(); num_frames],
        }
    }

    /// Allocate the lowest free frame for `(pid, page_number)`.
    pub fn allocate_frame(&mut self, pid: Pid, page_number: usize) -> Option<usize> {
        for (i, frame) in self.frames.iter_mut().enumerate() {
            if !frame.allocated {
                frame.allocated = true;
                frame.owner_pid = Some(pid);
                frame.page_number = page_number;
                return Some(i);
            }
        }
        None
    }

    /// Unconditionally reset frame `frame_number`.
    pub fn free_frame(&mut self, frame_number: usize) {
        self.frames[frame_number] = FrameInfo::default();
    }

    /// Force-assign an already-chosen frame, used by the replacer after an
    /// eviction.
    pub fn assign_frame(&mut self, frame_number: usize, pid: Pid, page_number: usize) {
        let frame = &mut self.frames[frame_number];
        frame.allocated = true;
        frame.owner_pid = Some(pid);
        frame.page_number = page_number;
    }

    pub fn frame_info(&self, frame_number: usize) -> &FrameInfo {
        &self.frames[frame_number]
    }

    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn free_frames(&self) -> usize {
        self.frames.iter().filter(|f| !f.allocated).count()
    }

    pub fn used_frames(&self) -> usize {
        self.total_frames() - self.free_frames()
    }

    pub fn dump(&self) {
        println!("=== Physical Memory ===");
        println!("Total: {} frames", self.total_frames());
        println!("Free: {}", self.free_frames());
        println!("Used: {}", self.used_frames());
        println!();
        println!("Frame | Status | PID | VPage");
        println!("------|--------|-----|------");
        for (i, frame) in self.frames.iter().enumerate() {
            match frame.owner_pid {
                Some(pid) if frame.allocated => {
                    println!("{:5} |  Used  | {:3} | {:5}", i, pid, frame.page_number)
                }
                _ => println!("{:5} |  Free  |  -  |   -", i),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_frame() {
        let mut pm = PhysicalMemory::new(4);
        assert_eq!(pm.allocate_frame(1, 0), Some(0));
        assert_eq!(pm.allocate_frame(1, 1), Some(1));
        pm.free_frame(0);
        // lowest-index policy hands frame 0 back out
        assert_eq!(pm.allocate_frame(2, 7), Some(0));
        let info = pm.frame_info(0);
        assert!(info.allocated);
        assert_eq!(info.owner_pid, Some(2));
        assert_eq!(info.page_number, 7);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut pm = PhysicalMemory::new(2);
        assert!(pm.allocate_frame(1, 0).is_some());
        assert!(pm.allocate_frame(1, 1).is_some());
        assert_eq!(pm.allocate_frame(1, 2), None);
        assert_eq!(pm.free_frames(), 0);
        assert_eq!(pm.used_frames(), 2);
    }
}
