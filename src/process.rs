//! Process control blocks.

use core::fmt;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::config::{DEFAULT_TIME_SLICE, DEFAULT_VIRTUAL_PAGES};
use crate::pmem::Pid;
use crate::program::Program;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    New,
    Ready,
    Running,
    Blocked,
    Terminated,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ProcessState::New => "New",
            ProcessState::Ready => "Ready",
            ProcessState::Running => "Running",
            ProcessState::Blocked => "Blocked",
            ProcessState::Terminated => "Terminated",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    None,
    Sleep,
    Device,
}

pub struct Pcb {
    pub pid: Pid,
    pub state: ProcessState,
    pub quantum: i32,
    pub quantum_left: i32,
    pub cpu_time: u32,
    pub total_time: usize,
    pub blocked_time: u32,
    pub blocked_reason: BlockReason,
    pub waiting_device: Option<u32>,

    pub program: Rc<Program>,
    pub pc: usize,
    pub virtual_pages: usize,

    /// Script-local fds (>= 3) mapped onto file-system handles.
    pub fd_map: BTreeMap<i32, i32>,
    pub next_script_fd: i32,
}

impl Pcb {
    pub fn new(pid: Pid, program: Rc<Program>) -> Pcb {
        let total_time = program.len();
        Pcb {
            pid,
            state: ProcessState::New,
            quantum: DEFAULT_TIME_SLICE,
            quantum_left: DEFAULT_TIME_SLICE,
            cpu_time: 0,
            total_time,
            blocked_time: 0,
            blocked_reason: BlockReason::None,
            waiting_device: None,
            program,
            pc: 0,
            virtual_pages: DEFAULT_VIRTUAL_PAGES,
            fd_map: BTreeMap::new(),
            next_script_fd: 3,
        }
    }

    /// First unused script fd at or after `next_script_fd`.
    pub fn allocate_script_fd(&mut self) -> i32 {
        while self.fd_map.contains_key(&self.next_script_fd) {
            self.next_script_fd += 1;
        }
        let fd = self.next_script_fd;
        self.next_script_fd += 1;
        fd
    }
}
