//! Process manager: PCB table, round-robin ready queue, and the per-tick
//! execution of scripted instructions against the other engines.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

use log::{info, warn};

use crate::config::{DEFAULT_VIRTUAL_PAGES, FILE_FILL_BYTE, MAX_IO_BYTES};
use crate::device::DeviceManager;
use crate::fs::FileSystem;
use crate::instruction::Instruction;
use crate::memory::{Access, MemoryManager};
use crate::pmem::Pid;
use crate::process::{BlockReason, Pcb, ProcessState};
use crate::program::Program;

pub struct ProcessManager {
    processes: BTreeMap<Pid, Pcb>,
    ready_queue: VecDeque<Pid>,
    next_pid: Pid,
    next_tick: u64,
    cur_pid: Option<Pid>,

    memory: MemoryManager,
    devices: DeviceManager,
    fs: FileSystem,
}

impl ProcessManager {
    pub fn new(memory: MemoryManager, devices: DeviceManager, fs: FileSystem) -> ProcessManager {
        ProcessManager {
            processes: BTreeMap::new(),
            ready_queue: VecDeque::new(),
            next_pid: 1,
            next_tick: 0,
            cur_pid: None,
            memory,
            devices,
            fs,
        }
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryManager {
        &mut self.memory
    }

    pub fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut FileSystem {
        &mut self.fs
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.cur_pid
    }

    pub fn process_state(&self, pid: Pid) -> Option<ProcessState> {
        self.processes.get(&pid).map(|pcb| pcb.state)
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn pcb(&self, pid: Pid) -> Option<&Pcb> {
        self.processes.get(&pid)
    }

    /// Create the default compute-only process of `total_time` instructions.
    pub fn create_process(&mut self, total_time: usize) -> Pid {
        self.create_process_with_program(Program::compute_only(total_time))
    }

    pub fn create_process_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Pid, String> {
        let program = Program::load(path)?;
        Ok(self.create_process_with_program(program))
    }

    pub fn create_process_with_program(&mut self, program: Rc<Program>) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;

        let mut pcb = Pcb::new(pid, program);
        pcb.state = ProcessState::Ready;
        let instructions = pcb.total_time;
        let virtual_pages = pcb.virtual_pages;

        self.processes.insert(pid, pcb);
        self.ready_queue.push_back(pid);
        self.memory.create_process_memory(pid, virtual_pages);

        info!("Process {} created with {} instructions", pid, instructions);
        pid
    }

    /// Same as `create_process_with_program` but with an explicit virtual
    /// address-space size, for workloads smaller than the default.
    pub fn create_process_with_pages(&mut self, program: Rc<Program>, virtual_pages: usize) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;

        let mut pcb = Pcb::new(pid, program);
        pcb.state = ProcessState::Ready;
        pcb.virtual_pages = if virtual_pages == 0 { DEFAULT_VIRTUAL_PAGES } else { virtual_pages };
        let virtual_pages = pcb.virtual_pages;

        self.processes.insert(pid, pcb);
        self.ready_queue.push_back(pid);
        self.memory.create_process_memory(pid, virtual_pages);
        pid
    }

    /// Force-kill a process, releasing everything it holds.
    pub fn terminate_process(&mut self, pid: Pid) {
        if !self.processes.contains_key(&pid) {
            info!("Process {} not found", pid);
            return;
        }
        self.finish_process(pid);
        info!("Process {} terminated", pid);
    }

    /// Shared termination path: hand devices to their successors, close the
    /// process's files, free its memory, drop the PCB. Stale entries in the
    /// ready queue are left behind; the scheduler filters them.
    fn finish_process(&mut self, pid: Pid) {
        for (dev, next) in self.devices.release_all(pid) {
            self.wake_device_successor(dev, next);
        }
        self.devices.cancel_wait(pid);

        if let Some(pcb) = self.processes.get_mut(&pid) {
            let fds: Vec<i32> = pcb.fd_map.values().copied().collect();
            pcb.fd_map.clear();
            for fs_fd in fds {
                self.fs.close_file(fs_fd);
            }
        }

        self.memory.free_process_memory(pid);
        self.processes.remove(&pid);
        if self.cur_pid == Some(pid) {
            self.cur_pid = None;
        }
    }

    /// Wake the process a released device was handed to. A successor that
    /// died while waiting is skipped by releasing through it until a live
    /// waiter is found or the device goes idle.
    fn wake_device_successor(&mut self, dev: u32, mut next: Option<Pid>) {
        while let Some(pid) = next {
            match self.processes.get(&pid) {
                Some(pcb) if pcb.state == ProcessState::Blocked => {
                    self.wakeup_process(pid);
                    return;
                }
                _ => {
                    next = self.devices.release(pid, dev);
                }
            }
        }
    }

    /// One unit of simulated time.
    pub fn tick(&mut self) {
        info!("=== Tick {} ===", self.next_tick);
        self.next_tick += 1;

        if self.cur_pid.is_none() {
            self.schedule();
        }

        if let Some(pid) = self.cur_pid {
            let pcb = match self.processes.get(&pid) {
                Some(pcb) => pcb,
                None => panic!("current PID {} not in process table", pid),
            };

            if pcb.pc < pcb.program.len() {
                let inst = pcb.program.get(pcb.pc).clone();
                info!("[Exec: {}] {}", pid, inst);
                self.execute_instruction(pid, &inst);
                // pc advances even when the instruction blocked the process,
                // so it resumes at the next instruction after wakeup.
                let pcb = self.processes.get_mut(&pid).unwrap();
                pcb.pc += 1;
            }

            let pcb = self.processes.get_mut(&pid).unwrap();
            pcb.quantum_left -= 1;
            pcb.cpu_time += 1;
            info!(
                "[Tick] Process {} executing (PC={}/{}, slice remaining: {})",
                pid,
                pcb.pc,
                pcb.program.len(),
                pcb.quantum_left
            );

            if pcb.pc >= pcb.program.len() {
                info!("[Tick] Process {} completed", pid);
                self.finish_process(pid);
            } else if pcb.quantum_left <= 0 {
                info!("[Tick] Process {} time slice exhausted", pid);
                pcb.state = ProcessState::Ready;
                pcb.quantum_left = pcb.quantum;
                self.ready_queue.push_back(pid);
                self.cur_pid = None;
            } else if pcb.state == ProcessState::Blocked {
                info!("[Tick] Process {} blocked during execution", pid);
                self.cur_pid = None;
            }
        }

        self.check_blocked_processes();
    }

    /// Pop the ready queue until a PID that still exists and is Ready turns
    /// up. Terminated processes may have left stale entries behind.
    fn schedule(&mut self) {
        while let Some(pid) = self.ready_queue.pop_front() {
            let pcb = match self.processes.get_mut(&pid) {
                Some(pcb) => pcb,
                None => continue,
            };
            if pcb.state != ProcessState::Ready {
                continue;
            }

            pcb.state = ProcessState::Running;
            self.cur_pid = Some(pid);
            info!("[Schedule] Process {} is now running", pid);
            return;
        }
        info!("[Schedule] CPU idle - no ready processes");
    }

    /// Manual preemption: put the current process back on the queue and
    /// install `pid` as Running.
    pub fn run_process(&mut self, pid: Pid) {
        match self.processes.get(&pid) {
            None => {
                info!("Process {} not found", pid);
                return;
            }
            Some(pcb) if pcb.state != ProcessState::Ready => {
                info!("Process {} is not in Ready state", pid);
                return;
            }
            Some(_) => {}
        }

        if let Some(cur) = self.cur_pid {
            let pcb = self.processes.get_mut(&cur).unwrap();
            pcb.state = ProcessState::Ready;
            self.ready_queue.push_back(cur);
            info!("Process {} preempted", cur);
        }

        let pcb = self.processes.get_mut(&pid).unwrap();
        pcb.state = ProcessState::Running;
        self.cur_pid = Some(pid);
        info!("Process {} is now running", pid);
    }

    /// Put a Ready or Running process to sleep for `duration` ticks.
    pub fn block_process(&mut self, pid: Pid, duration: u32) {
        let pcb = match self.processes.get_mut(&pid) {
            Some(pcb) => pcb,
            None => {
                info!("Process {} not found", pid);
                return;
            }
        };
        if pcb.state != ProcessState::Running && pcb.state != ProcessState::Ready {
            info!("Process {} cannot be blocked in its current state", pid);
            return;
        }

        pcb.state = ProcessState::Blocked;
        pcb.blocked_reason = BlockReason::Sleep;
        pcb.blocked_time = duration;
        pcb.waiting_device = None;
        info!("Process {} is blocked for {} ticks", pid, duration);

        if self.cur_pid == Some(pid) {
            self.cur_pid = None;
            self.schedule();
        }
    }

    /// Wake a Blocked process: it leaves any device queue and joins the
    /// ready queue.
    pub fn wakeup_process(&mut self, pid: Pid) {
        let pcb = match self.processes.get_mut(&pid) {
            Some(pcb) => pcb,
            None => {
                info!("Process {} not found", pid);
                return;
            }
        };
        if pcb.state != ProcessState::Blocked {
            info!("Process {} is not blocked", pid);
            return;
        }

        pcb.state = ProcessState::Ready;
        pcb.blocked_time = 0;
        pcb.blocked_reason = BlockReason::None;
        pcb.waiting_device = None;
        self.devices.cancel_wait(pid);
        self.ready_queue.push_back(pid);
        info!("Process {} woken up and added to ready queue", pid);
    }

    /// Sleep-timer sweep: every sleeping PCB counts down one tick and wakes
    /// at zero.
    fn check_blocked_processes(&mut self) {
        let mut expired = Vec::new();
        for (&pid, pcb) in self.processes.iter_mut() {
            if pcb.state == ProcessState::Blocked
                && pcb.blocked_reason == BlockReason::Sleep
                && pcb.blocked_time > 0
            {
                pcb.blocked_time -= 1;
                if pcb.blocked_time == 0 {
                    pcb.state = ProcessState::Ready;
                    pcb.blocked_reason = BlockReason::None;
                    expired.push(pid);
                }
            }
        }
        for pid in expired {
            self.ready_queue.push_back(pid);
            info!("[Tick] Process {} auto-woken up", pid);
        }
    }

    fn execute_instruction(&mut self, pid: Pid, inst: &Instruction) {
        match inst {
            Instruction::Compute => {}

            Instruction::MemRead { addr } => {
                if let Err(e) = self.memory.access_memory(pid, *addr, Access::Read) {
                    warn!("[Exec: {}] memory read failed: {}", pid, e);
                }
            }
            Instruction::MemWrite { addr } => {
                if let Err(e) = self.memory.access_memory(pid, *addr, Access::Write) {
                    warn!("[Exec: {}] memory write failed: {}", pid, e);
                }
            }

            Instruction::FileOpen { fd, path } => {
                let pcb = self.processes.get_mut(&pid).unwrap();
                let script_fd = match fd {
                    Some(fd) => {
                        if *fd < 3 || pcb.fd_map.contains_key(fd) {
                            warn!("[Exec: {}] bad script fd {} for open", pid, fd);
                            return;
                        }
                        *fd
                    }
                    None => pcb.allocate_script_fd(),
                };

                match self.fs.open_file(path) {
                    Ok(fs_fd) => {
                        let pcb = self.processes.get_mut(&pid).unwrap();
                        pcb.fd_map.insert(script_fd, fs_fd);
                        info!("[Exec: {}] opened {} as fd {}", pid, path, script_fd);
                    }
                    Err(e) => warn!("[Exec: {}] open {} failed: {}", pid, path, e),
                }
            }

            Instruction::FileClose { fd } => {
                let pcb = self.processes.get_mut(&pid).unwrap();
                match pcb.fd_map.remove(fd) {
                    Some(fs_fd) => self.fs.close_file(fs_fd),
                    None => warn!("[Exec: {}] close of unknown fd {}", pid, fd),
                }
            }

            Instruction::FileRead { fd, size } => {
                let size = (*size).min(MAX_IO_BYTES);
                let fs_fd = match self.processes[&pid].fd_map.get(fd) {
                    Some(&fs_fd) => fs_fd,
                    None => {
                        warn!("[Exec: {}] read from unknown fd {}", pid, fd);
                        return;
                    }
                };

                let mut buf = vec![0u8; size];
                match self.fs.read_file(fs_fd, &mut buf) {
                    Ok(n) => info!("[Exec: {}] read {} bytes from fd {}", pid, n, fd),
                    Err(e) => warn!("[Exec: {}] read from fd {} failed: {}", pid, fd, e),
                }
            }

            Instruction::FileWrite { fd, size } => {
                let size = (*size).min(MAX_IO_BYTES);
                let fs_fd = match self.processes[&pid].fd_map.get(fd) {
                    Some(&fs_fd) => fs_fd,
                    None => {
                        warn!("[Exec: {}] write to unknown fd {}", pid, fd);
                        return;
                    }
                };

                let buf = vec![FILE_FILL_BYTE; size];
                match self.fs.write_file(fs_fd, &buf) {
                    Ok(n) => info!("[Exec: {}] wrote {} bytes to fd {}", pid, n, fd),
                    Err(e) => warn!("[Exec: {}] write to fd {} failed: {}", pid, fd, e),
                }
            }

            Instruction::DevRequest { dev } => {
                if !self.devices.request(pid, *dev) {
                    let pcb = self.processes.get_mut(&pid).unwrap();
                    pcb.state = ProcessState::Blocked;
                    pcb.blocked_reason = BlockReason::Device;
                    pcb.waiting_device = Some(*dev);
                    // no timeout: only a grant wakes the process
                    pcb.blocked_time = 0;
                }
            }

            Instruction::DevRelease { dev } => {
                let next = self.devices.release(pid, *dev);
                self.wake_device_successor(*dev, next);
            }

            Instruction::Sleep { ticks } => {
                let pcb = self.processes.get_mut(&pid).unwrap();
                pcb.state = ProcessState::Blocked;
                pcb.blocked_reason = BlockReason::Sleep;
                pcb.blocked_time = *ticks;
            }
        }
    }

    pub fn dump_processes(&self) {
        println!("PID\tState\t\tRemain\tCPU/Total\tBlocked");
        for (pid, pcb) in &self.processes {
            println!(
                "{}\t{}\t\t{}\t{}/{}\t\t{}",
                pid, pcb.state, pcb.quantum_left, pcb.cpu_time, pcb.total_time, pcb.blocked_time
            );
        }
        match self.cur_pid {
            Some(pid) => println!("Currently running: {}", pid),
            None => println!("CPU idle"),
        }
    }
}
