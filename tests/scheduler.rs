//! Scheduling integration: round-robin, sleep, devices, termination.

mod common;

use common::fresh_pm;
use tinix::{Instruction, ProcessState, Program};

// Three compute-only programs of length 5 with quantum 3: after 5 ticks
// exactly one process has run its full slice and waits in the queue; after
// 15 ticks everything has terminated.
#[test]
fn round_robin_shares_the_cpu_fairly() {
    let (_image, mut pm) = fresh_pm("rr");
    let p1 = pm.create_process(5);
    let p2 = pm.create_process(5);
    let p3 = pm.create_process(5);

    for _ in 0..5 {
        pm.tick();
    }
    assert_eq!(pm.pcb(p1).unwrap().pc, 3);
    assert_eq!(pm.process_state(p1), Some(ProcessState::Ready));
    assert_eq!(pm.pcb(p2).unwrap().pc, 2);
    assert_eq!(pm.process_state(p2), Some(ProcessState::Running));
    assert_eq!(pm.pcb(p3).unwrap().pc, 0);

    for _ in 0..10 {
        pm.tick();
    }
    assert_eq!(pm.process_count(), 0);
    assert_eq!(pm.current_pid(), None);
}

#[test]
fn quantum_exhaustion_moves_the_process_to_the_tail() {
    let (_image, mut pm) = fresh_pm("quantum");
    let p1 = pm.create_process(6);
    let p2 = pm.create_process(6);

    pm.tick();
    pm.tick();
    pm.tick();
    // p1 burned its slice; p2 must run next while p1 waits behind it.
    assert_eq!(pm.process_state(p1), Some(ProcessState::Ready));
    assert_eq!(pm.pcb(p1).unwrap().quantum_left, pm.pcb(p1).unwrap().quantum);
    pm.tick();
    assert_eq!(pm.process_state(p2), Some(ProcessState::Running));
}

// SLEEP blocks at the tick that executes it and the timer sweep counts it
// back down; the trailing compute runs after the wakeup.
#[test]
fn sleep_blocks_and_expires() {
    let (_image, mut pm) = fresh_pm("sleep");
    let pid = pm.create_process_with_program(Program::from_instructions(vec![
        Instruction::Sleep { ticks: 3 },
        Instruction::Compute,
    ]));

    pm.tick();
    assert_eq!(pm.process_state(pid), Some(ProcessState::Blocked));
    assert_eq!(pm.pcb(pid).unwrap().pc, 1);

    pm.tick();
    assert_eq!(pm.process_state(pid), Some(ProcessState::Blocked));
    pm.tick();
    assert_eq!(pm.process_state(pid), Some(ProcessState::Ready));

    // Wakes, runs the trailing compute, terminates.
    pm.tick();
    assert_eq!(pm.process_count(), 0);
}

#[test]
fn blocking_instruction_is_not_reexecuted_after_wakeup() {
    let (_image, mut pm) = fresh_pm("noreexec");
    let pid = pm.create_process_with_program(Program::from_instructions(vec![
        Instruction::Sleep { ticks: 2 },
        Instruction::Compute,
    ]));

    for _ in 0..4 {
        pm.tick();
    }
    // One tick for SLEEP, one for the compute; re-execution would need more.
    assert_eq!(pm.process_count(), 0);
    let _ = pid;
}

// E4: FIFO handoff. P2 and P3 queue on the device P1 holds; releasing
// makes P2 the owner and Ready while P3 keeps waiting.
#[test]
fn device_waiters_are_served_in_fifo_order() {
    let (_image, mut pm) = fresh_pm("fifo");
    let p1 = pm.create_process_with_program(Program::from_instructions(vec![
        Instruction::DevRequest { dev: 0 },
        Instruction::Compute,
        Instruction::Compute,
        Instruction::Compute,
        Instruction::DevRelease { dev: 0 },
    ]));
    let p2 = pm.create_process_with_program(Program::from_instructions(vec![
        Instruction::DevRequest { dev: 0 },
        Instruction::Compute,
    ]));
    let p3 = pm.create_process_with_program(Program::from_instructions(vec![
        Instruction::DevRequest { dev: 0 },
        Instruction::Compute,
    ]));

    // t0..t2: P1 takes the device and burns its quantum.
    pm.tick();
    assert_eq!(pm.devices().owner(0), Some(p1));
    pm.tick();
    pm.tick();
    // t3: P2 requests and blocks. t4: P3 requests and blocks.
    pm.tick();
    assert_eq!(pm.process_state(p2), Some(ProcessState::Blocked));
    pm.tick();
    assert_eq!(pm.process_state(p3), Some(ProcessState::Blocked));
    assert_eq!(pm.devices().waiters(0), vec![p2, p3]);

    // t5: P1 computes. t6: P1 releases and completes.
    pm.tick();
    pm.tick();
    assert!(pm.pcb(p1).is_none());
    assert_eq!(pm.devices().owner(0), Some(p2));
    assert_eq!(pm.process_state(p2), Some(ProcessState::Ready));
    assert_eq!(pm.process_state(p3), Some(ProcessState::Blocked));
}

#[test]
fn terminating_an_owner_hands_the_device_to_the_head_waiter() {
    let (_image, mut pm) = fresh_pm("handoff");
    let p1 = pm.create_process_with_program(Program::from_instructions(vec![
        Instruction::DevRequest { dev: 7 },
        Instruction::Compute,
        Instruction::Compute,
        Instruction::Compute,
        Instruction::Compute,
    ]));
    let p2 = pm.create_process_with_program(Program::from_instructions(vec![
        Instruction::DevRequest { dev: 7 },
        Instruction::Compute,
    ]));

    for _ in 0..4 {
        pm.tick();
    }
    assert_eq!(pm.devices().owner(7), Some(p1));
    assert_eq!(pm.process_state(p2), Some(ProcessState::Blocked));

    pm.terminate_process(p1);
    assert_eq!(pm.devices().owner(7), Some(p2));
    assert_eq!(pm.process_state(p2), Some(ProcessState::Ready));
}

#[test]
fn stale_ready_queue_entries_are_skipped() {
    let (_image, mut pm) = fresh_pm("stale");
    let p1 = pm.create_process(3);
    let p2 = pm.create_process(3);

    // p2 dies while still queued; the scheduler must step over it.
    pm.terminate_process(p2);
    for _ in 0..3 {
        pm.tick();
    }
    assert!(pm.pcb(p1).is_none());
    assert_eq!(pm.process_count(), 0);
}

#[test]
fn manual_block_and_wakeup_cycle() {
    let (_image, mut pm) = fresh_pm("manual");
    let p1 = pm.create_process(4);

    pm.tick();
    assert_eq!(pm.process_state(p1), Some(ProcessState::Running));

    pm.block_process(p1, 100);
    assert_eq!(pm.process_state(p1), Some(ProcessState::Blocked));
    assert_eq!(pm.current_pid(), None);

    pm.wakeup_process(p1);
    assert_eq!(pm.process_state(p1), Some(ProcessState::Ready));

    for _ in 0..4 {
        pm.tick();
    }
    assert_eq!(pm.process_count(), 0);
}

#[test]
fn run_process_preempts_the_current_one() {
    let (_image, mut pm) = fresh_pm("preempt");
    let p1 = pm.create_process(10);
    let p2 = pm.create_process(10);

    pm.tick();
    assert_eq!(pm.process_state(p1), Some(ProcessState::Running));

    pm.run_process(p2);
    assert_eq!(pm.process_state(p2), Some(ProcessState::Running));
    assert_eq!(pm.process_state(p1), Some(ProcessState::Ready));
    assert_eq!(pm.current_pid(), Some(p2));
}

#[test]
fn memory_failures_do_not_block_the_process() {
    let (_image, mut pm) = fresh_pm("memfail");
    // Address far past the 64-page address space, then a compute.
    let pid = pm.create_process_with_program(Program::from_instructions(vec![
        Instruction::MemRead { addr: 1 << 40 },
        Instruction::Compute,
    ]));

    pm.tick();
    assert_eq!(pm.process_state(pid), Some(ProcessState::Running));
    pm.tick();
    assert_eq!(pm.process_count(), 0);
}

#[test]
fn address_space_size_is_per_process() {
    let (_image, mut pm) = fresh_pm("vpages");
    // 16 virtual pages: the last page is reachable, one past it is not.
    let pid = pm.create_process_with_pages(
        Program::from_instructions(vec![
            Instruction::MemRead { addr: 15 * 4096 },
            Instruction::MemRead { addr: 16 * 4096 },
            Instruction::Compute,
        ]),
        16,
    );

    for _ in 0..3 {
        pm.tick();
    }
    assert_eq!(pm.process_count(), 0);

    // The out-of-range access was refused before it was counted.
    let stats = pm.memory().stats();
    assert_eq!(stats.memory_accesses, 1);
    assert_eq!(stats.page_faults, 1);
    let _ = pid;
}

#[test]
fn pids_increase_and_are_never_reused() {
    let (_image, mut pm) = fresh_pm("pids");
    let p1 = pm.create_process(1);
    pm.terminate_process(p1);
    let p2 = pm.create_process(1);
    assert!(p2 > p1);
}

#[test]
fn termination_frees_the_address_space() {
    let (_image, mut pm) = fresh_pm("cleanup");
    let pid = pm.create_process_with_program(Program::from_instructions(vec![
        Instruction::MemWrite { addr: 0 },
        Instruction::MemWrite { addr: 4096 },
        Instruction::Compute,
    ]));

    pm.tick();
    pm.tick();
    assert_eq!(pm.memory().physical_memory().used_frames(), 2);

    pm.terminate_process(pid);
    assert_eq!(pm.memory().physical_memory().used_frames(), 0);
    assert!(!pm.memory().has_process_memory(pid));
}
