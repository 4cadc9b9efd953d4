//! Segment selector layout and the per-unit privileged stack descriptor.
//!
//! The GDT itself belongs to the surrounding kernel; this module only
//! fixes the selector values the trap core depends on and owns the task
//! state (TSS) instances that hold each execution unit's privileged
//! stack. A unit's task state is written exactly once, during that
//! unit's initialization, and is read-only afterwards (the hardware
//! reads it on every privilege-raising trap).

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

/// Kernel code segment, the target of every vector table entry.
pub const KERNEL_CODE: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0); // 0x08
/// Kernel data segment, used as the privileged stack segment.
pub const KERNEL_DATA: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0); // 0x10
pub const USER_CODE: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring3); // 0x1b
pub const USER_DATA: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring3); // 0x23

/// GDT index of unit 0's task state descriptor; unit N uses index
/// `TASK_STATE_BASE_INDEX + N`.
pub const TASK_STATE_BASE_INDEX: u16 = 5;

/// Maximum hardware execution units with their own task state.
pub const MAX_UNITS: usize = 8;

/// Privileged stack to switch to when a trap raises privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegedStack {
    pub top: u32,
    pub segment: SegmentSelector,
}

/// i386 task state segment. Only `esp0`/`ss0` are ever written; the rest
/// of the layout exists because the hardware mandates the full 104-byte
/// record.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TaskState {
    link: u32,
    pub esp0: u32,
    pub ss0: u16,
    pad0: u16,
    esp1: u32,
    ss1: u16,
    pad1: u16,
    esp2: u32,
    ss2: u16,
    pad2: u16,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u16,
    pad3: u16,
    cs: u16,
    pad4: u16,
    ss: u16,
    pad5: u16,
    ds: u16,
    pad6: u16,
    fs: u16,
    pad7: u16,
    gs: u16,
    pad8: u16,
    ldt: u16,
    pad9: u16,
    trap: u16,
    pub iomb: u16,
}

impl TaskState {
    pub const fn new() -> Self {
        TaskState {
            link: 0,
            esp0: 0,
            ss0: 0,
            pad0: 0,
            esp1: 0,
            ss1: 0,
            pad1: 0,
            esp2: 0,
            ss2: 0,
            pad2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            pad3: 0,
            cs: 0,
            pad4: 0,
            ss: 0,
            pad5: 0,
            ds: 0,
            pad6: 0,
            fs: 0,
            pad7: 0,
            gs: 0,
            pad8: 0,
            ldt: 0,
            pad9: 0,
            trap: 0,
            iomb: 0,
        }
    }

    pub fn set_privileged_stack(&mut self, stack: PrivilegedStack) {
        self.esp0 = stack.top;
        self.ss0 = stack.segment.0;
    }

    pub fn privileged_stack(&self) -> PrivilegedStack {
        PrivilegedStack {
            top: self.esp0,
            segment: SegmentSelector(self.ss0),
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

// One task state per unit. Written during single-threaded boot only; the
// ready flags document the write-once lifecycle, they do not serialize
// concurrent writers (there are none by construction).
static mut UNIT_TASK_STATES: [TaskState; MAX_UNITS] = [TaskState::new(); MAX_UNITS];

static UNIT_READY: [AtomicBool; MAX_UNITS] = [
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitInitError {
    OutOfRange,
    AlreadyInitialized,
}

impl fmt::Display for UnitInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitInitError::OutOfRange => write!(f, "unit index out of range"),
            UnitInitError::AlreadyInitialized => write!(f, "unit already initialized"),
        }
    }
}

/// Write a unit's privileged stack into its task state. Callable once
/// per unit, during that unit's single-threaded initialization.
pub fn init_unit(unit: usize, stack: PrivilegedStack) -> Result<&'static TaskState, UnitInitError> {
    if unit >= MAX_UNITS {
        return Err(UnitInitError::OutOfRange);
    }
    if UNIT_READY[unit].swap(true, Ordering::SeqCst) {
        return Err(UnitInitError::AlreadyInitialized);
    }

    unsafe {
        let ts = &mut *core::ptr::addr_of_mut!(UNIT_TASK_STATES[unit]);
        ts.set_privileged_stack(stack);
        Ok(&*core::ptr::addr_of!(UNIT_TASK_STATES[unit]))
    }
}

/// The unit's task state, if that unit has been initialized.
pub fn task_state(unit: usize) -> Option<&'static TaskState> {
    if unit >= MAX_UNITS || !UNIT_READY[unit].load(Ordering::SeqCst) {
        return None;
    }
    Some(unsafe { &*core::ptr::addr_of!(UNIT_TASK_STATES[unit]) })
}

/// Address handed to the GDT owner so it can build the unit's task state
/// descriptor.
pub fn task_state_address(unit: usize) -> Option<usize> {
    task_state(unit).map(|ts| ts as *const TaskState as usize)
}

/// Task register selector for a unit.
pub fn task_state_selector(unit: usize) -> SegmentSelector {
    SegmentSelector::new(TASK_STATE_BASE_INDEX + unit as u16, PrivilegeLevel::Ring0)
}
