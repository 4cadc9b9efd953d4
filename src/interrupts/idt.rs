//! Vector table construction and activation.
//!
//! The table is built once during boot, lives for the rest of the
//! kernel's lifetime, and is shared read-only by every unit. Each unit
//! additionally gets its own task state so privilege-raising traps land
//! on that unit's privileged stack.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Once;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use crate::gdt::{self, PrivilegedStack, UnitInitError};
use crate::interrupts::vectors::Vector;
use crate::kinfo;
use crate::privops::PrivilegedOps;

pub const TABLE_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateType {
    /// Interrupts are masked while the handler runs.
    Interrupt = 0xE,
    Trap = 0xF,
}

/// One 8-byte protected-mode gate descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDescriptor {
    low: u32,
    high: u32,
}

impl GateDescriptor {
    /// Non-present descriptor; raising its vector faults with a general
    /// protection error naming the vector.
    pub const EMPTY: GateDescriptor = GateDescriptor { low: 0, high: 0 };

    /// Present 32-bit interrupt gate. All handlers use interrupt gates
    /// so the interrupts-disabled entry invariant holds by construction.
    pub fn interrupt_gate(offset: u32, selector: SegmentSelector, dpl: PrivilegeLevel) -> Self {
        let low = ((selector.0 as u32) << 16) | (offset & 0xffff);
        let high = (offset & 0xffff_0000)
            | (1 << 15)
            | ((dpl as u32) << 13)
            | ((GateType::Interrupt as u32) << 8);
        GateDescriptor { low, high }
    }

    pub fn offset(&self) -> u32 {
        (self.high & 0xffff_0000) | (self.low & 0xffff)
    }

    pub fn selector(&self) -> SegmentSelector {
        SegmentSelector((self.low >> 16) as u16)
    }

    pub fn dpl(&self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16(((self.high >> 13) & 0x3) as u16)
    }

    pub fn present(&self) -> bool {
        self.high & (1 << 15) != 0
    }

    pub fn gate_type(&self) -> u8 {
        ((self.high >> 8) & 0xf) as u8
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

/// Operand for the table-load instruction.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct TablePointer {
    pub limit: u16,
    pub base: u32,
}

/// The full 256-entry vector table. Vectors without a handler stay
/// empty.
#[repr(C, align(8))]
pub struct VectorTable {
    entries: [GateDescriptor; TABLE_ENTRIES],
}

impl VectorTable {
    /// Populate descriptors for every handled vector. `entry` maps a
    /// vector to the address of its entry trampoline.
    pub fn build(kernel_cs: SegmentSelector, entry: impl Fn(Vector) -> u32) -> Self {
        let mut entries = [GateDescriptor::EMPTY; TABLE_ENTRIES];
        for vector in Vector::ALL {
            entries[vector.number() as usize] =
                GateDescriptor::interrupt_gate(entry(vector), kernel_cs, vector.dpl());
        }
        VectorTable { entries }
    }

    pub fn descriptor(&self, vector: u8) -> GateDescriptor {
        self.entries[vector as usize]
    }

    pub fn pointer(&self) -> TablePointer {
        TablePointer {
            limit: (core::mem::size_of::<VectorTable>() - 1) as u16,
            base: self.entries.as_ptr() as u32,
        }
    }
}

static VECTOR_TABLE: Once<VectorTable> = Once::new();
static TRAP_INIT_DONE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    AlreadyInitialized,
    /// Per-unit bring-up was attempted before the table was built.
    TableNotBuilt,
    Unit(UnitInitError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::AlreadyInitialized => write!(f, "vector table already initialized"),
            InitError::TableNotBuilt => write!(f, "vector table not built"),
            InitError::Unit(err) => write!(f, "{}", err),
        }
    }
}

impl From<UnitInitError> for InitError {
    fn from(err: UnitInitError) -> Self {
        InitError::Unit(err)
    }
}

/// Build the vector table and bring up unit 0. Called once, from the
/// boot unit, before any other unit starts.
pub fn init(
    entry: impl Fn(Vector) -> u32,
    boot_stack: PrivilegedStack,
    ops: &mut dyn PrivilegedOps,
) -> Result<(), InitError> {
    if TRAP_INIT_DONE.swap(true, Ordering::SeqCst) {
        return Err(InitError::AlreadyInitialized);
    }

    VECTOR_TABLE.call_once(|| VectorTable::build(gdt::KERNEL_CODE, entry));
    init_unit(0, boot_stack, ops)?;

    kinfo!(
        "trap: vector table active, {} handled vectors",
        Vector::ALL.len()
    );
    Ok(())
}

/// Bring up one unit: record its privileged stack, load its task
/// register, and point it at the shared table. Units after the boot
/// unit call this from their own startup path.
pub fn init_unit(
    unit: usize,
    stack: PrivilegedStack,
    ops: &mut dyn PrivilegedOps,
) -> Result<(), InitError> {
    let table = VECTOR_TABLE.get().ok_or(InitError::TableNotBuilt)?;

    gdt::init_unit(unit, stack)?;
    unsafe {
        ops.load_task_register(gdt::task_state_selector(unit));
        ops.load_vector_table(&table.pointer());
    }

    kinfo!("trap: unit {} online, esp0={:#010x}", unit, stack.top);
    Ok(())
}

/// The live table, once built.
pub fn table() -> Option<&'static VectorTable> {
    VECTOR_TABLE.get()
}
