//! Privileged-operations boundary.
//!
//! Every privileged instruction the trap core needs goes through this
//! trait, so the dispatcher and the table loader can be exercised on a
//! host with a recording fake while hardware gets the real thing.

use x86_64::structures::gdt::SegmentSelector;

use crate::interrupts::idt::TablePointer;

pub trait PrivilegedOps {
    /// Whether maskable interrupts are currently enabled on this unit.
    fn interrupts_enabled(&self) -> bool;

    /// The faulting linear address of the most recent page fault (CR2).
    fn fault_address(&mut self) -> u32;

    /// Point the hardware at a vector table.
    ///
    /// # Safety
    /// `pointer` must describe a fully populated table that outlives the
    /// registration (in practice, a `'static` table).
    unsafe fn load_vector_table(&mut self, pointer: &TablePointer);

    /// Load the task register with a unit's task state selector.
    ///
    /// # Safety
    /// The selector must index a valid, present task state descriptor in
    /// the live GDT.
    unsafe fn load_task_register(&mut self, selector: SegmentSelector);
}

/// [`PrivilegedOps`] backed by the real instructions.
#[cfg(target_arch = "x86_64")]
pub struct HardwareOps;

#[cfg(target_arch = "x86_64")]
impl PrivilegedOps for HardwareOps {
    fn interrupts_enabled(&self) -> bool {
        x86_64::instructions::interrupts::are_enabled()
    }

    fn fault_address(&mut self) -> u32 {
        use x86_64::registers::control::Cr2;
        // A non-canonical CR2 cannot occur on the fault path; treat it
        // as address zero rather than propagating.
        Cr2::read().map(|addr| addr.as_u64() as u32).unwrap_or(0)
    }

    unsafe fn load_vector_table(&mut self, pointer: &TablePointer) {
        use x86_64::instructions::tables::lidt;
        use x86_64::structures::DescriptorTablePointer;
        use x86_64::VirtAddr;

        let descriptor = DescriptorTablePointer {
            limit: pointer.limit,
            base: VirtAddr::new(pointer.base as u64),
        };
        lidt(&descriptor);
    }

    unsafe fn load_task_register(&mut self, selector: SegmentSelector) {
        x86_64::instructions::tables::load_tss(selector);
    }
}
