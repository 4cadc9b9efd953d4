//! The captured state record pushed by the trap entry trampolines.
//!
//! Field order is ABI: the entry trampolines build this record on the
//! stack in exactly this layout before calling into the dispatcher, and
//! the resume path restores from it. Do not reorder fields.

/// General-purpose registers in `pushal` order.
///
/// `oesp` is the useless copy of `esp` that `pushal` stores; it is kept
/// so the record matches the hardware push layout byte for byte.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushRegs {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub oesp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

/// Captured CPU state at the moment of a trap.
///
/// `esp` and `ss` are pushed by the processor only when the trap crossed
/// from a lower-privileged context; for kernel-mode traps those two
/// fields are not written by the trampoline and must not be read. Whether
/// they are meaningful is determined solely by the privilege bits of
/// `cs` (see [`Trapframe::privilege`]).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Trapframe {
    pub regs: PushRegs,
    pub es: u16,
    padding1: u16,
    pub ds: u16,
    padding2: u16,
    pub vector: u32,
    pub err: u32,
    // Pushed by the processor from here on.
    pub eip: u32,
    pub cs: u16,
    padding3: u16,
    pub eflags: u32,
    // Pushed by the processor only on a privilege crossing.
    pub esp: u32,
    pub ss: u16,
    padding4: u16,
}

/// Interrupt-enable bit in `eflags`.
pub const FLAG_IF: u32 = 1 << 9;

/// Privilege level a record was captured at, derived from the RPL bits
/// of the trapped code segment selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Kernel,
    User,
}

impl Trapframe {
    pub fn privilege(&self) -> Privilege {
        if self.cs & 0x3 == 0 {
            Privilege::Kernel
        } else {
            Privilege::User
        }
    }
}
