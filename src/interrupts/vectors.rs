//! The trap vectors this kernel installs handlers for.

use x86_64::PrivilegeLevel;

/// Hardware-defined exception vectors plus the software syscall vector.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vector {
    Divide = 0,
    Debug = 1,
    NonMaskable = 2,
    Breakpoint = 3,
    Overflow = 4,
    BoundsCheck = 5,
    InvalidOpcode = 6,
    DeviceNotAvailable = 7,
    DoubleFault = 8,
    InvalidTaskState = 10,
    SegmentNotPresent = 11,
    StackFault = 12,
    GeneralProtection = 13,
    PageFault = 14,
    FloatingPointError = 16,
    AlignmentCheck = 17,
    MachineCheck = 18,
    SimdError = 19,
    Syscall = 48,
}

impl Vector {
    pub const ALL: [Vector; 19] = [
        Vector::Divide,
        Vector::Debug,
        Vector::NonMaskable,
        Vector::Breakpoint,
        Vector::Overflow,
        Vector::BoundsCheck,
        Vector::InvalidOpcode,
        Vector::DeviceNotAvailable,
        Vector::DoubleFault,
        Vector::InvalidTaskState,
        Vector::SegmentNotPresent,
        Vector::StackFault,
        Vector::GeneralProtection,
        Vector::PageFault,
        Vector::FloatingPointError,
        Vector::AlignmentCheck,
        Vector::MachineCheck,
        Vector::SimdError,
        Vector::Syscall,
    ];

    pub const fn number(self) -> u32 {
        self as u32
    }

    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|vector| vector.number() == number)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Vector::Divide => "Divide error",
            Vector::Debug => "Debug",
            Vector::NonMaskable => "Non-Maskable Interrupt",
            Vector::Breakpoint => "Breakpoint",
            Vector::Overflow => "Overflow",
            Vector::BoundsCheck => "BOUND Range Exceeded",
            Vector::InvalidOpcode => "Invalid Opcode",
            Vector::DeviceNotAvailable => "Device Not Available",
            Vector::DoubleFault => "Double Fault",
            Vector::InvalidTaskState => "Invalid TSS",
            Vector::SegmentNotPresent => "Segment Not Present",
            Vector::StackFault => "Stack Fault",
            Vector::GeneralProtection => "General Protection",
            Vector::PageFault => "Page Fault",
            Vector::FloatingPointError => "x87 FPU Floating-Point Error",
            Vector::AlignmentCheck => "Alignment Check",
            Vector::MachineCheck => "Machine-Check",
            Vector::SimdError => "SIMD Floating-Point Exception",
            Vector::Syscall => "System call",
        }
    }

    /// Lowest privilege allowed to raise this vector from software.
    /// Breakpoint and syscall are reachable from user mode; everything
    /// else faults with a general protection error if `int`ed from
    /// ring 3.
    pub const fn dpl(self) -> PrivilegeLevel {
        match self {
            Vector::Breakpoint | Vector::Syscall => PrivilegeLevel::Ring3,
            _ => PrivilegeLevel::Ring0,
        }
    }

    /// Whether the processor pushes an error code for this vector. The
    /// entry trampolines push a zero placeholder for the rest so the
    /// record layout is uniform.
    pub const fn pushes_error_code(self) -> bool {
        matches!(
            self,
            Vector::DoubleFault
                | Vector::InvalidTaskState
                | Vector::SegmentNotPresent
                | Vector::StackFault
                | Vector::GeneralProtection
                | Vector::PageFault
                | Vector::AlignmentCheck
        )
    }
}

/// Human-readable name for any vector number, handled or not.
pub fn vector_name(number: u32) -> &'static str {
    match Vector::from_number(number) {
        Some(vector) => vector.name(),
        None => "(unknown trap)",
    }
}
