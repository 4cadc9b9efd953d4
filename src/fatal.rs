//! Unrecoverable trap-path conditions.

use core::fmt;

use crate::env::EnvId;

/// Conditions from which the trap path cannot continue. Each one ends
/// with the unit halted after a diagnostic dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatal {
    /// A trap arrived with maskable interrupts still enabled.
    InterruptsEnabled,
    /// A user-mode trap arrived with no current environment.
    NoCurrentEnvironment,
    /// After handling, the current environment is not runnable.
    EnvironmentNotRunnable(EnvId),
    /// A trap with no handler was taken in kernel mode.
    UnhandledKernelTrap { vector: u32 },
    /// The kernel itself faulted on a memory access.
    KernelPageFault { fault_va: u32, eip: u32 },
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::InterruptsEnabled => write!(f, "interrupts enabled on trap entry"),
            Fatal::NoCurrentEnvironment => write!(f, "user trap with no current environment"),
            Fatal::EnvironmentNotRunnable(env) => {
                write!(f, "current environment {} not runnable after trap", env)
            }
            Fatal::UnhandledKernelTrap { vector } => {
                write!(f, "unhandled trap 0x{:02x} in kernel", vector)
            }
            Fatal::KernelPageFault { fault_va, eip } => {
                write!(f, "kernel fault va {:08x} ip {:08x}", fault_va, eip)
            }
        }
    }
}

/// Log the condition and stop the unit.
pub fn halt(fatal: &Fatal) -> ! {
    crate::kfatal!("{}", fatal);
    crate::arch::halt_loop()
}
