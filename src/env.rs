//! The environment (user process) surface the dispatcher depends on.
//!
//! The scheduler and process table live in the surrounding kernel; the
//! trap core only needs to find the current environment, copy trap
//! state in and out of its persistent record, and terminate or resume
//! it. Those operations are a trait so dispatch logic runs against a
//! scripted fake in tests.

use core::fmt;

use crate::trapframe::Trapframe;

/// Opaque environment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(pub u32);

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    Running,
    Stopped,
    Terminated,
}

pub trait EnvManager {
    /// The environment running on this unit, if any.
    fn current(&self) -> Option<EnvId>;

    fn status(&self, env: EnvId) -> EnvStatus;

    /// The environment's persistent trap state record.
    fn trapframe(&self, env: EnvId) -> &Trapframe;

    fn trapframe_mut(&mut self, env: EnvId) -> &mut Trapframe;

    /// Destroy the environment and reclaim its resources. If it was the
    /// current environment, there is no current environment afterwards
    /// until the scheduler picks another.
    fn terminate(&mut self, env: EnvId);

    /// Return to user mode in the environment, restoring from its
    /// persistent trap state record. Does not return to the caller.
    fn resume(&mut self, env: EnvId) -> !;
}

/// Interactive kernel monitor entered on breakpoint traps.
pub trait Debugger {
    fn enter(&mut self, frame: &Trapframe);
}
