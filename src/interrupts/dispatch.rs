//! Trap routing.
//!
//! Every trap ends in exactly one of three outcomes: the current
//! environment is resumed, the faulting environment is terminated and
//! another one is resumed, or the condition is fatal and the unit halts
//! after a diagnostic dump.

use core::fmt;

use crate::env::{Debugger, EnvId, EnvManager, EnvStatus};
use crate::fatal::{self, Fatal};
use crate::interrupts::vectors::{vector_name, Vector};
use crate::interrupts::{diag, exceptions};
use crate::kdebug;
use crate::privops::PrivilegedOps;
use crate::syscall::{self, SyscallTable};
use crate::trapframe::{Privilege, Trapframe};

/// Kernel services the dispatcher calls into, borrowed for the duration
/// of one trap.
pub struct Services<'a> {
    pub envs: &'a mut dyn EnvManager,
    pub debugger: &'a mut dyn Debugger,
    pub syscalls: &'a mut dyn SyscallTable,
    pub ops: &'a mut dyn PrivilegedOps,
    pub console: &'a mut dyn fmt::Write,
}

/// Where a trap came from, decided once from the captured `cs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapSource {
    Kernel,
    User(EnvId),
}

/// Per-unit dispatch state carried across the handling of one trap.
pub struct Dispatcher {
    // CR2 sampled at page-fault entry. Cleared on every trap so a dump
    // never shows a fault address from an earlier, unrelated fault.
    live_fault: Option<u32>,
    // The record being handled, for the fatal-path dump.
    record: Option<Trapframe>,
    dumped: bool,
}

impl Dispatcher {
    pub const fn new() -> Self {
        Dispatcher {
            live_fault: None,
            record: None,
            dumped: false,
        }
    }

    pub fn live_fault(&self) -> Option<u32> {
        self.live_fault
    }

    pub(crate) fn set_live_fault(&mut self, fault_va: u32) {
        self.live_fault = Some(fault_va);
    }

    /// Print the record once; the fatal path will not print it again.
    pub(crate) fn dump(&mut self, console: &mut dyn fmt::Write, frame: &Trapframe) {
        let _ = diag::print_trapframe(console, frame, self.live_fault);
        self.dumped = true;
    }

    /// Handle one captured trap. `Ok` names the environment to resume;
    /// `Err` is a condition the caller must halt on, already dumped.
    pub fn handle_trap(
        &mut self,
        tf: &mut Trapframe,
        sys: &mut Services<'_>,
    ) -> Result<EnvId, Fatal> {
        let result = self.dispatch(tf, sys);
        if let Err(fatal) = &result {
            crate::kfatal!("trap: {}", fatal);
            if !self.dumped {
                let record = self.record.unwrap_or(*tf);
                let _ = diag::print_trapframe(sys.console, &record, self.live_fault);
                self.dumped = true;
            }
        }
        result
    }

    fn dispatch(&mut self, tf: &mut Trapframe, sys: &mut Services<'_>) -> Result<EnvId, Fatal> {
        self.live_fault = None;
        self.record = None;
        self.dumped = false;

        // Handlers run through interrupt gates, so arriving with
        // interrupts enabled means the entry path is corrupted.
        if sys.ops.interrupts_enabled() {
            self.record = Some(*tf);
            return Err(Fatal::InterruptsEnabled);
        }

        // A user trap is handled from the environment's persistent
        // record, so the environment can be descheduled and later
        // resumed from it; the transient record on the privileged stack
        // is dead after this copy. Kernel traps are handled in place.
        let (frame, source) = match tf.privilege() {
            Privilege::User => {
                let env = sys.envs.current().ok_or(Fatal::NoCurrentEnvironment)?;
                *sys.envs.trapframe_mut(env) = *tf;
                (*sys.envs.trapframe(env), TrapSource::User(env))
            }
            Privilege::Kernel => (*tf, TrapSource::Kernel),
        };
        self.record = Some(frame);

        #[cfg(feature = "trace_dispatch")]
        crate::ktrace!(
            "trap: raw record eip={:08x} err={:08x} eflags={:08x}",
            frame.eip,
            frame.err,
            frame.eflags
        );
        kdebug!(
            "trap: 0x{:02x} {} from {:?}",
            frame.vector,
            vector_name(frame.vector),
            source
        );

        self.route(&frame, source, tf, sys)?;

        // Whatever the handlers did, the unit can only return to a
        // runnable current environment.
        let current = sys.envs.current().ok_or(Fatal::NoCurrentEnvironment)?;
        match sys.envs.status(current) {
            EnvStatus::Running => Ok(current),
            _ => Err(Fatal::EnvironmentNotRunnable(current)),
        }
    }

    fn route(
        &mut self,
        frame: &Trapframe,
        source: TrapSource,
        tf: &mut Trapframe,
        sys: &mut Services<'_>,
    ) -> Result<(), Fatal> {
        match Vector::from_number(frame.vector) {
            Some(Vector::Breakpoint) => {
                sys.debugger.enter(frame);
                Ok(())
            }
            Some(Vector::PageFault) => exceptions::page_fault(self, frame, source, sys),
            Some(Vector::Syscall) => {
                let result = syscall::marshal(sys.syscalls, frame);
                match source {
                    TrapSource::User(env) => {
                        syscall::write_result(sys.envs.trapframe_mut(env), result)
                    }
                    TrapSource::Kernel => syscall::write_result(tf, result),
                }
                Ok(())
            }
            _ => exceptions::unexpected(self, frame, source, sys),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// The non-returning outer entry: dispatch, then resume or halt.
pub fn trap_entry(dispatcher: &mut Dispatcher, tf: &mut Trapframe, sys: &mut Services<'_>) -> ! {
    match dispatcher.handle_trap(tf, sys) {
        Ok(env) => sys.envs.resume(env),
        Err(fatal) => fatal::halt(&fatal),
    }
}
