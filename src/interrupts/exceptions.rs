//! Page-fault and unexpected-trap handling.

use core::fmt::Write;

use crate::fatal::Fatal;
use crate::interrupts::dispatch::{Dispatcher, Services, TrapSource};
use crate::interrupts::vectors::vector_name;
use crate::trapframe::Trapframe;
use crate::{kerror, kwarn};

/// A kernel-mode fault is a kernel bug and fatal. A user-mode fault
/// terminates the environment after reporting where it faulted.
pub(crate) fn page_fault(
    d: &mut Dispatcher,
    frame: &Trapframe,
    source: TrapSource,
    sys: &mut Services<'_>,
) -> Result<(), Fatal> {
    // CR2 first: any memory access below could itself fault and
    // clobber it.
    let fault_va = sys.ops.fault_address();
    d.set_live_fault(fault_va);

    match source {
        TrapSource::Kernel => Err(Fatal::KernelPageFault {
            fault_va,
            eip: frame.eip,
        }),
        TrapSource::User(env) => {
            kerror!("trap: environment {} faulted, va {:08x}", env, fault_va);
            let _ = writeln!(
                sys.console,
                "[{:08x}] user fault va {:08x} ip {:08x}",
                env.0, fault_va, frame.eip
            );
            d.dump(sys.console, frame);
            sys.envs.terminate(env);
            Ok(())
        }
    }
}

/// Any handled vector without a dedicated path lands here.
pub(crate) fn unexpected(
    d: &mut Dispatcher,
    frame: &Trapframe,
    source: TrapSource,
    sys: &mut Services<'_>,
) -> Result<(), Fatal> {
    match source {
        TrapSource::Kernel => Err(Fatal::UnhandledKernelTrap {
            vector: frame.vector,
        }),
        TrapSource::User(env) => {
            kwarn!(
                "trap: environment {} raised {} (0x{:02x}), terminating",
                env,
                vector_name(frame.vector),
                frame.vector
            );
            d.dump(sys.console, frame);
            sys.envs.terminate(env);
            Ok(())
        }
    }
}
