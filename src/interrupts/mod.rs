//! Vector table, trap dispatch, and trap diagnostics.

pub mod diag;
pub mod dispatch;
pub mod exceptions;
pub mod idt;
pub mod vectors;

pub use dispatch::{trap_entry, Dispatcher, Services, TrapSource};
pub use idt::{init, init_unit, GateDescriptor, InitError, TablePointer, VectorTable};
pub use vectors::{vector_name, Vector};
