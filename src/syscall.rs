//! System call numbers, error codes, and the register-marshalling shim.
//!
//! ABI: the call number arrives in `eax`, up to five arguments in
//! `edx`, `ecx`, `ebx`, `edi`, `esi`, and the result is returned in
//! `eax`. Negative results are error codes.

use crate::env::EnvId;
use crate::trapframe::Trapframe;

pub const SYS_CPUTS: u32 = 0;
pub const SYS_CGETC: u32 = 1;
pub const SYS_GETENVID: u32 = 2;
pub const SYS_ENV_DESTROY: u32 = 3;

pub const E_UNSPECIFIED: i32 = 1;
pub const E_BAD_ENV: i32 = 2;
pub const E_INVAL: i32 = 3;
pub const E_NO_MEM: i32 = 4;
pub const E_NO_FREE_ENV: i32 = 5;
pub const E_NO_SYS: i32 = 6;

/// Returned in `eax` when the call number names no implemented call.
pub const NO_SUCH_CALL: i32 = -E_NO_SYS;

/// The kernel's system call implementations. The table decides which
/// numbers exist; `None` means the number is unassigned and the caller
/// gets [`NO_SUCH_CALL`].
pub trait SyscallTable {
    fn invoke(&mut self, num: u32, args: [u32; 5]) -> Option<i32>;
}

/// Pull the call number and arguments out of a trap record and run the
/// call.
pub fn marshal(table: &mut dyn SyscallTable, frame: &Trapframe) -> i32 {
    let num = frame.regs.eax;
    let args = [
        frame.regs.edx,
        frame.regs.ecx,
        frame.regs.ebx,
        frame.regs.edi,
        frame.regs.esi,
    ];
    table.invoke(num, args).unwrap_or(NO_SUCH_CALL)
}

/// Store a call result where the resume path will restore it into `eax`.
pub fn write_result(frame: &mut Trapframe, result: i32) {
    frame.regs.eax = result as u32;
}

/// Identity helper for the common `SYS_GETENVID` implementation: an
/// environment id is returned as a non-negative `i32`.
pub fn envid_result(env: EnvId) -> i32 {
    env.0 as i32
}
