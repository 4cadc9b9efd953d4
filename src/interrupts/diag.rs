//! Diagnostic dump of a captured trap record.

use core::fmt::{self, Write};

use x86_64::structures::idt::PageFaultErrorCode;

use crate::interrupts::vectors::{vector_name, Vector};
use crate::trapframe::{Privilege, Trapframe};

/// Print a trap record in fixed layout, one field per line.
///
/// `fault_address` is the CR2 value sampled when this record's page
/// fault was taken; the cr2 line is printed only for a page-fault
/// record with a live sample, since CR2 read at print time could belong
/// to a later, unrelated fault.
pub fn print_trapframe(
    w: &mut dyn Write,
    tf: &Trapframe,
    fault_address: Option<u32>,
) -> fmt::Result {
    writeln!(w, "TRAP frame at {:p}", tf)?;
    print_regs(w, tf)?;
    writeln!(w, "  es   0x----{:04x}", tf.es)?;
    writeln!(w, "  ds   0x----{:04x}", tf.ds)?;
    writeln!(w, "  trap 0x{:08x} {}", tf.vector, vector_name(tf.vector))?;
    if tf.vector == Vector::PageFault.number() {
        if let Some(cr2) = fault_address {
            writeln!(w, "  cr2  0x{:08x}", cr2)?;
        }
    }
    write!(w, "  err  0x{:08x}", tf.err)?;
    if tf.vector == Vector::PageFault.number() {
        write_fault_decode(w, tf.err)?;
    }
    writeln!(w)?;
    writeln!(w, "  eip  0x{:08x}", tf.eip)?;
    writeln!(w, "  cs   0x----{:04x}", tf.cs)?;
    writeln!(w, "  flag 0x{:08x}", tf.eflags)?;
    if tf.privilege() == Privilege::User {
        writeln!(w, "  esp  0x{:08x}", tf.esp)?;
        writeln!(w, "  ss   0x----{:04x}", tf.ss)?;
    }
    Ok(())
}

fn print_regs(w: &mut dyn Write, tf: &Trapframe) -> fmt::Result {
    writeln!(w, "  edi  0x{:08x}", tf.regs.edi)?;
    writeln!(w, "  esi  0x{:08x}", tf.regs.esi)?;
    writeln!(w, "  ebp  0x{:08x}", tf.regs.ebp)?;
    writeln!(w, "  oesp 0x{:08x}", tf.regs.oesp)?;
    writeln!(w, "  ebx  0x{:08x}", tf.regs.ebx)?;
    writeln!(w, "  edx  0x{:08x}", tf.regs.edx)?;
    writeln!(w, "  ecx  0x{:08x}", tf.regs.ecx)?;
    writeln!(w, "  eax  0x{:08x}", tf.regs.eax)
}

/// Decode a page-fault error code as `[mode, access, cause]`.
fn write_fault_decode(w: &mut dyn Write, err: u32) -> fmt::Result {
    let code = PageFaultErrorCode::from_bits_truncate(err as u64);
    write!(
        w,
        " [{}, {}, {}]",
        if code.contains(PageFaultErrorCode::USER_MODE) {
            "user"
        } else {
            "kernel"
        },
        if code.contains(PageFaultErrorCode::CAUSED_BY_WRITE) {
            "write"
        } else {
            "read"
        },
        if code.contains(PageFaultErrorCode::PROTECTION_VIOLATION) {
            "protection"
        } else {
            "not-present"
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdt;

    fn user_frame(vector: Vector, err: u32) -> Trapframe {
        let mut tf = Trapframe::default();
        tf.vector = vector.number();
        tf.err = err;
        tf.eip = 0x0080_0042;
        tf.cs = gdt::USER_CODE.0;
        tf.esp = 0xeebf_e000;
        tf.ss = gdt::USER_DATA.0;
        tf
    }

    #[test]
    fn test_page_fault_dump_includes_cr2_and_decode() {
        let tf = user_frame(Vector::PageFault, 0x7);
        let mut out = String::new();
        print_trapframe(&mut out, &tf, Some(0xdead_b000)).unwrap();

        assert!(out.contains("  trap 0x0000000e Page Fault\n"));
        assert!(out.contains("  cr2  0xdeadb000\n"));
        assert!(out.contains("  err  0x00000007 [user, write, protection]\n"));
        assert!(out.contains("  esp  0xeebfe000\n"));
        assert!(out.contains("  ss   0x----0023\n"));
    }

    #[test]
    fn test_stale_fault_address_is_omitted() {
        let tf = user_frame(Vector::PageFault, 0x4);
        let mut out = String::new();
        print_trapframe(&mut out, &tf, None).unwrap();

        assert!(!out.contains("cr2"));
        assert!(out.contains("  err  0x00000004 [user, read, not-present]\n"));
    }

    #[test]
    fn test_kernel_frame_omits_stack_fields() {
        let mut tf = user_frame(Vector::GeneralProtection, 0x10);
        tf.cs = gdt::KERNEL_CODE.0;
        let mut out = String::new();
        print_trapframe(&mut out, &tf, None).unwrap();

        assert!(out.contains("  trap 0x0000000d General Protection\n"));
        // No fault decode for a non page fault record.
        assert!(out.contains("  err  0x00000010\n"));
        assert!(!out.contains("  esp"));
        assert!(!out.contains("  ss "));
    }

    #[test]
    fn test_unknown_vector_name() {
        let mut tf = user_frame(Vector::Breakpoint, 0);
        tf.vector = 33;
        let mut out = String::new();
        print_trapframe(&mut out, &tf, None).unwrap();
        assert!(out.contains("  trap 0x00000021 (unknown trap)\n"));
    }
}
