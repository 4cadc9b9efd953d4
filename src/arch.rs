//! Architecture glue that is not part of the privileged-operations
//! boundary: stopping the machine.

/// Stop this execution unit permanently.
#[cfg(target_arch = "x86_64")]
pub fn halt_loop() -> ! {
    x86_64::instructions::interrupts::disable();
    loop {
        x86_64::instructions::hlt();
    }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn halt_loop() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
