//! Trap and interrupt dispatch core for a protected-mode kernel.
//!
//! This crate owns the path between a hardware trap and the kernel's
//! response to it:
//!
//! - building the 256-entry interrupt vector table and activating it,
//!   together with the per-unit privileged stack descriptor, during boot
//!   ([`interrupts::init`]);
//! - dispatching every captured trap record to the breakpoint, page-fault,
//!   syscall, or unexpected-trap path ([`interrupts::Dispatcher`]);
//! - guaranteeing that each trap ends in exactly one of: resume a runnable
//!   environment, terminate the faulting environment, or halt the system
//!   ([`fatal`]).
//!
//! Everything the core needs from the rest of the kernel (environment
//! management, the debugger, the syscall table, and the few privileged
//! machine instructions) enters through the traits in [`env`], [`syscall`]
//! and [`privops`], so the dispatch logic itself contains no unsafe code
//! and runs unmodified on a host.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod env;
pub mod fatal;
pub mod gdt;
pub mod interrupts;
pub mod logger;
pub mod privops;
#[cfg(target_arch = "x86_64")]
pub mod serial;
pub mod syscall;
pub mod trapframe;

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::logger::log($level, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! kpanic {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::PANIC, $($arg)*);
        $crate::arch::halt_loop()
    }};
}

#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::FATAL, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::ERROR, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::WARN, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::INFO, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::DEBUG, $($arg)*);
    }};
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::TRACE, $($arg)*);
    }};
}
