//! End-to-end dispatch scenarios against scripted kernel services.

use trapcore::env::{Debugger, EnvId, EnvManager, EnvStatus};
use trapcore::fatal::Fatal;
use trapcore::gdt;
use trapcore::interrupts::idt::TablePointer;
use trapcore::interrupts::{Dispatcher, Services, Vector};
use trapcore::privops::PrivilegedOps;
use trapcore::syscall::{SyscallTable, NO_SUCH_CALL, SYS_CPUTS, SYS_GETENVID};
use trapcore::trapframe::Trapframe;

use x86_64::structures::gdt::SegmentSelector;

// =========================================================================
// Scripted collaborators
// =========================================================================

struct Env {
    id: EnvId,
    status: EnvStatus,
    frame: Trapframe,
}

struct MockEnvs {
    envs: Vec<Env>,
    current: Option<usize>,
    terminated: Vec<EnvId>,
}

impl MockEnvs {
    fn one_running(id: u32) -> Self {
        Self::with_envs(&[id])
    }

    fn with_envs(ids: &[u32]) -> Self {
        MockEnvs {
            envs: ids
                .iter()
                .map(|&id| Env {
                    id: EnvId(id),
                    status: EnvStatus::Running,
                    frame: Trapframe::default(),
                })
                .collect(),
            current: if ids.is_empty() { None } else { Some(0) },
            terminated: Vec::new(),
        }
    }

    fn index_of(&self, env: EnvId) -> usize {
        self.envs
            .iter()
            .position(|e| e.id == env)
            .expect("unknown environment id")
    }
}

impl EnvManager for MockEnvs {
    fn current(&self) -> Option<EnvId> {
        self.current.map(|i| self.envs[i].id)
    }

    fn status(&self, env: EnvId) -> EnvStatus {
        self.envs[self.index_of(env)].status
    }

    fn trapframe(&self, env: EnvId) -> &Trapframe {
        &self.envs[self.index_of(env)].frame
    }

    fn trapframe_mut(&mut self, env: EnvId) -> &mut Trapframe {
        let i = self.index_of(env);
        &mut self.envs[i].frame
    }

    fn terminate(&mut self, env: EnvId) {
        let i = self.index_of(env);
        self.envs[i].status = EnvStatus::Terminated;
        self.terminated.push(env);
        if self.current == Some(i) {
            // Next runnable environment, as a scheduler would pick.
            self.current = self
                .envs
                .iter()
                .position(|e| e.status == EnvStatus::Running);
        }
    }

    fn resume(&mut self, _env: EnvId) -> ! {
        panic!("resume must not be reached from handle_trap");
    }
}

#[derive(Default)]
struct MockDebugger {
    entered: Vec<Trapframe>,
}

impl Debugger for MockDebugger {
    fn enter(&mut self, frame: &Trapframe) {
        self.entered.push(*frame);
    }
}

struct MockCalls {
    envid: u32,
    cputs: Vec<(u32, u32)>,
}

impl MockCalls {
    fn new(envid: u32) -> Self {
        MockCalls {
            envid,
            cputs: Vec::new(),
        }
    }
}

impl SyscallTable for MockCalls {
    fn invoke(&mut self, num: u32, args: [u32; 5]) -> Option<i32> {
        match num {
            SYS_CPUTS => {
                self.cputs.push((args[0], args[1]));
                Some(0)
            }
            SYS_GETENVID => Some(self.envid as i32),
            _ => None,
        }
    }
}

struct MockOps {
    interrupts_enabled: bool,
    cr2: u32,
}

impl MockOps {
    fn quiet() -> Self {
        MockOps {
            interrupts_enabled: false,
            cr2: 0,
        }
    }
}

impl PrivilegedOps for MockOps {
    fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    fn fault_address(&mut self) -> u32 {
        self.cr2
    }

    unsafe fn load_vector_table(&mut self, _pointer: &TablePointer) {}

    unsafe fn load_task_register(&mut self, _selector: SegmentSelector) {}
}

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

fn kernel_frame(vector: Vector, err: u32) -> Trapframe {
    let mut tf = Trapframe::default();
    tf.vector = vector.number();
    tf.err = err;
    tf.eip = 0xf010_3000;
    tf.cs = gdt::KERNEL_CODE.0;
    tf
}

macro_rules! services {
    ($envs:expr, $dbg:expr, $calls:expr, $ops:expr, $console:expr) => {
        Services {
            envs: &mut $envs,
            debugger: &mut $dbg,
            syscalls: &mut $calls,
            ops: &mut $ops,
            console: &mut $console,
        }
    };
}

// =========================================================================
// Breakpoint and syscall paths
// =========================================================================

#[test]
fn test_user_breakpoint_copies_record_and_enters_debugger() {
    let mut envs = MockEnvs::one_running(0x1001);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    let mut console = String::new();

    let mut tf = user_frame(Vector::Breakpoint, 0);
    tf.regs.eax = 0x1111_1111;
    tf.regs.edi = 0x2222_2222;

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(d.handle_trap(&mut tf, &mut sys), Ok(EnvId(0x1001)));

    // The persistent copy matches the captured record field for field,
    // and the debugger saw that copy.
    assert_eq!(*envs.trapframe(EnvId(0x1001)), tf);
    assert_eq!(dbg.entered, vec![tf]);
    assert!(envs.terminated.is_empty());
}

#[test]
fn test_kernel_breakpoint_enters_debugger() {
    let mut envs = MockEnvs::one_running(0x1001);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    let mut console = String::new();

    let mut tf = kernel_frame(Vector::Breakpoint, 0);

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(d.handle_trap(&mut tf, &mut sys), Ok(EnvId(0x1001)));

    assert_eq!(dbg.entered.len(), 1);
    // A kernel trap is handled in place, never copied into the
    // environment's persistent record.
    assert_eq!(*envs.trapframe(EnvId(0x1001)), Trapframe::default());
}

#[test]
fn test_user_syscall_result_lands_in_persistent_eax() {
    let mut envs = MockEnvs::one_running(0x1001);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    let mut console = String::new();

    let mut tf = user_frame(Vector::Syscall, 0);
    tf.regs.eax = SYS_GETENVID;

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(d.handle_trap(&mut tf, &mut sys), Ok(EnvId(0x1001)));

    assert_eq!(envs.trapframe(EnvId(0x1001)).regs.eax, 0x1001);
    assert_eq!(envs.status(EnvId(0x1001)), EnvStatus::Running);
}

#[test]
fn test_user_syscall_argument_marshalling() {
    let mut envs = MockEnvs::one_running(0x1001);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    let mut console = String::new();

    let mut tf = user_frame(Vector::Syscall, 0);
    tf.regs.eax = SYS_CPUTS;
    tf.regs.edx = 0x0080_2000; // string pointer
    tf.regs.ecx = 13; // length

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(d.handle_trap(&mut tf, &mut sys), Ok(EnvId(0x1001)));

    assert_eq!(calls.cputs, vec![(0x0080_2000, 13)]);
    assert_eq!(envs.trapframe(EnvId(0x1001)).regs.eax, 0);
}

#[test]
fn test_unassigned_syscall_number_fails_without_terminating() {
    let mut envs = MockEnvs::one_running(0x1001);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    let mut console = String::new();

    let mut tf = user_frame(Vector::Syscall, 0);
    tf.regs.eax = 0xdead;

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(d.handle_trap(&mut tf, &mut sys), Ok(EnvId(0x1001)));

    assert_eq!(
        envs.trapframe(EnvId(0x1001)).regs.eax as i32,
        NO_SUCH_CALL
    );
    assert!(envs.terminated.is_empty());
}

#[test]
fn test_kernel_syscall_result_lands_in_transient_frame() {
    let mut envs = MockEnvs::one_running(0x1001);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    let mut console = String::new();

    let mut tf = kernel_frame(Vector::Syscall, 0);
    tf.regs.eax = SYS_GETENVID;

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(d.handle_trap(&mut tf, &mut sys), Ok(EnvId(0x1001)));

    assert_eq!(tf.regs.eax, 0x1001);
    assert_eq!(*envs.trapframe(EnvId(0x1001)), Trapframe::default());
}

// =========================================================================
// Page faults
// =========================================================================

#[test]
fn test_user_page_fault_reports_and_terminates() {
    let mut envs = MockEnvs::with_envs(&[0x1001, 0x1002]);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    ops.cr2 = 0xdead_b000;
    let mut console = String::new();

    let mut tf = user_frame(Vector::PageFault, 0x6); // user write, not present

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    let result = d.handle_trap(&mut tf, &mut sys);

    // The faulting environment dies and the next runnable one resumes.
    assert_eq!(result, Ok(EnvId(0x1002)));
    assert_eq!(envs.terminated, vec![EnvId(0x1001)]);
    assert_eq!(envs.status(EnvId(0x1001)), EnvStatus::Terminated);

    assert!(console.contains("[00001001] user fault va deadb000 ip 00800042\n"));
    assert!(console.contains("TRAP frame"));
    assert!(console.contains("  cr2  0xdeadb000\n"));
    assert!(console.contains("  err  0x00000006 [user, write, not-present]\n"));
    assert_eq!(d.live_fault(), Some(0xdead_b000));
}

#[test]
fn test_user_page_fault_with_no_successor_halts() {
    let mut envs = MockEnvs::one_running(0x1001);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    ops.cr2 = 0x0000_0004;
    let mut console = String::new();

    let mut tf = user_frame(Vector::PageFault, 0x4);

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(
        d.handle_trap(&mut tf, &mut sys),
        Err(Fatal::NoCurrentEnvironment)
    );
    assert_eq!(envs.terminated, vec![EnvId(0x1001)]);
}

#[test]
fn test_kernel_page_fault_is_fatal() {
    let mut envs = MockEnvs::one_running(0x1001);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    ops.cr2 = 0xf011_c000;
    let mut console = String::new();

    let mut tf = kernel_frame(Vector::PageFault, 0x2);

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(
        d.handle_trap(&mut tf, &mut sys),
        Err(Fatal::KernelPageFault {
            fault_va: 0xf011_c000,
            eip: 0xf010_3000,
        })
    );

    // The kernel never takes down an environment for its own fault.
    assert!(envs.terminated.is_empty());
    assert!(console.contains("TRAP frame"));
    assert!(console.contains("  cr2  0xf011c000\n"));
    assert!(console.contains("  err  0x00000002 [kernel, write, not-present]\n"));
}

#[test]
fn test_fault_address_clears_on_next_trap() {
    let mut envs = MockEnvs::with_envs(&[0x1001, 0x1002]);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    ops.cr2 = 0xdead_b000;
    let mut console = String::new();

    let mut d = Dispatcher::new();
    {
        let mut tf = user_frame(Vector::PageFault, 0x6);
        let mut sys = services!(envs, dbg, calls, ops, console);
        assert_eq!(d.handle_trap(&mut tf, &mut sys), Ok(EnvId(0x1002)));
    }
    assert_eq!(d.live_fault(), Some(0xdead_b000));

    {
        let mut tf = user_frame(Vector::Breakpoint, 0);
        let mut sys = services!(envs, dbg, calls, ops, console);
        assert_eq!(d.handle_trap(&mut tf, &mut sys), Ok(EnvId(0x1002)));
    }
    assert_eq!(d.live_fault(), None);
}

// =========================================================================
// Unexpected traps
// =========================================================================

#[test]
fn test_unexpected_kernel_trap_is_fatal() {
    let mut envs = MockEnvs::one_running(0x1001);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    let mut console = String::new();

    let mut tf = kernel_frame(Vector::GeneralProtection, 0x10);

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(
        d.handle_trap(&mut tf, &mut sys),
        Err(Fatal::UnhandledKernelTrap { vector: 13 })
    );
    assert!(envs.terminated.is_empty());
    assert!(console.contains("  trap 0x0000000d General Protection\n"));
}

#[test]
fn test_unexpected_user_trap_terminates_environment() {
    let mut envs = MockEnvs::with_envs(&[0x1001, 0x1002]);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    let mut console = String::new();

    let mut tf = user_frame(Vector::Divide, 0);

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(d.handle_trap(&mut tf, &mut sys), Ok(EnvId(0x1002)));

    assert_eq!(envs.terminated, vec![EnvId(0x1001)]);
    assert!(console.contains("  trap 0x00000000 Divide error\n"));
    // User record dump includes the user stack fields.
    assert!(console.contains("  esp  0xeebfe000\n"));
}

// =========================================================================
// Entry invariants
// =========================================================================

#[test]
fn test_interrupts_enabled_on_entry_is_fatal() {
    let mut envs = MockEnvs::one_running(0x1001);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    ops.interrupts_enabled = true;
    let mut console = String::new();

    let mut tf = user_frame(Vector::Syscall, 0);
    tf.regs.eax = SYS_GETENVID;

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(
        d.handle_trap(&mut tf, &mut sys),
        Err(Fatal::InterruptsEnabled)
    );

    // Nothing downstream ran.
    assert!(dbg.entered.is_empty());
    assert!(envs.terminated.is_empty());
    assert_eq!(*envs.trapframe(EnvId(0x1001)), Trapframe::default());
    assert!(console.contains("TRAP frame"));
}

#[test]
fn test_user_trap_without_current_environment_is_fatal() {
    let mut envs = MockEnvs::with_envs(&[]);
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0);
    let mut ops = MockOps::quiet();
    let mut console = String::new();

    let mut tf = user_frame(Vector::Breakpoint, 0);

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(
        d.handle_trap(&mut tf, &mut sys),
        Err(Fatal::NoCurrentEnvironment)
    );
    assert!(dbg.entered.is_empty());
}

#[test]
fn test_non_runnable_current_environment_after_trap_is_fatal() {
    let mut envs = MockEnvs::one_running(0x1001);
    envs.envs[0].status = EnvStatus::Stopped;
    let mut dbg = MockDebugger::default();
    let mut calls = MockCalls::new(0x1001);
    let mut ops = MockOps::quiet();
    let mut console = String::new();

    let mut tf = user_frame(Vector::Breakpoint, 0);

    let mut d = Dispatcher::new();
    let mut sys = services!(envs, dbg, calls, ops, console);
    assert_eq!(
        d.handle_trap(&mut tf, &mut sys),
        Err(Fatal::EnvironmentNotRunnable(EnvId(0x1001)))
    );
    // The debugger still ran; the failure is the resume precondition.
    assert_eq!(dbg.entered.len(), 1);
}
