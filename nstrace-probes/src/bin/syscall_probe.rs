//! Syscall entry probe
//!
//! Attaches to `raw_syscalls/sys_enter` and reports the syscall number for
//! every task whose pid namespace is on the allow-list.

#![no_std]
#![no_main]

use aya_ebpf::{
    macros::{map, tracepoint},
    maps::{HashMap, PerCpuArray, PerfEventArray},
    programs::TracePointContext,
};
use nstrace_common::{
    config::ALLOW_LIST_CAPACITY, syscall::syscall_enter, ProbeConfig, Skip, SyscallEvent,
};
use nstrace_probes::{
    kernel::CurrentTask,
    maps::{deliver, load_config, Table},
};

#[map]
static ALLOW_LIST: HashMap<u64, u32> = HashMap::with_max_entries(ALLOW_LIST_CAPACITY, 0);

#[map]
static CONFIG: HashMap<u32, ProbeConfig> = HashMap::with_max_entries(1, 0);

#[map]
static SYSCALL_EVENTS: PerfEventArray<SyscallEvent> = PerfEventArray::new(0);

#[map]
static SKIP_COUNTERS: PerCpuArray<u64> = PerCpuArray::with_max_entries(Skip::COUNT, 0);

// raw_syscalls/sys_enter: long id
const ID_OFFSET: usize = 8;

#[tracepoint]
pub fn sys_enter(ctx: TracePointContext) -> u32 {
    let outcome = try_sys_enter(&ctx);
    deliver(&SYSCALL_EVENTS, &ctx, &SKIP_COUNTERS, outcome);
    0
}

fn try_sys_enter(ctx: &TracePointContext) -> Result<SyscallEvent, Skip> {
    // SAFETY: offset matches the tracepoint format.
    let id: i64 = unsafe { ctx.read_at(ID_OFFSET) }.map_err(|_| Skip::ReadFailed)?;
    let config = load_config(&CONFIG);
    syscall_enter(
        &Table::new(&ALLOW_LIST),
        &CurrentTask::new(config),
        &config,
        id as u64,
    )
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
