//! Network lifecycle probe
//!
//! Programs in this object:
//! - `inet_sock_set_state` (tracepoint sock/inet_sock_set_state): TCP teardown
//! - `udp_sendmsg` (kprobe): datagram sends
//! - `tcp_v4_connect` / `tcp_v4_connect_ret` (kprobe + kretprobe): outbound connects
//! - `inet_csk_accept` / `inet_csk_accept_ret` (kprobe + kretprobe): inbound accepts
//!
//! Events go to `NETWORK_EVENTS`; invocations that end without one bump the
//! matching slot of `SKIP_COUNTERS`.

#![no_std]
#![no_main]

use aya_ebpf::{
    macros::{kprobe, kretprobe, map, tracepoint},
    maps::{HashMap, PerCpuArray, PerfEventArray},
    programs::{ProbeContext, RetProbeContext, TracePointContext},
};
use aya_log_ebpf::debug;
use nstrace_common::{
    config::{ALLOW_LIST_CAPACITY, CORRELATION_CAPACITY, EXCLUDE_LIST_CAPACITY},
    correlate::{Correlator, Operation},
    network::{NetworkHooks, StateChange},
    socket::SocketRef,
    NetworkEvent, Pending, ProbeConfig, Skip,
};
use nstrace_probes::{
    kernel::{CurrentTask, KernelSockets},
    maps::{count_skip, deliver, load_config, PendingTable, Table},
};

#[map]
static ALLOW_LIST: HashMap<u64, u32> = HashMap::with_max_entries(ALLOW_LIST_CAPACITY, 0);

#[map]
static EXCLUDE_LIST: HashMap<u32, u32> = HashMap::with_max_entries(EXCLUDE_LIST_CAPACITY, 0);

#[map]
static CONFIG: HashMap<u32, ProbeConfig> = HashMap::with_max_entries(1, 0);

#[map]
static CONNECT_PENDING: HashMap<u32, Pending> = HashMap::with_max_entries(CORRELATION_CAPACITY, 0);

#[map]
static ACCEPT_PENDING: HashMap<u32, Pending> = HashMap::with_max_entries(CORRELATION_CAPACITY, 0);

#[map]
static NETWORK_EVENTS: PerfEventArray<NetworkEvent> = PerfEventArray::new(0);

#[map]
static SKIP_COUNTERS: PerCpuArray<u64> = PerCpuArray::with_max_entries(Skip::COUNT, 0);

// sock/inet_sock_set_state record layout
const SKADDR_OFFSET: usize = 8;
const OLDSTATE_OFFSET: usize = 16;
const NEWSTATE_OFFSET: usize = 20;
const FAMILY_OFFSET: usize = 28;
const PROTOCOL_OFFSET: usize = 30;

type Hooks<'a> = NetworkHooks<
    'a,
    Table<'static, u64, u32>,
    Table<'static, u32, u32>,
    CurrentTask,
    KernelSockets,
>;

#[inline(always)]
fn with_hooks<R>(f: impl FnOnce(&Hooks<'_>) -> R) -> R {
    let config = load_config(&CONFIG);
    let allow = Table::new(&ALLOW_LIST);
    let exclude = Table::new(&EXCLUDE_LIST);
    let task = CurrentTask::new(config);
    let sockets = KernelSockets::new(config);
    f(&NetworkHooks::new(&allow, &exclude, &task, &sockets, config))
}

#[tracepoint]
pub fn inet_sock_set_state(ctx: TracePointContext) -> u32 {
    let outcome = try_inet_sock_set_state(&ctx);
    deliver(&NETWORK_EVENTS, &ctx, &SKIP_COUNTERS, outcome);
    0
}

fn try_inet_sock_set_state(ctx: &TracePointContext) -> Result<NetworkEvent, Skip> {
    // SAFETY: offsets match the tracepoint format.
    let change = unsafe {
        StateChange {
            socket: SocketRef(read(ctx, SKADDR_OFFSET)?),
            old_state: read::<i32>(ctx, OLDSTATE_OFFSET)? as u16,
            new_state: read::<i32>(ctx, NEWSTATE_OFFSET)? as u16,
            family: read(ctx, FAMILY_OFFSET)?,
            protocol: read(ctx, PROTOCOL_OFFSET)?,
        }
    };
    let event = with_hooks(|hooks| hooks.state_change(&change))?;
    debug!(ctx, "close {} -> {}", change.old_state, change.new_state);
    Ok(event)
}

#[inline(always)]
unsafe fn read<T>(ctx: &TracePointContext, offset: usize) -> Result<T, Skip> {
    ctx.read_at::<T>(offset).map_err(|_| Skip::ReadFailed)
}

#[kprobe]
pub fn udp_sendmsg(ctx: ProbeContext) -> u32 {
    let outcome = match ctx.arg::<u64>(0) {
        Some(sk) => with_hooks(|hooks| hooks.datagram_send(SocketRef(sk))),
        None => Err(Skip::ReadFailed),
    };
    deliver(&NETWORK_EVENTS, &ctx, &SKIP_COUNTERS, outcome);
    0
}

#[kprobe]
pub fn tcp_v4_connect(ctx: ProbeContext) -> u32 {
    let table = PendingTable::new(&CONNECT_PENDING);
    enter(&ctx, &Correlator::new(&table, Operation::Connect));
    0
}

#[kretprobe]
pub fn tcp_v4_connect_ret(ctx: RetProbeContext) -> u32 {
    // An unreadable return value counts as a failed connect so the entry still clears.
    let ret = ctx.ret::<i32>().map_or(-1, i64::from);
    let table = PendingTable::new(&CONNECT_PENDING);
    exit(&ctx, &Correlator::new(&table, Operation::Connect), ret);
    0
}

#[kprobe]
pub fn inet_csk_accept(ctx: ProbeContext) -> u32 {
    let table = PendingTable::new(&ACCEPT_PENDING);
    enter(&ctx, &Correlator::new(&table, Operation::Accept));
    0
}

#[kretprobe]
pub fn inet_csk_accept_ret(ctx: RetProbeContext) -> u32 {
    let ret = ctx.ret::<u64>().unwrap_or(0) as i64;
    let table = PendingTable::new(&ACCEPT_PENDING);
    exit(&ctx, &Correlator::new(&table, Operation::Accept), ret);
    0
}

#[inline(always)]
fn enter(ctx: &ProbeContext, correlator: &Correlator<'_, PendingTable<'_>>) {
    let outcome = match ctx.arg::<u64>(0) {
        Some(sk) => with_hooks(|hooks| hooks.enter(correlator, SocketRef(sk))),
        None => Err(Skip::ReadFailed),
    };
    match outcome {
        Ok(()) => {}
        Err(Skip::TableFull) => {
            debug!(ctx, "correlation table full, entry dropped");
            count_skip(&SKIP_COUNTERS, Skip::TableFull);
        }
        Err(skip) => count_skip(&SKIP_COUNTERS, skip),
    }
}

#[inline(always)]
fn exit(ctx: &RetProbeContext, correlator: &Correlator<'_, PendingTable<'_>>, ret: i64) {
    let outcome = with_hooks(|hooks| hooks.exit(correlator, ret));
    if let Ok(event) = &outcome {
        debug!(ctx, "correlated kind={}", event.kind);
    }
    deliver(&NETWORK_EVENTS, ctx, &SKIP_COUNTERS, outcome);
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
