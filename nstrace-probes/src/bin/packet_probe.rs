//! XDP ingress probe
//!
//! Records the source address and SYN/ACK bits of incoming TCP/IPv4 frames.
//! Frames are never rewritten. Only frames too short for their Ethernet or
//! IPv4 header are dropped.

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::xdp_action,
    macros::{map, xdp},
    maps::{HashMap, PerCpuArray, PerfEventArray},
    programs::XdpContext,
};
use aya_log_ebpf::debug;
use nstrace_common::{
    config::ALLOW_LIST_CAPACITY,
    packet::{inspect, Verdict},
    PacketEvent, ProbeConfig, Skip,
};
use nstrace_probes::{
    kernel::{CurrentTask, XdpFrame},
    maps::{deliver, load_config, Table},
};

#[map]
static ALLOW_LIST: HashMap<u64, u32> = HashMap::with_max_entries(ALLOW_LIST_CAPACITY, 0);

#[map]
static CONFIG: HashMap<u32, ProbeConfig> = HashMap::with_max_entries(1, 0);

#[map]
static PACKET_EVENTS: PerfEventArray<PacketEvent> = PerfEventArray::new(0);

#[map]
static SKIP_COUNTERS: PerCpuArray<u64> = PerCpuArray::with_max_entries(Skip::COUNT, 0);

#[xdp]
pub fn packet_ingress(ctx: XdpContext) -> u32 {
    let config = load_config(&CONFIG);
    // SAFETY: ctx.ctx is the xdp_md the kernel passed in.
    let if_index = unsafe { (*ctx.ctx).ingress_ifindex };
    let inspection = inspect(
        &XdpFrame::new(&ctx),
        if_index,
        &Table::new(&ALLOW_LIST),
        &CurrentTask::new(config),
        &config,
    );

    deliver(&PACKET_EVENTS, &ctx, &SKIP_COUNTERS, inspection.outcome);
    match inspection.verdict {
        Verdict::Pass => xdp_action::XDP_PASS,
        Verdict::Drop => {
            debug!(&ctx, "malformed frame on ifindex {}", if_index);
            xdp_action::XDP_DROP
        }
    }
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
