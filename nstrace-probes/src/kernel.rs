//! Kernel memory views: current task namespaces, socket tuples, packet frames
//!
//! No BTF bindings are compiled in. Struct offsets for the namespace chains come
//! from [`ProbeConfig`]; a zero offset means it is unknown and the lookup yields
//! `None`. The `sock_common` head layout is stable on every supported kernel.

use core::mem;

use aya_ebpf::{
    helpers::{bpf_get_current_pid_tgid, bpf_probe_read_kernel, gen::bpf_get_current_task},
    programs::XdpContext,
};
use nstrace_common::{
    packet::Frame,
    socket::{SockTuple, SocketReader, SocketRef, TaskContext},
    ProbeConfig,
};

/// First 20 bytes of `struct sock_common`.
#[repr(C)]
#[derive(Clone, Copy)]
struct SockCommonHead {
    skc_daddr: u32,
    skc_rcv_saddr: u32,
    skc_hash: u32,
    skc_dport: u16,
    skc_num: u16,
    skc_family: u16,
    _state_reuse: u16,
}

#[inline(always)]
fn read_field<T: Copy>(base: u64, offset: u32) -> Option<T> {
    if base == 0 {
        return None;
    }
    let src = (base + offset as u64) as *const T;
    // SAFETY: bpf_probe_read_kernel validates the address and fails cleanly.
    unsafe { bpf_probe_read_kernel(src) }.ok()
}

#[inline(always)]
fn read_pointer(base: u64, offset: u32) -> Option<u64> {
    read_field::<u64>(base, offset).filter(|ptr| *ptr != 0)
}

/// The task the program is running on behalf of.
pub struct CurrentTask {
    config: ProbeConfig,
}

impl CurrentTask {
    #[inline(always)]
    pub const fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    #[inline(always)]
    fn namespace(&self, nsproxy_offset: u32, inum_offset: u32) -> Option<u64> {
        let task_offset = self.config.task_nsproxy_offset;
        if task_offset == 0 || nsproxy_offset == 0 || inum_offset == 0 {
            return None;
        }
        // SAFETY: returns the address of the current task_struct, never dereferenced directly.
        let task = unsafe { bpf_get_current_task() };
        let nsproxy = read_pointer(task, task_offset)?;
        let ns = read_pointer(nsproxy, nsproxy_offset)?;
        read_field::<u32>(ns, inum_offset).map(u64::from)
    }
}

impl TaskContext for CurrentTask {
    #[inline(always)]
    fn thread_id(&self) -> u32 {
        bpf_get_current_pid_tgid() as u32
    }

    #[inline(always)]
    fn pid_namespace(&self) -> Option<u64> {
        self.namespace(
            self.config.nsproxy_pid_ns_offset,
            self.config.pid_ns_inum_offset,
        )
    }

    #[inline(always)]
    fn mount_namespace(&self) -> Option<u64> {
        self.namespace(
            self.config.nsproxy_mnt_ns_offset,
            self.config.mnt_ns_inum_offset,
        )
    }
}

/// `struct sock` reader.
pub struct KernelSockets {
    config: ProbeConfig,
}

impl KernelSockets {
    #[inline(always)]
    pub const fn new(config: ProbeConfig) -> Self {
        Self { config }
    }
}

impl SocketReader for KernelSockets {
    #[inline(always)]
    fn tuple(&self, socket: SocketRef) -> Option<SockTuple> {
        let head = read_field::<SockCommonHead>(socket.0, 0)?;
        Some(SockTuple {
            family: head.skc_family,
            src_addr: head.skc_rcv_saddr,
            src_port: head.skc_num,
            dst_addr: head.skc_daddr,
            dst_port: u16::from_be(head.skc_dport),
        })
    }

    #[inline(always)]
    fn namespace(&self, socket: SocketRef) -> Option<u64> {
        if !self.config.has_socket_namespace() {
            return None;
        }
        let net = read_pointer(socket.0, self.config.sock_net_offset)?;
        read_field::<u32>(net, self.config.net_ns_inum_offset).map(u64::from)
    }
}

/// Packet bytes between `data` and `data_end`.
pub struct XdpFrame<'a>(&'a XdpContext);

impl<'a> XdpFrame<'a> {
    #[inline(always)]
    pub const fn new(ctx: &'a XdpContext) -> Self {
        Self(ctx)
    }
}

impl Frame for XdpFrame<'_> {
    #[inline(always)]
    unsafe fn load<T: Copy>(&self, offset: usize) -> Option<T> {
        let start = self.0.data();
        let end = self.0.data_end();
        if start + offset + mem::size_of::<T>() > end {
            return None;
        }
        // Bounds checked against data_end for the verifier. The caller
        // guarantees any bit pattern is a valid T.
        Some(core::ptr::read_unaligned((start + offset) as *const T))
    }
}
