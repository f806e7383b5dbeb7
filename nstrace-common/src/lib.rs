//! Shared types and in-kernel logic for nstrace
//!
//! This crate is compiled twice: once for the `bpfel-unknown-none` target as a
//! dependency of `nstrace-probes`, and once for the host with the `userspace`
//! feature. Everything a probe decides (namespace gating, exclusion, entry/exit
//! correlation, classification) lives here behind small traits so the same code
//! runs in the kernel and under `cargo test`.
//!
//! Event structures must be:
//! - `#[repr(C)]` with explicit padding, so no uninitialised bytes reach the
//!   perf buffer
//! - `no_std` compatible for eBPF
//! - shared byte-for-byte between kernel probes and the userspace consumer

#![cfg_attr(not(feature = "userspace"), no_std)]

pub mod classify;
pub mod config;
pub mod correlate;
pub mod emit;
pub mod filter;
pub mod network;
pub mod packet;
pub mod skip;
pub mod socket;
pub mod syscall;

#[cfg(feature = "userspace")]
pub mod decode;

pub use config::ProbeConfig;
pub use skip::Skip;

/// Network connection lifecycle event
///
/// Layout (32 bytes total, 8-byte aligned):
/// - context_id: namespace inum of the task that triggered the hook
/// - src_addr: local IPv4 address (network byte order)
/// - src_port: local port (host byte order)
/// - dst_addr: remote IPv4 address (network byte order)
/// - dst_port: remote port (host byte order)
/// - old_state / new_state: TCP state codes, zero unless produced by a state transition
/// - kind: see [`kind`]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct NetworkEvent {
    pub context_id: u64,
    pub src_addr: u32,
    pub src_port: u16,
    pub _pad0: u16,
    pub dst_addr: u32,
    pub dst_port: u16,
    pub old_state: u16,
    pub new_state: u16,
    pub kind: u16,
    pub _pad1: u32,
}

/// Raw syscall entry event
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct SyscallEvent {
    pub context_id: u64,
    pub syscall_number: u64,
}

/// Ingress packet event from the XDP path
///
/// `src_addr` is copied straight from the IPv4 header (network byte order).
/// `syn` and `ack` are the TCP flag bits (0 or 1).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct PacketEvent {
    pub context_id: u64,
    pub src_addr: u32,
    pub syn: u16,
    pub ack: u16,
    pub ingress_if_index: u32,
    pub _padding: u32,
}

/// Value stored in a correlation table between an entry hook and its exit hook
///
/// `socket` is the kernel address of the `struct sock` seen at entry. It is
/// never dereferenced directly, only handed back to a [`socket::SocketReader`].
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pending {
    pub socket: u64,
}

/// Event kind constants carried in [`NetworkEvent::kind`]
pub mod kind {
    /// Not reportable. Never emitted.
    pub const UNSET: u16 = 0;
    /// Outbound: connect completed, or local side started closing.
    pub const EGRESS: u16 = 1;
    /// Inbound: accept completed, or remote side closed first.
    pub const INGRESS: u16 = 2;
    pub const DATAGRAM_SEND: u16 = 3;
}

/// TCP state codes as reported by `inet_sock_set_state`
pub mod tcp_state {
    pub const ESTABLISHED: u16 = 1;
    pub const SYN_SENT: u16 = 2;
    pub const SYN_RECV: u16 = 3;
    pub const FIN_WAIT1: u16 = 4;
    pub const FIN_WAIT2: u16 = 5;
    pub const TIME_WAIT: u16 = 6;
    pub const CLOSE: u16 = 7;
    pub const CLOSE_WAIT: u16 = 8;
    pub const LAST_ACK: u16 = 9;
    pub const LISTEN: u16 = 10;
    pub const CLOSING: u16 = 11;
}

/// Address family and protocol constants
pub mod proto {
    pub const AF_INET: u16 = 2;
    pub const IPPROTO_TCP: u16 = 6;
}

const _: () = {
    assert!(
        core::mem::size_of::<NetworkEvent>() == 32,
        "NetworkEvent must be exactly 32 bytes"
    );
    assert!(
        core::mem::align_of::<NetworkEvent>() == 8,
        "NetworkEvent must be 8-byte aligned"
    );
    assert!(
        core::mem::size_of::<SyscallEvent>() == 16,
        "SyscallEvent must be exactly 16 bytes"
    );
    assert!(
        core::mem::size_of::<PacketEvent>() == 24,
        "PacketEvent must be exactly 24 bytes"
    );
    assert!(
        core::mem::size_of::<Pending>() == 8,
        "Pending must be exactly 8 bytes"
    );
};

#[cfg(all(feature = "userspace", target_os = "linux"))]
mod pod {
    use super::*;

    // SAFETY: all types are #[repr(C)], Copy, and have no implicit padding.
    unsafe impl aya::Pod for NetworkEvent {}
    unsafe impl aya::Pod for SyscallEvent {}
    unsafe impl aya::Pod for PacketEvent {}
    unsafe impl aya::Pod for Pending {}
    unsafe impl aya::Pod for ProbeConfig {}
}
