//! Ingress packet inspection (XDP path)
//!
//! Reads the Ethernet, IPv4 and TCP headers of an incoming frame and records
//! the source address and SYN/ACK bits. Frames are never modified. A frame too
//! short to hold its Ethernet or IPv4 header is dropped as malformed; every
//! other frame passes, with or without an event.
//!
//! By default this path does not consult the namespace allow-list or the
//! exclude-list. Setting [`flags::PACKET_NAMESPACE_GATE`] applies the
//! allow-list to the mount namespace the record is tagged with.

use core::mem;

use network_types::{
    eth::{EthHdr, EtherType},
    ip::{IpProto, Ipv4Hdr},
    tcp::TcpHdr,
};

use crate::config::{flags, ProbeConfig};
use crate::filter::{monitored, Lookup};
use crate::socket::TaskContext;
use crate::{PacketEvent, Skip};

/// `ether_type` within the Ethernet header.
const ETHER_TYPE_OFFSET: usize = 12;
/// `protocol` within the IPv4 header.
const IP_PROTO_OFFSET: usize = 9;
/// `saddr` within the IPv4 header.
const IP_SRC_OFFSET: usize = 12;

/// Bounds-checked access to packet bytes.
pub trait Frame {
    /// Copy a `T` out of the frame at `offset`, or `None` if it would run past
    /// the end.
    ///
    /// # Safety
    ///
    /// Every bit pattern must be a valid `T`: plain integers, byte arrays, or
    /// structs made only of those.
    unsafe fn load<T: Copy>(&self, offset: usize) -> Option<T>;
}

impl Frame for [u8] {
    #[inline(always)]
    unsafe fn load<T: Copy>(&self, offset: usize) -> Option<T> {
        let end = offset.checked_add(mem::size_of::<T>())?;
        if end > self.len() {
            return None;
        }
        Some(core::ptr::read_unaligned(self.as_ptr().add(offset) as *const T))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Drop,
}

/// What the packet hook returns to the kernel, and what it reports.
#[derive(Clone, Copy, Debug)]
pub struct Inspection {
    pub verdict: Verdict,
    pub outcome: Result<PacketEvent, Skip>,
}

impl Inspection {
    #[inline(always)]
    fn pass(outcome: Result<PacketEvent, Skip>) -> Self {
        Self {
            verdict: Verdict::Pass,
            outcome,
        }
    }

    #[inline(always)]
    fn malformed() -> Self {
        Self {
            verdict: Verdict::Drop,
            outcome: Err(Skip::Malformed),
        }
    }
}

/// Parse one ingress frame.
///
/// Ethertype and IP protocol are compared as raw integers before anything
/// else is read, so unknown values never become `EtherType` or `IpProto`.
#[inline(always)]
pub fn inspect<F, A, T>(
    frame: &F,
    ingress_if_index: u32,
    allow: &A,
    task: &T,
    config: &ProbeConfig,
) -> Inspection
where
    F: Frame + ?Sized,
    A: Lookup<u64>,
    T: TaskContext,
{
    // SAFETY: u16 accepts any bit pattern. Reaching offset 14 proves the
    // Ethernet header is complete.
    let ether_type: u16 = match unsafe { frame.load(ETHER_TYPE_OFFSET) } {
        Some(ether_type) => ether_type,
        None => return Inspection::malformed(),
    };
    if ether_type != EtherType::Ipv4 as u16 {
        return Inspection::pass(Err(Skip::NotIpv4));
    }

    // SAFETY: byte array.
    let ip: [u8; Ipv4Hdr::LEN] = match unsafe { frame.load(EthHdr::LEN) } {
        Some(ip) => ip,
        None => return Inspection::malformed(),
    };
    let ihl = (ip[0] & 0x0f) as usize;
    if ihl < 5 {
        return Inspection::malformed();
    }
    if ip[IP_PROTO_OFFSET] != IpProto::Tcp as u8 {
        return Inspection::pass(Err(Skip::NotTcp));
    }
    let src_addr = u32::from_ne_bytes([
        ip[IP_SRC_OFFSET],
        ip[IP_SRC_OFFSET + 1],
        ip[IP_SRC_OFFSET + 2],
        ip[IP_SRC_OFFSET + 3],
    ]);

    // SAFETY: TcpHdr holds only integer fields.
    let tcp: TcpHdr = match unsafe { frame.load(EthHdr::LEN + ihl * 4) } {
        Some(tcp) => tcp,
        None => return Inspection::pass(Err(Skip::ReadFailed)),
    };

    let context = task.mount_namespace();
    let context_id = if config.enabled(flags::PACKET_NAMESPACE_GATE) {
        match monitored(allow, context) {
            Ok(inum) => inum,
            Err(skip) => return Inspection::pass(Err(skip)),
        }
    } else {
        context.unwrap_or(0)
    };

    Inspection::pass(Ok(PacketEvent {
        context_id,
        src_addr,
        syn: tcp.syn(),
        ack: tcp.ack(),
        ingress_if_index,
        _padding: 0,
    }))
}
