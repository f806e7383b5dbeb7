//! Userspace view of the records
//!
//! Decoding from raw perf buffer samples plus a few accessors that put the
//! wire fields into std types. Aggregation and presentation belong to the
//! consumer, not here.

use std::fmt;
use std::mem;
use std::net::Ipv4Addr;

use serde::Serialize;
use thiserror::Error;

use crate::tcp_state::{CLOSE_WAIT, ESTABLISHED, FIN_WAIT1, LAST_ACK};
use crate::{kind, NetworkEvent, PacketEvent, SyscallEvent};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("{record} sample has {actual} bytes, expected {expected}")]
    Length {
        record: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Fixed-layout record that can be copied out of a perf sample.
pub trait Record: Copy {
    const NAME: &'static str;

    fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let expected = mem::size_of::<Self>();
        if bytes.len() != expected {
            return Err(RecordError::Length {
                record: Self::NAME,
                expected,
                actual: bytes.len(),
            });
        }
        // SAFETY: length checked, every record is #[repr(C)] plain data.
        Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const Self) })
    }
}

impl Record for NetworkEvent {
    const NAME: &'static str = "network";
}

impl Record for SyscallEvent {
    const NAME: &'static str = "syscall";
}

impl Record for PacketEvent {
    const NAME: &'static str = "packet";
}

/// Connection lifecycle moment a [`NetworkEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Connect,
    Accept,
    DatagramSend,
    EgressClose,
    IngressClose,
}

impl Lifecycle {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Connect => "connect",
            Lifecycle::Accept => "accept",
            Lifecycle::DatagramSend => "datagram_send",
            Lifecycle::EgressClose => "egress_close",
            Lifecycle::IngressClose => "ingress_close",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl NetworkEvent {
    pub fn src_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from_be(self.src_addr))
    }

    pub fn dst_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from_be(self.dst_addr))
    }

    /// `None` for an unset kind or a state pair no detector produces.
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        match (self.kind, self.old_state, self.new_state) {
            (kind::EGRESS, 0, 0) => Some(Lifecycle::Connect),
            (kind::INGRESS, 0, 0) => Some(Lifecycle::Accept),
            (kind::DATAGRAM_SEND, _, _) => Some(Lifecycle::DatagramSend),
            (kind::EGRESS, ESTABLISHED, FIN_WAIT1) => Some(Lifecycle::EgressClose),
            (kind::INGRESS, CLOSE_WAIT, LAST_ACK) => Some(Lifecycle::IngressClose),
            _ => None,
        }
    }
}

impl PacketEvent {
    pub fn src_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from_be(self.src_addr))
    }
}
