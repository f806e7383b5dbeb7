//! Event classification
//!
//! Three independent detectors, each mapping raw hook inputs to an event kind:
//!
//! - [`transition`]: `inet_sock_set_state` old/new pairs. Only teardown
//!   transitions are reportable.
//! - [`Operation::kind`](crate::correlate::Operation::kind): which entry/exit
//!   pair fired. Used for connection establishment.
//! - [`datagram`]: every admitted `udp_sendmsg`.
//!
//! The detectors observe different lifecycle moments and run side by side. A
//! connection reported as connected and later as closing yields two events.

use crate::kind;
use crate::tcp_state::{CLOSE_WAIT, ESTABLISHED, FIN_WAIT1, LAST_ACK};

/// Classify a TCP state transition.
///
/// - `ESTABLISHED -> FIN_WAIT1`: local side closes first (egress)
/// - `CLOSE_WAIT -> LAST_ACK`: remote side closed first (ingress)
///
/// Everything else is [`kind::UNSET`].
#[inline(always)]
pub const fn transition(old_state: u16, new_state: u16) -> u16 {
    match (old_state, new_state) {
        (ESTABLISHED, FIN_WAIT1) => kind::EGRESS,
        (CLOSE_WAIT, LAST_ACK) => kind::INGRESS,
        _ => kind::UNSET,
    }
}

#[inline(always)]
pub const fn datagram() -> u16 {
    kind::DATAGRAM_SEND
}

#[inline(always)]
pub const fn is_reportable(kind: u16) -> bool {
    kind != kind::UNSET
}
