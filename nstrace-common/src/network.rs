//! Network hook pipelines
//!
//! Every pipeline follows the same order: detector enabled, namespace gate,
//! address extraction, address gate, classification. The result is either a
//! finished [`NetworkEvent`] or the [`Skip`] that stopped it.

use crate::classify;
use crate::config::{flags, ProbeConfig};
use crate::correlate::{CorrelationTable, Correlator, Operation};
use crate::filter::{admit, monitored, socket_monitored, Lookup};
use crate::proto::{AF_INET, IPPROTO_TCP};
use crate::socket::{SockTuple, SocketReader, SocketRef, TaskContext};
use crate::{NetworkEvent, Skip};

/// Arguments of the `sock/inet_sock_set_state` tracepoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateChange {
    pub socket: SocketRef,
    pub old_state: u16,
    pub new_state: u16,
    pub family: u16,
    pub protocol: u16,
}

/// Everything a network hook reads: both filter tables, the current task,
/// kernel sockets, and the active configuration.
pub struct NetworkHooks<'a, A, E, T, S> {
    allow: &'a A,
    exclude: &'a E,
    task: &'a T,
    sockets: &'a S,
    config: ProbeConfig,
}

impl<'a, A, E, T, S> NetworkHooks<'a, A, E, T, S>
where
    A: Lookup<u64>,
    E: Lookup<u32>,
    T: TaskContext,
    S: SocketReader,
{
    pub fn new(
        allow: &'a A,
        exclude: &'a E,
        task: &'a T,
        sockets: &'a S,
        config: ProbeConfig,
    ) -> Self {
        Self {
            allow,
            exclude,
            task,
            sockets,
            config,
        }
    }

    #[inline(always)]
    fn require(&self, flag: u32) -> Result<(), Skip> {
        if self.config.enabled(flag) {
            Ok(())
        } else {
            Err(Skip::Disabled)
        }
    }

    #[inline(always)]
    fn context(&self) -> Result<u64, Skip> {
        monitored(self.allow, self.task.pid_namespace())
    }

    #[inline(always)]
    fn socket_context(&self, socket: SocketRef) -> Result<(), Skip> {
        if !self.config.has_socket_namespace() {
            return Ok(());
        }
        socket_monitored(self.allow, self.sockets.namespace(socket))
    }

    #[inline(always)]
    fn admitted_tuple(&self, socket: SocketRef) -> Result<SockTuple, Skip> {
        let tuple = self.sockets.tuple(socket).ok_or(Skip::ReadFailed)?;
        admit(self.exclude, &tuple)?;
        Ok(tuple)
    }

    /// Teardown detection from `inet_sock_set_state`.
    pub fn state_change(&self, change: &StateChange) -> Result<NetworkEvent, Skip> {
        self.require(flags::STATE_TRANSITIONS)?;
        let context_id = self.context()?;

        if change.family != AF_INET {
            return Err(Skip::NotIpv4);
        }
        if change.protocol != IPPROTO_TCP {
            return Err(Skip::NotTcp);
        }

        let tuple = self.admitted_tuple(change.socket)?;
        let kind = classify::transition(change.old_state, change.new_state);
        if !classify::is_reportable(kind) {
            return Err(Skip::NotReportable);
        }

        let mut event = event(context_id, &tuple, kind);
        event.old_state = change.old_state;
        event.new_state = change.new_state;
        Ok(event)
    }

    /// `udp_sendmsg` entry. Single phase, no correlation.
    pub fn datagram_send(&self, socket: SocketRef) -> Result<NetworkEvent, Skip> {
        self.require(flags::DATAGRAM)?;
        let context_id = self.context()?;
        let tuple = self.admitted_tuple(socket)?;
        Ok(event(context_id, &tuple, classify::datagram()))
    }

    /// Entry half of a correlated operation: gate, then remember the socket.
    pub fn enter<C: CorrelationTable>(
        &self,
        correlator: &Correlator<'_, C>,
        socket: SocketRef,
    ) -> Result<(), Skip> {
        self.require(operation_flag(correlator.operation()))?;
        self.context()?;
        self.socket_context(socket)?;
        correlator.begin(self.task.thread_id(), socket)
    }

    /// Exit half of a correlated operation.
    ///
    /// The pending entry is removed first, whatever happens next.
    pub fn exit<C: CorrelationTable>(
        &self,
        correlator: &Correlator<'_, C>,
        ret: i64,
    ) -> Result<NetworkEvent, Skip> {
        let socket = correlator.finish(self.task.thread_id(), ret)?;
        let context_id = self.context()?;
        self.socket_context(socket)?;
        let tuple = self.admitted_tuple(socket)?;
        Ok(event(context_id, &tuple, correlator.operation().kind()))
    }
}

const fn operation_flag(operation: Operation) -> u32 {
    match operation {
        Operation::Connect => flags::CONNECT,
        Operation::Accept => flags::ACCEPT,
    }
}

#[inline(always)]
fn event(context_id: u64, tuple: &SockTuple, kind: u16) -> NetworkEvent {
    NetworkEvent {
        context_id,
        src_addr: tuple.src_addr,
        src_port: tuple.src_port,
        _pad0: 0,
        dst_addr: tuple.dst_addr,
        dst_port: tuple.dst_port,
        old_state: 0,
        new_state: 0,
        kind,
        _pad1: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind;
    use crate::tcp_state::{CLOSE_WAIT, ESTABLISHED, FIN_WAIT1, LAST_ACK, SYN_SENT};
    use crate::Pending;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    const NS: u64 = 4026532200;
    const SOCK: SocketRef = SocketRef(0xffff_8880_1234_0000);

    struct Set<K>(HashSet<K>);

    impl<K: std::hash::Hash + Eq> Lookup<K> for Set<K> {
        fn contains(&self, key: &K) -> bool {
            self.0.contains(key)
        }
    }

    struct Task {
        tid: u32,
        ns: Option<u64>,
    }

    impl TaskContext for Task {
        fn thread_id(&self) -> u32 {
            self.tid
        }
        fn pid_namespace(&self) -> Option<u64> {
            self.ns
        }
        fn mount_namespace(&self) -> Option<u64> {
            None
        }
    }

    struct Sockets {
        tuples: HashMap<u64, SockTuple>,
        namespaces: HashMap<u64, u64>,
    }

    impl SocketReader for Sockets {
        fn tuple(&self, socket: SocketRef) -> Option<SockTuple> {
            self.tuples.get(&socket.0).copied()
        }
        fn namespace(&self, socket: SocketRef) -> Option<u64> {
            self.namespaces.get(&socket.0).copied()
        }
    }

    struct Table(RefCell<HashMap<u32, Pending>>);

    impl CorrelationTable for Table {
        fn insert(&self, thread_id: u32, pending: Pending) -> Result<(), Skip> {
            self.0.borrow_mut().insert(thread_id, pending);
            Ok(())
        }
        fn take(&self, thread_id: u32) -> Option<Pending> {
            self.0.borrow_mut().remove(&thread_id)
        }
    }

    fn ip(a: u8, b: u8, c: u8, d: u8) -> u32 {
        u32::from_be_bytes([a, b, c, d]).to_be()
    }

    fn tuple(dst: u32) -> SockTuple {
        SockTuple {
            family: AF_INET,
            src_addr: ip(10, 0, 0, 5),
            src_port: 51000,
            dst_addr: dst,
            dst_port: 443,
        }
    }

    fn sockets(t: SockTuple) -> Sockets {
        Sockets {
            tuples: HashMap::from([(SOCK.0, t)]),
            namespaces: HashMap::new(),
        }
    }

    fn change(old_state: u16, new_state: u16) -> StateChange {
        StateChange {
            socket: SOCK,
            old_state,
            new_state,
            family: AF_INET,
            protocol: IPPROTO_TCP,
        }
    }

    #[test]
    fn test_state_change_egress_close() {
        let allow = Set(HashSet::from([NS]));
        let exclude = Set(HashSet::new());
        let task = Task {
            tid: 1,
            ns: Some(NS),
        };
        let socks = sockets(tuple(ip(1, 1, 1, 1)));
        let hooks = NetworkHooks::new(&allow, &exclude, &task, &socks, ProbeConfig::DEFAULT);

        let event = hooks
            .state_change(&change(ESTABLISHED, FIN_WAIT1))
            .expect("Should report egress close");
        assert_eq!(event.kind, kind::EGRESS);
        assert_eq!(event.old_state, ESTABLISHED);
        assert_eq!(event.new_state, FIN_WAIT1);
        assert_eq!(event.context_id, NS);

        let event = hooks
            .state_change(&change(CLOSE_WAIT, LAST_ACK))
            .expect("Should report ingress close");
        assert_eq!(event.kind, kind::INGRESS);
    }

    #[test]
    fn test_state_change_filters() {
        let allow = Set(HashSet::from([NS]));
        let exclude = Set(HashSet::new());
        let task = Task {
            tid: 1,
            ns: Some(NS),
        };
        let socks = sockets(tuple(ip(1, 1, 1, 1)));
        let hooks = NetworkHooks::new(&allow, &exclude, &task, &socks, ProbeConfig::DEFAULT);

        assert_eq!(
            hooks.state_change(&change(SYN_SENT, ESTABLISHED)),
            Err(Skip::NotReportable)
        );

        let mut ipv6 = change(ESTABLISHED, FIN_WAIT1);
        ipv6.family = 10;
        assert_eq!(hooks.state_change(&ipv6), Err(Skip::NotIpv4));

        let mut sctp = change(ESTABLISHED, FIN_WAIT1);
        sctp.protocol = 132;
        assert_eq!(hooks.state_change(&sctp), Err(Skip::NotTcp));
    }

    #[test]
    fn test_detector_can_be_disabled() {
        let allow = Set(HashSet::from([NS]));
        let exclude = Set(HashSet::new());
        let task = Task {
            tid: 1,
            ns: Some(NS),
        };
        let socks = sockets(tuple(ip(1, 1, 1, 1)));
        let config = ProbeConfig::DEFAULT.with_flags(flags::CONNECT);
        let hooks = NetworkHooks::new(&allow, &exclude, &task, &socks, config);

        assert_eq!(
            hooks.state_change(&change(ESTABLISHED, FIN_WAIT1)),
            Err(Skip::Disabled)
        );
        assert_eq!(hooks.datagram_send(SOCK), Err(Skip::Disabled));
    }

    #[test]
    fn test_datagram_send_unspecified_destination() {
        let allow = Set(HashSet::from([NS]));
        let exclude = Set(HashSet::new());
        let task = Task {
            tid: 1,
            ns: Some(NS),
        };
        let socks = sockets(tuple(0));
        let hooks = NetworkHooks::new(&allow, &exclude, &task, &socks, ProbeConfig::DEFAULT);

        assert_eq!(hooks.datagram_send(SOCK), Err(Skip::UnspecifiedDestination));
    }

    #[test]
    fn test_unreadable_socket() {
        let allow = Set(HashSet::from([NS]));
        let exclude = Set(HashSet::new());
        let task = Task {
            tid: 1,
            ns: Some(NS),
        };
        let socks = sockets(tuple(ip(1, 1, 1, 1)));
        let hooks = NetworkHooks::new(&allow, &exclude, &task, &socks, ProbeConfig::DEFAULT);

        assert_eq!(
            hooks.datagram_send(SocketRef(0xdead)),
            Err(Skip::ReadFailed)
        );
    }

    #[test]
    fn test_socket_namespace_revalidated_when_configured() {
        let allow = Set(HashSet::from([NS]));
        let exclude = Set(HashSet::new());
        let task = Task {
            tid: 9,
            ns: Some(NS),
        };
        let mut socks = sockets(tuple(ip(1, 1, 1, 1)));
        socks.namespaces.insert(SOCK.0, 4026531840);
        let table = Table(RefCell::new(HashMap::new()));
        let accept = Correlator::new(&table, Operation::Accept);

        let mut config = ProbeConfig::DEFAULT;
        config.sock_net_offset = 0x30;
        config.net_ns_inum_offset = 0xe0;
        let hooks = NetworkHooks::new(&allow, &exclude, &task, &socks, config);
        assert_eq!(hooks.enter(&accept, SOCK), Err(Skip::NotMonitored));
        assert!(table.0.borrow().is_empty());

        // offsets unknown: only the task namespace is checked
        let hooks = NetworkHooks::new(&allow, &exclude, &task, &socks, ProbeConfig::DEFAULT);
        assert_eq!(hooks.enter(&accept, SOCK), Ok(()));
        assert_eq!(table.0.borrow().len(), 1);
    }

    #[test]
    fn test_exit_releases_entry_before_namespace_check() {
        let allow = Set(HashSet::from([NS]));
        let exclude = Set(HashSet::new());
        let socks = sockets(tuple(ip(1, 1, 1, 1)));
        let table = Table(RefCell::new(HashMap::new()));
        let connect = Correlator::new(&table, Operation::Connect);

        let entering = Task {
            tid: 3,
            ns: Some(NS),
        };
        let hooks = NetworkHooks::new(&allow, &exclude, &entering, &socks, ProbeConfig::DEFAULT);
        hooks.enter(&connect, SOCK).expect("Should record entry");

        let migrated = Task {
            tid: 3,
            ns: Some(1),
        };
        let hooks = NetworkHooks::new(&allow, &exclude, &migrated, &socks, ProbeConfig::DEFAULT);
        assert_eq!(hooks.exit(&connect, 0), Err(Skip::NotMonitored));
        assert!(table.0.borrow().is_empty());
    }
}
