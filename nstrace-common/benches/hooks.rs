use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashSet;

use nstrace_common::filter::{admit, Lookup};
use nstrace_common::network::{NetworkHooks, StateChange};
use nstrace_common::proto::{AF_INET, IPPROTO_TCP};
use nstrace_common::socket::{SockTuple, SocketReader, SocketRef, TaskContext};
use nstrace_common::tcp_state::{ESTABLISHED, FIN_WAIT1, SYN_SENT};
use nstrace_common::{classify, ProbeConfig};

struct Set<K>(HashSet<K>);

impl<K: std::hash::Hash + Eq> Lookup<K> for Set<K> {
    fn contains(&self, key: &K) -> bool {
        self.0.contains(key)
    }
}

struct Task;

impl TaskContext for Task {
    fn thread_id(&self) -> u32 {
        1
    }
    fn pid_namespace(&self) -> Option<u64> {
        Some(4026532200)
    }
    fn mount_namespace(&self) -> Option<u64> {
        None
    }
}

struct Socket(SockTuple);

impl SocketReader for Socket {
    fn tuple(&self, _socket: SocketRef) -> Option<SockTuple> {
        Some(self.0)
    }
    fn namespace(&self, _socket: SocketRef) -> Option<u64> {
        None
    }
}

const TUPLE: SockTuple = SockTuple {
    family: AF_INET,
    src_addr: 0x0500_000a,
    src_port: 51000,
    dst_addr: 0x22d8_b85d,
    dst_port: 443,
};

fn bench_classify(c: &mut Criterion) {
    c.bench_function("transition", |b| {
        b.iter(|| classify::transition(black_box(ESTABLISHED), black_box(FIN_WAIT1)))
    });

    let exclude = Set((0..1024u32).collect::<HashSet<_>>());
    c.bench_function("admit", |b| b.iter(|| admit(&exclude, black_box(&TUPLE))));
}

fn bench_state_change(c: &mut Criterion) {
    let allow = Set(HashSet::from([4026532200u64]));
    let exclude = Set(HashSet::new());
    let socket = Socket(TUPLE);
    let hooks = NetworkHooks::new(&allow, &exclude, &Task, &socket, ProbeConfig::DEFAULT);

    let reportable = StateChange {
        socket: SocketRef(1),
        old_state: ESTABLISHED,
        new_state: FIN_WAIT1,
        family: AF_INET,
        protocol: IPPROTO_TCP,
    };
    let ignored = StateChange {
        old_state: SYN_SENT,
        new_state: ESTABLISHED,
        ..reportable
    };

    c.bench_function("state_change_reported", |b| {
        b.iter(|| hooks.state_change(black_box(&reportable)))
    });
    c.bench_function("state_change_ignored", |b| {
        b.iter(|| hooks.state_change(black_box(&ignored)))
    });
}

criterion_group!(benches, bench_classify, bench_state_change);
criterion_main!(benches);
