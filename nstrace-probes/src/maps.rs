//! Map wrappers implementing the common lookup, correlation and sink traits

use aya_ebpf::{
    maps::{HashMap, PerCpuArray, PerfEventArray},
    EbpfContext,
};
use nstrace_common::{
    config::CONFIG_KEY,
    correlate::CorrelationTable,
    emit::{forward, EventSink},
    filter::Lookup,
    Pending, ProbeConfig, Skip,
};

/// Membership view over an allow-list or exclude-list map.
pub struct Table<'a, K, V>(&'a HashMap<K, V>);

impl<'a, K, V> Table<'a, K, V> {
    #[inline(always)]
    pub const fn new(map: &'a HashMap<K, V>) -> Self {
        Self(map)
    }
}

impl<K, V> Lookup<K> for Table<'_, K, V> {
    #[inline(always)]
    fn contains(&self, key: &K) -> bool {
        // SAFETY: only presence is checked, the value reference is dropped at once.
        unsafe { self.0.get(key) }.is_some()
    }
}

/// Thread-keyed pending operations.
pub struct PendingTable<'a>(&'a HashMap<u32, Pending>);

impl<'a> PendingTable<'a> {
    #[inline(always)]
    pub const fn new(map: &'a HashMap<u32, Pending>) -> Self {
        Self(map)
    }
}

impl CorrelationTable for PendingTable<'_> {
    #[inline(always)]
    fn insert(&self, thread_id: u32, pending: Pending) -> Result<(), Skip> {
        self.0
            .insert(&thread_id, &pending, 0)
            .map_err(|_| Skip::TableFull)
    }

    #[inline(always)]
    fn take(&self, thread_id: u32) -> Option<Pending> {
        // SAFETY: the value is copied out before the entry is removed.
        let pending = unsafe { self.0.get(&thread_id) }.copied()?;
        let _ = self.0.remove(&thread_id);
        Some(pending)
    }
}

/// Per-CPU perf buffer bound to the context of the running program.
pub struct PerfSink<'a, T, C> {
    channel: &'a PerfEventArray<T>,
    ctx: &'a C,
}

impl<'a, T, C: EbpfContext> PerfSink<'a, T, C> {
    #[inline(always)]
    pub fn new(channel: &'a PerfEventArray<T>, ctx: &'a C) -> Self {
        Self { channel, ctx }
    }
}

impl<T, C: EbpfContext> EventSink<T> for PerfSink<'_, T, C> {
    #[inline(always)]
    fn submit(&self, event: &T) {
        self.channel.output(self.ctx, event, 0);
    }
}

/// Active configuration, or the defaults when userspace has not written one.
#[inline(always)]
pub fn load_config(map: &HashMap<u32, ProbeConfig>) -> ProbeConfig {
    // SAFETY: ProbeConfig is plain data, copied out immediately.
    unsafe { map.get(&CONFIG_KEY) }
        .copied()
        .unwrap_or(ProbeConfig::DEFAULT)
}

#[inline(always)]
pub fn count_skip(counters: &PerCpuArray<u64>, skip: Skip) {
    // SAFETY: per-CPU slot, no concurrent writer on this CPU.
    unsafe {
        if let Some(slot) = counters.get_ptr_mut(skip.index()) {
            *slot += 1;
        }
    }
}

/// Submit the outcome of a hook pipeline, counting it if there was no event.
#[inline(always)]
pub fn deliver<T, C: EbpfContext>(
    channel: &PerfEventArray<T>,
    ctx: &C,
    counters: &PerCpuArray<u64>,
    outcome: Result<T, Skip>,
) {
    if let Some(skip) = forward(&PerfSink::new(channel, ctx), outcome) {
        count_skip(counters, skip);
    }
}
