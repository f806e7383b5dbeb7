//! Probe configuration shared through the `CONFIG` map
//!
//! Userspace writes a single [`ProbeConfig`] at [`CONFIG_KEY`]. When the entry is
//! absent the probes fall back to [`ProbeConfig::DEFAULT`].
//!
//! Kernel struct offsets are discovered by userspace from BTF and written here,
//! so the probes need no compiled-in `vmlinux` bindings. An offset of zero means
//! "unknown" and makes the corresponding namespace read return `None`.

/// Key of the single entry in the `CONFIG` map.
pub const CONFIG_KEY: u32 = 0;

/// Capacity of the namespace allow-list map.
pub const ALLOW_LIST_CAPACITY: u32 = 10240;
/// Capacity of the IPv4 exclude-list map.
pub const EXCLUDE_LIST_CAPACITY: u32 = 10240;
/// Capacity of each correlation table (connect and accept are separate maps).
pub const CORRELATION_CAPACITY: u32 = 10240;

/// Detector selection bits for [`ProbeConfig::flags`]
pub mod flags {
    /// Classify `inet_sock_set_state` transitions (teardown detection).
    pub const STATE_TRANSITIONS: u32 = 1 << 0;
    /// Correlate `tcp_v4_connect` entry/return.
    pub const CONNECT: u32 = 1 << 1;
    /// Correlate `inet_csk_accept` entry/return.
    pub const ACCEPT: u32 = 1 << 2;
    /// Report `udp_sendmsg`.
    pub const DATAGRAM: u32 = 1 << 3;
    /// Report raw syscall entries.
    pub const SYSCALLS: u32 = 1 << 4;
    /// Apply the namespace allow-list to the XDP packet path as well.
    ///
    /// The packet path is keyed by the mount namespace of the current task,
    /// not the pid namespace the other hooks use, so the allow-list must also
    /// hold the mount namespace inums to be admitted.
    pub const PACKET_NAMESPACE_GATE: u32 = 1 << 5;

    pub const ALL_DETECTORS: u32 = STATE_TRANSITIONS | CONNECT | ACCEPT | DATAGRAM | SYSCALLS;
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    pub flags: u32,
    /// `task_struct.nsproxy`
    pub task_nsproxy_offset: u32,
    /// `nsproxy.pid_ns_for_children`
    pub nsproxy_pid_ns_offset: u32,
    /// `nsproxy.mnt_ns`
    pub nsproxy_mnt_ns_offset: u32,
    /// `pid_namespace.ns.inum`
    pub pid_ns_inum_offset: u32,
    /// `mnt_namespace.ns.inum`
    pub mnt_ns_inum_offset: u32,
    /// `sock_common.skc_net`
    pub sock_net_offset: u32,
    /// `net.ns.inum`
    pub net_ns_inum_offset: u32,
}

impl ProbeConfig {
    /// Every detector on, packet gate off, all offsets unknown.
    pub const DEFAULT: ProbeConfig = ProbeConfig {
        flags: flags::ALL_DETECTORS,
        task_nsproxy_offset: 0,
        nsproxy_pid_ns_offset: 0,
        nsproxy_mnt_ns_offset: 0,
        pid_ns_inum_offset: 0,
        mnt_ns_inum_offset: 0,
        sock_net_offset: 0,
        net_ns_inum_offset: 0,
    };

    #[inline(always)]
    pub const fn enabled(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }

    #[inline(always)]
    pub const fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Whether the socket network namespace can be resolved.
    #[inline(always)]
    pub const fn has_socket_namespace(&self) -> bool {
        self.sock_net_offset != 0 && self.net_ns_inum_offset != 0
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
