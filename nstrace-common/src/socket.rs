//! Views of the current task and of kernel sockets
//!
//! The probes implement these over `bpf_get_current_task` and
//! `bpf_probe_read_kernel`; tests implement them over plain structs.

/// Opaque kernel address of a `struct sock`.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketRef(pub u64);

impl SocketRef {
    #[inline(always)]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// IPv4 endpoint pair read from `sock_common`
///
/// Addresses stay in network byte order, ports are converted to host byte
/// order by the reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SockTuple {
    pub family: u16,
    pub src_addr: u32,
    pub src_port: u16,
    pub dst_addr: u32,
    pub dst_port: u16,
}

pub trait SocketReader {
    /// Read the endpoint pair. `None` if the memory could not be read.
    fn tuple(&self, socket: SocketRef) -> Option<SockTuple>;

    /// Network namespace inum of the socket, if it can be resolved.
    fn namespace(&self, socket: SocketRef) -> Option<u64>;
}

pub trait TaskContext {
    /// Lower 32 bits of `pid_tgid`.
    fn thread_id(&self) -> u32;

    /// `pid_ns_for_children` inum of the current task.
    fn pid_namespace(&self) -> Option<u64>;

    /// Mount namespace inum of the current task.
    fn mount_namespace(&self) -> Option<u64>;
}
