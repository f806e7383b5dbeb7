//! Reasons a hook invocation ends without emitting an event
//!
//! None of these are failures of the observed operation. They are returned as
//! the `Err` side of every hook pipeline, counted per CPU by the probes, and
//! otherwise dropped.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Skip {
    #[error("namespace is not on the allow-list")]
    NotMonitored = 0,

    #[error("detector disabled by probe configuration")]
    Disabled = 1,

    #[error("address family is not AF_INET")]
    NotIpv4 = 2,

    #[error("socket protocol is not TCP")]
    NotTcp = 3,

    #[error("destination address is unspecified")]
    UnspecifiedDestination = 4,

    #[error("destination address is loopback")]
    LoopbackDestination = 5,

    #[error("address is on the exclude list")]
    Excluded = 6,

    #[error("source and destination address are identical")]
    SelfConnection = 7,

    #[error("state transition is not reportable")]
    NotReportable = 8,

    #[error("no pending entry for this thread")]
    Uncorrelated = 9,

    #[error("observed operation did not succeed")]
    OperationFailed = 10,

    #[error("correlation table is full")]
    TableFull = 11,

    #[error("kernel memory could not be read")]
    ReadFailed = 12,

    #[error("frame too short for its headers")]
    Malformed = 13,
}

impl Skip {
    /// Number of variants, used to size the per-CPU counter array.
    pub const COUNT: u32 = 14;

    /// Stable slot in the skip counter array.
    pub const fn index(self) -> u32 {
        self as u32
    }
}
