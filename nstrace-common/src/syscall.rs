//! Raw syscall entry pipeline

use crate::config::{flags, ProbeConfig};
use crate::filter::{monitored, Lookup};
use crate::socket::TaskContext;
use crate::{Skip, SyscallEvent};

/// Build the record for a `raw_syscalls/sys_enter` invocation.
#[inline(always)]
pub fn syscall_enter<A, T>(
    allow: &A,
    task: &T,
    config: &ProbeConfig,
    syscall_number: u64,
) -> Result<SyscallEvent, Skip>
where
    A: Lookup<u64>,
    T: TaskContext,
{
    if !config.enabled(flags::SYSCALLS) {
        return Err(Skip::Disabled);
    }
    let context_id = monitored(allow, task.pid_namespace())?;
    Ok(SyscallEvent {
        context_id,
        syscall_number,
    })
}
