//! Kernel-side adapters for nstrace
//!
//! The decisions live in `nstrace-common`; this crate binds its traits to aya
//! maps, perf buffers and kernel memory reads. Programs are in src/bin/:
//! - `network_probe`: TCP state changes, connect/accept, UDP sends
//! - `syscall_probe`: raw syscall entry
//! - `packet_probe`: XDP ingress inspection

#![cfg_attr(not(test), no_std)]

pub mod kernel;
pub mod maps;
