//! Namespace allow-list and IPv4 exclude-list gates
//!
//! Both lists are populated by userspace and only ever read here. Presence of a
//! key is the only signal used; the stored marker value is ignored.

use crate::proto::AF_INET;
use crate::socket::SockTuple;
use crate::Skip;

/// Point membership query against an externally owned table.
pub trait Lookup<K> {
    fn contains(&self, key: &K) -> bool;
}

/// Resolve the context identifier and check it against the allow-list.
///
/// An unreadable namespace is treated the same as an unlisted one.
#[inline(always)]
pub fn monitored<A: Lookup<u64>>(allow: &A, context: Option<u64>) -> Result<u64, Skip> {
    match context {
        Some(inum) if allow.contains(&inum) => Ok(inum),
        _ => Err(Skip::NotMonitored),
    }
}

/// Re-validate a socket's own namespace, when one could be read.
#[inline(always)]
pub fn socket_monitored<A: Lookup<u64>>(allow: &A, namespace: Option<u64>) -> Result<(), Skip> {
    match namespace {
        Some(inum) if !allow.contains(&inum) => Err(Skip::NotMonitored),
        _ => Ok(()),
    }
}

/// `0.0.0.0`
#[inline(always)]
pub const fn is_unspecified(addr_be: u32) -> bool {
    addr_be == 0
}

/// `127.0.0.0/8`
#[inline(always)]
pub const fn is_loopback(addr_be: u32) -> bool {
    u32::from_be(addr_be) >> 24 == 127
}

/// Apply the address rules every reported network event must satisfy.
///
/// Order: family, unspecified destination, loopback destination, exclude-list
/// (source then destination), self-connection.
#[inline(always)]
pub fn admit<E: Lookup<u32>>(exclude: &E, tuple: &SockTuple) -> Result<(), Skip> {
    if tuple.family != AF_INET {
        return Err(Skip::NotIpv4);
    }
    if is_unspecified(tuple.dst_addr) {
        return Err(Skip::UnspecifiedDestination);
    }
    if is_loopback(tuple.dst_addr) {
        return Err(Skip::LoopbackDestination);
    }
    if exclude.contains(&tuple.src_addr) || exclude.contains(&tuple.dst_addr) {
        return Err(Skip::Excluded);
    }
    if tuple.src_addr == tuple.dst_addr {
        return Err(Skip::SelfConnection);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Set<K>(HashSet<K>);

    impl<K: std::hash::Hash + Eq> Lookup<K> for Set<K> {
        fn contains(&self, key: &K) -> bool {
            self.0.contains(key)
        }
    }

    fn ip(a: u8, b: u8, c: u8, d: u8) -> u32 {
        u32::from_be_bytes([a, b, c, d]).to_be()
    }

    fn tuple(src: u32, dst: u32) -> SockTuple {
        SockTuple {
            family: AF_INET,
            src_addr: src,
            src_port: 51000,
            dst_addr: dst,
            dst_port: 443,
        }
    }

    #[test]
    fn test_monitored_requires_listed_namespace() {
        let allow = Set(HashSet::from([4026531836u64]));

        assert_eq!(monitored(&allow, Some(4026531836)), Ok(4026531836));
        assert_eq!(monitored(&allow, Some(1)), Err(Skip::NotMonitored));
        assert_eq!(monitored(&allow, None), Err(Skip::NotMonitored));
    }

    #[test]
    fn test_socket_namespace_unknown_is_accepted() {
        let allow = Set(HashSet::from([7u64]));

        assert_eq!(socket_monitored(&allow, None), Ok(()));
        assert_eq!(socket_monitored(&allow, Some(7)), Ok(()));
        assert_eq!(socket_monitored(&allow, Some(8)), Err(Skip::NotMonitored));
    }

    #[test]
    fn test_loopback_block() {
        assert!(is_loopback(ip(127, 0, 0, 1)));
        assert!(is_loopback(ip(127, 1, 2, 3)));
        assert!(!is_loopback(ip(10, 0, 0, 127)));
        assert!(!is_loopback(ip(128, 0, 0, 1)));
    }

    #[test]
    fn test_admit_rules() {
        let exclude = Set(HashSet::from([ip(8, 8, 8, 8)]));
        let local = ip(10, 0, 0, 5);

        assert_eq!(admit(&exclude, &tuple(local, ip(93, 184, 216, 34))), Ok(()));
        assert_eq!(
            admit(&exclude, &tuple(local, 0)),
            Err(Skip::UnspecifiedDestination)
        );
        assert_eq!(
            admit(&exclude, &tuple(local, ip(127, 0, 0, 1))),
            Err(Skip::LoopbackDestination)
        );
        assert_eq!(
            admit(&exclude, &tuple(local, ip(8, 8, 8, 8))),
            Err(Skip::Excluded)
        );
        assert_eq!(
            admit(&exclude, &tuple(ip(8, 8, 8, 8), local)),
            Err(Skip::Excluded)
        );
        assert_eq!(
            admit(&exclude, &tuple(local, local)),
            Err(Skip::SelfConnection)
        );
    }

    #[test]
    fn test_admit_rejects_other_families() {
        let exclude = Set(HashSet::new());
        let mut t = tuple(ip(10, 0, 0, 5), ip(10, 0, 0, 6));
        t.family = 10;

        assert_eq!(admit(&exclude, &t), Err(Skip::NotIpv4));
    }
}
