//! Registered record types, looked up by name or by capture link type.

use crate::net::{Ethernet, Ipv4Header, Root, LINKTYPE_ETHERNET, LINKTYPE_IPV4, LINKTYPE_RAW};
use crate::packet::RecordType;
use crate::pcap::{FileHeader, RecordHeader};

static TYPES: [&dyn RecordType; 5] = [&FileHeader, &RecordHeader, &Root, &Ethernet, &Ipv4Header];

/// Every record type this build knows about.
pub fn all() -> &'static [&'static dyn RecordType] {
    &TYPES
}

/// Resolve a type name (case-insensitive).
pub fn by_name(name: &str) -> Option<&'static dyn RecordType> {
    TYPES.iter().copied().find(|ty| ty.name().eq_ignore_ascii_case(name))
}

/// Link-layer decoder for a capture's link type.
pub fn for_link_type(link_type: u32) -> Option<&'static dyn RecordType> {
    match link_type {
        LINKTYPE_ETHERNET            => Some(&Ethernet),
        LINKTYPE_RAW | LINKTYPE_IPV4 => Some(&Ipv4Header),
        _                            => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_resolvable() {
        for ty in all() {
            let found = by_name(&ty.name().to_ascii_uppercase()).unwrap();
            assert_eq!(found.name(), ty.name());
        }
        assert!(by_name("Tcp").is_none());
    }

    #[test]
    fn link_types_map_to_decoders() {
        assert_eq!(for_link_type(LINKTYPE_ETHERNET).map(|t| t.name()), Some("Ethernet"));
        assert_eq!(for_link_type(LINKTYPE_RAW).map(|t| t.name()), Some("IPv4"));
        assert_eq!(for_link_type(LINKTYPE_IPV4).map(|t| t.name()), Some("IPv4"));
        assert!(for_link_type(113).is_none());
    }
}
