//! Static protocol, target and table catalogs
//!
//! Process-wide immutable lookup tables for the legacy netfilter rule
//! engine. Pure data: no state, no lazy initialization.

/// Transport protocols the rule engine understands, as (name, kernel id)
/// pairs. The ids are the IANA protocol numbers the kernel stores in
/// `ip.proto`.
pub const PROTOCOLS: &[(&str, u8)] = &[("TCP", 6), ("UDP", 17), ("ICMP", 1)];

/// Kernel verdict targets a rule may name. Membership is a linear scan;
/// the list is small and fixed.
pub const TARGETS: &[&str] = &["ACCEPT", "DROP", "QUEUE", "RETURN"];

/// The tables the backend opens a handle for. This list is static: the
/// legacy netfilter rule store registers exactly these tables.
pub const TABLE_NAMES: &[&str] = &["filter", "nat", "mangle", "raw"];

/// Resolves a protocol name to its kernel id. Unknown names fail the
/// lookup; callers must treat that as invalid input.
pub fn proto_to_id(name: &str) -> Option<u8> {
    PROTOCOLS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, id)| id)
}

/// Resolves a kernel protocol id back to its catalog name.
pub fn id_to_proto(id: u8) -> Option<&'static str> {
    PROTOCOLS
        .iter()
        .find(|&&(_, i)| i == id)
        .map(|&(name, _)| name)
}

/// Display form of a kernel protocol id, with a fallback for ids the
/// catalog does not list.
pub fn proto_display(id: u8) -> &'static str {
    id_to_proto(id).unwrap_or("UNKNOWN")
}

/// Whether `name` is a kernel-recognized verdict target.
pub fn is_valid_target(name: &str) -> bool {
    TARGETS.contains(&name)
}
