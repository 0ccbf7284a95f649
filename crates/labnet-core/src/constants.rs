//! Flow rule constants. Priorities match the values the lab's controller deployment expects.

/// Priority of L3/L4 data rules.
pub const PRIORITY_DATA: u16 = 40_000;

/// Priority of ARP rules. Strictly lower than [`PRIORITY_DATA`] so host learning traffic never
/// pre-empts a data rule.
pub const PRIORITY_ARP: u16 = 30_000;

/// The IPv4 ethertype.
pub const ETH_TYPE_IPV4: u16 = 0x0800;

/// The ARP ethertype.
pub const ETH_TYPE_ARP: u16 = 0x0806;

/// Separates a handler from the rest of a rule name. Handlers never contain it.
pub const NAME_SEP: char = '_';
