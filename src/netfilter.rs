//! Classification of network interfaces that must not count towards bandwidth.

/// Name fragments of loopback, container, hypervisor, tunnel and PAN adapters.
///
/// Matched case-insensitively anywhere in the interface name.
const VIRTUAL_MARKERS: &[&str] = &[
    "docker",
    "veth",
    "br-",
    "lo",
    "loopback",
    "vmnet",
    "vboxnet",
    "tun",
    "tap",
    "vethernet",
    "hyper-v",
    "vmware",
    "bluetooth",
];

/// Returns `true` if `name` looks like a virtual or loopback interface.
///
/// Substring matching is deliberately broad: a name such as `wlo1` contains
/// `lo` and is excluded too.
pub fn is_virtual(name: &str) -> bool {
    let lower = name.to_lowercase();
    VIRTUAL_MARKERS.iter().any(|marker| lower.contains(marker))
}
