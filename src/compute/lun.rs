//! Logical unit number selection for new data disks

use std::collections::HashSet;

use super::models::DataDisk;

/// Capacity used when the size name cannot be parsed
pub const DEFAULT_LUN_CAPACITY: u32 = 16;

/// Hard platform ceiling on data disks per node
pub const MAX_LUN_CAPACITY: u32 = 64;

/// vCPU count encoded in a size name such as `Standard_E16as_v4`
fn vcpus_from_size(vm_size: &str) -> Option<u32> {
    let (tier, rest) = vm_size.split_once('_')?;
    if !tier.eq_ignore_ascii_case("standard") && !tier.eq_ignore_ascii_case("basic") {
        return None;
    }

    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok().filter(|vcpus| *vcpus > 0)
}

/// Number of data disks a node of `vm_size` can take
///
/// Two per vCPU, as read from the size name (`Standard_D4s_v3` has 4).
pub fn lun_capacity(vm_size: &str) -> u32 {
    vcpus_from_size(vm_size)
        .map(|vcpus| vcpus.saturating_mul(2).min(MAX_LUN_CAPACITY))
        .unwrap_or(DEFAULT_LUN_CAPACITY)
}

/// Lowest LUN not used by `disks`, or `None` if the node is full
pub fn find_free_lun(vm_size: &str, disks: &[DataDisk]) -> Option<u32> {
    let used: HashSet<u32> = disks.iter().map(|disk| disk.lun).collect();
    (0..lun_capacity(vm_size)).find(|lun| !used.contains(lun))
}
