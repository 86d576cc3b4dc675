//! Candidate MAC generation
//!
//! Candidates live in the platform vendor block `00:50:56:xx:xx:xx`. The
//! platform reserves every address whose fourth octet is 0x40 or above for
//! its own automatic assignment, so candidates are drawn from below that.

use rand::Rng;

use crate::types::MacAddress;

/// Fourth octets from here up belong to the platform
pub const RESERVED_OCTET_START: u8 = 0x40;

pub fn is_reserved(mac: &MacAddress) -> bool {
    mac.has_vendor_prefix() && mac.octets()[3] >= RESERVED_OCTET_START
}

/// A random vendor-block MAC outside the reserved sub-range
pub fn generate_candidate<R: Rng + ?Sized>(rng: &mut R) -> MacAddress {
    let mut tail = [0u8; 3];
    rng.fill(&mut tail[..]);
    tail[0] %= RESERVED_OCTET_START;

    let [a, b, c] = MacAddress::VENDOR_PREFIX;
    MacAddress::new([a, b, c, tail[0], tail[1], tail[2]])
}
