//! Safe address lookup.
//!
//! The real debug server recovers a live Objective-C object from a
//! client-supplied hex address by masking the word at that address against
//! an architecture class-pointer mask and checking the result against the
//! registered Objective-C class table. This crate has no foreign object
//! runtime to introspect, and there is no sound, crash-proof way in safe
//! Rust to dereference an arbitrary, untrusted integer as a pointer. Unlike
//! the host platform, there is no OS-guarded "read this address, fail
//! instead of crashing if it's unmapped" primitive to fall back on, so
//! reading truly arbitrary memory would risk exactly the crash this
//! mechanism exists to avoid.
//!
//! This module instead implements the full validation contract (the zero
//! check, the alignment check, the class-pointer mask, the
//! registered-class check, and the subclass check) over an explicit,
//! safely-owned registry that stands in for the host's live object table
//! (see `DESIGN.md`'s Open Question resolution). Nothing in this module
//! reads memory at an address it did not itself hand out.

mod mask;
mod registry;

pub use mask::{class_pointer_mask, Arch};
pub use registry::{ClassId, ObjectHandle, Registry};

/// Parse a hex address string, stripping an optional `0x`/`0X` prefix.
/// Returns `None` on empty or malformed input.
pub fn parse_address(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Format an address the way clients expect it back: `0x` + lowercase hex.
pub fn address_string(address: u64) -> String {
    format!("0x{address:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_prefix() {
        assert_eq!(parse_address("0x1A"), Some(0x1A));
        assert_eq!(parse_address("0X1a"), Some(0x1A));
        assert_eq!(parse_address("1a"), Some(0x1A));
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert_eq!(parse_address(""), None);
        assert_eq!(parse_address("0x"), None);
        assert_eq!(parse_address("not-hex"), None);
    }

    #[test]
    fn address_string_round_trips() {
        let s = address_string(0xdead_beef);
        assert_eq!(s, "0xdeadbeef");
        assert_eq!(parse_address(&s), Some(0xdead_beef));
    }
}
