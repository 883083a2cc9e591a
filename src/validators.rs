//! Input validation for rule and chain requests
//!
//! Centralized validation for the fields that end up inside kernel
//! records, surfaced before any store call so a malformed field never
//! reaches a partially-constructed record.

use std::net::Ipv4Addr;

/// Validates a dotted-decimal IPv4 address or mask.
///
/// # Errors
///
/// Returns `Err` if the string is not a plain dotted quad. CIDR
/// notation is rejected on purpose: masks here are free-form address
/// masks, not prefixes.
pub fn validate_ipv4(value: &str) -> Result<Ipv4Addr, String> {
    value
        .parse::<Ipv4Addr>()
        .map_err(|_| format!("not a dotted-decimal IPv4 address: {value}"))
}

/// Validates a numeric port string.
///
/// # Errors
///
/// Returns `Err` if the string is not a base-10 number in 0..=65535.
pub fn validate_port_str(value: &str) -> Result<u16, String> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| format!("not a port number: {value}"))
}

/// Validates a (low, high) port-range pair of numeric strings.
///
/// # Errors
///
/// Returns `Err` if either bound is malformed or low exceeds high.
pub fn validate_port_range_str(low: &str, high: &str) -> Result<(u16, u16), String> {
    let low = validate_port_str(low)?;
    let high = validate_port_str(high)?;

    if low > high {
        Err(format!("port range start {low} exceeds end {high}"))
    } else {
        Ok((low, high))
    }
}

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// # Errors
///
/// Returns `Err` if the name violates kernel constraints.
pub fn validate_interface(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("interface name is empty".to_string());
    }

    if name.len() > 15 {
        return Err(format!("interface name too long (max 15 characters): {name}"));
    }

    if name == "." || name == ".." {
        return Err(format!("invalid interface name: {name}"));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(format!("interface name contains invalid characters: {name}"));
    }

    Ok(())
}

/// Validates a chain name against the kernel's label limits.
///
/// # Errors
///
/// Returns `Err` if the name is empty, longer than 28 bytes, or
/// contains whitespace or control characters.
pub fn validate_chain_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("chain name is empty".to_string());
    }

    if name.len() > 28 {
        return Err(format!("chain name too long (max 28 characters): {name}"));
    }

    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("chain name contains whitespace: {name}"));
    }

    Ok(())
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_validate_port_str_matches_u16_parse(input in "\\PC*") {
            let expected = input.trim().parse::<u16>().ok();
            prop_assert_eq!(validate_port_str(&input).ok(), expected);
        }

        #[test]
        fn test_validate_port_range_ordering(low in any::<u16>(), high in any::<u16>()) {
            let result = validate_port_range_str(&low.to_string(), &high.to_string());
            if low <= high {
                prop_assert_eq!(result, Ok((low, high)));
            } else {
                prop_assert!(result.is_err());
            }
        }

        #[test]
        fn test_validate_interface_never_panics(input in "\\PC*") {
            let _ = validate_interface(&input);
        }

        #[test]
        fn test_valid_interface_fits_kernel_field(input in "[a-z0-9._-]{1,15}") {
            if let Ok(()) = validate_interface(&input) {
                prop_assert!(input.len() <= 15);
            }
        }
    }
}
