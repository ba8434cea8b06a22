//! Canonical data container naming

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Logical names must fit the engine's container-name alphabet.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("valid name pattern"));

/// Check that a logical service/chain name can be embedded in a container name
pub fn validate_name(name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Build the canonical data container name for `(name, number)`.
///
/// The result is `{prefix}_data_{name}_{number}`. The same inputs always
/// produce the same name, so callers never need to store it.
pub fn data_container_name(prefix: &str, name: &str, number: u32) -> String {
    format!("{}_data_{}_{}", prefix, name, number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_container_name_format() {
        assert_eq!(data_container_name("eris", "ipfs", 1), "eris_data_ipfs_1");
        assert_eq!(data_container_name("acme", "chain.a", 12), "acme_data_chain.a_12");
    }

    #[test]
    fn test_data_container_name_is_deterministic() {
        assert_eq!(
            data_container_name("eris", "keys", 3),
            data_container_name("eris", "keys", 3)
        );
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("ipfs").is_ok());
        assert!(validate_name("chain-1.main_a").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("-leading").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("slash/name").is_err());
    }
}
