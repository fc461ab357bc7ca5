use crate::error::{Result, StashError};
use std::net::Ipv4Addr;

pub const MIN_NAME_LEN: usize = 3;
pub const MAX_NAME_LEN: usize = 512;

/// Checks a collection name against the allowed shape.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(StashError::InvalidCollectionName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return invalid(&format!(
            "expected between {} and {} characters, got {}",
            MIN_NAME_LEN, MAX_NAME_LEN, len
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return invalid("only [a-zA-Z0-9._-] are allowed");
    }
    // Length check above guarantees both ends exist
    let first = name.chars().next().unwrap_or('.');
    let last = name.chars().last().unwrap_or('.');
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("..") {
        return invalid("must not contain two consecutive periods");
    }
    if name.parse::<Ipv4Addr>().is_ok() {
        return invalid("must not be a valid IPv4 address");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for name in ["docs", "your_collection_name", "a.b-c_9", "ABC"] {
            assert!(validate_collection_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_bad_shapes() {
        for name in ["ab", "", "-abc", "abc_", "a..b", "has space", "10.0.0.1", "naïve"] {
            assert!(
                matches!(
                    validate_collection_name(name),
                    Err(StashError::InvalidCollectionName { .. })
                ),
                "{name}"
            );
        }
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(validate_collection_name(&long).is_err());
        assert!(validate_collection_name(&"a".repeat(MAX_NAME_LEN)).is_ok());
    }
}
