//! Channel name validation.
//!
//! Names are composed of letters, digits, `.`, `_`, `-`, plus the configurable
//! system-prefix character (default `$`), bounded by `max_channel_name_length`.

use crate::error::CrossBarError;

pub fn validate(name: &str, system_prefix: char, max_len: usize) -> Result<(), CrossBarError> {
    if name.is_empty() {
        return Err(CrossBarError::invalid_channel_name(name, "name is empty"));
    }
    if name.len() > max_len {
        return Err(CrossBarError::invalid_channel_name(
            name,
            format!("name exceeds max length {max_len}"),
        ));
    }
    for (i, c) in name.chars().enumerate() {
        let allowed = c.is_ascii_alphanumeric()
            || c == '.'
            || c == '_'
            || c == '-'
            || (i == 0 && c == system_prefix);
        if !allowed {
            return Err(CrossBarError::invalid_channel_name(
                name,
                format!("character {c:?} at position {i} is not permitted"),
            ));
        }
    }
    Ok(())
}

/// Whether `name` belongs to the reserved system-channel namespace.
pub fn is_system_channel(name: &str, system_prefix: char) -> bool {
    name.starts_with(system_prefix)
}

/// Validates a `subscribe` channel pattern: same alphabet as [`validate`], but
/// `*` and `>` are additionally permitted as whole dot-separated segments,
/// with `>` legal only as the final segment.
pub fn validate_pattern(pattern: &str, system_prefix: char, max_len: usize) -> Result<(), CrossBarError> {
    if pattern.is_empty() {
        return Err(CrossBarError::invalid_channel_name(pattern, "pattern is empty"));
    }
    if pattern.len() > max_len {
        return Err(CrossBarError::invalid_channel_name(
            pattern,
            format!("pattern exceeds max length {max_len}"),
        ));
    }
    let segments: Vec<&str> = pattern.split('.').collect();
    let last = segments.len() - 1;
    for (i, seg) in segments.iter().enumerate() {
        if *seg == "*" {
            continue;
        }
        if *seg == ">" {
            if i != last {
                return Err(CrossBarError::invalid_channel_name(
                    pattern,
                    "'>' is only legal as the final segment",
                ));
            }
            continue;
        }
        let prefix = if i == 0 { system_prefix } else { '\0' };
        validate(seg, prefix, max_len)?;
    }
    Ok(())
}

/// Whether `pattern` contains a `*` or `>` wildcard segment.
pub fn is_wildcard_pattern(pattern: &str) -> bool {
    pattern.split('.').any(|seg| seg == "*" || seg == ">")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate("orders.filled", '$', 256).is_ok());
        assert!(validate("a-b_c.D1", '$', 256).is_ok());
    }

    #[test]
    fn accepts_system_prefix_only_at_start() {
        assert!(validate("$channel.lifecycle", '$', 256).is_ok());
        assert!(validate("channel.$oops", '$', 256).is_err());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(validate("", '$', 256).is_err());
        let long = "a".repeat(300);
        assert!(validate(&long, '$', 256).is_err());
    }

    #[test]
    fn rejects_illegal_characters() {
        assert!(validate("orders filled", '$', 256).is_err());
        assert!(validate("orders/filled", '$', 256).is_err());
        assert!(validate("orders*filled", '$', 256).is_err());
    }

    #[test]
    fn detects_system_channel() {
        assert!(is_system_channel("$channel.lifecycle", '$'));
        assert!(!is_system_channel("orders.filled", '$'));
    }

    #[test]
    fn validate_pattern_accepts_wildcards() {
        assert!(validate_pattern("orders.*.filled", '$', 256).is_ok());
        assert!(validate_pattern("orders.>", '$', 256).is_ok());
        assert!(validate_pattern("*", '$', 256).is_ok());
    }

    #[test]
    fn validate_pattern_rejects_greater_than_mid_pattern() {
        assert!(validate_pattern("orders.>.filled", '$', 256).is_err());
    }

    #[test]
    fn is_wildcard_pattern_detects_star_and_greater_than() {
        assert!(is_wildcard_pattern("orders.*"));
        assert!(is_wildcard_pattern("orders.>"));
        assert!(!is_wildcard_pattern("orders.filled"));
    }

    use proptest::prelude::*;

    #[test]
    fn any_name_built_from_the_allowed_alphabet_validates() {
        proptest!(|(name in "[a-zA-Z0-9_-]{1,64}(\\.[a-zA-Z0-9_-]{1,64}){0,4}")| {
            prop_assert!(validate(&name, '$', 256).is_ok());
        });
    }

    #[test]
    fn validate_pattern_accepts_the_same_names_validate_does() {
        proptest!(|(name in "[a-zA-Z0-9_-]{1,64}(\\.[a-zA-Z0-9_-]{1,64}){0,4}")| {
            prop_assert!(validate_pattern(&name, '$', 256).is_ok());
        });
    }

    #[test]
    fn oversized_names_are_always_rejected() {
        proptest!(|(name in "[a-zA-Z0-9]{257,300}")| {
            prop_assert!(validate(&name, '$', 256).is_err());
        });
    }
}
