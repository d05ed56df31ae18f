use crate::db::Repository;
use crate::error::{AppError, AppResult};
use regex::Regex;
use std::sync::OnceLock;

/// Character set for generated codes and custom aliases.
const ALPHABET_CHARS: &[char] = &[
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M',
    'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm',
    'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
    '_', '-',
];

/// Collision probes at the configured length before widening.
const MAX_ATTEMPTS: u32 = 10;

fn alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap_or_else(|_| unreachable!()))
}

/// Allocates unique short codes and validates requested aliases.
pub struct CodeAllocator;

impl CodeAllocator {
    /// Generate a code that does not collide with an existing record.
    ///
    /// Probes the authoritative store, not the cache. After ten collisions
    /// at the configured length, one final attempt is made two characters
    /// longer before giving up.
    pub async fn allocate(length: usize, repository: &Repository) -> AppResult<String> {
        for _ in 0..MAX_ATTEMPTS {
            let code = nanoid::nanoid!(length, ALPHABET_CHARS);

            if !repository.code_exists(&code).await? {
                return Ok(code);
            }
        }

        // The keyspace at this length is congested; widen once.
        let code = nanoid::nanoid!((length + 2), ALPHABET_CHARS);
        if !repository.code_exists(&code).await? {
            return Ok(code);
        }

        Err(AppError::CodeGenerationFailed)
    }

    /// Validate a requested alias against the charset and length rules.
    pub fn validate_alias(alias: &str, min_length: usize, max_length: usize) -> AppResult<()> {
        if alias.len() < min_length || alias.len() > max_length {
            return Err(AppError::AliasInvalid(format!(
                "alias must be {}-{} characters",
                min_length, max_length
            )));
        }
        if !alias_pattern().is_match(alias) {
            return Err(AppError::AliasInvalid(
                "alias may only contain letters, digits, underscores, and hyphens".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_has_64_unique_chars() {
        assert_eq!(ALPHABET_CHARS.len(), 64);
        let unique: std::collections::HashSet<_> = ALPHABET_CHARS.iter().collect();
        assert_eq!(unique.len(), ALPHABET_CHARS.len());
    }

    #[test]
    fn test_generated_codes_use_the_alphabet() {
        let code = nanoid::nanoid!(7, ALPHABET_CHARS);
        assert_eq!(code.len(), 7);
        assert!(code.chars().all(|c| ALPHABET_CHARS.contains(&c)));
    }

    #[test]
    fn test_valid_aliases_accepted() {
        assert!(CodeAllocator::validate_alias("my-link", 3, 50).is_ok());
        assert!(CodeAllocator::validate_alias("abc", 3, 50).is_ok());
        assert!(CodeAllocator::validate_alias("A_b-9", 3, 50).is_ok());
    }

    #[test]
    fn test_alias_length_bounds_enforced() {
        assert!(CodeAllocator::validate_alias("ab", 3, 50).is_err());
        let long = "a".repeat(51);
        assert!(CodeAllocator::validate_alias(&long, 3, 50).is_err());
        let max = "a".repeat(50);
        assert!(CodeAllocator::validate_alias(&max, 3, 50).is_ok());
    }

    #[test]
    fn test_alias_charset_enforced() {
        assert!(CodeAllocator::validate_alias("has space", 3, 50).is_err());
        assert!(CodeAllocator::validate_alias("emoji💥", 3, 50).is_err());
        assert!(CodeAllocator::validate_alias("slash/evil", 3, 50).is_err());
    }
}
