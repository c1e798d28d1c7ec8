//! ISBN normalization, validation, and conversion.
//!
//! This module provides the [`Isbn`] value type and the pure functions the
//! rest of the crate builds on: input normalization, mod-10/mod-11 checksum
//! validation, 10-to-13 digit enrichment, and the variant-equivalence check
//! used to decide whether two identifiers describe the same work.
//!
//! # Overview
//!
//! An [`Isbn`] is an immutable, already-validated identifier string: ten or
//! thirteen digits, with `X` allowed only as the final check character of the
//! ten-digit form. Construction goes through [`Isbn::parse`], which strips
//! separators, enforces length, and verifies the checksum. Invalid input is
//! fatal for that identifier and is never retried downstream.
//!
//! # Example
//!
//! ```
//! use bookmeta_core::isbn::Isbn;
//!
//! let isbn = Isbn::parse("978-0-13-468599-1")?;
//! assert_eq!(isbn.as_str(), "9780134685991");
//! assert_eq!(isbn.to_isbn10().unwrap().as_str(), "0134685997");
//! # Ok::<(), bookmeta_core::isbn::IsbnError>(())
//! ```

use std::fmt;

use thiserror::Error;

/// Registry prefixes valid for the 13-digit form.
const ISBN13_PREFIXES: [&str; 2] = ["978", "979"];

/// Publisher-confirmed variant pairs (13-digit form).
///
/// Some publishers issue multiple identifiers for what is catalogued as one
/// edition (hardcover/paperback reissues sharing metadata). Checksum equality
/// alone under-merges these; the table is deliberately small and static.
const KNOWN_VARIANTS: [(&str, &str); 2] = [
    ("9780262011532", "9780262510875"),
    ("9781593275990", "9781593276034"),
];

/// Errors produced by identifier parsing and conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IsbnError {
    /// Input does not normalize to a 10- or 13-digit identifier.
    #[error("invalid identifier format for '{input}': {reason}")]
    InvalidFormat {
        /// The raw input that failed normalization.
        input: String,
        /// Why normalization rejected it.
        reason: String,
    },

    /// Identifier has the right shape but fails its checksum.
    #[error("checksum validation failed for '{input}'")]
    InvalidChecksum {
        /// The normalized identifier that failed.
        input: String,
    },
}

impl IsbnError {
    fn invalid_format(input: &str, reason: &str) -> Self {
        Self::InvalidFormat {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A normalized, checksum-valid 10- or 13-digit book identifier.
///
/// Immutable value type. The 13-digit form always starts with one of the two
/// fixed registry prefixes (`978`/`979`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Isbn {
    digits: String,
}

impl Isbn {
    /// Parses and validates a raw identifier string.
    ///
    /// Strips every character except digits and the literal `X` check
    /// character (uppercased), then enforces length, registry prefix, and
    /// checksum.
    ///
    /// # Errors
    ///
    /// Returns [`IsbnError::InvalidFormat`] when the normalized form is not
    /// 10 or 13 characters long, when `X` appears anywhere but the final
    /// position of a 10-digit identifier, or when a 13-digit identifier does
    /// not start with a known registry prefix.
    /// Returns [`IsbnError::InvalidChecksum`] when the check digit is wrong.
    pub fn parse(raw: &str) -> Result<Self, IsbnError> {
        let normalized = normalize(raw);

        match normalized.len() {
            10 => {
                if normalized[..9].contains('X') {
                    return Err(IsbnError::invalid_format(
                        raw,
                        "check character X is only valid in the final position",
                    ));
                }
                if !validate_checksum_10(&normalized) {
                    return Err(IsbnError::InvalidChecksum { input: normalized });
                }
            }
            13 => {
                if normalized.contains('X') {
                    return Err(IsbnError::invalid_format(
                        raw,
                        "13-digit identifiers contain digits only",
                    ));
                }
                if !ISBN13_PREFIXES.iter().any(|p| normalized.starts_with(p)) {
                    return Err(IsbnError::invalid_format(
                        raw,
                        "13-digit identifiers must start with registry prefix 978 or 979",
                    ));
                }
                if !validate_checksum_13(&normalized) {
                    return Err(IsbnError::InvalidChecksum { input: normalized });
                }
            }
            n => {
                return Err(IsbnError::invalid_format(
                    raw,
                    &format!("expected 10 or 13 significant characters, found {n}"),
                ));
            }
        }

        Ok(Self { digits: normalized })
    }

    /// Returns the normalized identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.digits
    }

    /// Returns true for the 13-digit form.
    #[must_use]
    pub fn is_thirteen(&self) -> bool {
        self.digits.len() == 13
    }

    /// Returns the 13-digit form, enriching a 10-digit identifier with the
    /// standard `978` registry prefix and a recomputed check digit.
    ///
    /// This is a one-way enrichment: it is the identity on 13-digit input and
    /// always succeeds because `parse` already validated the identifier.
    #[must_use]
    pub fn to_isbn13(&self) -> Isbn {
        if self.is_thirteen() {
            return self.clone();
        }
        let mut digits = String::with_capacity(13);
        digits.push_str("978");
        digits.push_str(&self.digits[..9]);
        digits.push(check_digit_13(&digits));
        Isbn { digits }
    }

    /// Returns the 10-digit form, if one exists.
    ///
    /// Only identifiers under the `978` prefix have a 10-digit equivalent;
    /// `979`-prefixed identifiers return `None`. The conversion is lossy and
    /// is not guaranteed to round-trip from arbitrary 10-digit input.
    #[must_use]
    pub fn to_isbn10(&self) -> Option<Isbn> {
        if !self.is_thirteen() {
            return Some(self.clone());
        }
        if !self.digits.starts_with("978") {
            return None;
        }
        let mut digits = String::with_capacity(10);
        digits.push_str(&self.digits[3..12]);
        digits.push(check_digit_10(&digits));
        Some(Isbn { digits })
    }

    /// Returns the registration-group digit of the 13-digit form.
    ///
    /// Used by the region routing table. Real registration groups can span
    /// several digits; the single leading digit is enough for the static
    /// routing rules shipped here.
    #[must_use]
    pub fn registration_group(&self) -> char {
        let thirteen = self.to_isbn13();
        // Index 3 exists on every 13-digit identifier.
        thirteen.digits.as_bytes()[3] as char
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits)
    }
}

/// Strips all characters except digits and the `X` check character
/// (uppercased). Does not validate length or checksum.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            'x' | 'X' => Some('X'),
            _ => None,
        })
        .collect()
}

/// Validates the weighted alternating 1/3 mod-10 checksum of a 13-digit
/// identifier. Returns false for any other length or non-digit input.
#[must_use]
pub fn validate_checksum_13(digits: &str) -> bool {
    if digits.len() != 13 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    digits.as_bytes()[12] as char == check_digit_13(&digits[..12])
}

/// Validates the weighted 10..1 mod-11 checksum of a 10-digit identifier,
/// treating a trailing `X` as the value 10.
#[must_use]
pub fn validate_checksum_10(digits: &str) -> bool {
    if digits.len() != 10 {
        return false;
    }
    let mut sum: u32 = 0;
    for (i, c) in digits.chars().enumerate() {
        let value = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'X' if i == 9 => 10,
            _ => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

/// Computes the mod-10 check digit over the first 12 digits.
fn check_digit_13(first_twelve: &str) -> char {
    let sum: u32 = first_twelve
        .bytes()
        .take(12)
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 0 { d } else { d * 3 }
        })
        .sum();
    let check = (10 - sum % 10) % 10;
    char::from(b'0' + check as u8)
}

/// Computes the mod-11 check character over the first 9 digits.
fn check_digit_10(first_nine: &str) -> char {
    let sum: u32 = first_nine
        .bytes()
        .take(9)
        .enumerate()
        .map(|(i, b)| u32::from(b - b'0') * (10 - i as u32))
        .sum();
    match (11 - sum % 11) % 11 {
        10 => 'X',
        d => char::from(b'0' + d as u8),
    }
}

/// Returns true when two identifiers describe the same logical work.
///
/// Two identifiers match when they are equal after conversion to the common
/// 13-digit length, or when they appear together in the static table of
/// publisher-confirmed variants. Exact equality alone under-merges real-world
/// data; see [`KNOWN_VARIANTS`].
#[must_use]
pub fn is_known_variant(a: &Isbn, b: &Isbn) -> bool {
    let a13 = a.to_isbn13();
    let b13 = b.to_isbn13();
    if a13 == b13 {
        return true;
    }
    KNOWN_VARIANTS.iter().any(|(x, y)| {
        (a13.as_str() == *x && b13.as_str() == *y) || (a13.as_str() == *y && b13.as_str() == *x)
    })
}
