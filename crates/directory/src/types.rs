//! Tenant identifier type.
//!
//! A [`TenantId`] is the primary key of the tenant directory and the first
//! DNS label of every tenant's host name (`{tenant_id}.example.com`). It is
//! always non-empty, lowercase ASCII and at most 63 characters.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of an identifier derived from a company name.
pub const MAX_DERIVED_LEN: usize = 50;

/// Maximum length of any tenant identifier (one DNS label).
pub const MAX_TENANT_ID_LEN: usize = 63;

/// A validated tenant identifier.
///
/// # Examples
///
/// ```
/// use tenantgate_directory::TenantId;
///
/// let id = TenantId::parse("acmecorp")?;
/// assert_eq!(id.as_str(), "acmecorp");
///
/// let derived = TenantId::derive_from_company_name("Acme Corp!").expect("non-empty");
/// assert_eq!(derived, id);
/// # Ok::<(), tenantgate_directory::InvalidTenantId>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

/// Rejected tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid tenant id '{value}': {reason}")]
pub struct InvalidTenantId {
    /// The rejected input, truncated for display.
    pub value: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl InvalidTenantId {
    fn new(value: &str, reason: &'static str) -> Self {
        Self { value: value.chars().take(MAX_TENANT_ID_LEN + 1).collect(), reason }
    }
}

impl TenantId {
    /// Parses a tenant identifier.
    ///
    /// Accepts 1 to 63 characters of lowercase ASCII letters, digits and
    /// `-`, not starting or ending with `-`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTenantId`] if `value` violates any of these rules.
    pub fn parse(value: &str) -> Result<Self, InvalidTenantId> {
        if value.is_empty() {
            return Err(InvalidTenantId::new(value, "must not be empty"));
        }
        if value.len() > MAX_TENANT_ID_LEN {
            return Err(InvalidTenantId::new(value, "longer than 63 characters"));
        }
        if !value.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-') {
            return Err(InvalidTenantId::new(
                value,
                "only lowercase letters, digits and '-' are allowed",
            ));
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(InvalidTenantId::new(value, "must not start or end with '-'"));
        }
        Ok(Self(value.to_owned()))
    }

    /// Derives the identifier assigned to a tenant at onboarding.
    ///
    /// Drops every character that is not an ASCII letter or digit, lowercases
    /// the rest and keeps the first [`MAX_DERIVED_LEN`] characters. The
    /// derivation is deterministic and idempotent.
    ///
    /// Returns `None` when no character survives.
    ///
    /// ```
    /// use tenantgate_directory::TenantId;
    ///
    /// let id = TenantId::derive_from_company_name("Acme Corp!").expect("non-empty");
    /// assert_eq!(id.as_str(), "acmecorp");
    /// assert_eq!(TenantId::derive_from_company_name(id.as_str()), Some(id));
    /// assert_eq!(TenantId::derive_from_company_name("!!!"), None);
    /// ```
    #[must_use]
    pub fn derive_from_company_name(company_name: &str) -> Option<Self> {
        let derived: String = company_name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .take(MAX_DERIVED_LEN)
            .collect();
        if derived.is_empty() { None } else { Some(Self(derived)) }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TenantId {
    type Err = InvalidTenantId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = InvalidTenantId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::punctuation("Acme Corp!", "acmecorp")]
    #[case::whitespace("  Foo\tBar \n", "foobar")]
    #[case::underscore("snake_case_co", "snakecaseco")]
    #[case::digits("Route 66 Diner", "route66diner")]
    #[case::non_ascii("Café Müller", "cafmller")]
    #[case::already_derived("acmecorp", "acmecorp")]
    fn test_derive_from_company_name(#[case] name: &str, #[case] expected: &str) {
        let id = TenantId::derive_from_company_name(name).expect("non-empty");
        assert_eq!(id.as_str(), expected);
    }

    #[test]
    fn test_derive_truncates_to_fifty() {
        let name = "A".repeat(80);
        let id = TenantId::derive_from_company_name(&name).expect("non-empty");
        assert_eq!(id.as_str().len(), MAX_DERIVED_LEN);
    }

    #[test]
    fn test_derive_truncates_after_stripping() {
        let name = format!("{}{}", "a b ".repeat(30), "tail");
        let id = TenantId::derive_from_company_name(&name).expect("non-empty");
        assert_eq!(id.as_str(), "ab".repeat(25));
    }

    #[rstest]
    #[case::empty("")]
    #[case::only_symbols("!!! ???")]
    #[case::only_underscores("___")]
    fn test_derive_rejects_names_without_word_chars(#[case] name: &str) {
        assert_eq!(TenantId::derive_from_company_name(name), None);
    }

    #[rstest]
    #[case::simple("acmecorp")]
    #[case::hyphenated("acme-corp")]
    #[case::digits("tenant42")]
    #[case::single("a")]
    fn test_parse_accepts(#[case] value: &str) {
        assert_eq!(TenantId::parse(value).expect("valid").as_str(), value);
    }

    #[rstest]
    #[case::empty("")]
    #[case::uppercase("AcmeCorp")]
    #[case::dot("acme.corp")]
    #[case::leading_dash("-acme")]
    #[case::trailing_dash("acme-")]
    #[case::space("acme corp")]
    #[case::too_long(&"a".repeat(64))]
    fn test_parse_rejects(#[case] value: &str) {
        assert!(TenantId::parse(value).is_err(), "expected '{value}' to be rejected");
    }

    #[test]
    fn test_serde_validates_on_deserialize() {
        let id: TenantId = serde_json::from_str("\"acmecorp\"").expect("valid id");
        assert_eq!(id.as_str(), "acmecorp");
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"acmecorp\"");

        let bad = serde_json::from_str::<TenantId>("\"Not Valid\"");
        assert!(bad.is_err());
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn derive_is_idempotent(name in ".{0,120}") {
                if let Some(once) = TenantId::derive_from_company_name(&name) {
                    let twice = TenantId::derive_from_company_name(once.as_str());
                    prop_assert_eq!(twice, Some(once));
                }
            }

            #[test]
            fn derive_is_bounded_and_parseable(name in ".{0,120}") {
                if let Some(id) = TenantId::derive_from_company_name(&name) {
                    prop_assert!(id.as_str().len() <= MAX_DERIVED_LEN);
                    prop_assert!(TenantId::parse(id.as_str()).is_ok());
                }
            }

            #[test]
            fn parse_round_trips_display(value in "[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?") {
                let id = TenantId::parse(&value).expect("generated ids are valid");
                prop_assert_eq!(id.to_string(), value);
            }
        }
    }
}
