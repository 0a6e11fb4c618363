//! Domain primitives for the attendance ledgers.
//!
//! Strong newtypes keep addresses, token amounts and the two id spaces
//! from being mixed up in function signatures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of an [`Address`].
pub const MAX_ADDRESS_LEN: usize = 64;

/// Error type for `Address` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid address: {0}")]
pub struct ParseAddressError(String);

/// An authenticated participant identity.
///
/// Callers, the administrator and the ledgers themselves (the ticket ledger
/// holds escrowed tokens) are all addresses. Identity is compared by equality.
///
/// # Validation
///
/// - `FromStr::from_str()`: rejects empty strings, strings longer than
///   [`MAX_ADDRESS_LEN`] and characters outside ASCII alphanumerics and `-_.:`
/// - `From::from()` and `new()`: no validation (for trusted, application-controlled input)
///
/// The character set keeps addresses safe to embed in `/`-separated storage keys.
///
/// # Examples
///
/// ```
/// use attendance_core::types::Address;
///
/// let alice: Address = "alice".parse().unwrap();
/// assert_eq!(alice.as_str(), "alice");
/// assert!("bad/address".parse::<Address>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create a new `Address` without validation.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseAddressError("address cannot be empty".to_string()));
        }
        if s.len() > MAX_ADDRESS_LEN {
            return Err(ParseAddressError(format!(
                "address longer than {MAX_ADDRESS_LEN} characters"
            )));
        }
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
        {
            return Err(ParseAddressError(format!("unexpected character {bad:?} in {s}")));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fungible-token quantity in the smallest indivisible unit.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u128);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from raw units.
    #[must_use]
    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    /// Returns the raw units.
    #[must_use]
    pub const fn units(self) -> u128 {
        self.0
    }

    /// Checks if this amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Subtracts `other`, returning `None` if it exceeds `self`.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(diff) => Some(Self(diff)),
            None => None,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Amount {
    fn from(units: u128) -> Self {
        Self(units)
    }
}

/// Ticket identifier, assigned sequentially from 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketId(u64);

impl TicketId {
    /// Creates a ticket id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Redemption (proof-of-attendance) identifier, assigned sequentially from 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RedemptionId(u64);

impl RedemptionId {
    /// Creates a redemption id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RedemptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sale phase of the ticket ledger.
///
/// Never stored: derived on every call from the current time and the
/// configured start time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleState {
    /// `now < start_time`: any whitelisted payer may buy.
    OnSale,
    /// `now >= start_time`: only the administrator may issue.
    Closed,
}

impl SaleState {
    /// Derives the sale state at `now` for an event starting at `start_time`.
    #[must_use]
    pub fn at(now: DateTime<Utc>, start_time: DateTime<Utc>) -> Self {
        if now < start_time {
            Self::OnSale
        } else {
            Self::Closed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn address_parse_rejects_empty_and_separators() {
        assert!("".parse::<Address>().is_err());
        assert!("alice/bob".parse::<Address>().is_err());
        assert!("a".repeat(MAX_ADDRESS_LEN + 1).parse::<Address>().is_err());
        assert_eq!(
            "0xAbC-1_2.3:4".parse::<Address>(),
            Ok(Address::new("0xAbC-1_2.3:4"))
        );
    }

    #[test]
    fn amount_checked_arithmetic() {
        let ten = Amount::new(10);
        assert_eq!(ten.checked_add(Amount::new(5)), Some(Amount::new(15)));
        assert_eq!(ten.checked_sub(Amount::new(11)), None);
        assert_eq!(Amount::new(u128::MAX).checked_add(Amount::new(1)), None);
        assert!(Amount::ZERO.is_zero());
    }

    proptest::proptest! {
        #[test]
        fn well_formed_addresses_parse_to_themselves(raw in "[A-Za-z0-9:._-]{1,64}") {
            proptest::prop_assert_eq!(raw.parse::<Address>(), Ok(Address::new(raw.clone())));
        }

        #[test]
        fn checked_add_matches_u128(a: u128, b: u128) {
            let sum = Amount::new(a).checked_add(Amount::new(b));
            proptest::prop_assert_eq!(sum.map(Amount::units), a.checked_add(b));
        }
    }

    #[test]
    fn sale_state_closes_at_start_time() {
        let start = Utc::now();
        assert_eq!(SaleState::at(start - Duration::seconds(1), start), SaleState::OnSale);
        assert_eq!(SaleState::at(start, start), SaleState::Closed);
        assert_eq!(SaleState::at(start + Duration::days(1), start), SaleState::Closed);
    }
}
