//! Participant identity, parameters and termination outcomes.
//!
//! Vendors and customers are described here as plain validated values. The
//! runtime crate turns them into running tasks.

use crate::error::MarketError;
use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a vendor or customer
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Creates a new random `ParticipantId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ParticipantId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the market a participant is on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Releases tickets into the pool
    Vendor,
    /// Withdraws tickets from the pool
    Customer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vendor => write!(f, "vendor"),
            Self::Customer => write!(f, "customer"),
        }
    }
}

/// Identity of a running participant, as reported in telemetry and status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    /// Unique id
    pub id: ParticipantId,
    /// Display name as given by the caller
    pub name: String,
    /// Vendor or customer
    pub role: Role,
}

/// Normalizes a display name for roster lookups: trimmed and lowercased.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// Parameters
// ============================================================================

/// Parameters for a vendor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorParams {
    /// Display name, unique among active vendors (case-insensitive)
    pub name: String,
    /// Event label stamped on every ticket
    pub event_name: String,
    /// Tickets released per batch
    pub batch_size: u32,
    /// Pause between batches
    pub period: Duration,
    /// Total tickets this vendor releases before finishing
    pub quota: u32,
    /// Price of each ticket
    pub price: Money,
}

impl VendorParams {
    /// Builds params with the period given in whole seconds
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        event_name: impl Into<String>,
        batch_size: u32,
        period_secs: u64,
        quota: u32,
        price: Money,
    ) -> Self {
        Self {
            name: name.into(),
            event_name: event_name.into(),
            batch_size,
            period: Duration::from_secs(period_secs),
            quota,
            price,
        }
    }

    /// Override the pacing period (sub-second periods are useful in tests)
    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Validate the parameters
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidParameter`] if the name or event name is
    /// blank, or if `batch_size` or `quota` is zero.
    pub fn validate(&self) -> Result<(), MarketError> {
        require_name("name", &self.name)?;
        require_name("event_name", &self.event_name)?;
        require_positive("batch_size", self.batch_size)?;
        require_positive("quota", self.quota)
    }
}

/// Parameters for a customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerParams {
    /// Display name, unique among active customers (case-insensitive)
    pub name: String,
    /// Pause between purchases
    pub period: Duration,
    /// Total tickets this customer buys before finishing
    pub quota: u32,
}

impl CustomerParams {
    /// Builds params with the period given in whole seconds
    #[must_use]
    pub fn new(name: impl Into<String>, period_secs: u64, quota: u32) -> Self {
        Self {
            name: name.into(),
            period: Duration::from_secs(period_secs),
            quota,
        }
    }

    /// Override the pacing period
    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Validate the parameters
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidParameter`] if the name is blank or
    /// `quota` is zero.
    pub fn validate(&self) -> Result<(), MarketError> {
        require_name("name", &self.name)?;
        require_positive("quota", self.quota)
    }
}

fn require_name(field: &'static str, value: &str) -> Result<(), MarketError> {
    if value.trim().is_empty() {
        return Err(MarketError::InvalidParameter {
            field,
            reason: "must not be blank".to_string(),
        });
    }
    Ok(())
}

fn require_positive(field: &'static str, value: u32) -> Result<(), MarketError> {
    if value == 0 {
        return Err(MarketError::InvalidParameter {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Termination
// ============================================================================

/// Why a participant's execution loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Issued or bought its full quota
    QuotaReached,
    /// Removed individually
    Cancelled,
    /// The pool was stopped (global shutdown)
    Stopped,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaReached => write!(f, "quota reached"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_name("  V1 "), "v1");
        assert_eq!(normalize_name("Alice"), normalize_name("alice\t"));
    }

    #[test]
    fn vendor_validation() {
        let ok = VendorParams::new("V1", "Gig", 3, 0, 10, Money::from_cents(500));
        assert!(ok.validate().is_ok());

        let bad_batch = VendorParams { batch_size: 0, ..ok.clone() };
        assert!(matches!(
            bad_batch.validate(),
            Err(MarketError::InvalidParameter { field: "batch_size", .. })
        ));

        let bad_quota = VendorParams { quota: 0, ..ok.clone() };
        assert!(matches!(
            bad_quota.validate(),
            Err(MarketError::InvalidParameter { field: "quota", .. })
        ));

        let blank_event = VendorParams { event_name: "  ".into(), ..ok };
        assert!(matches!(
            blank_event.validate(),
            Err(MarketError::InvalidParameter { field: "event_name", .. })
        ));
    }

    #[test]
    fn customer_validation() {
        assert!(CustomerParams::new("C1", 0, 1).validate().is_ok());
        assert!(CustomerParams::new(" ", 0, 1).validate().is_err());
        assert!(CustomerParams::new("C1", 0, 0).validate().is_err());
    }

    #[test]
    fn termination_serializes_snake_case() {
        let json = serde_json::to_string(&Termination::QuotaReached).unwrap();
        assert_eq!(json, "\"quota_reached\"");
    }
}
