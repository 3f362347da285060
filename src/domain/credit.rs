use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditReason {
    BookingDebit,
    CancellationRefund,
    MembershipGrant,
    MembershipRevoke,
}

impl CreditReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditReason::BookingDebit => "BOOKING_DEBIT",
            CreditReason::CancellationRefund => "CANCELLATION_REFUND",
            CreditReason::MembershipGrant => "MEMBERSHIP_GRANT",
            CreditReason::MembershipRevoke => "MEMBERSHIP_REVOKE",
        }
    }
}

impl fmt::Display for CreditReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKING_DEBIT" => Ok(CreditReason::BookingDebit),
            "CANCELLATION_REFUND" => Ok(CreditReason::CancellationRefund),
            "MEMBERSHIP_GRANT" => Ok(CreditReason::MembershipGrant),
            "MEMBERSHIP_REVOKE" => Ok(CreditReason::MembershipRevoke),
            other => Err(format!("unknown credit reason: {other}")),
        }
    }
}

/// Immutable record of a change to a user's credit balance
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Difference in credits
    ///
    /// A positive number adds credits to the balance. A negative number removes from it.
    pub delta: i64,
    /// Balance right after this event was applied
    pub balance_after: i64,
    pub reason: CreditReason,
    /// Booking or membership that caused the change
    pub reference_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl CreditEvent {
    pub fn new(
        user_id: Uuid,
        delta: i64,
        balance_after: i64,
        reason: CreditReason,
        reference_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            delta,
            balance_after,
            reason,
            reference_id,
            created_at: Utc::now(),
        }
    }
}
