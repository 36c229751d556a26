use chrono::{DateTime, Utc};

use super::types::{QuotaError, Reservation, UsageSnapshot};
use crate::accounts::Entitlement;
use crate::auth::Identity;

/// Gatekeeper for daily usage.
///
/// Check and reservation happen in one step so concurrent requests from the
/// same identity can never both slip under the limit.
pub trait QuotaLedger: Send + Sync {
    /// Reserve one slot for `identity`, or fail with `QuotaError::Exceeded`.
    fn check_and_reserve(
        &self,
        identity: &Identity,
        entitlement: &Entitlement,
        now: DateTime<Utc>,
    ) -> Result<Reservation, QuotaError> {
        let mut reservations = self.check_and_reserve_many(identity, entitlement, 1, now)?;
        reservations
            .pop()
            .ok_or_else(|| QuotaError::Database("no reservation returned".to_string()))
    }

    /// Reserve `slots` slots at once. Either all are granted or none.
    fn check_and_reserve_many(
        &self,
        identity: &Identity,
        entitlement: &Entitlement,
        slots: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, QuotaError>;

    /// Turn a reservation into counted usage.
    fn commit(&self, reservation: Reservation) -> Result<(), QuotaError>;

    /// Give a reservation back without counting it.
    fn release(&self, reservation: Reservation) -> Result<(), QuotaError>;

    /// Drop every outstanding reservation. Only valid while no submission is
    /// in flight, at startup. Returns the number of counters touched.
    fn clear_reservations(&self) -> Result<usize, QuotaError>;

    fn usage(
        &self,
        identity: &Identity,
        entitlement: &Entitlement,
        now: DateTime<Utc>,
    ) -> Result<UsageSnapshot, QuotaError>;
}
