// Error taxonomy surfaced to the presentation layer

use thiserror::Error;

use crate::time_slot::{CalendarDate, ProviderId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Provider directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Availability for provider {provider_id} on {date} unavailable: {reason}")]
    AvailabilityUnavailable {
        provider_id: ProviderId,
        date: CalendarDate,
        reason: String,
    },

    #[error("Selection incomplete: {0}")]
    IncompleteSelection(String),

    #[error("Booking rejected: {0}")]
    BookingRejected(String),

    #[error("Booking service unavailable: {0}")]
    BookingUnavailable(String),

    #[error("Invalid slot hour {0}")]
    InvalidSlot(u8),
}

impl CoordinatorError {
    /// Whether the user can recover by repeating or adjusting the action.
    /// Only a malformed slot from the backing service is not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CoordinatorError::InvalidSlot(_))
    }

    /// Local precondition failures are shown as a blocked action rather than
    /// an alert.
    pub fn is_local(&self) -> bool {
        matches!(self, CoordinatorError::IncompleteSelection(_))
    }
}
