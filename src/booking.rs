// Booking submitter: one confirmation, one request, no automatic retries

use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::CoordinatorError;
use crate::fetcher::DayAvailability;
use crate::selection::Selection;
use crate::service::{BookingRequest, BookingService, ServiceError};
use crate::time_slot::ProviderId;

/// What the success screen is keyed by. `timestamp` is always the slot that
/// was requested; `appointment_id` is `None` when the service accepted the
/// booking but its reply could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingConfirmation {
    pub appointment_id: Option<String>,
    pub provider_id: ProviderId,
    pub timestamp: NaiveDateTime,
}

impl BookingConfirmation {
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.and_utc().timestamp_millis()
    }
}

#[derive(Debug, Default)]
pub struct BookingStats {
    pub submitted: AtomicUsize,
    pub confirmed: AtomicUsize,
    pub unreadable_replies: AtomicUsize,
    pub rejected: AtomicUsize,
    pub failed: AtomicUsize,
    pub blocked: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BookingStatsReport {
    pub submitted: usize,
    pub confirmed: usize,
    pub unreadable_replies: usize,
    pub rejected: usize,
    pub failed: usize,
    pub blocked: usize,
}

// Clears the in-flight flag even if the submission future is dropped
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct BookingSubmitter<S: BookingService> {
    service: Arc<S>,
    submitting: AtomicBool,
    stats: BookingStats,
}

impl<S: BookingService> BookingSubmitter<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            submitting: AtomicBool::new(false),
            stats: BookingStats::default(),
        }
    }

    /// Builds the outbound request from a selection whose hour is still
    /// available in `day`. Fails locally otherwise.
    pub fn prepare(
        selection: &Selection,
        day: Option<&DayAvailability>,
    ) -> Result<BookingRequest, CoordinatorError> {
        let hour = selection.confirmable_hour(day)?;
        Ok(BookingRequest {
            provider_id: selection.provider_id().clone(),
            timestamp: selection.date().at_hour(hour)?,
        })
    }

    /// Submits the selection exactly once. Each call is a separate request;
    /// nothing is deduplicated or retried here.
    pub async fn confirm(
        &self,
        selection: &Selection,
        day: Option<&DayAvailability>,
    ) -> Result<BookingConfirmation, CoordinatorError> {
        let request = match Self::prepare(selection, day) {
            Ok(request) => request,
            Err(e) => {
                self.stats.blocked.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        self.submit(request).await
    }

    async fn submit(&self, request: BookingRequest) -> Result<BookingConfirmation, CoordinatorError> {
        let _in_flight = InFlight::enter(&self.submitting);
        self.stats.submitted.fetch_add(1, Ordering::SeqCst);
        info!(provider_id = %request.provider_id, timestamp = %request.timestamp, "Submitting booking");

        match self.service.create_appointment(&request).await {
            Ok(created) => {
                self.stats.confirmed.fetch_add(1, Ordering::SeqCst);
                info!(appointment_id = %created.id, date = ?created.date, "Booking confirmed");
                Ok(BookingConfirmation {
                    appointment_id: Some(created.id),
                    provider_id: request.provider_id,
                    timestamp: request.timestamp,
                })
            }
            // Only produced after a 2xx: the appointment exists, so reporting a
            // failure here would invite a duplicate booking on retry.
            Err(ServiceError::Decode(reason)) => {
                self.stats.confirmed.fetch_add(1, Ordering::SeqCst);
                self.stats.unreadable_replies.fetch_add(1, Ordering::SeqCst);
                warn!(%reason, timestamp = %request.timestamp, "Booking accepted with unreadable reply");
                Ok(BookingConfirmation {
                    appointment_id: None,
                    provider_id: request.provider_id,
                    timestamp: request.timestamp,
                })
            }
            Err(ServiceError::Rejected { status_code, message }) => {
                self.stats.rejected.fetch_add(1, Ordering::SeqCst);
                warn!(status_code, %message, "Booking rejected by backing service");
                Err(CoordinatorError::BookingRejected(message))
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                warn!(error = %e, "Booking submission failed");
                Err(CoordinatorError::BookingUnavailable(e.to_string()))
            }
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> BookingStatsReport {
        BookingStatsReport {
            submitted: self.stats.submitted.load(Ordering::SeqCst),
            confirmed: self.stats.confirmed.load(Ordering::SeqCst),
            unreadable_replies: self.stats.unreadable_replies.load(Ordering::SeqCst),
            rejected: self.stats.rejected.load(Ordering::SeqCst),
            failed: self.stats.failed.load(Ordering::SeqCst),
            blocked: self.stats.blocked.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::mock_backend::{BookingMode, MockBackend};
    use crate::time_slot::{AvailabilitySlot, CalendarDate};

    fn march_10() -> CalendarDate {
        CalendarDate::from_ymd(2024, 3, 10).unwrap()
    }

    fn example_day() -> DayAvailability {
        DayAvailability {
            provider_id: ProviderId::new("P1"),
            date: march_10(),
            slots: vec![
                AvailabilitySlot::new(8, true),
                AvailabilitySlot::new(9, false),
                AvailabilitySlot::new(14, true),
            ],
            seq: 1,
        }
    }

    fn selected_at(hour: u8) -> Selection {
        Selection::new("P1".into(), march_10())
            .select_hour(hour, Some(&example_day()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_confirm_without_hour_never_calls_service() {
        let backend = Arc::new(MockBackend::new());
        let submitter = BookingSubmitter::new(Arc::clone(&backend));
        let selection = Selection::new("P1".into(), march_10());

        let result = submitter.confirm(&selection, Some(&example_day())).await;

        assert!(matches!(result, Err(CoordinatorError::IncompleteSelection(_))));
        assert_eq!(backend.booking_calls.load(Ordering::SeqCst), 0);
        assert_eq!(submitter.stats().blocked, 1);
    }

    #[tokio::test]
    async fn test_confirm_submits_merged_timestamp() {
        let backend = Arc::new(MockBackend::new());
        let submitter = BookingSubmitter::new(Arc::clone(&backend));

        let confirmation = submitter
            .confirm(&selected_at(14), Some(&example_day()))
            .await
            .unwrap();

        let bookings = backend.bookings();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].provider_id, ProviderId::new("P1"));
        assert_eq!(
            bookings[0].timestamp,
            march_10().at_hour(14).unwrap()
        );
        assert_eq!(confirmation.appointment_id.as_deref(), Some("appointment-1"));
        assert_eq!(confirmation.timestamp.to_string(), "2024-03-10 14:00:00");
        assert!(!submitter.is_submitting());
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let backend = Arc::new(MockBackend::new());
        backend.set_booking_mode(BookingMode::Reject("slot already booked".to_string()));
        let submitter = BookingSubmitter::new(Arc::clone(&backend));

        let result = submitter.confirm(&selected_at(8), Some(&example_day())).await;

        assert_eq!(
            result,
            Err(CoordinatorError::BookingRejected("slot already booked".to_string()))
        );
        assert_eq!(backend.booking_calls.load(Ordering::SeqCst), 1);
        assert_eq!(submitter.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_classified() {
        let backend = Arc::new(MockBackend::new());
        backend.set_booking_mode(BookingMode::Unavailable("connection reset".to_string()));
        let submitter = BookingSubmitter::new(Arc::clone(&backend));

        let result = submitter.confirm(&selected_at(8), Some(&example_day())).await;

        assert!(matches!(result, Err(CoordinatorError::BookingUnavailable(_))));
        assert_eq!(backend.booking_calls.load(Ordering::SeqCst), 1);
        assert_eq!(submitter.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_unreadable_success_reply_still_confirms() {
        let backend = Arc::new(MockBackend::new());
        backend.set_booking_mode(BookingMode::UnreadableReply);
        let submitter = BookingSubmitter::new(Arc::clone(&backend));

        let confirmation = submitter
            .confirm(&selected_at(14), Some(&example_day()))
            .await
            .unwrap();

        assert_eq!(confirmation.appointment_id, None);
        assert_eq!(confirmation.provider_id, ProviderId::new("P1"));
        assert_eq!(confirmation.timestamp, march_10().at_hour(14).unwrap());
        assert_eq!(backend.booking_calls.load(Ordering::SeqCst), 1);

        let stats = submitter.stats();
        assert_eq!(stats.confirmed, 1);
        assert_eq!(stats.unreadable_replies, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_each_confirmation_is_a_new_request() {
        let backend = Arc::new(MockBackend::new());
        let submitter = BookingSubmitter::new(Arc::clone(&backend));
        let selection = selected_at(14);

        submitter.confirm(&selection, Some(&example_day())).await.unwrap();
        submitter.confirm(&selection, Some(&example_day())).await.unwrap();

        assert_eq!(backend.booking_calls.load(Ordering::SeqCst), 2);
        assert_eq!(submitter.stats().submitted, 2);
    }

    #[tokio::test]
    async fn test_stale_day_blocks_confirmation() {
        let backend = Arc::new(MockBackend::new());
        let submitter = BookingSubmitter::new(Arc::clone(&backend));
        let mut taken = example_day();
        taken.slots[2].available = false;

        let result = submitter.confirm(&selected_at(14), Some(&taken)).await;

        assert!(matches!(result, Err(CoordinatorError::IncompleteSelection(_))));
        assert_eq!(backend.booking_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_timestamp_millis() {
        let confirmation = BookingConfirmation {
            appointment_id: Some("a1".to_string()),
            provider_id: ProviderId::new("P1"),
            timestamp: march_10().at_hour(14).unwrap(),
        };
        assert_eq!(confirmation.timestamp_millis(), 1_710_079_200_000);
    }
}
