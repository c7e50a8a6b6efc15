// Availability fetcher
//
// Every request is tagged with a monotonically increasing sequence number.
// A response is applied only if its sequence number is still the latest one
// issued; anything older is dropped on arrival, successful or not. In-flight
// requests are never aborted, their results are just ignored.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::CoordinatorError;
use crate::service::{AvailabilityService, ServiceError};
use crate::time_slot::{validate_slots, AvailabilitySlot, CalendarDate, ProviderId};

/// Snapshot of one provider's day as returned by the backing service.
/// Replaced wholesale by the next applied fetch, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayAvailability {
    pub provider_id: ProviderId,
    pub date: CalendarDate,
    pub slots: Vec<AvailabilitySlot>,
    pub seq: u64,
}

impl DayAvailability {
    pub fn matches(&self, provider_id: &ProviderId, date: CalendarDate) -> bool {
        &self.provider_id == provider_id && self.date == date
    }

    pub fn slot(&self, hour: u8) -> Option<&AvailabilitySlot> {
        self.slots.iter().find(|slot| slot.hour == hour)
    }

    pub fn is_available(&self, hour: u8) -> bool {
        self.slot(hour).is_some_and(|slot| slot.available)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied(Arc<DayAvailability>),
    // A newer request was issued while this one was in flight
    Superseded { seq: u64 },
}

impl FetchOutcome {
    pub fn applied(&self) -> Option<&Arc<DayAvailability>> {
        match self {
            FetchOutcome::Applied(day) => Some(day),
            FetchOutcome::Superseded { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestTicket {
    seq: u64,
    provider_id: ProviderId,
    date: CalendarDate,
}

#[derive(Debug, Default)]
struct RequestLog {
    last_seq: u64,
    latest: Option<RequestTicket>,
    resolved_seq: u64,
}

#[derive(Debug, Default)]
pub struct FetchStats {
    pub started: AtomicUsize,
    pub applied: AtomicUsize,
    pub superseded: AtomicUsize,
    pub failed: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchStatsReport {
    pub started: usize,
    pub applied: usize,
    pub superseded: usize,
    pub failed: usize,
}

pub struct AvailabilityFetcher<S: AvailabilityService> {
    service: Arc<S>,
    requests: Mutex<RequestLog>,
    current: RwLock<Option<Arc<DayAvailability>>>,
    stats: FetchStats,
}

impl<S: AvailabilityService> AvailabilityFetcher<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            requests: Mutex::new(RequestLog::default()),
            current: RwLock::new(None),
            stats: FetchStats::default(),
        }
    }

    /// Fetches the day for `(provider_id, date)`. The previous snapshot stays
    /// visible until this one lands; on failure it is kept and the error is
    /// returned, unless the request was superseded in the meantime.
    pub async fn fetch_day(
        &self,
        provider_id: &ProviderId,
        date: CalendarDate,
    ) -> Result<FetchOutcome, CoordinatorError> {
        let seq = self.begin(provider_id, date);
        let result = self.service.day_availability(provider_id, date).await;
        self.complete(seq, provider_id, date, result)
    }

    fn begin(&self, provider_id: &ProviderId, date: CalendarDate) -> u64 {
        let mut log = self.requests.lock();
        log.last_seq += 1;
        let seq = log.last_seq;
        log.latest = Some(RequestTicket {
            seq,
            provider_id: provider_id.clone(),
            date,
        });
        self.stats.started.fetch_add(1, Ordering::SeqCst);
        debug!(provider_id = %provider_id, date = %date, seq, "Availability fetch started");
        seq
    }

    fn complete(
        &self,
        seq: u64,
        provider_id: &ProviderId,
        date: CalendarDate,
        result: Result<Vec<AvailabilitySlot>, ServiceError>,
    ) -> Result<FetchOutcome, CoordinatorError> {
        // Held until the snapshot is swapped so a concurrent begin() cannot
        // slip in between the check and the write
        let mut log = self.requests.lock();

        if log.last_seq != seq {
            self.stats.superseded.fetch_add(1, Ordering::SeqCst);
            debug!(
                provider_id = %provider_id,
                date = %date,
                seq,
                latest = log.last_seq,
                "Discarding stale availability response"
            );
            return Ok(FetchOutcome::Superseded { seq });
        }
        log.resolved_seq = seq;

        let slots = match result {
            Ok(slots) => slots,
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                warn!(provider_id = %provider_id, date = %date, seq, error = %e, "Availability fetch failed");
                return Err(CoordinatorError::AvailabilityUnavailable {
                    provider_id: provider_id.clone(),
                    date,
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = validate_slots(&slots) {
            self.stats.failed.fetch_add(1, Ordering::SeqCst);
            warn!(provider_id = %provider_id, date = %date, seq, error = %e, "Backing service sent an invalid slot");
            return Err(e);
        }

        let day = Arc::new(DayAvailability {
            provider_id: provider_id.clone(),
            date,
            slots,
            seq,
        });
        *self.current.write() = Some(Arc::clone(&day));
        self.stats.applied.fetch_add(1, Ordering::SeqCst);
        info!(provider_id = %provider_id, date = %date, seq, slots = day.slots.len(), "Availability applied");

        Ok(FetchOutcome::Applied(day))
    }

    /// The snapshot currently shown, which may belong to an older key while a
    /// newer fetch is pending.
    pub fn current(&self) -> Option<Arc<DayAvailability>> {
        self.current.read().clone()
    }

    /// True while the most recent request has not resolved yet.
    pub fn is_pending(&self) -> bool {
        let log = self.requests.lock();
        log.latest
            .as_ref()
            .is_some_and(|ticket| ticket.seq != log.resolved_seq)
    }

    pub fn latest_request(&self) -> Option<(ProviderId, CalendarDate)> {
        self.requests
            .lock()
            .latest
            .as_ref()
            .map(|ticket| (ticket.provider_id.clone(), ticket.date))
    }

    pub fn stats(&self) -> FetchStatsReport {
        FetchStatsReport {
            started: self.stats.started.load(Ordering::SeqCst),
            applied: self.stats.applied.load(Ordering::SeqCst),
            superseded: self.stats.superseded.load(Ordering::SeqCst),
            failed: self.stats.failed.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::mock_backend::MockBackend;

    fn march_10() -> CalendarDate {
        CalendarDate::from_ymd(2024, 3, 10).unwrap()
    }

    fn march_11() -> CalendarDate {
        CalendarDate::from_ymd(2024, 3, 11).unwrap()
    }

    fn backend() -> Arc<MockBackend> {
        let backend = MockBackend::new();
        backend.set_day("P1", march_10(), &[(8, true), (9, false), (14, true)]);
        backend.set_day("P2", march_10(), &[(10, true), (16, true)]);
        backend.set_day("P1", march_11(), &[(11, true)]);
        Arc::new(backend)
    }

    #[tokio::test]
    async fn test_fetch_applies_snapshot() {
        let fetcher = AvailabilityFetcher::new(backend());

        let outcome = fetcher.fetch_day(&"P1".into(), march_10()).await.unwrap();

        let day = outcome.applied().unwrap();
        assert_eq!(day.slots.len(), 3);
        assert!(day.is_available(8));
        assert!(!day.is_available(9));
        assert!(!day.is_available(10));
        assert_eq!(fetcher.current().unwrap().seq, 1);
        assert!(!fetcher.is_pending());
    }

    #[tokio::test]
    async fn test_out_of_order_responses_keep_latest() {
        let backend = backend();
        backend.hold("P1");
        let fetcher = AvailabilityFetcher::new(Arc::clone(&backend));

        let p1 = "P1".into();
        let p2 = "P2".into();
        let first = fetcher.fetch_day(&p1, march_10());
        let second = async {
            let outcome = fetcher.fetch_day(&p2, march_10()).await;
            // P1 resolves only after P2 has been applied
            backend.release("P1");
            outcome
        };

        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), FetchOutcome::Superseded { seq: 1 });
        assert!(second.unwrap().applied().is_some());

        let current = fetcher.current().unwrap();
        assert_eq!(current.provider_id, ProviderId::new("P2"));
        assert_eq!(current.seq, 2);

        let stats = fetcher.stats();
        assert_eq!(stats.started, 2);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.superseded, 1);
    }

    #[tokio::test]
    async fn test_stale_failure_is_discarded() {
        let backend = backend();
        backend.hold("P1");
        let fetcher = AvailabilityFetcher::new(Arc::clone(&backend));

        let p1 = "P1".into();
        let p2 = "P2".into();
        let first = fetcher.fetch_day(&p1, march_10());
        let second = async {
            let outcome = fetcher.fetch_day(&p2, march_10()).await;
            backend.fail_next_availability(1);
            backend.release("P1");
            outcome
        };

        let (first, second) = tokio::join!(first, second);

        assert!(matches!(first, Ok(FetchOutcome::Superseded { .. })));
        assert!(second.is_ok());
        assert_eq!(fetcher.current().unwrap().provider_id, ProviderId::new("P2"));
        assert_eq!(fetcher.stats().failed, 0);
    }

    #[tokio::test]
    async fn test_previous_snapshot_visible_while_pending() {
        let backend = backend();
        let fetcher = AvailabilityFetcher::new(Arc::clone(&backend));
        fetcher.fetch_day(&"P1".into(), march_10()).await.unwrap();

        backend.hold("P1");
        let p1 = "P1".into();
        let pending = fetcher.fetch_day(&p1, march_11());
        let observer = async {
            tokio::task::yield_now().await;
            let seen = (fetcher.current().unwrap().date, fetcher.is_pending());
            backend.release("P1");
            seen
        };

        let (outcome, (shown_date, pending_flag)) = tokio::join!(pending, observer);

        assert_eq!(shown_date, march_10());
        assert!(pending_flag);
        assert!(outcome.unwrap().applied().is_some());
        assert_eq!(fetcher.current().unwrap().date, march_11());
    }

    #[tokio::test]
    async fn test_failure_retains_prior_snapshot() {
        let backend = backend();
        let fetcher = AvailabilityFetcher::new(Arc::clone(&backend));
        fetcher.fetch_day(&"P1".into(), march_10()).await.unwrap();

        backend.fail_next_availability(1);
        let result = fetcher.fetch_day(&"P1".into(), march_11()).await;

        match result {
            Err(CoordinatorError::AvailabilityUnavailable { provider_id, date, .. }) => {
                assert_eq!(provider_id, ProviderId::new("P1"));
                assert_eq!(date, march_11());
            }
            other => panic!("Expected AvailabilityUnavailable, got {:?}", other),
        }

        assert_eq!(fetcher.current().unwrap().date, march_10());
        assert!(!fetcher.is_pending());
        assert_eq!(fetcher.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_invalid_hour_rejected() {
        let backend = backend();
        backend.set_day("P3", march_10(), &[(9, true), (24, true)]);
        let fetcher = AvailabilityFetcher::new(Arc::clone(&backend));

        let result = fetcher.fetch_day(&"P3".into(), march_10()).await;

        assert!(matches!(result, Err(CoordinatorError::InvalidSlot(24))));
        assert!(fetcher.current().is_none());
    }

    #[tokio::test]
    async fn test_latest_request_tracks_key() {
        let fetcher = AvailabilityFetcher::new(backend());
        assert!(fetcher.latest_request().is_none());

        fetcher.fetch_day(&"P2".into(), march_10()).await.unwrap();

        assert_eq!(fetcher.latest_request(), Some((ProviderId::new("P2"), march_10())));
    }
}
