// Availability & booking coordinator
//
// Wires the provider directory, the availability fetcher, the selection state
// machine and the booking submitter together for one booking screen. The
// coordinator is the only owner of the current `Selection` and replaces it
// with the value returned by each transition.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::booking::{BookingConfirmation, BookingStatsReport, BookingSubmitter};
use crate::directory::{DirectoryStatsReport, ProviderDirectory};
use crate::error::CoordinatorError;
use crate::fetcher::{AvailabilityFetcher, FetchOutcome, FetchStatsReport};
use crate::selection::{HourRejection, Selection};
use crate::service::{AvailabilityService, BookingService, DirectoryService};
use crate::time_slot::{
    partition_for_selection, CalendarDate, Provider, ProviderId, SlotPartition,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderChoice {
    pub provider: Provider,
    pub selected: bool,
}

/// Everything the booking screen renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleView {
    pub providers: Vec<ProviderChoice>,
    pub slots: SlotPartition,
    pub selection: Selection,
    // Key of the day the slots belong to
    pub showing: Option<(ProviderId, CalendarDate)>,
    pub is_stale: bool,
    pub pending: bool,
    pub can_confirm: bool,
    pub submitting: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub directory: DirectoryStatsReport,
    pub fetches: FetchStatsReport,
    pub bookings: BookingStatsReport,
}

/// Result of entering the screen. The two loads are independent, so each
/// carries its own outcome.
#[derive(Debug)]
pub struct EntryOutcome {
    pub providers: Result<Arc<Vec<Provider>>, CoordinatorError>,
    pub availability: Result<FetchOutcome, CoordinatorError>,
}

pub struct BookingCoordinator<B>
where
    B: DirectoryService + AvailabilityService + BookingService,
{
    directory: ProviderDirectory<B>,
    fetcher: AvailabilityFetcher<B>,
    submitter: BookingSubmitter<B>,
    selection: Mutex<Selection>,
    // Set after a rejected booking until the day is fetched again
    needs_refresh: AtomicBool,
}

impl<B> BookingCoordinator<B>
where
    B: DirectoryService + AvailabilityService + BookingService,
{
    /// Starts the screen on `provider_id` (usually the one tapped on the
    /// previous screen) and `date`. Nothing is fetched until [`enter`](Self::enter)
    /// or a transition.
    pub fn open(backend: Arc<B>, provider_id: ProviderId, date: CalendarDate) -> Self {
        Self {
            directory: ProviderDirectory::new(Arc::clone(&backend)),
            fetcher: AvailabilityFetcher::new(Arc::clone(&backend)),
            submitter: BookingSubmitter::new(backend),
            selection: Mutex::new(Selection::new(provider_id, date)),
            needs_refresh: AtomicBool::new(false),
        }
    }

    /// Loads the provider directory and the initial day concurrently.
    pub async fn enter(&self) -> EntryOutcome {
        let (providers, availability) = futures::join!(self.load_providers(), self.refresh());
        EntryOutcome {
            providers,
            availability,
        }
    }

    pub async fn load_providers(&self) -> Result<Arc<Vec<Provider>>, CoordinatorError> {
        self.directory.load().await
    }

    pub async fn reload_providers(&self) -> Result<Arc<Vec<Provider>>, CoordinatorError> {
        self.directory.invalidate();
        self.directory.load().await
    }

    pub fn selection(&self) -> Selection {
        self.selection.lock().clone()
    }

    pub async fn select_provider(&self, provider_id: ProviderId) -> Result<FetchOutcome, CoordinatorError> {
        debug!(provider_id = %provider_id, "Provider selected");
        let selection = self.transition(|current| current.select_provider(provider_id));
        self.fetch_for(&selection).await
    }

    pub async fn select_date(&self, date: CalendarDate) -> Result<FetchOutcome, CoordinatorError> {
        debug!(date = %date, "Date selected");
        let selection = self.transition(|current| current.select_date(date));
        self.fetch_for(&selection).await
    }

    /// Rejected hours leave the selection as it was.
    pub fn select_hour(&self, hour: u8) -> Result<Selection, HourRejection> {
        let day = self.fetcher.current();
        let mut current = self.selection.lock();

        match current.select_hour(hour, day.as_deref()) {
            Ok(next) => {
                *current = next.clone();
                debug!(hour, "Hour selected");
                Ok(next)
            }
            Err(rejection) => {
                debug!(hour, %rejection, "Hour selection rejected");
                Err(rejection)
            }
        }
    }

    /// Fetches the currently selected day again.
    pub async fn refresh(&self) -> Result<FetchOutcome, CoordinatorError> {
        let selection = self.selection();
        self.fetch_for(&selection).await
    }

    /// Books the current selection. A rejection clears the hour and blocks
    /// further confirmations until the day has been fetched again.
    pub async fn confirm(&self) -> Result<BookingConfirmation, CoordinatorError> {
        if self.needs_refresh.load(Ordering::SeqCst) {
            return Err(CoordinatorError::IncompleteSelection(
                "availability must be refreshed after a rejected booking".to_string(),
            ));
        }

        let selection = self.selection();
        let day = self.fetcher.current();

        match self.submitter.confirm(&selection, day.as_deref()).await {
            Ok(confirmation) => {
                info!(
                    appointment_id = ?confirmation.appointment_id,
                    timestamp = %confirmation.timestamp,
                    "Appointment created"
                );
                Ok(confirmation)
            }
            Err(e @ CoordinatorError::BookingRejected(_)) => {
                let mut current = self.selection.lock();
                // The user may have moved on while the request was in flight;
                // only the rejected day is known to be stale.
                if current.provider_id() == selection.provider_id()
                    && current.date() == selection.date()
                {
                    self.needs_refresh.store(true, Ordering::SeqCst);
                    warn!(error = %e, "Booking rejected, availability must be refreshed");
                } else {
                    warn!(error = %e, "Booking rejected for a day no longer selected");
                }
                if *current == selection {
                    *current = current.clone().clear_hour();
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn view(&self) -> Result<ScheduleView, CoordinatorError> {
        let selection = self.selection();
        let day = self.fetcher.current();

        let providers = self
            .directory
            .cached()
            .map(|providers| {
                providers
                    .iter()
                    .map(|provider| ProviderChoice {
                        selected: &provider.id == selection.provider_id(),
                        provider: provider.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let is_current = day
            .as_ref()
            .is_some_and(|day| day.matches(selection.provider_id(), selection.date()));

        let slots = match &day {
            Some(day) => {
                let highlighted = if is_current { selection.hour() } else { None };
                partition_for_selection(&day.slots, highlighted)?
            }
            None => SlotPartition::default(),
        };

        let can_confirm = !self.needs_refresh.load(Ordering::SeqCst)
            && !self.submitter.is_submitting()
            && selection.confirmable_hour(day.as_deref()).is_ok();

        Ok(ScheduleView {
            providers,
            slots,
            showing: day.as_ref().map(|day| (day.provider_id.clone(), day.date)),
            is_stale: day.is_some() && !is_current,
            pending: self.fetcher.is_pending(),
            can_confirm,
            submitting: self.submitter.is_submitting(),
            selection,
        })
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            directory: self.directory.stats(),
            fetches: self.fetcher.stats(),
            bookings: self.submitter.stats(),
        }
    }

    fn transition<F>(&self, f: F) -> Selection
    where
        F: FnOnce(Selection) -> Selection,
    {
        let mut current = self.selection.lock();
        let next = f(current.clone());
        *current = next.clone();
        next
    }

    async fn fetch_for(&self, selection: &Selection) -> Result<FetchOutcome, CoordinatorError> {
        let outcome = self
            .fetcher
            .fetch_day(selection.provider_id(), selection.date())
            .await?;

        if let FetchOutcome::Applied(day) = &outcome {
            let mut current = self.selection.lock();
            *current = current.clone().reconcile(day);
            if day.matches(current.provider_id(), current.date()) {
                self.needs_refresh.store(false, Ordering::SeqCst);
            }
        }

        Ok(outcome)
    }
}
