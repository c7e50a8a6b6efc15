// Selection state machine
//
// `Selection` is a plain value. Every transition consumes or borrows the
// current value and returns the next one; nothing mutates it in place. An
// hour is only ever held when it was `available` in the day snapshot fetched
// for the same provider and date.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::error::CoordinatorError;
use crate::fetcher::DayAvailability;
use crate::time_slot::{CalendarDate, ProviderId};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourRejection {
    #[error("Hour {0} is not offered on this day")]
    NotListed(u8),

    #[error("Hour {0} is already taken")]
    Unavailable(u8),

    #[error("Availability for the current provider and date has not been loaded")]
    StaleAvailability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    provider_id: ProviderId,
    date: CalendarDate,
    hour: Option<u8>,
}

impl Selection {
    pub fn new(provider_id: ProviderId, date: CalendarDate) -> Self {
        Self {
            provider_id,
            date,
            hour: None,
        }
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    pub fn date(&self) -> CalendarDate {
        self.date
    }

    pub fn hour(&self) -> Option<u8> {
        self.hour
    }

    /// The hour belonged to the old provider's day, so it is dropped. The
    /// date is kept.
    pub fn select_provider(self, provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            date: self.date,
            hour: None,
        }
    }

    pub fn select_date(self, date: CalendarDate) -> Self {
        Self {
            provider_id: self.provider_id,
            date,
            hour: None,
        }
    }

    /// Accepts `hour` only if `day` is the snapshot for this selection's
    /// provider and date and lists the hour as available. A rejected hour
    /// leaves the caller's selection untouched.
    pub fn select_hour(&self, hour: u8, day: Option<&DayAvailability>) -> Result<Self, HourRejection> {
        let day = match day {
            Some(day) if day.matches(&self.provider_id, self.date) => day,
            _ => return Err(HourRejection::StaleAvailability),
        };

        match day.slot(hour) {
            None => Err(HourRejection::NotListed(hour)),
            Some(slot) if !slot.available => Err(HourRejection::Unavailable(hour)),
            Some(_) => Ok(Self {
                hour: Some(hour),
                ..self.clone()
            }),
        }
    }

    pub fn clear_hour(self) -> Self {
        Self { hour: None, ..self }
    }

    /// Applied when a new snapshot lands: a held hour that is no longer
    /// available in it is cleared. Snapshots for a different provider or date
    /// leave the selection alone.
    pub fn reconcile(self, day: &DayAvailability) -> Self {
        match self.hour {
            Some(hour) if day.matches(&self.provider_id, self.date) && !day.is_available(hour) => {
                debug!(hour, provider_id = %self.provider_id, date = %self.date, "Selected hour no longer available");
                self.clear_hour()
            }
            _ => self,
        }
    }

    /// The hour to book, provided it is still valid against `day`.
    pub fn confirmable_hour(&self, day: Option<&DayAvailability>) -> Result<u8, CoordinatorError> {
        let hour = self
            .hour
            .ok_or_else(|| CoordinatorError::IncompleteSelection("no hour selected".to_string()))?;

        match day {
            Some(day) if day.matches(&self.provider_id, self.date) => {
                if day.is_available(hour) {
                    Ok(hour)
                } else {
                    Err(CoordinatorError::IncompleteSelection(format!(
                        "hour {} is not available",
                        hour
                    )))
                }
            }
            _ => Err(CoordinatorError::IncompleteSelection(
                "availability for the selected day has not been loaded".to_string(),
            )),
        }
    }
}
