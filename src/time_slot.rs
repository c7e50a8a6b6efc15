// Time-slot model: providers, calendar dates, hourly availability slots and
// the morning/afternoon projection handed to the presentation layer.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoordinatorError;

// Hours before this belong to the morning section
pub const AFTERNOON_STARTS_AT: u8 = 12;
pub const LAST_HOUR: u8 = 23;

/// Opaque provider identifier as issued by the backing service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// A day picked on the calendar. Carries no time component until an hour is
/// merged in with [`CalendarDate::at_hour`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn today() -> Self {
        Self(chrono::Local::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// 1-based month, as the availability endpoint expects it.
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    /// Merge an hour into the date with minutes and seconds zeroed.
    pub fn at_hour(&self, hour: u8) -> Result<NaiveDateTime, CoordinatorError> {
        if hour > LAST_HOUR {
            return Err(CoordinatorError::InvalidSlot(hour));
        }
        self.0
            .and_hms_opt(u32::from(hour), 0, 0)
            .ok_or(CoordinatorError::InvalidSlot(hour))
    }
}

impl From<NaiveDate> for CalendarDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub hour: u8,
    pub available: bool,
}

impl AvailabilitySlot {
    pub fn new(hour: u8, available: bool) -> Self {
        Self { hour, available }
    }
}

/// A slot annotated for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedSlot {
    pub hour: u8,
    pub label: String,
    pub available: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotPartition {
    pub morning: Vec<FormattedSlot>,
    pub afternoon: Vec<FormattedSlot>,
}

impl SlotPartition {
    pub fn len(&self) -> usize {
        self.morning.len() + self.afternoon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.morning.is_empty() && self.afternoon.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormattedSlot> {
        self.morning.iter().chain(self.afternoon.iter())
    }
}

/// Renders an hour as `HH:00` in 24-hour form.
pub fn format_hour(hour: u8) -> Result<String, CoordinatorError> {
    if hour > LAST_HOUR {
        return Err(CoordinatorError::InvalidSlot(hour));
    }
    Ok(format!("{:02}:00", hour))
}

/// Checks every hour of a fetched day before it is accepted.
pub fn validate_slots(slots: &[AvailabilitySlot]) -> Result<(), CoordinatorError> {
    match slots.iter().find(|slot| slot.hour > LAST_HOUR) {
        Some(slot) => Err(CoordinatorError::InvalidSlot(slot.hour)),
        None => Ok(()),
    }
}

/// Splits slots into morning (hour < 12) and afternoon sections, keeping the
/// input order inside each section. Slots are not re-sorted.
pub fn partition(slots: &[AvailabilitySlot]) -> Result<SlotPartition, CoordinatorError> {
    partition_for_selection(slots, None)
}

/// Same as [`partition`], additionally flagging the slot for `selected_hour`.
pub fn partition_for_selection(
    slots: &[AvailabilitySlot],
    selected_hour: Option<u8>,
) -> Result<SlotPartition, CoordinatorError> {
    let mut result = SlotPartition::default();

    for slot in slots {
        let formatted = FormattedSlot {
            hour: slot.hour,
            label: format_hour(slot.hour)?,
            available: slot.available,
            selected: selected_hour == Some(slot.hour),
        };

        if slot.hour < AFTERNOON_STARTS_AT {
            result.morning.push(formatted);
        } else {
            result.afternoon.push(formatted);
        }
    }

    Ok(result)
}
