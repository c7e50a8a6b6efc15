// Backing-service contracts for providers, day availability and appointments

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time_slot::{AvailabilitySlot, CalendarDate, Provider, ProviderId};

// Wire-level failures reported by a backing-service implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request rejected: {status_code} - {message}")]
    Rejected { status_code: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

// Outbound booking request: the selected date merged with the selected hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub provider_id: ProviderId,
    #[serde(rename = "date")]
    pub timestamp: NaiveDateTime,
}

// Date echoed back for a created appointment. Servers may answer with an
// RFC 3339 instant (`...Z`) or with the naive timestamp that was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppointmentDate {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedAppointment {
    pub id: String,
    #[serde(default)]
    pub date: Option<AppointmentDate>,
}

#[async_trait]
pub trait DirectoryService: Send + Sync + 'static {
    async fn list_providers(&self) -> Result<Vec<Provider>, ServiceError>;
}

#[async_trait]
pub trait AvailabilityService: Send + Sync + 'static {
    async fn day_availability(
        &self,
        provider_id: &ProviderId,
        date: CalendarDate,
    ) -> Result<Vec<AvailabilitySlot>, ServiceError>;
}

#[async_trait]
pub trait BookingService: Send + Sync + 'static {
    async fn create_appointment(
        &self,
        request: &BookingRequest,
    ) -> Result<CreatedAppointment, ServiceError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_request_wire_format() {
        let date = CalendarDate::from_ymd(2024, 3, 10).unwrap();
        let request = BookingRequest {
            provider_id: ProviderId::new("P1"),
            timestamp: date.at_hour(14).unwrap(),
        };

        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "provider_id": "P1", "date": "2024-03-10T14:00:00" })
        );
    }

    #[test]
    fn test_created_appointment_with_naive_date() {
        let created: CreatedAppointment =
            serde_json::from_str(r#"{ "id": "abc-123", "date": "2024-03-10T14:00:00" }"#).unwrap();

        assert_eq!(created.id, "abc-123");
        match created.date {
            Some(AppointmentDate::Naive(date)) => {
                assert_eq!(date.to_string(), "2024-03-10 14:00:00")
            }
            other => panic!("Expected naive date, got {:?}", other),
        }
    }

    #[test]
    fn test_created_appointment_with_utc_instant() {
        // JavaScript Date serialization
        let created: CreatedAppointment =
            serde_json::from_str(r#"{"id":"abc","date":"2024-03-10T17:00:00.000Z"}"#).unwrap();

        assert_eq!(created.id, "abc");
        match created.date {
            Some(AppointmentDate::Zoned(date)) => {
                assert_eq!(date.naive_utc().to_string(), "2024-03-10 17:00:00")
            }
            other => panic!("Expected zoned date, got {:?}", other),
        }
    }

    #[test]
    fn test_created_appointment_without_date() {
        let created: CreatedAppointment = serde_json::from_str(r#"{ "id": "abc" }"#).unwrap();
        assert_eq!(created.date, None);
    }
}
