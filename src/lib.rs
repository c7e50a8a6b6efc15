// Availability & booking coordinator for an appointment booking screen

pub mod booking;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod selection;
pub mod service;
pub mod telemetry;
pub mod time_slot;

// Re-export key types for convenience
pub use booking::{BookingConfirmation, BookingSubmitter};
pub use config::{ClientConfig, ClientError};
pub use coordinator::{BookingCoordinator, EntryOutcome, ScheduleView};
pub use directory::ProviderDirectory;
pub use error::CoordinatorError;
pub use fetcher::{AvailabilityFetcher, DayAvailability, FetchOutcome};
pub use http::HttpBackend;
pub use selection::{HourRejection, Selection};
pub use service::{
    AppointmentDate, AvailabilityService, BookingRequest, BookingService, CreatedAppointment,
    DirectoryService, ServiceError,
};
pub use time_slot::{
    format_hour, partition, AvailabilitySlot, CalendarDate, FormattedSlot, Provider, ProviderId,
    SlotPartition,
};
