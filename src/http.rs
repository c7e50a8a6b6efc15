// reqwest implementation of the backing-service contracts

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{ClientConfig, ClientError};
use crate::service::{
    AvailabilityService, BookingRequest, BookingService, CreatedAppointment, DirectoryService,
    ServiceError,
};
use crate::time_slot::{AvailabilitySlot, CalendarDate, Provider, ProviderId};

pub struct HttpBackend {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        classify_status(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

// 4xx means the service refused the request; anything else non-2xx is an
// outage from the client's point of view
async fn classify_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(status_error(status, message))
}

fn status_error(status: StatusCode, message: String) -> ServiceError {
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        message
    };

    if status.is_client_error() {
        ServiceError::Rejected {
            status_code: status.as_u16(),
            message,
        }
    } else {
        ServiceError::Transport(format!("{} - {}", status.as_u16(), message))
    }
}

#[async_trait]
impl DirectoryService for HttpBackend {
    async fn list_providers(&self) -> Result<Vec<Provider>, ServiceError> {
        debug!("GET /providers");
        let response = self.send(self.client.get(self.url("providers"))).await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl AvailabilityService for HttpBackend {
    async fn day_availability(
        &self,
        provider_id: &ProviderId,
        date: CalendarDate,
    ) -> Result<Vec<AvailabilitySlot>, ServiceError> {
        debug!(provider_id = %provider_id, date = %date, "GET day-availability");
        let request = self
            .client
            .get(self.url(&format!("providers/{}/day-availability", provider_id)))
            .query(&[
                ("year", date.year().to_string()),
                ("month", date.month().to_string()),
                ("day", date.day().to_string()),
            ]);
        let response = self.send(request).await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl BookingService for HttpBackend {
    async fn create_appointment(
        &self,
        request: &BookingRequest,
    ) -> Result<CreatedAppointment, ServiceError> {
        debug!(provider_id = %request.provider_id, timestamp = %request.timestamp, "POST /appointments");
        let response = self
            .send(self.client.post(self.url("appointments")).json(request))
            .await?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ClientConfig {
            base_url: "localhost".to_string(),
            ..Default::default()
        };
        assert!(matches!(HttpBackend::new(config), Err(ClientError::ConfigError(_))));
    }

    #[test]
    fn test_url_joins_paths() {
        let backend = HttpBackend::new(ClientConfig {
            base_url: "https://api.example.com/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            backend.url("providers/P1/day-availability"),
            "https://api.example.com/providers/P1/day-availability"
        );
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            status_error(StatusCode::CONFLICT, "slot already booked".to_string()),
            ServiceError::Rejected {
                status_code: 409,
                message: "slot already booked".to_string(),
            }
        );
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, String::new()),
            ServiceError::Rejected {
                status_code: 400,
                message: "Bad Request".to_string(),
            }
        );
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            ServiceError::Transport(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let backend = HttpBackend::new(ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 500,
            ..Default::default()
        })
        .unwrap();

        let result = backend.list_providers().await;

        assert!(matches!(result, Err(ServiceError::Transport(_))));
    }
}
