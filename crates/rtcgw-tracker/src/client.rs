//! Registry HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{AuthMethod, RegistryConfig, api_root};
use crate::error::TrackerError;
use crate::payload::{
    EnrollmentPayload, EventUpdatePayload, EventsEnvelope, TrackedEntityCreatePayload,
    TrackedEntityUpdatePayload,
};
use crate::response::{RootResponse, TrackedEntity};

const CLIENT_USER_AGENT: &str = concat!("rtcgw/", env!("CARGO_PKG_VERSION"));

/// Raw outcome of a write call.
///
/// Non-success statuses are returned as values rather than errors: the
/// registry puts its conflict report in the body of a 409, and callers need
/// it.
#[derive(Debug, Clone)]
pub struct RegistryResponse {
    pub status: u16,
    pub body: String,
}

impl RegistryResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn parse_root(&self) -> Result<RootResponse, TrackerError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Conflict text from the body, falling back to the raw body when it
    /// does not parse as an import summary.
    pub fn error_message(&self) -> String {
        match self.parse_root().ok().and_then(|r| r.conflict_message()) {
            Some(message) => message,
            None if self.body.is_empty() => format!("HTTP {}", self.status),
            None => self.body.clone(),
        }
    }
}

/// Existence search for a tracked entity by a unique attribute.
#[derive(Debug, Clone)]
pub struct TrackedEntitySearch {
    pub org_unit: String,
    pub program: String,
    pub attribute: String,
    pub value: String,
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn search_tracked_entities(
        &self,
        search: &TrackedEntitySearch,
    ) -> Result<Vec<TrackedEntity>, TrackerError>;

    async fn create_tracked_entity(
        &self,
        payload: &TrackedEntityCreatePayload,
    ) -> Result<RegistryResponse, TrackerError>;

    async fn update_tracked_entity(
        &self,
        program: &str,
        payload: &TrackedEntityUpdatePayload,
    ) -> Result<RegistryResponse, TrackerError>;

    /// Updates the single data value carried by `payload` on `event`.
    async fn update_event_data_value(
        &self,
        event: &str,
        data_element: &str,
        payload: &EventUpdatePayload,
    ) -> Result<RegistryResponse, TrackerError>;

    async fn create_enrollment(
        &self,
        payload: &EnrollmentPayload,
    ) -> Result<RegistryResponse, TrackerError>;

    async fn create_event(&self, payload: &EventsEnvelope)
    -> Result<RegistryResponse, TrackerError>;

    /// `Ok(false)` only when the registry answers 404.
    async fn event_exists(&self, event: &str) -> Result<bool, TrackerError>;

    /// Enrollment ID of `tracked_entity` in `program`, if any.
    async fn find_enrollment(
        &self,
        tracked_entity: &str,
        program: &str,
        org_unit: &str,
    ) -> Result<Option<String>, TrackerError>;
}

pub struct HttpRegistryClient {
    http: Client,
    root: String,
    config: RegistryConfig,
}

impl HttpRegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self, TrackerError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if config.auth_method == AuthMethod::Token {
            let mut value = HeaderValue::from_str(&format!("Token {}", config.token))
                .map_err(|_| TrackerError::invalid_config("registry.token is not a valid header"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            http,
            root: api_root(&config.base_url),
            config: config.clone(),
        })
    }

    pub fn api_root(&self) -> &str {
        &self.root
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.root, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.auth_method {
            AuthMethod::Basic => {
                request.basic_auth(&self.config.username, Some(&self.config.password))
            }
            AuthMethod::Token => request,
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, TrackerError> {
        let request = self.authorize(self.http.get(self.url(path)).query(query));
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TrackerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        request: RequestBuilder,
        payload: &T,
    ) -> Result<RegistryResponse, TrackerError> {
        let response = self.authorize(request).json(payload).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RegistryResponse { status, body })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<RegistryResponse, TrackerError> {
        let response = self.send(self.http.post(self.url(path)), payload).await?;
        debug!(path, status = response.status, "POST");
        Ok(response)
    }

    async fn put<T: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        payload: &T,
    ) -> Result<RegistryResponse, TrackerError> {
        let request = self.http.put(self.url(path)).query(query);
        let response = self.send(request, payload).await?;
        debug!(path, status = response.status, "PUT");
        Ok(response)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn search_tracked_entities(
        &self,
        search: &TrackedEntitySearch,
    ) -> Result<Vec<TrackedEntity>, TrackerError> {
        let filter = format!("{}:EQ:{}", search.attribute, search.value);
        let body = self
            .get_json(
                "tracker/trackedEntities",
                &[
                    ("orgUnit", search.org_unit.as_str()),
                    ("program", search.program.as_str()),
                    ("ouMode", "SELECTED"),
                    ("orgUnitMode", "SELECTED"),
                    ("filter", filter.as_str()),
                ],
            )
            .await?;

        // Newer registries page under `instances`, older ones under `trackedEntities`.
        let list = body
            .get("instances")
            .or_else(|| body.get("trackedEntities"))
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(list)?)
    }

    async fn create_tracked_entity(
        &self,
        payload: &TrackedEntityCreatePayload,
    ) -> Result<RegistryResponse, TrackerError> {
        self.post("trackedEntityInstances", payload).await
    }

    async fn update_tracked_entity(
        &self,
        program: &str,
        payload: &TrackedEntityUpdatePayload,
    ) -> Result<RegistryResponse, TrackerError> {
        let path = format!("trackedEntityInstances/{}", payload.tracked_entity_instance);
        self.put(&path, &[("program", program)], payload).await
    }

    async fn update_event_data_value(
        &self,
        event: &str,
        data_element: &str,
        payload: &EventUpdatePayload,
    ) -> Result<RegistryResponse, TrackerError> {
        let path = format!("events/{event}/{data_element}");
        self.put(&path, &[], payload).await
    }

    async fn create_enrollment(
        &self,
        payload: &EnrollmentPayload,
    ) -> Result<RegistryResponse, TrackerError> {
        self.post("enrollments", payload).await
    }

    async fn create_event(
        &self,
        payload: &EventsEnvelope,
    ) -> Result<RegistryResponse, TrackerError> {
        self.post("events", payload).await
    }

    async fn event_exists(&self, event: &str) -> Result<bool, TrackerError> {
        match self
            .get_json(&format!("events/{event}"), &[("fields", "uid")])
            .await
        {
            Ok(_) => Ok(true),
            Err(TrackerError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn find_enrollment(
        &self,
        tracked_entity: &str,
        program: &str,
        org_unit: &str,
    ) -> Result<Option<String>, TrackerError> {
        let body = self
            .get_json(
                "enrollments",
                &[
                    ("trackedEntityInstance", tracked_entity),
                    ("program", program),
                    ("fields", "enrollment"),
                    ("ou", org_unit),
                    ("skipPaging", "true"),
                ],
            )
            .await?;

        Ok(body
            .get("enrollments")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .and_then(|e| e.get("enrollment"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string))
    }
}
