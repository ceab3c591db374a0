use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};

use super::config::ApiConfig;
use super::error::ApiError;
use super::models::{
    array_of_objects, first_object, parse_root, ApiCrop, ApiSensor, ApiUser, Measurement,
};

/// Client for the HydroBox backend REST API.
///
/// Plain request/response: no retries, no caching. Each call maps loosely structured
/// JSON onto the typed records in [`super::models`].
#[derive(Debug, Clone)]
pub struct HydroApi {
    http: reqwest::Client,
    base_url: String,
}

impl HydroApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Self::from_reqwest(&config.base_url, http)
    }

    /// Wraps an existing `reqwest` client, e.g. one pointed at a mock server.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, ApiError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, ApiError> {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json; charset=utf-8")
                .body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!("{} {} answered {}", method, url, status);
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    /// Logs in against the backend. Any failure, including wrong credentials, yields `None`.
    pub async fn login(&self, email: &str, password: &str) -> Option<ApiUser> {
        let body = json!({ "email": email, "password": password });

        let text = match self.request(Method::POST, "login", Some(body)).await {
            Ok(text) => text,
            Err(ApiError::Http { status, .. }) => {
                info!("Login for {} rejected with HTTP {}", email, status);
                return None;
            }
            Err(e) => {
                warn!("Login request failed: {}", e);
                return None;
            }
        };

        let user = ApiUser::from_login_json(&text);
        match &user {
            Some(u) => info!("Logged in as {} (id {})", u.email, u.id),
            None => warn!("Login response for {} could not be parsed", email),
        }
        user
    }

    /// The crop currently growing in the box, if the backend reports one.
    pub async fn current_crop(&self) -> Result<Option<ApiCrop>, ApiError> {
        let raw = self.request(Method::GET, "hortaliza/actual", None).await?;
        let crop = parse_root(&raw)?
            .and_then(first_object)
            .and_then(|obj| ApiCrop::from_object(&obj));
        debug!("Current crop: {:?}", crop);
        Ok(crop)
    }

    /// Asks the backend to switch the active crop. `false` on any failure.
    pub async fn change_crop(&self, crop_id: i64) -> bool {
        let body = json!({ "id_hortaliza": crop_id });
        match self.request(Method::POST, "hortaliza/cambiar", Some(body)).await {
            Ok(_) => {
                info!("Active crop changed to {}", crop_id);
                true
            }
            Err(e) => {
                warn!("Changing crop to {} failed: {}", crop_id, e);
                false
            }
        }
    }

    /// Full measurement log, oldest first as delivered by the backend.
    pub async fn measurements(&self) -> Result<Vec<Measurement>, ApiError> {
        let raw = self.request(Method::GET, "registro-mediciones", None).await?;
        let rows: Vec<Measurement> = parse_root(&raw)?
            .map(array_of_objects)
            .unwrap_or_default()
            .iter()
            .map(Measurement::from_object)
            .collect();
        debug!("Fetched {} measurements", rows.len());
        Ok(rows)
    }

    pub async fn latest_measurement(&self) -> Result<Option<Measurement>, ApiError> {
        Ok(self.measurements().await?.pop())
    }

    pub async fn sensors(&self) -> Result<Vec<ApiSensor>, ApiError> {
        let raw = self.request(Method::GET, "sensores", None).await?;
        let sensors: Vec<ApiSensor> = parse_root(&raw)?
            .map(array_of_objects)
            .unwrap_or_default()
            .iter()
            .map(ApiSensor::from_object)
            .collect();
        debug!("Fetched {} sensors", sensors.len());
        Ok(sensors)
    }
}
