//! REST client for the monitor server. The push channel only says *that*
//! something changed; the actual rows always come from here.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

use crate::protocol::{AlertNotice, TelemetryFrame};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid url: {0}")]
    BadUrl(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub machine_id: i64,
    pub sensor_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub sensor_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub model_id: Option<i64>,
    /// 0 normal, 1 anomaly
    #[serde(default)]
    pub last_status: Option<i32>,
    /// 0 normal, 1 minor, 2 serious, 3 critical
    #[serde(default)]
    pub last_severity: Option<i32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_reading_time: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlModel {
    pub model_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub route_h5: Option<String>,
    pub route_pkl: Option<String>,
}

/// Typed client for the monitor REST API.
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base = Url::parse(base_url)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn machines(&self) -> Result<Vec<Machine>, ApiError> {
        self.get_json(self.base.join("/api/machines/")?).await
    }

    pub async fn sensors(&self) -> Result<Vec<Sensor>, ApiError> {
        self.get_json(self.base.join("/api/sensors/")?).await
    }

    pub async fn models(&self) -> Result<Vec<MlModel>, ApiError> {
        self.get_json(self.base.join("/api/models/")?).await
    }

    /// Most recent alerts, newest first.
    pub async fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertNotice>, ApiError> {
        let mut url = self.base.join("/api/alerts")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }

    /// Recent vibration samples, optionally scoped to one sensor.
    pub async fn recent_vibration_data(
        &self,
        sensor_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<TelemetryFrame>, ApiError> {
        let mut url = self.base.join("/api/vibration-data")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(id) = sensor_id {
                query.append_pair("sensor_id", &id.to_string());
            }
        }
        self.get_json(url).await
    }
}
