use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::insights::{CalendarDay, SubjectProgress};
use crate::planner::ListFilter;
use crate::server::ApiResponse;
use crate::{Error, Kind, Result, StudyPlanner};

const ATTEMPTS: u64 = 3;

/// Remote planner speaking the JSON HTTP API.
pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct Items<T> {
    items: Vec<T>,
}

#[derive(Deserialize)]
struct Deleted {
    deleted: bool,
}

fn error_for(status: StatusCode, message: String) -> Error {
    match status {
        StatusCode::BAD_REQUEST => Error::Validation(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::CONFLICT => Error::Conflict(message),
        _ => Error::Internal(message),
    }
}

impl Client {
    /// Connects to a planner at `addr` (`host:port` or a full `http://` URL)
    /// and checks that it answers.
    pub async fn connect(addr: &str) -> Result<Self> {
        let base_url = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", addr.trim_end_matches('/'))
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let client = Self { base_url, http };
        client.send::<Value>(Method::GET, "/api/health", None, None).await?;
        Ok(client)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: Option<&ListFilter>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        // Only retry when the request never reached the server.
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let mut req = self.http.request(method.clone(), &url);
            if let Some(body) = body {
                req = req.json(body);
            }
            if let Some(query) = query {
                req = req.query(query);
            }
            match req.send().await {
                Ok(resp) => break resp,
                Err(e) if e.is_connect() && attempt < ATTEMPTS => {
                    log::warn!("connect to {} failed (attempt {}): {}", url, attempt, e);
                    tokio::time::sleep(Duration::from_millis(attempt * 200)).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let status = response.status();
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("invalid response from {}: {}", url, e)))?;

        if !envelope.success {
            let message = envelope.error.unwrap_or_else(|| status.to_string());
            return Err(error_for(status, message));
        }
        envelope
            .data
            .ok_or_else(|| Error::Internal(format!("response from {} carried no data", url)))
    }

    /// Lists a kind and decodes each record as `T`.
    pub async fn list_as<T: DeserializeOwned>(&self, kind: Kind, filter: &ListFilter) -> Result<Vec<T>> {
        let page: Items<T> = self
            .send(Method::GET, &format!("/api/{}", kind), None, Some(filter))
            .await?;
        Ok(page.items)
    }

    /// Creates a record from typed fields and decodes the stored record.
    pub async fn create_as<F: Serialize, T: DeserializeOwned>(&self, kind: Kind, fields: &F) -> Result<T> {
        let body = serde_json::to_value(fields)?;
        self.send(Method::POST, &format!("/api/{}", kind), Some(&body), None).await
    }
}

#[async_trait]
impl StudyPlanner for Client {
    async fn list(&self, kind: Kind, filter: &ListFilter) -> Result<Vec<Value>> {
        self.list_as(kind, filter).await
    }

    async fn create(&self, kind: Kind, fields: Value) -> Result<Value> {
        self.send(Method::POST, &format!("/api/{}", kind), Some(&fields), None).await
    }

    async fn update(&self, kind: Kind, id: &str, fields: Value) -> Result<Value> {
        self.send(Method::PUT, &format!("/api/{}/{}", kind, id), Some(&fields), None).await
    }

    async fn delete(&self, kind: Kind, id: &str) -> Result<bool> {
        match self
            .send::<Deleted>(Method::DELETE, &format!("/api/{}/{}", kind, id), None, None)
            .await
        {
            Ok(d) => Ok(d.deleted),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn progress(&self) -> Result<Vec<SubjectProgress>> {
        self.send(Method::GET, "/api/progress", None, None).await
    }

    async fn calendar(&self) -> Result<Vec<CalendarDay>> {
        self.send(Method::GET, "/api/calendar", None, None).await
    }
}
