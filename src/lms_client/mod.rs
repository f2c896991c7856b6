use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct LmsClient {
    base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl LmsClient {
    /// Create a new client with the given API base URL (e.g. "http://localhost:8000/api/v1").
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url_str = base_url.into();
        tracing::debug!(base_url = %base_url_str, "creating LmsClient");
        Ok(LmsClient {
            base_url: base_url_str.trim_end_matches('/').to_string(),
            access_token: None,
            client,
        })
    }

    /// Return a client with the provided access token set (Bearer)
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
        what: &str,
    ) -> anyhow::Result<T> {
        let status = resp.error_for_status()?;
        let body = status.text().await?;
        match serde_json::from_str::<T>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                let snippet_len = body.len().min(2000);
                let snippet = body.get(..snippet_len).unwrap_or(&body);
                tracing::error!(error = %e, body_snippet = %snippet, "failed to parse {what}");
                Err(e).with_context(|| format!("invalid {what} body"))
            }
        }
    }

    /// GET /assignments/mine/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_my_assignments(&self) -> anyhow::Result<Vec<AssignmentResponse>> {
        let url = self.url("/assignments/mine/");
        tracing::debug!(%url, "GET my assignments");
        let resp = self.authorized(self.client.get(&url)).send().await?;
        Self::read_json(resp, "assignment list").await
    }

    /// POST /assignments/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn post_assignment(
        &self,
        body: &CreateAssignmentRequest,
    ) -> anyhow::Result<AssignmentResponse> {
        let url = self.url("/assignments/");
        tracing::debug!(%url, course_id = body.course_id, "POST assignment");
        let resp = self
            .authorized(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        Self::read_json(resp, "created assignment").await
    }

    /// PATCH /assignments/{id}/progress/
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn patch_progress(
        &self,
        assignment_id: i64,
        body: &UpdateProgressRequest,
    ) -> anyhow::Result<AssignmentResponse> {
        let url = self.url(&format!("/assignments/{}/progress/", assignment_id));
        tracing::debug!(%url, progress_pct = body.progress_pct, "PATCH assignment progress");
        let resp = self
            .authorized(self.client.patch(&url))
            .json(body)
            .send()
            .await?;
        Self::read_json(resp, "updated assignment").await
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CreateAssignmentRequest {
    pub course_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct UpdateProgressRequest {
    pub progress_pct: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct AssignmentResponse {
    pub id: i64,
    pub user: i64,
    pub user_name: Option<String>,
    pub course: CourseField,
    pub course_title: Option<String>,
    pub assigned_by: Option<i64>,
    pub assigned_by_name: Option<String>,
    pub status: String,
    #[serde(deserialize_with = "crate::lms_client::de::percent_from_num", default)]
    pub progress_pct: u8,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The LMS sends `course` as a bare primary key or as the nested course object
/// depending on the endpoint.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CourseField {
    Id(i64),
    Nested(CourseSummary),
}

impl CourseField {
    pub fn id(&self) -> i64 {
        match self {
            CourseField::Id(id) => *id,
            CourseField::Nested(c) => c.id,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct CourseSummary {
    pub id: i64,
    pub title: Option<String>,
    pub video_url: Option<String>,
    pub status: Option<String>,
    pub duration_minutes: Option<i64>,
    // allow extra fields
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

/// Internal serde helpers
pub mod de {
    use serde::{Deserialize, Deserializer};

    /// Accept a percent as an integer or float, clamped to 0..=100; null -> 0.
    pub fn percent_from_num<'de, D>(deserializer: D) -> Result<u8, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val: Option<f64> = Option::deserialize(deserializer)?;
        Ok(match val {
            Some(v) if v.is_finite() => v.round().clamp(0.0, 100.0) as u8,
            _ => 0,
        })
    }
}
