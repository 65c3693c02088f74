//! The success envelope every handler returns: `{success: true, data|message,
//! pagination?}`. Failures never go through this module — `AppError`'s
//! `ResponseError` impl renders the matching `{success: false, ...}` shape
//! directly.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiSuccess<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiSuccess<T> {
    pub fn data(data: T) -> Self {
        Self { success: true, data, pagination: None }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self { success: true, data, pagination: Some(pagination) }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }
}

/// Query parameters shared by every range-scoped analytics endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DateRangeQuery {
    #[serde(rename = "startDate")]
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "endDate")]
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
}

impl DateRangeQuery {
    /// Resolves to an explicit range, defaulting to the trailing 30 days
    /// when either bound is omitted.
    pub fn resolve(&self) -> analytics_core::store::TimeRange {
        let to = self.end_date.unwrap_or_else(chrono::Utc::now);
        let from = self.start_date.unwrap_or_else(|| to - chrono::Duration::days(30));
        analytics_core::store::TimeRange { from, to }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

impl PageQuery {
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit as usize
    }
}
