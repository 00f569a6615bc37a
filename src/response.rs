use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub status: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn with_status(status: StatusCode, data: T) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                code: status.as_u16(),
                status: "success".to_string(),
                data,
            }),
        )
    }

    pub fn ok(data: T) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::OK, data)
    }

    pub fn created(data: T) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::CREATED, data)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        let total_pages = ((total.max(0) as f64) / (page.limit as f64)).ceil() as u32;
        Self {
            items,
            total,
            page: page.number,
            limit: page.limit,
            total_pages,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// A resolved, 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(number: u32, limit: u32) -> Self {
        Self {
            number: number.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit as i64
    }

    pub fn offset(&self) -> i64 {
        (self.number as i64 - 1) * self.limit as i64
    }
}

impl From<PageQuery> for Page {
    fn from(query: PageQuery) -> Self {
        Page::new(
            query.page.unwrap_or(1),
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}
