//! Dashboard response types

use serde::Serialize;

use crate::monitor::InstrumentSummary;

/// GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: i64,
    pub cycles: u64,
    pub last_cycle_at: Option<i64>,
}

/// GET /api/status
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub cycles: u64,
    pub last_cycle_at: Option<i64>,
    pub instruments: Vec<InstrumentSummary>,
}

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}
