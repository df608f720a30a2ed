//! Request/response bodies for the control API (§6), plus the duplex
//! WebSocket message types used at `/ws/simulation`.

use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::FieldError;
use crate::manager::{MetricsSnapshot, MetricsSummary, StatusInfo};
use crate::sim::WorldSnapshot;

/// `GET /status` response body.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub info: StatusInfo,
}

/// `POST /start` response body.
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub message: String,
    pub session_id: String,
    pub status: crate::sim::Status,
}

/// Response body shared by `/pause`, `/resume`, `/stop`, `/reset`,
/// `PATCH /speed`, and `/step`.
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub message: String,
    pub status: crate::sim::Status,
}

/// `PATCH /speed` request body.
#[derive(Debug, Deserialize)]
pub struct SpeedRequest {
    pub speed_multiplier: f64,
}

/// `POST /config/validate` response body.
#[derive(Debug, Serialize)]
pub struct ConfigValidateResponse {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

/// `PUT /config` response body.
#[derive(Debug, Serialize)]
pub struct ConfigUpdateResponse {
    pub message: String,
    pub status: &'static str,
}

/// `GET /config` response body.
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    #[serde(flatten)]
    pub config: SimulationConfig,
}

/// `GET /snapshot` response body.
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    #[serde(flatten)]
    pub snapshot: WorldSnapshot,
}

/// `GET /metrics/current` response body.
#[derive(Debug, Serialize)]
pub struct MetricsCurrentResponse {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
}

/// `GET /metrics/summary` response body.
#[derive(Debug, Serialize)]
pub struct MetricsSummaryResponse {
    #[serde(flatten)]
    pub metrics: MetricsSummary,
}

/// Error body for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Messages the server pushes to a connected WebSocket client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    InitialState {
        status: StatusInfo,
        snapshot: Option<Box<WorldSnapshot>>,
        metrics: Option<Box<MetricsSnapshot>>,
    },
    StateUpdate {
        status: StatusInfo,
        snapshot: Box<WorldSnapshot>,
        metrics: Box<MetricsSnapshot>,
    },
    CommandAck {
        command: String,
        status: crate::sim::Status,
    },
    SpeedAck {
        speed: f64,
    },
    Pong {
        timestamp: u64,
    },
    Error {
        message: String,
    },
}

/// Messages a connected client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Command { command: String },
    SetSpeed { speed: f64 },
    Ping,
}
