//! Request handlers for the control API and the `/ws/simulation` duplex
//! socket (§6).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::debug;

use super::types::{
    ClientMessage, ConfigResponse, ConfigUpdateResponse, ConfigValidateResponse, ControlResponse, ErrorResponse, MetricsCurrentResponse,
    MetricsSummaryResponse, ServerMessage, SnapshotResponse, SpeedRequest, StartResponse, StatusResponse,
};
use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::manager::{Manager, ManagerEvent};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: SimError) -> ApiError {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse { error: e.to_string() }))
}

fn not_found(e: SimError) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: e.to_string() }))
}

pub async fn get_status(State(manager): State<Arc<Manager>>) -> Json<StatusResponse> {
    Json(StatusResponse { info: manager.status_info() })
}

pub async fn get_snapshot(State(manager): State<Arc<Manager>>) -> Result<Json<SnapshotResponse>, ApiError> {
    manager.snapshot().map(|snapshot| Json(SnapshotResponse { snapshot })).map_err(not_found)
}

pub async fn start(State(manager): State<Arc<Manager>>) -> Result<impl IntoResponse, ApiError> {
    let session_id = manager.start().map_err(error_response)?;
    let status = manager.status_info().status;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartResponse {
            message: "Simulation started".to_string(),
            session_id,
            status,
        }),
    ))
}

pub async fn pause(State(manager): State<Arc<Manager>>) -> Result<impl IntoResponse, ApiError> {
    manager.pause().map_err(error_response)?;
    Ok(control_response(&manager, "Simulation paused"))
}

pub async fn resume(State(manager): State<Arc<Manager>>) -> Result<impl IntoResponse, ApiError> {
    manager.resume().map_err(error_response)?;
    Ok(control_response(&manager, "Simulation resumed"))
}

/// Always succeeds, from any status: a fire-and-forget stop.
pub async fn stop(State(manager): State<Arc<Manager>>) -> impl IntoResponse {
    let _ = manager.stop();
    control_response(&manager, "Simulation stopped")
}

/// Always succeeds, from any status: a fire-and-forget reset.
pub async fn reset(State(manager): State<Arc<Manager>>) -> impl IntoResponse {
    let _ = manager.reset();
    control_response(&manager, "Simulation reset")
}

pub async fn patch_speed(State(manager): State<Arc<Manager>>, Json(req): Json<SpeedRequest>) -> Result<impl IntoResponse, ApiError> {
    if !Manager::speed_in_range(req.speed_multiplier) {
        return Err(error_response(SimError::SpeedOutOfRange(req.speed_multiplier)));
    }
    let clamped = manager.set_speed(req.speed_multiplier);
    Ok((
        StatusCode::ACCEPTED,
        Json(ControlResponse {
            message: format!("Speed adjusted to {clamped}x"),
            status: manager.status_info().status,
        }),
    ))
}

pub async fn step(State(manager): State<Arc<Manager>>) -> Result<impl IntoResponse, ApiError> {
    let executed = manager.step().map_err(error_response)?;
    let message = if executed { "Step executed" } else { "No more events" };
    Ok((
        StatusCode::ACCEPTED,
        Json(ControlResponse {
            message: message.to_string(),
            status: manager.status_info().status,
        }),
    ))
}

pub async fn get_config(State(manager): State<Arc<Manager>>) -> Json<ConfigResponse> {
    Json(ConfigResponse { config: manager.config() })
}

pub async fn put_config(State(manager): State<Arc<Manager>>, Json(config): Json<SimulationConfig>) -> Result<impl IntoResponse, ApiError> {
    manager.set_config(config).map_err(error_response)?;
    Ok(Json(ConfigUpdateResponse {
        message: "Configuration updated".to_string(),
        status: "configured",
    }))
}

pub async fn validate_config(Json(config): Json<SimulationConfig>) -> Json<ConfigValidateResponse> {
    let errors = Manager::validate_config(&config);
    Json(ConfigValidateResponse {
        valid: errors.is_empty(),
        errors,
    })
}

pub async fn metrics_current(State(manager): State<Arc<Manager>>) -> Json<MetricsCurrentResponse> {
    Json(MetricsCurrentResponse { metrics: manager.metrics_current() })
}

pub async fn metrics_summary(State(manager): State<Arc<Manager>>) -> Result<Json<MetricsSummaryResponse>, ApiError> {
    manager.metrics_summary().map(|metrics| Json(MetricsSummaryResponse { metrics })).map_err(not_found)
}

pub async fn ws_simulation(ws: WebSocketUpgrade, State(manager): State<Arc<Manager>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, manager))
}

fn control_response(manager: &Manager, message: &str) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(ControlResponse {
            message: message.to_string(),
            status: manager.status_info().status,
        }),
    )
}

async fn handle_socket(socket: WebSocket, manager: Arc<Manager>) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = manager.subscribe();

    let status = manager.status_info();
    let snapshot = manager.snapshot().ok();
    let metrics = snapshot.as_ref().map(|_| Box::new(manager.metrics_current()));
    let initial = ServerMessage::InitialState {
        status,
        snapshot: snapshot.map(Box::new),
        metrics,
    };
    if send_json(&mut sender, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_message(&text, &manager, &mut sender).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("websocket recv error: {e}");
                        break;
                    }
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(ManagerEvent::StateUpdate(status, snapshot, metrics)) => {
                        let msg = ServerMessage::StateUpdate { status: *status, snapshot, metrics };
                        if send_json(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn handle_client_message<S>(text: &str, manager: &Arc<Manager>, sender: &mut S) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    let Ok(msg) = parsed else {
        return send_json(
            sender,
            &ServerMessage::Error {
                message: "could not parse message".to_string(),
            },
        )
        .await;
    };

    match msg {
        ClientMessage::Command { command } => {
            let result = dispatch_command(&command, manager);
            let ack = match result {
                Ok(()) => ServerMessage::CommandAck {
                    command,
                    status: manager.status_info().status,
                },
                Err(e) => ServerMessage::Error { message: e.to_string() },
            };
            send_json(sender, &ack).await
        }
        ClientMessage::SetSpeed { speed } => {
            let clamped = manager.set_speed(speed);
            send_json(sender, &ServerMessage::SpeedAck { speed: clamped }).await
        }
        ClientMessage::Ping => {
            let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
            send_json(sender, &ServerMessage::Pong { timestamp }).await
        }
    }
}

fn dispatch_command(command: &str, manager: &Arc<Manager>) -> Result<(), SimError> {
    match command {
        "start" => manager.start().map(|_| ()),
        "pause" => manager.pause(),
        "resume" => manager.resume(),
        "stop" => manager.stop(),
        "reset" => manager.reset(),
        other => Err(SimError::IllegalTransition(format!("unknown command \"{other}\""))),
    }
}

async fn send_json<S>(sender: &mut S, msg: &ServerMessage) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(msg).expect("ServerMessage always serializes");
    sender.send(Message::Text(text.into())).await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;

    fn tiny_config() -> SimulationConfig {
        let mut cfg = SimulationConfig::default();
        cfg.grid.width = 10;
        cfg.grid.height = 10;
        cfg.num_stations = 1;
        cfg.slots_per_station = 1;
        cfg.initial_batteries_per_station = 1;
        cfg.scooters.count = 1;
        cfg.duration_hours = 600.0 / 3600.0;
        cfg.random_seed = Some(3);
        cfg
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn status_before_any_config_is_idle() {
        let manager = Arc::new(Manager::new());
        let app = router(manager);
        let resp = app.oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "idle");
    }

    #[tokio::test]
    async fn snapshot_before_config_is_404() {
        let manager = Arc::new(Manager::new());
        let app = router(manager);
        let resp = app.oneshot(Request::builder().uri("/snapshot").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn put_config_then_start_then_step() {
        let manager = Arc::new(Manager::new());
        let app = router(Arc::clone(&manager));

        let body = serde_json::to_string(&tiny_config()).unwrap();
        let put_req = Request::builder()
            .method("PUT")
            .uri("/config")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = app.clone().oneshot(put_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let step_req = Request::builder().method("POST").uri("/step").body(Body::empty()).unwrap();
        let resp = app.oneshot(step_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "Step executed");
    }

    #[tokio::test]
    async fn step_without_config_is_400() {
        let manager = Arc::new(Manager::new());
        let app = router(manager);
        let resp = app.oneshot(Request::builder().method("POST").uri("/step").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn speed_out_of_range_is_422() {
        let manager = Arc::new(Manager::new());
        let app = router(manager);
        let body = serde_json::to_string(&serde_json::json!({ "speed_multiplier": 500.0 })).unwrap();
        let req = Request::builder()
            .method("PATCH")
            .uri("/speed")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn config_validate_reports_errors_without_mutating_state() {
        let manager = Arc::new(Manager::new());
        let app = router(manager);
        let mut bad = tiny_config();
        bad.duration_hours = 0.0;
        let body = serde_json::to_string(&bad).unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/config/validate")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["valid"], false);
        assert!(!json["errors"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_and_reset_never_error() {
        let manager = Arc::new(Manager::new());
        let app = router(manager);
        let resp = app.clone().oneshot(Request::builder().method("POST").uri("/stop").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let resp = app.oneshot(Request::builder().method("POST").uri("/reset").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }
}
