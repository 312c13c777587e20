//! REST API endpoints
//!
//! Handlers extract parameters, call into the bridge, and map
//! [`BridgeError`] onto HTTP status codes; nothing else happens here.

use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use meshttpd_bridge::{format_node_id, parse_node_id, BridgeError, NodeId};

use super::messages::{
    DeviceTelemetryEntry, EnvironmentTelemetryEntry, LimitQuery, MessageEntry, NodeEntry,
    SendMessageForm, StatusBody, StatusEntry, TelemetryQuery,
};
use crate::AppState;

/// Bridge error with its HTTP status mapping
pub struct ApiError(BridgeError);

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            BridgeError::TelemetryBusy { .. } => StatusCode::CONFLICT,
            BridgeError::TelemetryTimeout { .. } | BridgeError::TelemetryUnavailable { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            BridgeError::NotConnected
            | BridgeError::LocalNodeUnknown
            | BridgeError::Disconnected
            | BridgeError::ConnectFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(StatusBody::error(self.0.to_string()))).into_response()
    }
}

fn parse_optional_node(id: Option<&str>) -> Result<Option<NodeId>, ApiError> {
    // Empty form fields count as absent
    id.filter(|s| !s.trim().is_empty())
        .map(parse_node_id)
        .transpose()
        .map_err(ApiError::from)
}

/// Index page listing the available endpoints
pub async fn index() -> Html<&'static str> {
    Html(
        r#"<html>
<head><title>meshttpd</title></head>
<body>
<h1>meshttpd</h1>
<h2>Endpoints:</h2>
<ul>
    <li><b>POST /api/mesh/send_message</b> - send a message
        (<code>message</code> required, <code>node_id</code> optional)</li>
    <li><b>GET /api/mesh/get_device_telemetry</b> - device telemetry
        (<code>node_id</code> optional)</li>
    <li><b>GET /api/mesh/get_environment_telemetry</b> - environment telemetry
        (<code>node_id</code> optional)</li>
    <li><b>GET /api/mesh/get_last_messages</b> - message history
        (<code>limit</code> optional)</li>
    <li><b>GET /api/mesh/nodes</b> - all seen nodes</li>
    <li><b>GET /api/mesh/status</b> - connection status</li>
</ul>
</body>
</html>
"#,
    )
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Send a message to the mesh
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SendMessageForm>,
) -> Result<Json<StatusBody>, ApiError> {
    let to = parse_optional_node(form.node_id.as_deref())?;
    state.bridge.send_message(&form.message, to).await?;
    Ok(Json(StatusBody::success("Message sent successfully")))
}

/// Device telemetry for a node (the radio itself when no id is given)
pub async fn get_device_telemetry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TelemetryQuery>,
) -> Result<Json<DeviceTelemetryEntry>, ApiError> {
    let node = parse_optional_node(query.node_id.as_deref())?;
    let telemetry = state.bridge.device_telemetry(node).await?;
    let resolved = node.or(state.bridge.status().local_node).unwrap_or_default();
    Ok(Json(DeviceTelemetryEntry {
        node_id: format_node_id(resolved),
        telemetry,
    }))
}

/// Environment telemetry for a node (the radio itself when no id is given)
pub async fn get_environment_telemetry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TelemetryQuery>,
) -> Result<Json<EnvironmentTelemetryEntry>, ApiError> {
    let node = parse_optional_node(query.node_id.as_deref())?;
    let telemetry = state.bridge.environment_telemetry(node).await?;
    let resolved = node.or(state.bridge.status().local_node).unwrap_or_default();
    Ok(Json(EnvironmentTelemetryEntry {
        node_id: format_node_id(resolved),
        telemetry,
    }))
}

/// Message history in arrival order
pub async fn get_last_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<MessageEntry>> {
    let messages = state.bridge.last_messages(query.limit);
    Json(messages.into_iter().map(Into::into).collect())
}

/// All nodes seen on the mesh
pub async fn nodes(State(state): State<Arc<AppState>>) -> Json<Vec<NodeEntry>> {
    Json(state.bridge.nodes().into_iter().map(Into::into).collect())
}

/// Connection status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusEntry> {
    Json(state.bridge.status().into())
}
