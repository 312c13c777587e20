//! REST API endpoint tests
//!
//! These tests verify the REST API response formats.

use serde_json::json;

/// Test expected format for GET /api/mesh/status response
#[test]
fn test_status_response_format() {
    let response = json!({
        "connected": true,
        "node_id": "!a1b2c3d4",
        "uptime_seconds": 3600,
        "node_count": 5,
        "last_packet": "2026-08-07T12:00:00Z",
        "last_connected": "2026-08-07T11:00:00Z",
        "connection_attempts": 1
    });

    assert!(response["connected"].is_boolean());
    assert!(response["uptime_seconds"].is_number());
    assert!(response["node_count"].is_number());
    assert!(response["node_id"].as_str().unwrap().starts_with('!'));
}

/// Test expected format for GET /api/mesh/get_last_messages response
#[test]
fn test_messages_response_format() {
    let response = json!([
        {
            "node_id": "!a1b2c3d4",
            "to": null,
            "message": "hello mesh",
            "rx_time": "2026-08-07T12:00:00Z"
        },
        {
            "node_id": "!00000042",
            "to": "!a1b2c3d4",
            "message": "direct reply",
            "rx_time": "2026-08-07T12:00:05Z"
        }
    ]);

    assert!(response.is_array());
    for message in response.as_array().unwrap() {
        assert!(message["node_id"].is_string());
        assert!(message["message"].is_string());
        assert!(message["rx_time"].is_string());
    }
}

/// Test expected format for GET /api/mesh/get_device_telemetry response
#[test]
fn test_device_telemetry_response_format() {
    let response = json!({
        "node_id": "!a1b2c3d4",
        "time": "2026-08-07T12:00:00Z",
        "battery_level": 87,
        "voltage": 3.92,
        "channel_utilization": 12.5,
        "air_util_tx": 1.4
    });

    assert!(response["node_id"].is_string());
    assert!(response["time"].is_string());
    assert!(response["battery_level"].is_number());
}

/// Test expected format for GET /api/mesh/get_environment_telemetry response
#[test]
fn test_environment_telemetry_response_format() {
    let response = json!({
        "node_id": "!a1b2c3d4",
        "time": "2026-08-07T12:00:00Z",
        "temperature": 21.5,
        "relative_humidity": 48.0,
        "barometric_pressure": 1013.2
    });

    assert!(response["node_id"].is_string());
    assert!(response["temperature"].is_number());
}

/// Test expected format for GET /api/mesh/nodes response
#[test]
fn test_nodes_response_format() {
    let response = json!([
        {
            "node_id": "!a1b2c3d4",
            "long_name": "Ridge Repeater",
            "short_name": "RR",
            "last_seen": "2026-08-07T12:00:00Z",
            "device": {
                "time": "2026-08-07T11:59:00Z",
                "battery_level": 87,
                "voltage": 3.92,
                "channel_utilization": null,
                "air_util_tx": null
            },
            "environment": null
        },
        {
            "node_id": "!00000042",
            "long_name": null,
            "short_name": null,
            "last_seen": "2026-08-07T12:00:05Z",
            "device": null,
            "environment": null
        }
    ]);

    assert!(response.is_array());
    for node in response.as_array().unwrap() {
        assert!(node["node_id"].as_str().unwrap().starts_with('!'));
        assert!(node["last_seen"].is_string());
    }
}

/// Test expected format for error responses
#[test]
fn test_error_response_format() {
    let response = json!({
        "status": "error",
        "message": "radio link is not connected"
    });

    assert_eq!(response["status"], "error");
    assert!(response["message"].is_string());
}
