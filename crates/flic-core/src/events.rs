//! Typed events from the flicd socket stream

use serde::{Deserialize, Serialize};

use crate::types::{
    BdAddr, ClickType, ConnectionStatus, CreateConnectionChannelError, RemovedReason,
};

// ─────────────────────────────────────────────────────────
// Event Structs
// ─────────────────────────────────────────────────────────

/// Scan result for an advertising button
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisementPacket {
    pub scan_id: u32,
    pub bd_addr: BdAddr,
    #[serde(default)]
    pub name: String,
    pub rssi: i8,
    pub is_private: bool,
    #[serde(default)]
    pub already_verified: bool,
}

/// Acknowledgement of a createConnectionChannel request.
///
/// `connection_status` may already be `Ready` when another client
/// verified the button between the scan result and this event.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionChannelResponse {
    pub conn_id: u32,
    pub error: CreateConnectionChannelError,
    pub connection_status: ConnectionStatus,
}

/// A connection channel changed status
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusChanged {
    pub conn_id: u32,
    pub connection_status: ConnectionStatus,
    #[serde(default)]
    pub disconnect_reason: Option<String>,
}

/// A connection channel was removed, by us or by the daemon
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionChannelRemoved {
    pub conn_id: u32,
    pub removed_reason: RemovedReason,
}

/// Button up/down transition
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonUpOrDown {
    pub conn_id: u32,
    pub click_type: ClickType,
}

/// Single/double/hold classification, one per physical action
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonClickOrHold {
    pub conn_id: u32,
    pub click_type: ClickType,
}

/// Battery report for a registered listener
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryStatus {
    pub listener_id: u32,
    pub battery_percentage: u8,
}

/// Answer to getInfo: buttons the daemon already trusts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetInfoResponse {
    pub bd_addr_of_verified_buttons: Vec<BdAddr>,
}

// ─────────────────────────────────────────────────────────
// FlicEvent Enum
// ─────────────────────────────────────────────────────────

/// Fully typed flicd message
#[derive(Debug, Clone)]
pub enum FlicEvent {
    // Scanning
    AdvertisementPacket(AdvertisementPacket),

    // Connection channel lifecycle
    CreateConnectionChannelResponse(CreateConnectionChannelResponse),
    ConnectionStatusChanged(ConnectionStatusChanged),
    ConnectionChannelRemoved(ConnectionChannelRemoved),

    // Button activity
    ButtonUpOrDown(ButtonUpOrDown),
    ButtonClickOrHold(ButtonClickOrHold),
    BatteryStatus(BatteryStatus),

    // Queries
    GetInfoResponse(GetInfoResponse),

    // Responses to requests we sent
    Response {
        id: serde_json::Value,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    },

    // Fallback for unknown events
    UnknownEvent {
        event: String,
        params: serde_json::Value,
    },
}

impl FlicEvent {
    /// Parse a JSON line from the daemon into a typed event
    pub fn parse(json: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(json).ok()?;

        if let Some(event) = value.get("event").and_then(|v| v.as_str()) {
            let params = value
                .get("params")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            Some(Self::parse_event(event, params))
        } else if value.get("id").is_some() {
            let id = value.get("id").cloned().unwrap_or(serde_json::Value::Null);
            let result = value.get("result").cloned();
            let error = value.get("error").cloned();
            Some(FlicEvent::Response { id, result, error })
        } else {
            None
        }
    }

    /// Parse an event by name
    fn parse_event(event: &str, params: serde_json::Value) -> Self {
        match event {
            "advertisementPacket" => serde_json::from_value(params.clone())
                .map(FlicEvent::AdvertisementPacket)
                .unwrap_or_else(|_| Self::unknown(event, params)),
            "createConnectionChannelResponse" => serde_json::from_value(params.clone())
                .map(FlicEvent::CreateConnectionChannelResponse)
                .unwrap_or_else(|_| Self::unknown(event, params)),
            "connectionStatusChanged" => serde_json::from_value(params.clone())
                .map(FlicEvent::ConnectionStatusChanged)
                .unwrap_or_else(|_| Self::unknown(event, params)),
            "connectionChannelRemoved" => serde_json::from_value(params.clone())
                .map(FlicEvent::ConnectionChannelRemoved)
                .unwrap_or_else(|_| Self::unknown(event, params)),
            "buttonUpOrDown" => serde_json::from_value(params.clone())
                .map(FlicEvent::ButtonUpOrDown)
                .unwrap_or_else(|_| Self::unknown(event, params)),
            "buttonSingleOrDoubleClickOrHold" => serde_json::from_value(params.clone())
                .map(FlicEvent::ButtonClickOrHold)
                .unwrap_or_else(|_| Self::unknown(event, params)),
            "batteryStatus" => serde_json::from_value(params.clone())
                .map(FlicEvent::BatteryStatus)
                .unwrap_or_else(|_| Self::unknown(event, params)),
            "getInfoResponse" => serde_json::from_value(params.clone())
                .map(FlicEvent::GetInfoResponse)
                .unwrap_or_else(|_| Self::unknown(event, params)),
            _ => Self::unknown(event, params),
        }
    }

    fn unknown(event: &str, params: serde_json::Value) -> Self {
        FlicEvent::UnknownEvent {
            event: event.to_string(),
            params,
        }
    }

    /// Get the connection channel id if this event belongs to one
    pub fn conn_id(&self) -> Option<u32> {
        match self {
            FlicEvent::CreateConnectionChannelResponse(e) => Some(e.conn_id),
            FlicEvent::ConnectionStatusChanged(e) => Some(e.conn_id),
            FlicEvent::ConnectionChannelRemoved(e) => Some(e.conn_id),
            FlicEvent::ButtonUpOrDown(e) => Some(e.conn_id),
            FlicEvent::ButtonClickOrHold(e) => Some(e.conn_id),
            _ => None,
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self {
            FlicEvent::AdvertisementPacket(a) => {
                format!("Advertisement from {} (rssi {})", a.bd_addr, a.rssi)
            }
            FlicEvent::CreateConnectionChannelResponse(r) => {
                format!(
                    "Channel #{} created: {:?}/{:?}",
                    r.conn_id, r.error, r.connection_status
                )
            }
            FlicEvent::ConnectionStatusChanged(s) => {
                format!("Channel #{} now {:?}", s.conn_id, s.connection_status)
            }
            FlicEvent::ConnectionChannelRemoved(r) => {
                format!("Channel #{} removed: {}", r.conn_id, r.removed_reason.describe())
            }
            FlicEvent::ButtonUpOrDown(b) => {
                format!("Channel #{}: {:?}", b.conn_id, b.click_type)
            }
            FlicEvent::ButtonClickOrHold(b) => {
                format!("Channel #{}: {:?}", b.conn_id, b.click_type)
            }
            FlicEvent::BatteryStatus(b) => {
                format!("Battery listener #{}: {}%", b.listener_id, b.battery_percentage)
            }
            FlicEvent::GetInfoResponse(i) => {
                format!("{} verified buttons", i.bd_addr_of_verified_buttons.len())
            }
            FlicEvent::Response { id, error, .. } => {
                if error.is_some() {
                    format!("Response #{}: error", id)
                } else {
                    format!("Response #{}: ok", id)
                }
            }
            FlicEvent::UnknownEvent { event, .. } => {
                format!("Event: {}", event)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_advertisement_packet() {
        let json = r#"{"event":"advertisementPacket","params":{"scanId":1,"bdAddr":"aa:bb:cc:dd:ee:ff","name":"Flic","rssi":-60,"isPrivate":false,"alreadyVerified":false}}"#;
        let event = FlicEvent::parse(json).unwrap();
        if let FlicEvent::AdvertisementPacket(a) = event {
            assert_eq!(a.bd_addr.as_str(), "aa:bb:cc:dd:ee:ff");
            assert_eq!(a.rssi, -60);
            assert!(!a.is_private);
        } else {
            panic!("Expected AdvertisementPacket");
        }
    }

    #[test]
    fn test_parse_create_response_already_ready() {
        let json = r#"{"event":"createConnectionChannelResponse","params":{"connId":7,"error":"NoError","connectionStatus":"Ready"}}"#;
        let event = FlicEvent::parse(json).unwrap();
        if let FlicEvent::CreateConnectionChannelResponse(r) = event {
            assert_eq!(r.conn_id, 7);
            assert_eq!(r.error, CreateConnectionChannelError::NoError);
            assert_eq!(r.connection_status, ConnectionStatus::Ready);
        } else {
            panic!("Expected CreateConnectionChannelResponse");
        }
    }

    #[test]
    fn test_parse_status_changed() {
        let json = r#"{"event":"connectionStatusChanged","params":{"connId":3,"connectionStatus":"Connecting"}}"#;
        let event = FlicEvent::parse(json).unwrap();
        assert_eq!(event.conn_id(), Some(3));
        assert!(matches!(event, FlicEvent::ConnectionStatusChanged(_)));
    }

    #[test]
    fn test_parse_channel_removed() {
        let json = r#"{"event":"connectionChannelRemoved","params":{"connId":3,"removedReason":"RemovedByThisClient"}}"#;
        let event = FlicEvent::parse(json).unwrap();
        if let FlicEvent::ConnectionChannelRemoved(r) = event {
            assert_eq!(r.removed_reason, RemovedReason::RemovedByThisClient);
        } else {
            panic!("Expected ConnectionChannelRemoved");
        }
    }

    #[test]
    fn test_parse_button_events() {
        let json = r#"{"event":"buttonUpOrDown","params":{"connId":2,"clickType":"ButtonDown"}}"#;
        let event = FlicEvent::parse(json).unwrap();
        if let FlicEvent::ButtonUpOrDown(b) = event {
            assert_eq!(b.click_type, ClickType::ButtonDown);
        } else {
            panic!("Expected ButtonUpOrDown");
        }

        let json = r#"{"event":"buttonSingleOrDoubleClickOrHold","params":{"connId":2,"clickType":"ButtonDoubleClick"}}"#;
        let event = FlicEvent::parse(json).unwrap();
        assert!(matches!(event, FlicEvent::ButtonClickOrHold(_)));
    }

    #[test]
    fn test_parse_battery_status() {
        let json = r#"{"event":"batteryStatus","params":{"listenerId":9,"batteryPercentage":87}}"#;
        let event = FlicEvent::parse(json).unwrap();
        if let FlicEvent::BatteryStatus(b) = event {
            assert_eq!(b.listener_id, 9);
            assert_eq!(b.battery_percentage, 87);
        } else {
            panic!("Expected BatteryStatus");
        }
    }

    #[test]
    fn test_parse_get_info_response() {
        let json = r#"{"event":"getInfoResponse","params":{"bdAddrOfVerifiedButtons":["aa:bb:cc:dd:ee:ff"]}}"#;
        let event = FlicEvent::parse(json).unwrap();
        if let FlicEvent::GetInfoResponse(i) = event {
            assert_eq!(i.bd_addr_of_verified_buttons.len(), 1);
            assert_eq!(
                i.bd_addr_of_verified_buttons[0],
                BdAddr::from("aa:bb:cc:dd:ee:ff")
            );
        } else {
            panic!("Expected GetInfoResponse");
        }
    }

    #[test]
    fn test_parse_response() {
        let json = r#"{"id":1,"result":{"ok":true}}"#;
        let event = FlicEvent::parse(json).unwrap();
        assert!(matches!(event, FlicEvent::Response { .. }));
    }

    #[test]
    fn test_unknown_event_fallback() {
        let json = r#"{"event":"some.future.event","params":{"foo":"bar"}}"#;
        let event = FlicEvent::parse(json).unwrap();
        if let FlicEvent::UnknownEvent { event, .. } = event {
            assert_eq!(event, "some.future.event");
        } else {
            panic!("Expected UnknownEvent");
        }
    }

    #[test]
    fn test_malformed_event_fallback() {
        // advertisementPacket missing required fields
        let json = r#"{"event":"advertisementPacket","params":{"incomplete":true}}"#;
        let event = FlicEvent::parse(json).unwrap();
        assert!(matches!(event, FlicEvent::UnknownEvent { .. }));
    }

    #[test]
    fn test_invalid_json_returns_none() {
        assert!(FlicEvent::parse("not json").is_none());
        assert!(FlicEvent::parse("{incomplete").is_none());
    }

    #[test]
    fn test_conn_id_helper() {
        let json = r#"{"event":"buttonUpOrDown","params":{"connId":5,"clickType":"ButtonUp"}}"#;
        assert_eq!(FlicEvent::parse(json).unwrap().conn_id(), Some(5));

        let json = r#"{"event":"batteryStatus","params":{"listenerId":1,"batteryPercentage":50}}"#;
        assert_eq!(FlicEvent::parse(json).unwrap().conn_id(), None);
    }

    #[test]
    fn test_summary() {
        let json = r#"{"event":"connectionStatusChanged","params":{"connId":3,"connectionStatus":"Ready"}}"#;
        let event = FlicEvent::parse(json).unwrap();
        assert!(event.summary().contains("Ready"));
    }
}
