//! Request building and line parsing for the flicd session

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;

use flic_core::events::FlicEvent;
use flic_core::types::BdAddr;

/// Global request ID counter
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID
pub fn next_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Requests the bridge can send over the daemon session.
///
/// All of these are fire-and-forget from the caller's perspective; the
/// daemon answers through the event stream, not through return values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Ask for the set of already-verified buttons
    GetInfo,
    /// Subscribe to advertisement packets
    CreateScanner { scan_id: u32 },
    /// Unsubscribe a scanner
    RemoveScanner { scan_id: u32 },
    /// Open a connection channel for a button
    CreateConnectionChannel { conn_id: u32, bd_addr: BdAddr },
    /// Tear down a connection channel
    RemoveConnectionChannel { conn_id: u32 },
    /// Subscribe to battery reports for a button
    CreateBatteryStatusListener { listener_id: u32, bd_addr: BdAddr },
    /// Unsubscribe a battery listener
    RemoveBatteryStatusListener { listener_id: u32 },
    /// Forget a button's pairing on the daemon side
    DeleteButton { bd_addr: BdAddr },
}

impl ClientCommand {
    /// Build the JSON request line
    pub fn build(&self, id: u64) -> String {
        let (method, params) = match self {
            ClientCommand::GetInfo => ("getInfo", json!({})),
            ClientCommand::CreateScanner { scan_id } => {
                ("createScanner", json!({ "scanId": scan_id }))
            }
            ClientCommand::RemoveScanner { scan_id } => {
                ("removeScanner", json!({ "scanId": scan_id }))
            }
            ClientCommand::CreateConnectionChannel { conn_id, bd_addr } => (
                "createConnectionChannel",
                json!({ "connId": conn_id, "bdAddr": bd_addr }),
            ),
            ClientCommand::RemoveConnectionChannel { conn_id } => {
                ("removeConnectionChannel", json!({ "connId": conn_id }))
            }
            ClientCommand::CreateBatteryStatusListener { listener_id, bd_addr } => (
                "createBatteryStatusListener",
                json!({ "listenerId": listener_id, "bdAddr": bd_addr }),
            ),
            ClientCommand::RemoveBatteryStatusListener { listener_id } => (
                "removeBatteryStatusListener",
                json!({ "listenerId": listener_id }),
            ),
            ClientCommand::DeleteButton { bd_addr } => {
                ("deleteButton", json!({ "bdAddr": bd_addr }))
            }
        };

        json!({
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string()
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            ClientCommand::GetInfo => "get info",
            ClientCommand::CreateScanner { .. } => "create scanner",
            ClientCommand::RemoveScanner { .. } => "remove scanner",
            ClientCommand::CreateConnectionChannel { .. } => "create connection channel",
            ClientCommand::RemoveConnectionChannel { .. } => "remove connection channel",
            ClientCommand::CreateBatteryStatusListener { .. } => "create battery listener",
            ClientCommand::RemoveBatteryStatusListener { .. } => "remove battery listener",
            ClientCommand::DeleteButton { .. } => "delete button",
        }
    }
}

/// Parse one line of daemon output into a typed event
pub fn parse_client_line(line: &str) -> Option<FlicEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    FlicEvent::parse(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_request_id_uniqueness() {
        let id1 = next_request_id();
        let id2 = next_request_id();
        let id3 = next_request_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert!(id2 > id1);
        assert!(id3 > id2);
    }

    #[test]
    fn test_build_get_info() {
        let json = ClientCommand::GetInfo.build(1);
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["id"], 1);
        assert_eq!(parsed["method"], "getInfo");
    }

    #[test]
    fn test_build_create_connection_channel() {
        let cmd = ClientCommand::CreateConnectionChannel {
            conn_id: 7,
            bd_addr: BdAddr::from("aa:bb:cc:dd:ee:ff"),
        };
        let json = cmd.build(3);

        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["id"], 3);
        assert_eq!(parsed["method"], "createConnectionChannel");
        assert_eq!(parsed["params"]["connId"], 7);
        assert_eq!(parsed["params"]["bdAddr"], "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_build_scanner_commands() {
        let json = ClientCommand::CreateScanner { scan_id: 2 }.build(1);
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["method"], "createScanner");
        assert_eq!(parsed["params"]["scanId"], 2);

        let json = ClientCommand::RemoveScanner { scan_id: 2 }.build(2);
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["method"], "removeScanner");
    }

    #[test]
    fn test_build_battery_listener_commands() {
        let cmd = ClientCommand::CreateBatteryStatusListener {
            listener_id: 4,
            bd_addr: BdAddr::from("aa:bb:cc:dd:ee:ff"),
        };
        let parsed: Value = serde_json::from_str(&cmd.build(1)).unwrap();
        assert_eq!(parsed["method"], "createBatteryStatusListener");
        assert_eq!(parsed["params"]["listenerId"], 4);

        let cmd = ClientCommand::RemoveBatteryStatusListener { listener_id: 4 };
        let parsed: Value = serde_json::from_str(&cmd.build(2)).unwrap();
        assert_eq!(parsed["method"], "removeBatteryStatusListener");
    }

    #[test]
    fn test_build_delete_button() {
        let cmd = ClientCommand::DeleteButton {
            bd_addr: BdAddr::from("aa:bb:cc:dd:ee:ff"),
        };
        let parsed: Value = serde_json::from_str(&cmd.build(5)).unwrap();
        assert_eq!(parsed["method"], "deleteButton");
        assert_eq!(parsed["params"]["bdAddr"], "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_parse_client_line_skips_blank() {
        assert!(parse_client_line("").is_none());
        assert!(parse_client_line("   ").is_none());
    }

    #[test]
    fn test_parse_client_line_event() {
        let line = r#" {"event":"batteryStatus","params":{"listenerId":1,"batteryPercentage":90}} "#;
        let event = parse_client_line(line).unwrap();
        assert!(matches!(event, FlicEvent::BatteryStatus(_)));
    }

    #[test]
    fn test_command_description() {
        assert_eq!(ClientCommand::GetInfo.description(), "get info");
        assert_eq!(
            ClientCommand::RemoveConnectionChannel { conn_id: 1 }.description(),
            "remove connection channel"
        );
    }
}
