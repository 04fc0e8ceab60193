//! Button domain types
//!
//! The observable surface of a Flic button is fixed and small, so every
//! payload here is a closed enum rather than an open string-keyed map.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bluetooth hardware address of a Flic button.
///
/// The unit of identity for everything in the bridge: the device
/// registry, in-flight negotiations, and private-button prompt
/// de-duplication are all keyed by it. Never regenerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BdAddr(String);

impl BdAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable gateway device identifier for this button
    pub fn device_id(&self) -> String {
        format!("flic-{}", self.0)
    }

    /// Display name used when the operator supplied none
    pub fn default_name(&self) -> String {
        format!("Flic button {}", self.0)
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BdAddr {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// Deserialization goes through here so daemon-reported addresses get
// the same case normalization as operator-entered ones
impl From<String> for BdAddr {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<BdAddr> for String {
    fn from(addr: BdAddr) -> Self {
        addr.0
    }
}

/// Connection channel status reported by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Ready,
}

/// Result code carried on the channel creation acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateConnectionChannelError {
    NoError,
    MaxPendingConnectionsReached,
}

/// Why a connection channel was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovedReason {
    /// We asked for the removal ourselves (the negotiation timeout path)
    RemovedByThisClient,
    ButtonIsPrivate,
    VerifyTimeout,
    InternetBackendError,
    InvalidData,
    #[serde(other)]
    Unknown,
}

impl RemovedReason {
    /// Operator-facing description of a daemon-side removal
    pub fn describe(&self) -> &'static str {
        match self {
            RemovedReason::RemovedByThisClient => "removed by this client",
            RemovedReason::ButtonIsPrivate => "button is private",
            RemovedReason::VerifyTimeout => "verification timed out",
            RemovedReason::InternetBackendError => "internet backend error",
            RemovedReason::InvalidData => "invalid data from button",
            RemovedReason::Unknown => "unknown reason",
        }
    }
}

/// Raw press classification delivered by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClickType {
    ButtonDown,
    ButtonUp,
    ButtonClick,
    ButtonSingleClick,
    ButtonDoubleClick,
    ButtonHold,
}

impl ClickType {
    /// `Some(pushed)` for up/down transitions, `None` otherwise
    pub fn as_pushed(&self) -> Option<bool> {
        match self {
            ClickType::ButtonDown => Some(true),
            ClickType::ButtonUp => Some(false),
            _ => None,
        }
    }
}

/// Discrete event published to the gateway.
///
/// Exactly one of these is emitted per physical action; the daemon has
/// already done the single/double/hold disambiguation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Hold,
    SingleClick,
    DoubleClick,
}

impl ButtonEvent {
    /// Stable event identifier declared to the gateway
    pub fn name(&self) -> &'static str {
        match self {
            ButtonEvent::Hold => "hold",
            ButtonEvent::SingleClick => "singleClick",
            ButtonEvent::DoubleClick => "doubleClick",
        }
    }

    /// Map a daemon classification to a gateway event
    pub fn from_click_type(click: ClickType) -> Option<Self> {
        match click {
            ClickType::ButtonHold => Some(ButtonEvent::Hold),
            ClickType::ButtonSingleClick => Some(ButtonEvent::SingleClick),
            ClickType::ButtonDoubleClick => Some(ButtonEvent::DoubleClick),
            _ => None,
        }
    }
}

/// Typed property payloads pushed to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValue {
    /// Battery percentage, 0-100
    Battery(u8),
    /// Whether the button is currently held down
    Pushed(bool),
}

impl PropertyValue {
    /// Stable property identifier declared to the gateway
    pub fn name(&self) -> &'static str {
        match self {
            PropertyValue::Battery(_) => "battery",
            PropertyValue::Pushed(_) => "pushed",
        }
    }
}
