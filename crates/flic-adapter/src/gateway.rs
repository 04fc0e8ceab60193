//! Host device-model collaborator
//!
//! The adapter never talks to the smart-home gateway directly; it calls
//! through the [`Gateway`] trait so the host (and the tests) decide what
//! registration, property updates and notifications actually mean.

use flic_core::prelude::*;
use flic_core::types::{BdAddr, ButtonEvent, PropertyValue};

/// A property declared on a button device.
///
/// The schema is closed: every Flic button exposes exactly the same
/// properties, all read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescription {
    pub name: &'static str,
    /// Value type as the gateway understands it ("integer" / "boolean")
    pub kind: &'static str,
    pub unit: Option<&'static str>,
    pub read_only: bool,
}

/// A discrete event a button device can emit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescription {
    pub name: &'static str,
}

/// What the gateway needs to register one button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub id: String,
    pub name: String,
    pub properties: Vec<PropertyDescription>,
    pub events: Vec<EventDescription>,
}

impl DeviceDescription {
    /// The fixed schema for a Flic button
    pub fn button(bd_addr: &BdAddr, name: &str) -> Self {
        Self {
            id: bd_addr.device_id(),
            name: name.to_string(),
            properties: vec![
                PropertyDescription {
                    name: "battery",
                    kind: "integer",
                    unit: Some("percent"),
                    read_only: true,
                },
                PropertyDescription {
                    name: "pushed",
                    kind: "boolean",
                    unit: None,
                    read_only: true,
                },
            ],
            events: vec![
                EventDescription { name: "hold" },
                EventDescription { name: "singleClick" },
                EventDescription { name: "doubleClick" },
            ],
        }
    }
}

/// Callbacks into the host device model.
///
/// All calls happen from inside the adapter event loop, one at a time.
pub trait Gateway: Send {
    /// A button finished negotiation (or was verified at startup) and
    /// should appear as a device
    fn device_added(&mut self, device: &DeviceDescription);

    /// A button was removed and should disappear from the device model
    fn device_removed(&mut self, device_id: &str);

    /// A cached property changed value
    fn property_changed(&mut self, device_id: &str, value: &PropertyValue);

    /// A discrete button event fired
    fn event_notify(&mut self, device_id: &str, event: ButtonEvent);

    /// The operator should see a pairing instruction
    fn pairing_prompt(&mut self, message: &str);

    /// A failure the operator should know about
    fn adapter_error(&mut self, error: &Error);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test double
// ─────────────────────────────────────────────────────────────────────────────

/// One recorded gateway interaction
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    DeviceAdded(DeviceDescription),
    DeviceRemoved(String),
    PropertyChanged(String, PropertyValue),
    EventNotify(String, ButtonEvent),
    PairingPrompt(String),
    AdapterError(String),
}

/// Gateway stub that records every call for assertions
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Default)]
pub struct RecordingGateway {
    pub calls: Vec<GatewayCall>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device ids currently registered (added and not yet removed)
    pub fn registered_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for call in &self.calls {
            match call {
                GatewayCall::DeviceAdded(desc) => ids.push(desc.id.clone()),
                GatewayCall::DeviceRemoved(id) => ids.retain(|i| i != id),
                _ => {}
            }
        }
        ids
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Gateway for RecordingGateway {
    fn device_added(&mut self, device: &DeviceDescription) {
        self.calls.push(GatewayCall::DeviceAdded(device.clone()));
    }

    fn device_removed(&mut self, device_id: &str) {
        self.calls.push(GatewayCall::DeviceRemoved(device_id.to_string()));
    }

    fn property_changed(&mut self, device_id: &str, value: &PropertyValue) {
        self.calls
            .push(GatewayCall::PropertyChanged(device_id.to_string(), value.clone()));
    }

    fn event_notify(&mut self, device_id: &str, event: ButtonEvent) {
        self.calls.push(GatewayCall::EventNotify(device_id.to_string(), event));
    }

    fn pairing_prompt(&mut self, message: &str) {
        self.calls.push(GatewayCall::PairingPrompt(message.to_string()));
    }

    fn adapter_error(&mut self, error: &Error) {
        self.calls.push(GatewayCall::AdapterError(error.to_string()));
    }
}
