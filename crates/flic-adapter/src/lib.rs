//! # flic-adapter - Bridge Logic
//!
//! Turns the raw flicd event stream into gateway device objects:
//! pairing windows, connection negotiation, and per-button state.
//!
//! Everything stateful runs inside one event loop task
//! ([`FlicAdapter::run`]); background tasks in [`flic_daemon`] only
//! forward events into it, so invariants are checked synchronously
//! without locks.
//!
//! ## Public API
//!
//! ### Adapter
//! - [`FlicAdapter`] - The event loop owning all button state
//! - [`AdapterCommand`] - Operator commands (pairing, add/remove, unload)
//!
//! ### Gateway Collaboration
//! - [`Gateway`] - Callbacks into the host device model
//! - [`DeviceDescription`] - Fixed property/event schema for a button
//!
//! ### Configuration
//! - [`Settings`] - TOML settings with defaults

pub mod adapter;
pub mod buttons;
pub mod config;
pub mod gateway;
pub mod negotiate;
pub mod pairing;

pub use adapter::{AdapterCommand, ButtonSlot, FlicAdapter};
pub use buttons::FlicButton;
pub use config::{default_config_path, load_settings, save_settings, Settings};
pub use gateway::{DeviceDescription, EventDescription, Gateway, PropertyDescription};
pub use negotiate::{Negotiation, NegotiationStep, NEGOTIATION_BUDGET};
pub use pairing::{AdvertisementAction, PairingSession, DEFAULT_PAIRING_WINDOW};

#[cfg(any(test, feature = "test-helpers"))]
pub use gateway::{GatewayCall, RecordingGateway};
