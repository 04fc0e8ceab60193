//! # flic-core - Core Domain Types
//!
//! Foundation crate for Flic Bridge. Provides the button domain model,
//! error handling, typed daemon events, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`BdAddr`] - Bluetooth hardware address, the unit of button identity
//! - [`ConnectionStatus`], [`RemovedReason`], [`CreateConnectionChannelError`] -
//!   connection channel lifecycle states reported by the daemon
//! - [`ClickType`] - raw press classification from the daemon
//! - [`ButtonEvent`] - discrete gateway events (hold, single click, double click)
//! - [`PropertyValue`] - typed property payloads (battery percent, pushed flag)
//!
//! ### Events (`events`)
//! - [`FlicEvent`] - Parsed messages from the flicd socket stream
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use flic_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all Flic Bridge crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result};
pub use events::{
    AdvertisementPacket, BatteryStatus, ButtonClickOrHold, ButtonUpOrDown,
    ConnectionChannelRemoved, ConnectionStatusChanged, CreateConnectionChannelResponse, FlicEvent,
    GetInfoResponse,
};
pub use types::{
    BdAddr, ButtonEvent, ClickType, ConnectionStatus, CreateConnectionChannelError, PropertyValue,
    RemovedReason,
};
