//! # flic-daemon - flicd Process Management
//!
//! Supervises the `flicd` daemon process and owns the socket session to
//! it: scanning, connection channels, battery listeners, and the
//! get-info query.
//!
//! Depends on [`flic_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Supervision
//! - [`FlicdProcess`] - Spawn and supervise the flicd child process
//! - [`SupervisorEvent`] - Readiness/diagnostic/exit events from the supervisor
//!
//! ### Session Client
//! - [`FlicClient`] - Socket session to the daemon
//! - [`SessionHandle`] - Cloneable handle for sending commands
//! - [`ClientEvent`] - Typed daemon events plus transport-closed notification
//!
//! ### Protocol
//! - [`ClientCommand`] - Requests the bridge can send over the session
//! - [`parse_client_line()`] - Parse one line of daemon output
//!
//! ### Binary Resolution
//! - [`resolve_flicd_binary()`] - Locate flicd via config override or PATH

pub mod binary;
pub mod client;
pub mod process;
pub mod protocol;

pub use binary::resolve_flicd_binary;
pub use client::{ClientEvent, FlicClient, SessionHandle};
pub use process::{FlicdProcess, SupervisorEvent, READY_MARKER};
pub use protocol::{next_request_id, parse_client_line, ClientCommand};
