//! The adapter event loop
//!
//! All mutable state lives here and is only touched from [`FlicAdapter::run`],
//! one event at a time: supervisor events, session events, operator
//! commands and deadline ticks are funneled through the same
//! `tokio::select!`. A button address is in exactly one of three states
//! at any moment: absent, negotiating, or connected.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use flic_core::events::{
    AdvertisementPacket, BatteryStatus, ButtonClickOrHold, ButtonUpOrDown,
    ConnectionChannelRemoved, ConnectionStatusChanged, CreateConnectionChannelResponse, FlicEvent,
    GetInfoResponse,
};
use flic_core::prelude::*;
use flic_core::types::{BdAddr, ConnectionStatus};
use flic_daemon::{ClientCommand, ClientEvent, FlicdProcess, SessionHandle, SupervisorEvent};

use crate::buttons::FlicButton;
use crate::gateway::Gateway;
use crate::negotiate::{Negotiation, NegotiationStep};
use crate::pairing::{private_prompt_message, AdvertisementAction, PairingSession};

/// Operator-facing commands fed into the event loop
#[derive(Debug)]
pub enum AdapterCommand {
    /// Open a pairing window; `None` uses the configured default length
    StartPairing { window: Option<Duration> },
    CancelPairing,
    /// Connect a specific button, optionally under an operator-chosen name
    AddDevice { bd_addr: BdAddr, name: Option<String> },
    RemoveDevice { bd_addr: BdAddr },
    /// Tear everything down and stop the loop
    Unload,
}

/// What the adapter knows about one address.
///
/// Absent from the table means unknown; there is never both a pending
/// negotiation and a connected button for the same address.
#[derive(Debug)]
pub enum ButtonSlot {
    Negotiating(Negotiation),
    Connected(FlicButton),
}

/// The bridge state machine
pub struct FlicAdapter<G: Gateway> {
    gateway: G,
    session: SessionHandle,
    /// Supervised daemon, None when attached to an external flicd
    process: Option<FlicdProcess>,
    buttons: HashMap<BdAddr, ButtonSlot>,
    /// Connection channel id -> owning address
    conn_ids: HashMap<u32, BdAddr>,
    /// Battery listener id -> owning address
    listener_ids: HashMap<u32, BdAddr>,
    pairing: Option<PairingSession>,
    pairing_window: Duration,
    next_id: u32,
    /// Set when the daemon died or the session dropped; devices stay
    /// registered but every operation is refused
    suspended: bool,
}

impl<G: Gateway> FlicAdapter<G> {
    pub fn new(
        gateway: G,
        session: SessionHandle,
        process: Option<FlicdProcess>,
        pairing_window: Duration,
    ) -> Self {
        Self {
            gateway,
            session,
            process,
            buttons: HashMap::new(),
            conn_ids: HashMap::new(),
            listener_ids: HashMap::new(),
            pairing: None,
            pairing_window,
            next_id: 0,
            suspended: false,
        }
    }

    /// Ask the daemon which buttons it already trusts
    pub async fn startup(&mut self) -> Result<()> {
        self.session.send(ClientCommand::GetInfo).await
    }

    /// Run until unloaded or all input channels close
    pub async fn run(
        mut self,
        mut client_rx: mpsc::Receiver<ClientEvent>,
        mut supervisor_rx: mpsc::Receiver<SupervisorEvent>,
        mut cmd_rx: mpsc::Receiver<AdapterCommand>,
    ) {
        if let Err(e) = self.startup().await {
            error!("Startup enumeration failed: {}", e);
        }

        loop {
            let deadline = self.next_deadline();
            let sleep_target =
                deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                Some(event) = client_rx.recv() => {
                    self.handle_client_event(event).await;
                }
                Some(event) = supervisor_rx.recv() => {
                    self.handle_supervisor_event(event);
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => {
                            info!("Command channel closed, unloading");
                            self.unload().await;
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                    self.handle_deadlines(Instant::now()).await;
                }
            }
        }

        info!("Adapter loop finished");
    }

    // ─────────────────────────────────────────────────────────
    // Operator commands
    // ─────────────────────────────────────────────────────────

    /// Returns false when the loop should stop
    async fn handle_command(&mut self, cmd: AdapterCommand) -> bool {
        match cmd {
            AdapterCommand::StartPairing { window } => {
                self.start_pairing(window).await;
            }
            AdapterCommand::CancelPairing => {
                self.cancel_pairing().await;
            }
            AdapterCommand::AddDevice { bd_addr, name } => {
                if self.refuse_if_suspended() {
                    return true;
                }
                let name = name.unwrap_or_else(|| bd_addr.default_name());
                self.begin_negotiation(bd_addr, name).await;
            }
            AdapterCommand::RemoveDevice { bd_addr } => {
                self.remove_device(bd_addr).await;
            }
            AdapterCommand::Unload => {
                self.unload().await;
                return false;
            }
        }
        true
    }

    async fn start_pairing(&mut self, window: Option<Duration>) {
        if self.refuse_if_suspended() {
            return;
        }
        if self.pairing.is_some() {
            debug!("Pairing window already open, ignoring");
            return;
        }

        let scan_id = self.next_id();
        if let Err(e) = self.session.send(ClientCommand::CreateScanner { scan_id }).await {
            self.gateway.adapter_error(&e);
            return;
        }
        self.pairing = Some(PairingSession::new(
            scan_id,
            window.unwrap_or(self.pairing_window),
        ));
    }

    async fn cancel_pairing(&mut self) {
        let Some(session) = self.pairing.take() else {
            debug!("No pairing window open, nothing to cancel");
            return;
        };
        info!("Pairing window cancelled");
        if let Err(e) = self
            .session
            .send(ClientCommand::RemoveScanner { scan_id: session.scan_id })
            .await
        {
            warn!("Failed to deregister scanner: {}", e);
        }
    }

    async fn remove_device(&mut self, bd_addr: BdAddr) {
        match self.buttons.remove(&bd_addr) {
            Some(ButtonSlot::Connected(button)) => {
                info!("Removing button {}", bd_addr);
                self.conn_ids.remove(&button.conn_id);
                self.listener_ids.remove(&button.listener_id);
                self.send_or_warn(ClientCommand::RemoveConnectionChannel {
                    conn_id: button.conn_id,
                })
                .await;
                self.send_or_warn(ClientCommand::RemoveBatteryStatusListener {
                    listener_id: button.listener_id,
                })
                .await;
                self.send_or_warn(ClientCommand::DeleteButton {
                    bd_addr: bd_addr.clone(),
                })
                .await;
                self.gateway.device_removed(&button.device_id());
            }
            Some(ButtonSlot::Negotiating(neg)) => {
                info!("Abandoning negotiation for {}", bd_addr);
                self.conn_ids.remove(&neg.conn_id);
                self.send_or_warn(ClientCommand::RemoveConnectionChannel {
                    conn_id: neg.conn_id,
                })
                .await;
            }
            None => {
                debug!("Remove requested for unknown address {}", bd_addr);
            }
        }
    }

    /// Release every daemon-side resource and stop the supervised process
    pub async fn unload(&mut self) {
        info!("Unloading adapter");

        if let Some(session) = self.pairing.take() {
            self.send_or_warn(ClientCommand::RemoveScanner { scan_id: session.scan_id })
                .await;
        }

        let slots: Vec<_> = self.buttons.drain().collect();
        for (_, slot) in slots {
            match slot {
                ButtonSlot::Connected(button) => {
                    self.send_or_warn(ClientCommand::RemoveConnectionChannel {
                        conn_id: button.conn_id,
                    })
                    .await;
                    self.send_or_warn(ClientCommand::RemoveBatteryStatusListener {
                        listener_id: button.listener_id,
                    })
                    .await;
                }
                ButtonSlot::Negotiating(neg) => {
                    self.send_or_warn(ClientCommand::RemoveConnectionChannel {
                        conn_id: neg.conn_id,
                    })
                    .await;
                }
            }
        }
        self.conn_ids.clear();
        self.listener_ids.clear();

        if let Some(process) = self.process.as_mut() {
            if let Err(e) = process.shutdown().await {
                warn!("Daemon shutdown reported: {}", e);
            }
        }
    }

    /// Synchronous property-write check; every button property is read-only
    pub fn set_property(&self, bd_addr: &BdAddr, name: &str) -> Result<()> {
        match self.buttons.get(bd_addr) {
            Some(ButtonSlot::Connected(button)) => button.request_property_write(name),
            _ => Err(Error::config(format!("no connected button at {}", bd_addr))),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Supervisor events
    // ─────────────────────────────────────────────────────────

    fn handle_supervisor_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Ready => {
                debug!("Daemon reported ready");
            }
            SupervisorEvent::Stderr(line) => {
                trace!("flicd: {}", line);
            }
            SupervisorEvent::Exited { code } => {
                error!("flicd exited (code {:?}); suspending operations", code);
                self.suspended = true;
                // Devices stay registered so the operator sees them as
                // unreachable instead of silently vanishing
                self.gateway.adapter_error(&Error::DaemonExited { code });
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Session events
    // ─────────────────────────────────────────────────────────

    async fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Event(event) => self.handle_flic_event(event).await,
            ClientEvent::TransportClosed { reason } => {
                error!("Daemon session lost: {}; suspending operations", reason);
                self.suspended = true;
                self.gateway.adapter_error(&Error::transport(reason));
            }
        }
    }

    async fn handle_flic_event(&mut self, event: FlicEvent) {
        trace!("{}", event.summary());
        match event {
            FlicEvent::AdvertisementPacket(packet) => self.on_advertisement(packet).await,
            FlicEvent::CreateConnectionChannelResponse(resp) => {
                self.on_create_response(resp).await;
            }
            FlicEvent::ConnectionStatusChanged(changed) => self.on_status_changed(changed).await,
            FlicEvent::ConnectionChannelRemoved(removed) => self.on_channel_removed(removed).await,
            FlicEvent::ButtonUpOrDown(report) => self.on_up_or_down(report),
            FlicEvent::ButtonClickOrHold(report) => self.on_click_or_hold(report),
            FlicEvent::BatteryStatus(report) => self.on_battery_status(report),
            FlicEvent::GetInfoResponse(info) => self.on_get_info(info).await,
            FlicEvent::Response { id, error, .. } => {
                if let Some(error) = error {
                    warn!("Request {} failed: {}", id, error);
                }
            }
            FlicEvent::UnknownEvent { event, .. } => {
                debug!("Ignoring unknown daemon event: {}", event);
            }
        }
    }

    async fn on_advertisement(&mut self, packet: AdvertisementPacket) {
        let action = match self.pairing.as_mut() {
            Some(session) => session.on_advertisement(&packet),
            // Stale scan results after the window closed
            None => return,
        };

        match action {
            AdvertisementAction::PromptPrivate { bd_addr } => {
                info!("Private button {} in range", bd_addr);
                self.gateway.pairing_prompt(&private_prompt_message(&bd_addr));
            }
            AdvertisementAction::Negotiate { bd_addr, name } => {
                // The advertised friendly name wins when the button sent one
                let name = if name.is_empty() {
                    bd_addr.default_name()
                } else {
                    name
                };
                self.begin_negotiation(bd_addr, name).await;
            }
            AdvertisementAction::Ignore => {}
        }
    }

    async fn on_create_response(&mut self, resp: CreateConnectionChannelResponse) {
        let Some(bd_addr) = self.conn_ids.get(&resp.conn_id).cloned() else {
            debug!("Ack for unknown channel {}", resp.conn_id);
            return;
        };
        let step = match self.buttons.get_mut(&bd_addr) {
            Some(ButtonSlot::Negotiating(neg)) => neg.on_create_response(&resp),
            _ => return,
        };
        self.apply_step(bd_addr, step).await;
    }

    async fn on_status_changed(&mut self, changed: ConnectionStatusChanged) {
        let Some(bd_addr) = self.conn_ids.get(&changed.conn_id).cloned() else {
            return;
        };
        match self.buttons.get_mut(&bd_addr) {
            Some(ButtonSlot::Negotiating(neg)) => {
                let step = neg.on_status_changed(&changed);
                self.apply_step(bd_addr, step).await;
            }
            Some(ButtonSlot::Connected(_)) => {
                if changed.connection_status == ConnectionStatus::Disconnected {
                    debug!(
                        "Button {} disconnected ({:?}); daemon will reconnect",
                        bd_addr, changed.disconnect_reason
                    );
                }
            }
            None => {}
        }
    }

    async fn on_channel_removed(&mut self, removed: ConnectionChannelRemoved) {
        let Some(bd_addr) = self.conn_ids.get(&removed.conn_id).cloned() else {
            // Our own removal of an already-dropped slot echoing back
            debug!("Removal echo for unknown channel {}", removed.conn_id);
            return;
        };
        match self.buttons.get_mut(&bd_addr) {
            Some(ButtonSlot::Negotiating(neg)) => {
                let step = neg.on_removed(&removed);
                self.apply_step(bd_addr, step).await;
            }
            Some(ButtonSlot::Connected(_)) => {
                // The daemon dropped a live channel out from under us
                warn!(
                    "Channel for {} removed: {}",
                    bd_addr,
                    removed.removed_reason.describe()
                );
                if let Some(ButtonSlot::Connected(button)) = self.buttons.remove(&bd_addr) {
                    self.conn_ids.remove(&button.conn_id);
                    self.listener_ids.remove(&button.listener_id);
                    self.send_or_warn(ClientCommand::RemoveBatteryStatusListener {
                        listener_id: button.listener_id,
                    })
                    .await;
                    self.gateway.device_removed(&button.device_id());
                }
            }
            None => {}
        }
    }

    fn on_up_or_down(&mut self, report: ButtonUpOrDown) {
        let Some(bd_addr) = self.conn_ids.get(&report.conn_id) else {
            return;
        };
        if let Some(ButtonSlot::Connected(button)) = self.buttons.get_mut(bd_addr) {
            if let Some(value) = button.update_pushed(report.click_type) {
                self.gateway.property_changed(&button.device_id(), &value);
            }
        }
    }

    fn on_click_or_hold(&mut self, report: ButtonClickOrHold) {
        let Some(bd_addr) = self.conn_ids.get(&report.conn_id) else {
            return;
        };
        if let Some(ButtonSlot::Connected(button)) = self.buttons.get(bd_addr) {
            if let Some(event) = button.classify_click(report.click_type) {
                debug!("Button {}: {}", button.bd_addr, event.name());
                self.gateway.event_notify(&button.device_id(), event);
            }
        }
    }

    fn on_battery_status(&mut self, report: BatteryStatus) {
        let Some(bd_addr) = self.listener_ids.get(&report.listener_id) else {
            return;
        };
        if let Some(ButtonSlot::Connected(button)) = self.buttons.get_mut(bd_addr) {
            if let Some(value) = button.update_battery(report.battery_percentage) {
                self.gateway.property_changed(&button.device_id(), &value);
            }
        }
    }

    /// Attach every already-verified button without the negotiation races
    async fn on_get_info(&mut self, info: GetInfoResponse) {
        info!(
            "Daemon reports {} verified buttons",
            info.bd_addr_of_verified_buttons.len()
        );
        for bd_addr in info.bd_addr_of_verified_buttons {
            if self.buttons.contains_key(&bd_addr) {
                continue;
            }
            self.attach_verified(bd_addr).await;
        }
    }

    // ─────────────────────────────────────────────────────────
    // Negotiation plumbing
    // ─────────────────────────────────────────────────────────

    async fn begin_negotiation(&mut self, bd_addr: BdAddr, name: String) {
        if self.buttons.contains_key(&bd_addr) {
            debug!("Button {} already known, skipping negotiation", bd_addr);
            return;
        }

        let conn_id = self.next_id();
        info!("Negotiating connection for {} (channel {})", bd_addr, conn_id);
        if let Err(e) = self
            .session
            .send(ClientCommand::CreateConnectionChannel {
                conn_id,
                bd_addr: bd_addr.clone(),
            })
            .await
        {
            self.gateway.adapter_error(&e);
            return;
        }

        self.conn_ids.insert(conn_id, bd_addr.clone());
        self.buttons.insert(
            bd_addr.clone(),
            ButtonSlot::Negotiating(Negotiation::new(bd_addr, conn_id, name)),
        );
    }

    async fn apply_step(&mut self, bd_addr: BdAddr, step: NegotiationStep) {
        match step {
            NegotiationStep::Continue => {}
            NegotiationStep::Success => self.promote(bd_addr).await,
            NegotiationStep::Failure(error) => {
                warn!("Negotiation for {} failed: {}", bd_addr, error);
                if let Some(ButtonSlot::Negotiating(neg)) = self.buttons.remove(&bd_addr) {
                    self.conn_ids.remove(&neg.conn_id);
                }
                self.gateway.adapter_error(&error);
            }
            NegotiationStep::Abandon => {
                if let Some(ButtonSlot::Negotiating(neg)) = self.buttons.get(&bd_addr) {
                    let conn_id = neg.conn_id;
                    self.send_or_warn(ClientCommand::RemoveConnectionChannel { conn_id })
                        .await;
                }
            }
        }
    }

    /// Negotiation won: register the device and subscribe its battery
    async fn promote(&mut self, bd_addr: BdAddr) {
        let Some(ButtonSlot::Negotiating(neg)) = self.buttons.remove(&bd_addr) else {
            return;
        };

        let listener_id = self.next_id();
        let button = FlicButton::new(neg.bd_addr, neg.name, neg.conn_id, listener_id);
        info!("Button {} connected as {}", bd_addr, button.device_id());

        self.send_or_warn(ClientCommand::CreateBatteryStatusListener {
            listener_id,
            bd_addr: bd_addr.clone(),
        })
        .await;

        self.gateway.device_added(&button.description());
        self.listener_ids.insert(listener_id, bd_addr.clone());
        self.buttons.insert(bd_addr, ButtonSlot::Connected(button));
    }

    /// Direct attachment for a button the daemon already trusts
    async fn attach_verified(&mut self, bd_addr: BdAddr) {
        let conn_id = self.next_id();
        let listener_id = self.next_id();
        info!("Attaching verified button {}", bd_addr);

        self.send_or_warn(ClientCommand::CreateConnectionChannel {
            conn_id,
            bd_addr: bd_addr.clone(),
        })
        .await;
        self.send_or_warn(ClientCommand::CreateBatteryStatusListener {
            listener_id,
            bd_addr: bd_addr.clone(),
        })
        .await;

        let button = FlicButton::new(bd_addr.clone(), bd_addr.default_name(), conn_id, listener_id);
        self.gateway.device_added(&button.description());
        self.conn_ids.insert(conn_id, bd_addr.clone());
        self.listener_ids.insert(listener_id, bd_addr.clone());
        self.buttons.insert(bd_addr, ButtonSlot::Connected(button));
    }

    // ─────────────────────────────────────────────────────────
    // Deadlines
    // ─────────────────────────────────────────────────────────

    /// The soonest pending deadline, if any
    fn next_deadline(&self) -> Option<Instant> {
        let pairing = self.pairing.as_ref().map(|s| s.deadline());
        let negotiation = self
            .buttons
            .values()
            .filter_map(|slot| match slot {
                ButtonSlot::Negotiating(neg) => neg.deadline(),
                ButtonSlot::Connected(_) => None,
            })
            .min();
        match (pairing, negotiation) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn handle_deadlines(&mut self, now: Instant) {
        // Closing the pairing window leaves in-flight negotiations alone
        if self.pairing.as_ref().is_some_and(|s| s.expired(now)) {
            info!("Pairing window expired");
            if let Some(session) = self.pairing.take() {
                self.send_or_warn(ClientCommand::RemoveScanner { scan_id: session.scan_id })
                    .await;
            }
        }

        let mut abandoned = Vec::new();
        for slot in self.buttons.values_mut() {
            if let ButtonSlot::Negotiating(neg) = slot {
                if let NegotiationStep::Abandon = neg.on_deadline(now) {
                    abandoned.push(neg.conn_id);
                }
            }
        }
        for conn_id in abandoned {
            self.send_or_warn(ClientCommand::RemoveConnectionChannel { conn_id })
                .await;
        }
    }

    // ─────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// True (and reports) when the daemon is gone
    fn refuse_if_suspended(&mut self) -> bool {
        if self.suspended {
            self.gateway
                .adapter_error(&Error::daemon("flicd is not available; operation refused"));
        }
        self.suspended
    }

    async fn send_or_warn(&mut self, command: ClientCommand) {
        if let Err(e) = self.session.send(command).await {
            warn!("Session send failed: {}", e);
        }
    }
}
