//! Pairing window coordination
//!
//! A pairing session owns one daemon scanner and a wall-clock window.
//! Advertisements from private buttons produce exactly one operator
//! prompt per window; a later public advertisement from the same button
//! clears the suppression so a fresh privacy flip prompts again.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;

use flic_core::events::AdvertisementPacket;
use flic_core::prelude::*;
use flic_core::types::BdAddr;

/// Window length when the operator doesn't specify one
pub const DEFAULT_PAIRING_WINDOW: Duration = Duration::from_secs(60);

/// What the adapter should do with one advertisement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertisementAction {
    /// Tell the operator how to make the button public
    PromptPrivate { bd_addr: BdAddr },
    /// Public button in range; start (or skip, if already known) a
    /// connection negotiation. `name` is the advertised friendly name,
    /// empty when the button didn't send one
    Negotiate { bd_addr: BdAddr, name: String },
    /// Already prompted for this private button in this window
    Ignore,
}

/// One active pairing window
#[derive(Debug)]
pub struct PairingSession {
    pub scan_id: u32,
    deadline: Instant,
    prompted_private: HashSet<BdAddr>,
}

impl PairingSession {
    pub fn new(scan_id: u32, window: Duration) -> Self {
        info!("Pairing window open for {:?} (scanner {})", window, scan_id);
        Self {
            scan_id,
            deadline: Instant::now() + window,
            prompted_private: HashSet::new(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Classify one advertisement against the window state
    pub fn on_advertisement(&mut self, packet: &AdvertisementPacket) -> AdvertisementAction {
        if packet.is_private {
            if self.prompted_private.insert(packet.bd_addr.clone()) {
                AdvertisementAction::PromptPrivate {
                    bd_addr: packet.bd_addr.clone(),
                }
            } else {
                AdvertisementAction::Ignore
            }
        } else {
            // Public again: a future privacy flip should prompt anew
            self.prompted_private.remove(&packet.bd_addr);
            AdvertisementAction::Negotiate {
                bd_addr: packet.bd_addr.clone(),
                name: packet.name.clone(),
            }
        }
    }
}

/// Operator instruction for a private button
pub fn private_prompt_message(bd_addr: &BdAddr) -> String {
    format!(
        "Flic button {} is private. Hold it down for 7 seconds to make it public, then try again.",
        bd_addr
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(addr: &str, is_private: bool) -> AdvertisementPacket {
        AdvertisementPacket {
            scan_id: 1,
            bd_addr: BdAddr::from(addr),
            name: String::new(),
            rssi: -60,
            is_private,
            already_verified: false,
        }
    }

    #[test]
    fn test_private_prompts_once_per_window() {
        let mut session = PairingSession::new(1, DEFAULT_PAIRING_WINDOW);

        let first = session.on_advertisement(&packet("aa:bb:cc:dd:ee:ff", true));
        assert!(matches!(first, AdvertisementAction::PromptPrivate { .. }));

        let second = session.on_advertisement(&packet("aa:bb:cc:dd:ee:ff", true));
        assert_eq!(second, AdvertisementAction::Ignore);
    }

    #[test]
    fn test_distinct_private_buttons_each_prompt() {
        let mut session = PairingSession::new(1, DEFAULT_PAIRING_WINDOW);

        let a = session.on_advertisement(&packet("aa:bb:cc:dd:ee:ff", true));
        let b = session.on_advertisement(&packet("11:22:33:44:55:66", true));
        assert!(matches!(a, AdvertisementAction::PromptPrivate { .. }));
        assert!(matches!(b, AdvertisementAction::PromptPrivate { .. }));
    }

    #[test]
    fn test_public_clears_private_suppression() {
        let mut session = PairingSession::new(1, DEFAULT_PAIRING_WINDOW);

        session.on_advertisement(&packet("aa:bb:cc:dd:ee:ff", true));
        let public = session.on_advertisement(&packet("aa:bb:cc:dd:ee:ff", false));
        assert!(matches!(public, AdvertisementAction::Negotiate { .. }));

        // Flipped back to private: prompt again
        let reprompt = session.on_advertisement(&packet("aa:bb:cc:dd:ee:ff", true));
        assert!(matches!(reprompt, AdvertisementAction::PromptPrivate { .. }));
    }

    #[test]
    fn test_public_always_negotiates() {
        let mut session = PairingSession::new(1, DEFAULT_PAIRING_WINDOW);
        for _ in 0..3 {
            let action = session.on_advertisement(&packet("aa:bb:cc:dd:ee:ff", false));
            assert!(matches!(action, AdvertisementAction::Negotiate { .. }));
        }
    }

    #[test]
    fn test_negotiate_carries_advertised_name() {
        let mut session = PairingSession::new(1, DEFAULT_PAIRING_WINDOW);

        let mut adv = packet("aa:bb:cc:dd:ee:ff", false);
        adv.name = "Bedroom Flic".to_string();

        let action = session.on_advertisement(&adv);
        assert_eq!(
            action,
            AdvertisementAction::Negotiate {
                bd_addr: BdAddr::from("aa:bb:cc:dd:ee:ff"),
                name: "Bedroom Flic".to_string(),
            }
        );
    }

    #[test]
    fn test_window_expiry() {
        let session = PairingSession::new(1, Duration::from_secs(60));
        assert!(!session.expired(Instant::now()));
        assert!(session.expired(session.deadline()));
        assert!(session.expired(session.deadline() + Duration::from_secs(1)));
    }

    #[test]
    fn test_private_prompt_message_names_the_button() {
        let msg = private_prompt_message(&BdAddr::from("aa:bb:cc:dd:ee:ff"));
        assert!(msg.contains("aa:bb:cc:dd:ee:ff"));
        assert!(msg.contains("7 seconds"));
    }
}
