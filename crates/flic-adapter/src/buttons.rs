//! Per-button state tracking

use flic_core::prelude::*;
use flic_core::types::{BdAddr, ButtonEvent, ClickType, PropertyValue};

use crate::gateway::DeviceDescription;

/// A button with a live connection channel.
///
/// Caches the last known battery and pushed values so the gateway only
/// hears about actual changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlicButton {
    pub bd_addr: BdAddr,
    pub name: String,
    pub conn_id: u32,
    pub listener_id: u32,
    /// Battery percent; reported lazily by the daemon, so start optimistic
    pub battery: u8,
    pub pushed: bool,
}

impl FlicButton {
    pub fn new(bd_addr: BdAddr, name: String, conn_id: u32, listener_id: u32) -> Self {
        Self {
            bd_addr,
            name,
            conn_id,
            listener_id,
            battery: 100,
            pushed: false,
        }
    }

    pub fn device_id(&self) -> String {
        self.bd_addr.device_id()
    }

    pub fn description(&self) -> DeviceDescription {
        DeviceDescription::button(&self.bd_addr, &self.name)
    }

    /// Update the cached battery value. Returns the new property value
    /// if it actually changed.
    pub fn update_battery(&mut self, percentage: u8) -> Option<PropertyValue> {
        if self.battery == percentage {
            return None;
        }
        self.battery = percentage;
        Some(PropertyValue::Battery(percentage))
    }

    /// Apply an up/down transition. Returns the new property value if
    /// the pushed flag actually flipped.
    pub fn update_pushed(&mut self, click_type: ClickType) -> Option<PropertyValue> {
        let pushed = click_type.as_pushed()?;
        if self.pushed == pushed {
            return None;
        }
        self.pushed = pushed;
        Some(PropertyValue::Pushed(pushed))
    }

    /// Classify a click report into the one discrete event it carries
    pub fn classify_click(&self, click_type: ClickType) -> Option<ButtonEvent> {
        ButtonEvent::from_click_type(click_type)
    }

    /// Reject property writes; every button property is read-only
    pub fn request_property_write(&self, name: &str) -> Result<()> {
        Err(Error::read_only_property(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button() -> FlicButton {
        FlicButton::new(BdAddr::from("aa:bb:cc:dd:ee:ff"), "Flic button aa:bb:cc:dd:ee:ff".to_string(), 1, 2)
    }

    #[test]
    fn test_new_button_defaults() {
        let b = button();
        assert_eq!(b.battery, 100);
        assert!(!b.pushed);
        assert_eq!(b.device_id(), "flic-aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_update_battery_reports_changes_only() {
        let mut b = button();
        assert_eq!(b.update_battery(100), None);
        assert_eq!(b.update_battery(85), Some(PropertyValue::Battery(85)));
        assert_eq!(b.update_battery(85), None);
    }

    #[test]
    fn test_update_pushed_tracks_transitions() {
        let mut b = button();
        assert_eq!(
            b.update_pushed(ClickType::ButtonDown),
            Some(PropertyValue::Pushed(true))
        );
        // Repeated down is not a change
        assert_eq!(b.update_pushed(ClickType::ButtonDown), None);
        assert_eq!(
            b.update_pushed(ClickType::ButtonUp),
            Some(PropertyValue::Pushed(false))
        );
    }

    #[test]
    fn test_update_pushed_ignores_click_classifications() {
        let mut b = button();
        assert_eq!(b.update_pushed(ClickType::ButtonSingleClick), None);
        assert_eq!(b.update_pushed(ClickType::ButtonHold), None);
    }

    #[test]
    fn test_classify_click() {
        let b = button();
        assert_eq!(b.classify_click(ClickType::ButtonHold), Some(ButtonEvent::Hold));
        assert_eq!(
            b.classify_click(ClickType::ButtonSingleClick),
            Some(ButtonEvent::SingleClick)
        );
        assert_eq!(
            b.classify_click(ClickType::ButtonDoubleClick),
            Some(ButtonEvent::DoubleClick)
        );
        // Raw transitions carry no discrete event
        assert_eq!(b.classify_click(ClickType::ButtonDown), None);
    }

    #[test]
    fn test_property_writes_rejected() {
        let b = button();
        assert!(matches!(
            b.request_property_write("battery"),
            Err(Error::ReadOnlyProperty { .. })
        ));
        assert!(matches!(
            b.request_property_write("pushed"),
            Err(Error::ReadOnlyProperty { .. })
        ));
    }
}
