use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Clients
// ============================================================================

/// Identifier of a subsystem that holds (or wants) a claim on the EVSE.
///
/// The upper 16 bits carry the vendor, the lower 16 bits a vendor specific
/// client code. [`EvseClient::NULL`] is the all-ones sentinel used for "no
/// client" and, in the manager's getters, for "the resolved value".
///
/// # Examples
///
/// ```
/// use openevse_core::EvseClient;
///
/// let divert = EvseClient::new(EvseClient::VENDOR_OPENEVSE, 0x0002);
/// assert_eq!(divert, EvseClient::OPENEVSE_DIVERT);
/// assert_eq!(divert.vendor(), 0x0001);
/// assert_eq!(divert.code(), 0x0002);
/// assert_eq!(divert.to_string(), "0x00010002");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvseClient(u32);

impl EvseClient {
    const VENDOR_SHIFT: u32 = 16;

    pub const VENDOR_OPENEVSE: u16 = 0x0001;
    pub const VENDOR_OPEN_ENERGY_MONITOR: u16 = 0x0002;
    pub const VENDOR_BIG_JUNGLE: u16 = 0x0003;
    pub const VENDOR_UNREGISTERED: u16 = 0xFFFE;
    pub const VENDOR_RESERVED: u16 = 0xFFFF;

    /// No client. Also means "effective value" when passed to a getter.
    pub const NULL: EvseClient = EvseClient(u32::MAX);

    pub const OPENEVSE_MANUAL: EvseClient = EvseClient::new(Self::VENDOR_OPENEVSE, 0x0001);
    pub const OPENEVSE_DIVERT: EvseClient = EvseClient::new(Self::VENDOR_OPENEVSE, 0x0002);
    pub const OPENEVSE_BOOST: EvseClient = EvseClient::new(Self::VENDOR_OPENEVSE, 0x0003);
    pub const OPENEVSE_SCHEDULE: EvseClient = EvseClient::new(Self::VENDOR_OPENEVSE, 0x0004);
    pub const OPENEVSE_LIMIT: EvseClient = EvseClient::new(Self::VENDOR_OPENEVSE, 0x0006);
    pub const OPENEVSE_ERROR: EvseClient = EvseClient::new(Self::VENDOR_OPENEVSE, 0x0007);
    pub const OPENEVSE_OHM: EvseClient = EvseClient::new(Self::VENDOR_OPENEVSE, 0x0008);
    pub const OPEN_ENERGY_MONITOR_SHAPER: EvseClient =
        EvseClient::new(Self::VENDOR_OPEN_ENERGY_MONITOR, 0x0001);

    /// Build a client id from its vendor and client code.
    #[must_use]
    pub const fn new(vendor: u16, code: u16) -> Self {
        EvseClient(((vendor as u32) << Self::VENDOR_SHIFT) | code as u32)
    }

    /// Wrap a raw 32-bit id.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        EvseClient(raw)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn vendor(self) -> u16 {
        (self.0 >> Self::VENDOR_SHIFT) as u16
    }

    #[must_use]
    pub const fn code(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Returns `true` for the [`EvseClient::NULL`] sentinel.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Display for EvseClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl std::str::FromStr for EvseClient {
    type Err = Error;

    /// Parse a client id written either in decimal or as `0x`-prefixed hex.
    fn from_str(s: &str) -> Result<Self> {
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse(),
        };
        parsed
            .map(EvseClient)
            .map_err(|_| Error::InvalidClient(s.to_string()))
    }
}

// ============================================================================
// Priorities
// ============================================================================

/// Standard claim priorities. Higher wins.
pub mod priority {
    pub const DEFAULT: i32 = 10;
    pub const DIVERT: i32 = 50;
    pub const TIMER: i32 = 100;
    pub const BOOST: i32 = 200;
    pub const MANUAL: i32 = 1000;
    pub const LIMIT: i32 = 1100;
    pub const OHM: i32 = 1500;
    pub const ERROR: i32 = 10000;
}

// ============================================================================
// Requested State
// ============================================================================

/// Requested operating state of the EVSE.
///
/// `None` means "no opinion": a claim carrying it never influences the
/// resolved state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvseState {
    #[default]
    None,
    Active,
    Disabled,
}

impl EvseState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EvseState::None => "none",
            EvseState::Active => "active",
            EvseState::Disabled => "disabled",
        }
    }

    /// Returns `true` unless this is [`EvseState::None`].
    #[must_use]
    pub fn has_opinion(self) -> bool {
        !matches!(self, EvseState::None)
    }
}

impl fmt::Display for EvseState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EvseState {
    type Err = Error;

    /// Only the first character is significant: `a…` is active, `d…` is
    /// disabled. Matching is case sensitive and `none` is not accepted.
    fn from_str(s: &str) -> Result<Self> {
        match s.as_bytes().first() {
            Some(b'a') => Ok(EvseState::Active),
            Some(b'd') => Ok(EvseState::Disabled),
            _ => Err(Error::InvalidState(s.to_string())),
        }
    }
}

// ============================================================================
// Requested Properties
// ============================================================================

/// Operating properties a client asks for.
///
/// Numeric fields are optional; `None` leaves the decision to other claims
/// or to the hardware configuration. Unset fields are omitted when
/// serialized.
///
/// # Examples
///
/// ```
/// use openevse_core::{EvseProperties, EvseState};
///
/// let props = EvseProperties::new(EvseState::Active).with_charge_current(10);
/// assert_eq!(props.state, EvseState::Active);
/// assert_eq!(props.charge_current, Some(10));
/// assert_eq!(props.max_current, None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvseProperties {
    /// Requested state; `None` is no opinion.
    #[serde(default, skip_serializing_if = "is_no_opinion")]
    pub state: EvseState,

    /// Requested pilot current in amps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_current: Option<u32>,

    /// Hard ceiling on the pilot current in amps. Applies irrespective of
    /// priority but never raises the hardware's configured maximum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_current: Option<u32>,

    /// Energy to transfer in this session (Wh), after which the owning client
    /// moves its claim to `Disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_limit: Option<u32>,

    /// Session duration limit (seconds), after which the owning client moves
    /// its claim to `Disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,

    /// Release the claim once the charging session ends.
    #[serde(default)]
    pub auto_release: bool,
}

fn is_no_opinion(state: &EvseState) -> bool {
    !state.has_opinion()
}

impl EvseProperties {
    #[must_use]
    pub fn new(state: EvseState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_charge_current(mut self, amps: u32) -> Self {
        self.charge_current = Some(amps);
        self
    }

    #[must_use]
    pub fn with_max_current(mut self, amps: u32) -> Self {
        self.max_current = Some(amps);
        self
    }

    #[must_use]
    pub fn with_energy_limit(mut self, wh: u32) -> Self {
        self.energy_limit = Some(wh);
        self
    }

    #[must_use]
    pub fn with_time_limit(mut self, seconds: u32) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_auto_release(mut self, auto_release: bool) -> Self {
        self.auto_release = auto_release;
        self
    }

    /// Reset every field to "unset".
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl From<EvseState> for EvseProperties {
    fn from(state: EvseState) -> Self {
        EvseProperties::new(state)
    }
}

// ============================================================================
// Controller State
// ============================================================================

/// State byte reported by the charging controller (`$GS`, `$AT`, `$ST`).
///
/// Unknown codes are kept as-is so that newer firmware does not break
/// parsing; the predicates simply return `false` for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareState(u8);

impl HardwareState {
    pub const STARTING: HardwareState = HardwareState(0);
    pub const NOT_CONNECTED: HardwareState = HardwareState(1);
    pub const CONNECTED: HardwareState = HardwareState(2);
    pub const CHARGING: HardwareState = HardwareState(3);
    pub const VENT_REQUIRED: HardwareState = HardwareState(4);
    pub const DIODE_CHECK_FAILED: HardwareState = HardwareState(5);
    pub const GFI_FAULT: HardwareState = HardwareState(6);
    pub const NO_EARTH_GROUND: HardwareState = HardwareState(7);
    pub const STUCK_RELAY: HardwareState = HardwareState(8);
    pub const GFI_SELF_TEST_FAILED: HardwareState = HardwareState(9);
    pub const OVER_TEMPERATURE: HardwareState = HardwareState(10);
    pub const OVER_CURRENT: HardwareState = HardwareState(11);
    pub const SLEEPING: HardwareState = HardwareState(254);
    pub const DISABLED: HardwareState = HardwareState(255);

    #[must_use]
    pub const fn from_u8(code: u8) -> Self {
        HardwareState(code)
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Parse a state code as sent on the wire, in the given radix.
    ///
    /// # Errors
    /// Returns `Error::InvalidHardwareState` if the text is not a number that
    /// fits in a byte.
    pub fn parse_radix(text: &str, radix: u32) -> Result<Self> {
        u8::from_str_radix(text, radix)
            .map(HardwareState)
            .map_err(|_| Error::InvalidHardwareState(text.to_string()))
    }

    /// Ready or charging.
    #[must_use]
    pub fn is_active(self) -> bool {
        (Self::NOT_CONNECTED.0..=Self::CHARGING.0).contains(&self.0)
    }

    /// Sleeping or disabled.
    #[must_use]
    pub fn is_disabled(self) -> bool {
        self.0 >= Self::SLEEPING.0
    }

    #[must_use]
    pub fn is_charging(self) -> bool {
        self == Self::CHARGING
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        (Self::VENT_REQUIRED.0..=Self::OVER_CURRENT.0).contains(&self.0)
    }

    /// The requested-state view of this hardware state.
    #[must_use]
    pub fn requested_state(self) -> EvseState {
        if self.is_disabled() {
            EvseState::Disabled
        } else {
            EvseState::Active
        }
    }
}

impl fmt::Display for HardwareState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            Self::STARTING => "starting",
            Self::NOT_CONNECTED => "not connected",
            Self::CONNECTED => "connected",
            Self::CHARGING => "charging",
            Self::VENT_REQUIRED => "vent required",
            Self::DIODE_CHECK_FAILED => "diode check failed",
            Self::GFI_FAULT => "gfi fault",
            Self::NO_EARTH_GROUND => "no earth ground",
            Self::STUCK_RELAY => "stuck relay",
            Self::GFI_SELF_TEST_FAILED => "gfi self test failed",
            Self::OVER_TEMPERATURE => "over temperature",
            Self::OVER_CURRENT => "over current",
            Self::SLEEPING => "sleeping",
            Self::DISABLED => "disabled",
            _ => return write!(f, "unknown ({})", self.0),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_client_layout() {
        let client = EvseClient::OPEN_ENERGY_MONITOR_SHAPER;
        assert_eq!(client.as_u32(), 0x0002_0001);
        assert_eq!(client.vendor(), EvseClient::VENDOR_OPEN_ENERGY_MONITOR);
        assert_eq!(client.code(), 1);
        assert!(!client.is_null());
        assert!(EvseClient::NULL.is_null());
    }

    #[rstest]
    #[case("0x00010002", EvseClient::OPENEVSE_DIVERT)]
    #[case("65537", EvseClient::OPENEVSE_MANUAL)]
    #[case("4294967295", EvseClient::NULL)]
    fn test_client_parse(#[case] input: &str, #[case] expected: EvseClient) {
        assert_eq!(input.parse::<EvseClient>().unwrap(), expected);
    }

    #[test]
    fn test_client_parse_invalid() {
        assert!("divert".parse::<EvseClient>().is_err());
        assert!("0xZZ".parse::<EvseClient>().is_err());
    }

    #[rstest]
    #[case("active", EvseState::Active)]
    #[case("a", EvseState::Active)]
    #[case("activate", EvseState::Active)]
    #[case("disabled", EvseState::Disabled)]
    #[case("d", EvseState::Disabled)]
    fn test_state_from_str(#[case] input: &str, #[case] expected: EvseState) {
        assert_eq!(input.parse::<EvseState>().unwrap(), expected);
    }

    #[rstest]
    #[case("none")]
    #[case("")]
    #[case("Active")]
    #[case("DISABLED")]
    #[case("123")]
    fn test_state_from_str_invalid(#[case] input: &str) {
        assert!(input.parse::<EvseState>().is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(EvseState::Active.to_string(), "active");
        assert_eq!(EvseState::Disabled.to_string(), "disabled");
        assert_eq!(EvseState::None.to_string(), "none");
    }

    #[test]
    fn test_properties_default_is_unset() {
        let props = EvseProperties::default();
        assert_eq!(props.state, EvseState::None);
        assert_eq!(props.charge_current, None);
        assert_eq!(props.max_current, None);
        assert_eq!(props.energy_limit, None);
        assert_eq!(props.time_limit, None);
        assert!(!props.auto_release);
    }

    #[test]
    fn test_properties_clear() {
        let mut props = EvseProperties::new(EvseState::Disabled)
            .with_max_current(16)
            .with_auto_release(true);
        props.clear();
        assert_eq!(props, EvseProperties::default());
    }

    #[test]
    fn test_properties_serialize_omits_unset() {
        let props = EvseProperties::new(EvseState::Active).with_charge_current(10);
        let json = serde_json::to_value(props).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "active", "charge_current": 10, "auto_release": false})
        );

        let none = serde_json::to_value(EvseProperties::default()).unwrap();
        assert_eq!(none, serde_json::json!({"auto_release": false}));
    }

    #[test]
    fn test_properties_deserialize_partial() {
        let props: EvseProperties =
            serde_json::from_str(r#"{"state":"disabled","max_current":16}"#).unwrap();
        assert_eq!(props.state, EvseState::Disabled);
        assert_eq!(props.max_current, Some(16));
        assert_eq!(props.charge_current, None);
    }

    #[rstest]
    #[case(HardwareState::NOT_CONNECTED, true, false, false)]
    #[case(HardwareState::CHARGING, true, false, false)]
    #[case(HardwareState::GFI_FAULT, false, false, true)]
    #[case(HardwareState::SLEEPING, false, true, false)]
    #[case(HardwareState::DISABLED, false, true, false)]
    #[case(HardwareState::STARTING, false, false, false)]
    fn test_hardware_state_predicates(
        #[case] state: HardwareState,
        #[case] active: bool,
        #[case] disabled: bool,
        #[case] error: bool,
    ) {
        assert_eq!(state.is_active(), active);
        assert_eq!(state.is_disabled(), disabled);
        assert_eq!(state.is_error(), error);
    }

    #[test]
    fn test_hardware_state_parse() {
        assert_eq!(
            HardwareState::parse_radix("fe", 16).unwrap(),
            HardwareState::SLEEPING
        );
        assert_eq!(
            HardwareState::parse_radix("3", 10).unwrap(),
            HardwareState::CHARGING
        );
        assert!(HardwareState::parse_radix("zz", 16).is_err());
        assert_eq!(HardwareState::from_u8(42).to_string(), "unknown (42)");
    }
}
