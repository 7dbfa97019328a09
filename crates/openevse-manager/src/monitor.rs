//! Decoding of controller replies and unsolicited frames.
//!
//! The manager only deals in the typed values below; token positions and
//! number bases stay in this module.

use openevse_core::constants::{
    PROTOCOL_EXTENDED_STATUS, TEMPERATURE_NOT_INSTALLED, VFLAG_EV_CONNECTED, encode_version,
};
use openevse_core::{Error, HardwareState, Result};
use openevse_rapi::RapiResponse;
use serde::Serialize;

/// Parse a `major.minor.patch` protocol string.
///
/// ```
/// use openevse_manager::monitor::parse_protocol_version;
///
/// assert_eq!(parse_protocol_version("5.2.1").unwrap(), 5201);
/// assert!(parse_protocol_version("5.2").is_err());
/// ```
pub fn parse_protocol_version(text: &str) -> Result<u32> {
    let mut parts = text.split('.');
    let mut next = || -> Result<u32> {
        parts
            .next()
            .and_then(|part| part.parse::<u32>().ok())
            .ok_or_else(|| Error::InvalidVersion(text.to_string()))
    };
    let (major, minor, patch) = (next()?, next()?, next()?);
    if parts.next().is_some() {
        return Err(Error::InvalidVersion(text.to_string()));
    }
    Ok(encode_version(major, minor, patch))
}

/// Firmware identification from `$GV`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareInfo {
    pub firmware: String,
    pub protocol: String,
    /// `protocol` encoded for comparison.
    pub protocol_version: u32,
}

impl FirmwareInfo {
    /// Decode `$OK <firmware> <protocol>`.
    pub fn parse(response: &RapiResponse) -> Result<Self> {
        let (Some(firmware), Some(protocol)) = (response.token(1), response.token(2)) else {
            return Err(Error::malformed_reply("$GV", response.raw()));
        };
        Ok(Self {
            firmware: firmware.to_string(),
            protocol: protocol.to_string(),
            protocol_version: parse_protocol_version(protocol)?,
        })
    }

    /// Whether `$GS` replies carry hex states, pilot state and vflags.
    pub fn has_extended_status(&self) -> bool {
        self.protocol_version >= PROTOCOL_EXTENDED_STATUS
    }
}

/// Current limits from `$GC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrentCapacity {
    /// Lowest pilot the hardware accepts.
    pub min_current: u32,
    /// Highest pilot the hardware accepts.
    pub max_current: u32,
    /// Pilot in force when queried. Older firmware does not report it.
    pub pilot: Option<u32>,
    /// Maximum configured on the controller itself.
    pub configured_max: Option<u32>,
}

impl CurrentCapacity {
    /// Decode `$OK <min> <max> [<pilot> [<configured max>]]`.
    pub fn parse(response: &RapiResponse) -> Result<Self> {
        let (Some(min_current), Some(max_current)) = (response.token_u32(1), response.token_u32(2))
        else {
            return Err(Error::malformed_reply("$GC", response.raw()));
        };
        if min_current > max_current {
            return Err(Error::malformed_reply("$GC", response.raw()));
        }
        Ok(Self {
            min_current,
            max_current,
            pilot: response.token_u32(3),
            configured_max: response.token_u32(4),
        })
    }

    /// The ceiling the pilot may not exceed.
    pub fn ceiling(&self) -> u32 {
        self.configured_max
            .map_or(self.max_current, |configured| configured.min(self.max_current))
    }
}

/// What the controller reports about itself and the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvseStatus {
    pub evse_state: HardwareState,
    /// J1772 pilot state. Not reported by older firmware.
    pub pilot_state: Option<HardwareState>,
    pub vflags: u32,
}

impl EvseStatus {
    /// Status for firmware that only reports the state byte. The vehicle is
    /// taken as connected while the controller says connected or charging.
    pub fn from_state(evse_state: HardwareState) -> Self {
        let vflags = if matches!(evse_state, HardwareState::CONNECTED | HardwareState::CHARGING) {
            VFLAG_EV_CONNECTED
        } else {
            0
        };
        Self {
            evse_state,
            pilot_state: None,
            vflags,
        }
    }

    pub fn is_vehicle_connected(&self) -> bool {
        self.vflags & VFLAG_EV_CONNECTED != 0
    }

    pub fn is_charging(&self) -> bool {
        self.evse_state.is_charging()
    }

    pub fn is_active(&self) -> bool {
        self.evse_state.is_active()
    }

    pub fn is_error(&self) -> bool {
        self.evse_state.is_error()
    }
}

/// A decoded `$GS` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: EvseStatus,
    /// Seconds into the current charging session.
    pub session_elapsed: u32,
}

impl StatusReport {
    /// Decode `$GS` for the given firmware.
    ///
    /// Extended: `$OK <evse hex> <elapsed> <pilot hex> <vflags hex>`.
    /// Older: `$OK <evse> <elapsed>`.
    pub fn parse(response: &RapiResponse, firmware: &FirmwareInfo) -> Result<Self> {
        let malformed = || Error::malformed_reply("$GS", response.raw());
        let elapsed = response.token_u32(2).ok_or_else(malformed)?;

        if firmware.has_extended_status() {
            let evse = response.token(1).ok_or_else(malformed)?;
            let pilot = response.token(3).ok_or_else(malformed)?;
            let vflags = response.token_hex(4).ok_or_else(malformed)?;
            Ok(Self {
                status: EvseStatus {
                    evse_state: HardwareState::parse_radix(evse, 16)?,
                    pilot_state: Some(HardwareState::parse_radix(pilot, 16)?),
                    vflags,
                },
                session_elapsed: elapsed,
            })
        } else {
            let evse = response.token(1).ok_or_else(malformed)?;
            Ok(Self {
                status: EvseStatus::from_state(HardwareState::parse_radix(evse, 10)?),
                session_elapsed: elapsed,
            })
        }
    }
}

/// Live charge current and voltage from `$GG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChargeReading {
    pub milliamps: u32,
    /// `None` when the controller has no voltage measurement.
    pub millivolts: Option<u32>,
}

impl ChargeReading {
    /// Decode `$OK <milliamps> <millivolts>`; a negative voltage means not
    /// measured.
    pub fn parse(response: &RapiResponse) -> Result<Self> {
        let malformed = || Error::malformed_reply("$GG", response.raw());
        let milliamps = response.token_u32(1).ok_or_else(malformed)?;
        let millivolts = response.token_i32(2).ok_or_else(malformed)?;
        Ok(Self {
            milliamps,
            millivolts: u32::try_from(millivolts).ok(),
        })
    }

    pub fn amps(&self) -> f64 {
        f64::from(self.milliamps) / 1000.0
    }

    pub fn volts(&self) -> Option<f64> {
        self.millivolts.map(|mv| f64::from(mv) / 1000.0)
    }
}

/// Sensor temperatures from `$GP`, in tenths of a degree Celsius.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Temperatures {
    pub ds3231: Option<i32>,
    pub mcp9808: Option<i32>,
    pub tmp007: Option<i32>,
}

impl Temperatures {
    /// Decode `$OK <ds3231> <mcp9808> <tmp007>`. Sensors that are not
    /// fitted report -2560.
    pub fn parse(response: &RapiResponse) -> Result<Self> {
        let malformed = || Error::malformed_reply("$GP", response.raw());
        let mut sensors = [None; 3];
        for (index, sensor) in sensors.iter_mut().enumerate() {
            let value = response.token_i32(index + 1).ok_or_else(malformed)?;
            *sensor = (value != TEMPERATURE_NOT_INSTALLED).then_some(value);
        }
        let [ds3231, mcp9808, tmp007] = sensors;
        Ok(Self {
            ds3231,
            mcp9808,
            tmp007,
        })
    }

    /// The reading used for the charger temperature: the first fitted
    /// sensor.
    pub fn monitor(&self) -> Option<i32> {
        self.ds3231.or(self.mcp9808).or(self.tmp007)
    }

    pub fn max(&self) -> Option<i32> {
        [self.ds3231, self.mcp9808, self.tmp007].into_iter().flatten().max()
    }
}

/// An unsolicited frame, decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AsyncEvent {
    /// `$AT <evse hex> <pilot hex> <capacity> <vflags hex>`.
    Transition { status: EvseStatus, current_capacity: u32 },
    /// `$ST <evse hex>`.
    State(HardwareState),
    /// `$AB <post code> <firmware>`: the controller restarted.
    Boot { post_code: String, firmware: String },
    /// `$WF <mode>`: the controller asks for a WiFi mode change.
    WifiRequest { mode: String },
    /// Any other `$A..` frame.
    Other(String),
}

impl AsyncEvent {
    pub fn parse(response: &RapiResponse) -> Result<Self> {
        let malformed = || Error::malformed_reply("async", response.raw());
        let head = response.token(0).ok_or_else(malformed)?;

        match head {
            "$AT" => {
                let evse = response.token(1).ok_or_else(malformed)?;
                let pilot = response.token(2).ok_or_else(malformed)?;
                let capacity = response.token_u32(3).ok_or_else(malformed)?;
                let vflags = response.token_hex(4).ok_or_else(malformed)?;
                Ok(AsyncEvent::Transition {
                    status: EvseStatus {
                        evse_state: HardwareState::parse_radix(evse, 16)?,
                        pilot_state: Some(HardwareState::parse_radix(pilot, 16)?),
                        vflags,
                    },
                    current_capacity: capacity,
                })
            }
            "$ST" => {
                let evse = response.token(1).ok_or_else(malformed)?;
                Ok(AsyncEvent::State(HardwareState::parse_radix(evse, 16)?))
            }
            "$AB" => Ok(AsyncEvent::Boot {
                post_code: response.token(1).ok_or_else(malformed)?.to_string(),
                firmware: response.token(2).unwrap_or_default().to_string(),
            }),
            "$WF" => Ok(AsyncEvent::WifiRequest {
                mode: response.token(1).ok_or_else(malformed)?.to_string(),
            }),
            _ => Ok(AsyncEvent::Other(response.raw().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openevse_core::constants::VFLAG_CHARGING_ON;
    use rstest::rstest;

    fn reply(text: &str) -> RapiResponse {
        RapiResponse::from_tokens(text.split(' '))
    }

    fn firmware(protocol: &str) -> FirmwareInfo {
        FirmwareInfo::parse(&reply(&format!("$OK 8.2.2 {}", protocol))).unwrap()
    }

    #[rstest]
    #[case("5.0.0", Ok(5000))]
    #[case("4.9.12", Ok(4912))]
    #[case("5.x.1", Err(()))]
    #[case("5.0.0.1", Err(()))]
    #[case("", Err(()))]
    fn test_parse_protocol_version(#[case] text: &str, #[case] expected: std::result::Result<u32, ()>) {
        assert_eq!(parse_protocol_version(text).map_err(|_| ()), expected);
    }

    #[test]
    fn test_firmware_info() {
        let info = firmware("5.2.1");
        assert_eq!(info.firmware, "8.2.2");
        assert_eq!(info.protocol_version, 5201);
        assert!(info.has_extended_status());
        assert!(!firmware("4.0.1").has_extended_status());

        assert!(matches!(
            FirmwareInfo::parse(&reply("$OK 8.2.2")),
            Err(Error::MalformedReply { .. })
        ));
    }

    #[test]
    fn test_current_capacity() {
        let capacity = CurrentCapacity::parse(&reply("$OK 6 80 32 40")).unwrap();
        assert_eq!(capacity.min_current, 6);
        assert_eq!(capacity.max_current, 80);
        assert_eq!(capacity.pilot, Some(32));
        assert_eq!(capacity.ceiling(), 40);

        let legacy = CurrentCapacity::parse(&reply("$OK 6 32")).unwrap();
        assert_eq!(legacy.pilot, None);
        assert_eq!(legacy.ceiling(), 32);

        assert!(CurrentCapacity::parse(&reply("$OK 40 32")).is_err());
        assert!(CurrentCapacity::parse(&reply("$OK")).is_err());
    }

    #[test]
    fn test_extended_status() {
        let report = StatusReport::parse(&reply("$OK 03 120 03 0140"), &firmware("5.0.0")).unwrap();
        assert_eq!(report.status.evse_state, HardwareState::CHARGING);
        assert_eq!(report.status.pilot_state, Some(HardwareState::CHARGING));
        assert_eq!(report.status.vflags, VFLAG_EV_CONNECTED | VFLAG_CHARGING_ON);
        assert_eq!(report.session_elapsed, 120);
        assert!(report.status.is_vehicle_connected());
        assert!(report.status.is_charging());

        let sleeping = StatusReport::parse(&reply("$OK fe 0 01 0200"), &firmware("5.0.0")).unwrap();
        assert_eq!(sleeping.status.evse_state, HardwareState::SLEEPING);
        assert!(!sleeping.status.is_vehicle_connected());
    }

    #[test]
    fn test_legacy_status() {
        let report = StatusReport::parse(&reply("$OK 2 45"), &firmware("4.0.1")).unwrap();
        assert_eq!(report.status.evse_state, HardwareState::CONNECTED);
        assert_eq!(report.status.pilot_state, None);
        assert!(report.status.is_vehicle_connected());
        assert_eq!(report.session_elapsed, 45);

        let disabled = StatusReport::parse(&reply("$OK 255 0"), &firmware("4.0.1")).unwrap();
        assert_eq!(disabled.status.evse_state, HardwareState::DISABLED);
        assert!(!disabled.status.is_vehicle_connected());
    }

    #[rstest]
    #[case("$OK 03 120 03", "5.0.0")]
    #[case("$OK zz 120 03 0100", "5.0.0")]
    #[case("$OK 3", "4.0.1")]
    fn test_malformed_status(#[case] text: &str, #[case] protocol: &str) {
        assert!(StatusReport::parse(&reply(text), &firmware(protocol)).is_err());
    }

    #[test]
    fn test_async_events() {
        let event = AsyncEvent::parse(&reply("$AT 02 02 32 0100")).unwrap();
        assert_eq!(
            event,
            AsyncEvent::Transition {
                status: EvseStatus {
                    evse_state: HardwareState::CONNECTED,
                    pilot_state: Some(HardwareState::CONNECTED),
                    vflags: VFLAG_EV_CONNECTED,
                },
                current_capacity: 32,
            }
        );

        assert_eq!(
            AsyncEvent::parse(&reply("$ST fe")).unwrap(),
            AsyncEvent::State(HardwareState::SLEEPING)
        );
        assert_eq!(
            AsyncEvent::parse(&reply("$AB 00 8.2.2")).unwrap(),
            AsyncEvent::Boot {
                post_code: "00".to_string(),
                firmware: "8.2.2".to_string()
            }
        );
        assert_eq!(
            AsyncEvent::parse(&reply("$WF 2")).unwrap(),
            AsyncEvent::WifiRequest {
                mode: "2".to_string()
            }
        );
        assert!(matches!(
            AsyncEvent::parse(&reply("$AN 1")).unwrap(),
            AsyncEvent::Other(_)
        ));
        assert!(AsyncEvent::parse(&reply("$AT 02")).is_err());
    }

    #[rstest]
    #[case("$OK 15800 240000", 15800, Some(240_000))]
    #[case("$OK 0 -1", 0, None)]
    fn test_charge_reading(#[case] text: &str, #[case] milliamps: u32, #[case] millivolts: Option<u32>) {
        let reading = ChargeReading::parse(&reply(text)).unwrap();
        assert_eq!(reading.milliamps, milliamps);
        assert_eq!(reading.millivolts, millivolts);
    }

    #[test]
    fn test_charge_reading_units() {
        let reading = ChargeReading::parse(&reply("$OK 15500 230000")).unwrap();
        assert_eq!(reading.amps(), 15.5);
        assert_eq!(reading.volts(), Some(230.0));
        assert!(ChargeReading::parse(&reply("$OK 15500")).is_err());
        assert!(ChargeReading::parse(&reply("$OK -3 230000")).is_err());
    }

    #[test]
    fn test_temperatures() {
        let temps = Temperatures::parse(&reply("$OK -2560 312 287")).unwrap();
        assert_eq!(temps.ds3231, None);
        assert_eq!(temps.mcp9808, Some(312));
        assert_eq!(temps.monitor(), Some(312));
        assert_eq!(temps.max(), Some(312));

        let none = Temperatures::parse(&reply("$OK -2560 -2560 -2560")).unwrap();
        assert_eq!(none.monitor(), None);
        assert_eq!(none.max(), None);

        assert!(Temperatures::parse(&reply("$OK 250 250")).is_err());
    }
}
