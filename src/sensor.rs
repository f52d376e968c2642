// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor-type payload decoding
//!
//! The remainder of a data-log payload is sensor-type-specific:
//!
//! ```text
//! [TYPE: 2 LE] [STATE: 1] [DATA: per type]
//! ```
//!
//! Each supported type maps its data bytes to an engineering value and
//! unit. An unrecognized type is not an error; it passes through with
//! only the generic fields populated so the raw frame can still be
//! uploaded.

use crate::error::SensorDataError;
use std::fmt;

/// Sensor types with a known data layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SensorKind {
    /// Signed tenths of a degree Celsius
    Temperature = 2,
    /// Dry contact closure
    DryContact = 3,
    /// Open/closed switch
    OpenClosed = 9,
    /// Passive-infrared motion
    PirMotion = 23,
    /// Combined temperature and relative humidity
    Humidity = 43,
}

impl SensorKind {
    /// Look up a kind by its 2-byte wire type code
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            2 => Some(SensorKind::Temperature),
            3 => Some(SensorKind::DryContact),
            9 => Some(SensorKind::OpenClosed),
            23 => Some(SensorKind::PirMotion),
            43 => Some(SensorKind::Humidity),
            _ => None,
        }
    }

    /// The numeric wire code
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::DryContact => "dry contact",
            SensorKind::OpenClosed => "open closed",
            SensorKind::PirMotion => "PIR motion",
            SensorKind::Humidity => "humidity",
        }
    }
}

/// Unit and polarity preferences applied during decode
#[derive(Debug, Clone, Copy)]
pub struct UnitPrefs {
    /// Report temperatures in degrees Fahrenheit
    pub fahrenheit: bool,
    /// Invert the open/closed sense of contact sensors
    pub invert_contact: bool,
}

impl Default for UnitPrefs {
    fn default() -> Self {
        Self {
            fahrenheit: true,
            invert_contact: false,
        }
    }
}

/// A single decoded engineering value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    /// Continuous measurement
    Analog(f64),
    /// Two-state measurement
    Digital(bool),
}

/// An engineering value with its unit or state label
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub value: SampleValue,
    pub unit: &'static str,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            SampleValue::Analog(v) => write!(f, "{:.1} {}", v, self.unit),
            SampleValue::Digital(v) => write!(f, "{}({})", v, self.unit),
        }
    }
}

/// Decoded sensor-type-specific remainder of a data log
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Raw 2-byte type code, kept even for unrecognized types
    pub type_code: u16,
    /// Sensor state byte
    pub state: u8,
    /// Raw data bytes after the state byte
    pub data: Vec<u8>,
    /// Primary engineering value (`None` for unrecognized types)
    pub primary: Option<Measurement>,
    /// Secondary value, e.g. the temperature half of a humidity sensor
    pub secondary: Option<Measurement>,
}

impl SensorReading {
    /// The recognized kind, when the type code is in the table
    pub fn kind(&self) -> Option<SensorKind> {
        SensorKind::from_code(self.type_code)
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.primary, &self.secondary) {
            (Some(primary), Some(secondary)) => write!(f, "{} @ {}", primary, secondary),
            (Some(primary), None) => write!(f, "{}", primary),
            _ => write!(f, "type {} ({} data bytes)", self.type_code, self.data.len()),
        }
    }
}

/// Round to two decimal places
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn temperature(celsius: f64, prefs: &UnitPrefs) -> Measurement {
    if prefs.fahrenheit {
        Measurement {
            value: SampleValue::Analog(round2(celsius * 1.8 + 32.0)),
            unit: "F",
        }
    } else {
        Measurement {
            value: SampleValue::Analog(celsius),
            unit: "C",
        }
    }
}

fn contact(byte: u8, prefs: &UnitPrefs) -> Measurement {
    let mut closed = byte != 0;
    if prefs.invert_contact {
        closed = !closed;
    }
    Measurement {
        value: SampleValue::Digital(closed),
        unit: if closed { "closed" } else { "open" },
    }
}

fn motion(byte: u8) -> Measurement {
    let detected = byte != 0;
    Measurement {
        value: SampleValue::Digital(detected),
        unit: if detected {
            "motion detected"
        } else {
            "no motion"
        },
    }
}

fn expect_len(
    sensor_type: u16,
    data: &[u8],
    expected: usize,
    shown: &'static str,
) -> Result<(), SensorDataError> {
    if data.len() != expected {
        return Err(SensorDataError::LengthMismatch {
            sensor_type,
            expected: shown,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Decode the sensor-type-specific remainder of a data-log payload
///
/// `data` must start with the little-endian type code; the state byte
/// and per-type data follow.
pub fn decode(data: &[u8], prefs: &UnitPrefs) -> Result<SensorReading, SensorDataError> {
    if data.len() < 3 {
        return Err(SensorDataError::TooShort { len: data.len() });
    }

    let type_code = u16::from_le_bytes([data[0], data[1]]);
    let state = data[2];
    let rest = &data[3..];

    let (primary, secondary) = match SensorKind::from_code(type_code) {
        Some(SensorKind::Temperature) => {
            expect_len(type_code, rest, 2, "2")?;
            let celsius = f64::from(i16::from_le_bytes([rest[0], rest[1]])) / 10.0;
            (Some(temperature(celsius, prefs)), None)
        }
        Some(SensorKind::DryContact) => {
            // Spec says 2 bytes, but hardware often sends only 1.
            if rest.len() != 1 && rest.len() != 2 {
                return Err(SensorDataError::LengthMismatch {
                    sensor_type: type_code,
                    expected: "1 or 2",
                    actual: rest.len(),
                });
            }
            (Some(contact(rest[0], prefs)), None)
        }
        Some(SensorKind::OpenClosed) => {
            expect_len(type_code, rest, 2, "2")?;
            // Second byte is always zero.
            (Some(contact(rest[0], prefs)), None)
        }
        Some(SensorKind::PirMotion) => {
            expect_len(type_code, rest, 1, "1")?;
            (Some(motion(rest[0])), None)
        }
        Some(SensorKind::Humidity) => {
            expect_len(type_code, rest, 4, "4")?;
            let celsius = f64::from(i16::from_le_bytes([rest[0], rest[1]])) / 100.0;
            let humidity = f64::from(i16::from_le_bytes([rest[2], rest[3]])) / 100.0;
            (
                Some(Measurement {
                    value: SampleValue::Analog(humidity),
                    unit: "%RH",
                }),
                Some(temperature(celsius, prefs)),
            )
        }
        None => (None, None),
    };

    Ok(SensorReading {
        type_code,
        state,
        data: rest.to_vec(),
        primary,
        secondary,
    })
}
