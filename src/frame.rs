// Sensorlink - Serial sensor concentrator to cloud telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Wire frame codec and CRC-8
//!
//! Every message on the serial link is one frame:
//!
//! ```text
//! [0xC5] [LEN: 1] [OPTIONS: 1] [COMMAND: 1] [PAYLOAD: LEN-2] [CRC: 1]
//! ```
//!
//! `LEN` counts the bytes from `OPTIONS` through the end of `PAYLOAD`,
//! so a complete frame is `LEN + 3` bytes. The CRC covers that same
//! `OPTIONS..PAYLOAD` region; the start marker, length byte, and the CRC
//! itself are excluded. The CRC byte is optional on a frame under
//! construction, which is why [`validate`] accepts both forms.

use crate::error::FrameError;
use crc::{Algorithm, Crc};

/// Start delimiter of every frame
pub const START_DELIMITER: u8 = 0xC5;

/// Smallest possible frame: delimiter, length, options, command, CRC
pub const MIN_FRAME_LEN: usize = 5;

/// Offset of the options byte (start of the CRC region)
pub const OFFSET_OPTIONS: usize = 2;

/// Offset of the command byte
pub const OFFSET_COMMAND: usize = 3;

/// Offset of the first payload byte
pub const OFFSET_PAYLOAD: usize = 4;

/// CRC-8 used by the concentrator: polynomial 0x97, zero init,
/// unreflected, no output xor.
const CRC_8_CONCENTRATOR: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x97,
    init: 0x00,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0x00,
    residue: 0x00,
};

const FRAME_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_CONCENTRATOR);

/// Compute the frame CRC over the `OPTIONS..PAYLOAD` region
pub fn compute_crc(region: &[u8]) -> u8 {
    FRAME_CRC.checksum(region)
}

/// Confirm the basic wire form of a frame
///
/// Checks the minimum size, the start delimiter, and that the total size
/// matches the length byte with or without a trailing CRC. Returns the
/// expected frame size *without* the CRC byte.
pub fn validate(bytes: &[u8]) -> Result<usize, FrameError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort { len: bytes.len() });
    }
    if bytes[0] != START_DELIMITER {
        return Err(FrameError::BadStartMarker { byte: bytes[0] });
    }

    let expected = bytes[1] as usize + 2;
    if bytes.len() != expected && bytes.len() != expected + 1 {
        return Err(FrameError::LengthMismatch {
            len: bytes.len(),
            expected,
        });
    }

    Ok(expected)
}

/// Append a freshly computed CRC, discarding any stale trailing CRC
///
/// Idempotent: `append_crc(append_crc(f)) == append_crc(f)`.
pub fn append_crc(bytes: &[u8]) -> Result<Vec<u8>, FrameError> {
    let expected = validate(bytes)?;

    // Any old (or unknown) byte in the CRC position is discarded.
    let mut out = bytes[..expected].to_vec();
    out.push(compute_crc(&out[OFFSET_OPTIONS..]));
    Ok(out)
}

/// Verify the trailing CRC of a complete frame
///
/// Distinguishes a missing CRC byte ([`FrameError::CrcMissing`]) from a
/// wrong one ([`FrameError::CrcMismatch`]).
pub fn verify_crc(bytes: &[u8]) -> Result<(), FrameError> {
    let expected = validate(bytes)?;

    if bytes.len() != expected + 1 {
        return Err(FrameError::CrcMissing);
    }

    let crc = compute_crc(&bytes[OFFSET_OPTIONS..expected]);
    if crc != bytes[expected] {
        return Err(FrameError::CrcMismatch {
            expected: crc,
            actual: bytes[expected],
        });
    }

    Ok(())
}

/// Wrap a command byte plus payload into a complete frame
///
/// Prepends the start delimiter and length byte (reserving an options
/// byte of zero), then appends the CRC. So `[0x21, 0x01, ..]` becomes
/// `[0xC5, LEN, 0x00, 0x21, 0x01, .., CRC]`.
pub fn wrap(command_and_payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let length = command_and_payload.len() + 1;
    if length > u8::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            len: command_and_payload.len(),
            max: u8::MAX as usize - 1,
        });
    }

    let mut out = Vec::with_capacity(command_and_payload.len() + 4);
    out.push(START_DELIMITER);
    out.push(length as u8);
    out.push(0x00);
    out.extend_from_slice(command_and_payload);
    append_crc(&out)
}

/// Parsed view of a single frame
///
/// Immutable once built; either constructed for transmission via
/// [`wrap`] or parsed from received bytes via [`Frame::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Options flag byte
    pub options: u8,
    /// Command code
    pub command: u8,
    /// Command-specific payload
    pub payload: Vec<u8>,
}

impl Frame {
    /// Parse a frame, verifying the CRC when one is present
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let expected = validate(bytes)?;
        if bytes.len() == expected + 1 {
            verify_crc(bytes)?;
        }

        Ok(Self {
            options: bytes[OFFSET_OPTIONS],
            command: bytes[OFFSET_COMMAND],
            payload: bytes[OFFSET_PAYLOAD..expected].to_vec(),
        })
    }

    /// Re-encode the frame to its complete wire form, CRC included
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let length = self.payload.len() + 2;
        if length > u8::MAX as usize {
            return Err(FrameError::PayloadTooLarge {
                len: self.payload.len(),
                max: u8::MAX as usize - 2,
            });
        }

        let mut out = Vec::with_capacity(self.payload.len() + 5);
        out.push(START_DELIMITER);
        out.push(length as u8);
        out.push(self.options);
        out.push(self.command);
        out.extend_from_slice(&self.payload);
        append_crc(&out)
    }

    /// Total wire size including the CRC byte
    pub fn wire_len(&self) -> usize {
        self.payload.len() + 5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Known-answer frame from a captured exchange: CRC is 0x1E.
    const KNOWN: [u8; 10] = [0xC5, 0x07, 0x00, 0x21, 0x01, 0x39, 0xB5, 0x31, 0x0B, 0x1E];

    #[test]
    fn test_compute_crc_known_answer() {
        assert_eq!(compute_crc(&KNOWN[OFFSET_OPTIONS..9]), 0x1E);
    }

    #[test]
    fn test_compute_crc_captured_frames() {
        let frames: [&[u8]; 4] = [
            &[0xC5, 0x07, 0x00, 0x21, 0x01, 0x39, 0xB5, 0x31, 0x0B, 0x1E],
            &[
                0xC5, 0x0C, 0x00, 0x23, 0xC8, 0x00, 0x00, 0x00, 0x02, 0x00, 0x07, 0x80, 0x01,
                0x30, 0x6C,
            ],
            &[0xC5, 0x07, 0x00, 0x24, 0x85, 0x03, 0x00, 0x00, 0x00, 0x7F],
            &[0xC5, 0x07, 0x00, 0x24, 0xC8, 0x00, 0x00, 0x00, 0x0C, 0x3D],
        ];
        for frame in frames {
            let expected = validate(frame).unwrap();
            assert_eq!(
                compute_crc(&frame[OFFSET_OPTIONS..expected]),
                *frame.last().unwrap()
            );
        }
    }

    #[test]
    fn test_validate_too_short() {
        let cases: [&[u8]; 5] = [
            &[],
            &[0xC5],
            &[0xC5, 0x0C],
            &[0xC5, 0x07, 0x00],
            &[0xC5, 0x07, 0x00, 0x24],
        ];
        for case in cases {
            assert!(matches!(validate(case), Err(FrameError::TooShort { .. })));
        }
    }

    #[test]
    fn test_validate_bad_delimiter() {
        for first in [0x00u8, 0xC4, 0xFF] {
            let mut bytes = KNOWN.to_vec();
            bytes[0] = first;
            assert!(matches!(
                validate(&bytes),
                Err(FrameError::BadStartMarker { .. })
            ));
        }
    }

    #[test]
    fn test_validate_accepts_both_crc_forms() {
        assert_eq!(validate(&KNOWN).unwrap(), 9);
        assert_eq!(validate(&KNOWN[..9]).unwrap(), 9);
    }

    #[test]
    fn test_validate_rejects_off_by_one() {
        // One byte too long, one byte too short.
        let mut long = KNOWN.to_vec();
        long.push(0x00);
        assert!(matches!(
            validate(&long),
            Err(FrameError::LengthMismatch { .. })
        ));
        assert!(matches!(
            validate(&KNOWN[..8]),
            Err(FrameError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_append_crc_idempotent() {
        assert_eq!(append_crc(&KNOWN).unwrap(), KNOWN.to_vec());
        assert_eq!(append_crc(&KNOWN[..9]).unwrap(), KNOWN.to_vec());
    }

    #[test]
    fn test_verify_crc() {
        assert!(verify_crc(&KNOWN).is_ok());

        assert_eq!(verify_crc(&KNOWN[..9]), Err(FrameError::CrcMissing));

        let mut bad = KNOWN.to_vec();
        bad[9] = 0xFF;
        assert!(matches!(
            verify_crc(&bad),
            Err(FrameError::CrcMismatch { actual: 0xFF, .. })
        ));

        // Corrupt a payload byte instead of the CRC.
        let mut corrupt = KNOWN.to_vec();
        corrupt[5] = 0xFF;
        assert!(matches!(
            verify_crc(&corrupt),
            Err(FrameError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_wrap() {
        let body = [0x21, 0x01, 0x39, 0xB5, 0x31, 0x0B];
        assert_eq!(wrap(&body).unwrap(), KNOWN.to_vec());
    }

    #[test]
    fn test_wrap_oversize_payload() {
        let body = vec![0u8; 256];
        assert!(matches!(
            wrap(&body),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_frame_parse_roundtrip() {
        let frame = Frame::parse(&KNOWN).unwrap();
        assert_eq!(frame.options, 0x00);
        assert_eq!(frame.command, 0x21);
        assert_eq!(frame.payload, vec![0x01, 0x39, 0xB5, 0x31, 0x0B]);
        assert_eq!(frame.wire_len(), KNOWN.len());
        assert_eq!(frame.to_bytes().unwrap(), KNOWN.to_vec());
    }

    #[test]
    fn test_frame_parse_nonzero_options() {
        // A data-log frame with the options byte set.
        let bytes: &[u8] = &[
            0xC5, 0x12, 0x02, 0x56, 0xB4, 0x74, 0x01, 0x00, 0x25, 0xF0, 0x53, 0x0B, 0xD7, 0xD7,
            0x95, 0x09, 0x00, 0x02, 0x00, 0x00, 0xE0,
        ];
        let frame = Frame::parse(bytes).unwrap();
        assert_eq!(frame.options, 0x02);
        assert_eq!(frame.command, 0x56);
        assert_eq!(frame.to_bytes().unwrap(), bytes.to_vec());
    }

    #[test]
    fn test_frame_parse_rejects_bad_crc() {
        let mut bad = KNOWN.to_vec();
        bad[9] ^= 0x01;
        assert!(matches!(
            Frame::parse(&bad),
            Err(FrameError::CrcMismatch { .. })
        ));
    }
}
