//! Encoded polyline decoding and encoding.
//!
//! The format is the one used by Google Maps and Valhalla: every coordinate is stored as a
//! zig-zagged delta against the previous one, packed into 5-bit groups that are offset into the
//! printable ASCII range. Latitude comes first in every pair.
//!
//! Valhalla writes its shapes with six digits of precision, which is what [`decode`] assumes.
//! Use [`decode_with_precision`] for strings produced with another precision, such as the five
//! digits of Google's classic format.
//!
//! # Example
//!
//! ```
//! use valhalla_locate_view::polyline::decode_with_precision;
//!
//! let path = decode_with_precision("_p~iF~ps|U_ulLnnqC_mqNvxq`@", 5).unwrap();
//! assert_eq!(path.len(), 3);
//! assert!((path[0].lon - -120.2).abs() < 1e-9);
//! assert!((path[0].lat - 38.5).abs() < 1e-9);
//! ```

use thiserror::Error;

use crate::projection::GeoPos;

/// The number of decimal digits Valhalla uses when encoding shapes.
pub const DEFAULT_PRECISION: u32 = 6;

const ALPHABET_OFFSET: u8 = 63;
const CONTINUATION_BIT: u64 = 0x20;
const VALUE_MASK: u64 = 0x1f;
// Highest shift at which a 5-bit group still fits into a u64.
const MAX_SHIFT: u32 = 60;

/// Errors that can occur while decoding an encoded polyline.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A byte outside of the encoding alphabet (`?` to `~`) was found.
    #[error("Invalid byte 0x{byte:02x} at index {index} in encoded polyline")]
    InvalidByte {
        /// Byte offset into the input.
        index: usize,
        /// The offending byte.
        byte: u8,
    },

    /// The input ended while a value was still being read.
    #[error("Encoded polyline ends in the middle of a value at index {index}")]
    Truncated {
        /// Byte offset of the last byte read.
        index: usize,
    },

    /// A value was encoded with more bits than fit into 64.
    #[error("Encoded value starting before index {index} does not fit into 64 bits")]
    Overflow {
        /// Byte offset at which the overflow was detected.
        index: usize,
    },
}

/// Decodes a polyline encoded with Valhalla's default precision of six digits.
pub fn decode(encoded: &str) -> Result<Vec<GeoPos>, DecodeError> {
    decode_with_precision(encoded, DEFAULT_PRECISION)
}

/// Decodes a polyline encoded with `precision` decimal digits.
///
/// The returned path holds one coordinate for every complete latitude/longitude pair. A trailing
/// latitude without its longitude is ignored.
pub fn decode_with_precision(encoded: &str, precision: u32) -> Result<Vec<GeoPos>, DecodeError> {
    let factor = 10_f64.powi(precision as i32);
    let bytes = encoded.as_bytes();

    let mut path = Vec::with_capacity(bytes.len() / 4);
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;

    while index < bytes.len() {
        let (lat_delta, next) = read_value(bytes, index)?;
        index = next;
        if index >= bytes.len() {
            // Unpaired latitude at the very end.
            break;
        }
        let (lon_delta, next) = read_value(bytes, index)?;
        index = next;

        lat = lat.wrapping_add(lat_delta);
        lon = lon.wrapping_add(lon_delta);
        path.push(GeoPos {
            lon: lon as f64 / factor,
            lat: lat as f64 / factor,
        });
    }

    Ok(path)
}

/// Reads a single zig-zagged value starting at `start`, returning it with the index of the byte
/// following it.
fn read_value(bytes: &[u8], start: usize) -> Result<(i64, usize), DecodeError> {
    let mut magnitude: u64 = 0;
    let mut shift: u32 = 0;
    let mut index = start;

    loop {
        let Some(&byte) = bytes.get(index) else {
            return Err(DecodeError::Truncated {
                index: index.saturating_sub(1),
            });
        };
        if !(ALPHABET_OFFSET..=ALPHABET_OFFSET + 0x3f).contains(&byte) {
            return Err(DecodeError::InvalidByte { index, byte });
        }
        if shift > MAX_SHIFT {
            return Err(DecodeError::Overflow { index });
        }

        let value = (byte - ALPHABET_OFFSET) as u64;
        let group = value & VALUE_MASK;
        // At the last permissible shift only the lowest four bits survive.
        if shift == MAX_SHIFT && group > 0xf {
            return Err(DecodeError::Overflow { index });
        }
        magnitude |= group << shift;
        shift += 5;
        index += 1;

        if value & CONTINUATION_BIT == 0 {
            break;
        }
    }

    Ok((unzigzag(magnitude), index))
}

fn unzigzag(magnitude: u64) -> i64 {
    if magnitude & 1 == 1 {
        // Equivalent to -((magnitude + 1) >> 1) without overflowing at u64::MAX.
        !((magnitude >> 1) as i64)
    } else {
        (magnitude >> 1) as i64
    }
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Encodes a path with Valhalla's default precision of six digits.
pub fn encode(path: &[GeoPos]) -> String {
    encode_with_precision(path, DEFAULT_PRECISION)
}

/// Encodes a path with `precision` decimal digits.
pub fn encode_with_precision(path: &[GeoPos], precision: u32) -> String {
    let factor = 10_f64.powi(precision as i32);
    let mut encoded = String::with_capacity(path.len() * 8);
    let mut prev_lat: i64 = 0;
    let mut prev_lon: i64 = 0;

    for pos in path {
        let lat = (pos.lat * factor).round() as i64;
        let lon = (pos.lon * factor).round() as i64;
        write_value(&mut encoded, lat.wrapping_sub(prev_lat));
        write_value(&mut encoded, lon.wrapping_sub(prev_lon));
        prev_lat = lat;
        prev_lon = lon;
    }

    encoded
}

fn write_value(out: &mut String, value: i64) {
    let mut magnitude = zigzag(value);
    while magnitude >= CONTINUATION_BIT {
        let byte = ((magnitude & VALUE_MASK) | CONTINUATION_BIT) as u8 + ALPHABET_OFFSET;
        out.push(byte as char);
        magnitude >>= 5;
    }
    out.push((magnitude as u8 + ALPHABET_OFFSET) as char);
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;
    const CANONICAL: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn assert_path_eq(actual: &[GeoPos], expected: &[(f64, f64)], tolerance: f64) {
        assert_eq!(actual.len(), expected.len(), "path length");
        for (pos, (lon, lat)) in actual.iter().zip(expected) {
            assert!(
                (pos.lon - lon).abs() < tolerance && (pos.lat - lat).abs() < tolerance,
                "{:?} != ({}, {})",
                pos,
                lon,
                lat
            );
        }
    }

    #[test]
    fn empty_string_decodes_to_empty_path() {
        assert_eq!(decode(""), Ok(vec![]));
        assert_eq!(decode_with_precision("", 5), Ok(vec![]));
    }

    #[test]
    fn canonical_vector_decodes_longitude_first() {
        let path = decode_with_precision(CANONICAL, 5).unwrap();
        assert_path_eq(
            &path,
            &[(-120.2, 38.5), (-120.95, 40.7), (-126.453, 43.252)],
            EPSILON,
        );
    }

    #[test]
    fn default_precision_is_six_digits() {
        let path = decode(CANONICAL).unwrap();
        assert_path_eq(
            &path,
            &[(-12.02, 3.85), (-12.095, 4.07), (-12.6453, 4.3252)],
            EPSILON,
        );
    }

    #[test]
    fn decoding_is_deterministic() {
        let first = decode(CANONICAL).unwrap();
        let second = decode(CANONICAL).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn canonical_vector_encodes_back() {
        let path = vec![
            GeoPos {
                lon: -120.2,
                lat: 38.5,
            },
            GeoPos {
                lon: -120.95,
                lat: 40.7,
            },
            GeoPos {
                lon: -126.453,
                lat: 43.252,
            },
        ];
        assert_eq!(encode_with_precision(&path, 5), CANONICAL);
    }

    fn zurich_path() -> Vec<GeoPos> {
        vec![
            GeoPos {
                lon: 8.541694,
                lat: 47.376887,
            },
            GeoPos {
                lon: 8.5423456,
                lat: 47.3771234,
            },
            GeoPos {
                lon: -0.000001,
                lat: 0.0,
            },
            GeoPos {
                lon: 179.999999,
                lat: -89.999999,
            },
        ]
    }

    fn to_coords(path: &[GeoPos]) -> Vec<geo_types::Coord<f64>> {
        path.iter()
            .map(|p| geo_types::Coord { x: p.lon, y: p.lat })
            .collect()
    }

    #[test]
    fn decodes_what_the_polyline_crate_encodes() {
        let path = zurich_path();
        for precision in [5, 6] {
            let encoded = polyline::encode_coordinates(to_coords(&path), precision).unwrap();
            let decoded = decode_with_precision(&encoded, precision).unwrap();
            let expected: Vec<(f64, f64)> = path.iter().map(|p| (p.lon, p.lat)).collect();
            assert_path_eq(&decoded, &expected, 0.5 / 10_f64.powi(precision as i32) + EPSILON);
        }
    }

    #[test]
    fn decoding_agrees_with_the_polyline_crate() {
        for (encoded, precision) in [(CANONICAL, 5), (CANONICAL, 6), ("", 6)] {
            let ours = decode_with_precision(encoded, precision).unwrap();
            let theirs = polyline::decode_polyline(encoded, precision).unwrap();
            let expected: Vec<(f64, f64)> = theirs.coords().map(|c| (c.x, c.y)).collect();
            assert_path_eq(&ours, &expected, EPSILON);
        }
    }

    #[test]
    fn encoding_matches_the_polyline_crate() {
        let path = zurich_path();
        for precision in [5, 6] {
            assert_eq!(
                encode_with_precision(&path, precision),
                polyline::encode_coordinates(to_coords(&path), precision).unwrap(),
                "precision {}",
                precision
            );
        }
    }

    #[test]
    fn truncated_input_is_rejected() {
        // '_' carries the continuation bit, so the string ends in the middle of a value.
        assert_eq!(decode("_"), Err(DecodeError::Truncated { index: 0 }));
        assert_eq!(
            decode_with_precision("_p~iF~ps|U_", 5),
            Err(DecodeError::Truncated { index: 10 })
        );
    }

    #[test]
    fn bytes_outside_the_alphabet_are_rejected() {
        assert_eq!(
            decode("_p~iF ps|U"),
            Err(DecodeError::InvalidByte {
                index: 5,
                byte: b' '
            })
        );
        assert!(matches!(
            decode("_p~iFä"),
            Err(DecodeError::InvalidByte { index: 5, .. })
        ));
    }

    #[test]
    fn overlong_values_are_rejected() {
        let overlong = "_".repeat(14) + "?";
        assert!(matches!(
            decode(&overlong),
            Err(DecodeError::Overflow { .. })
        ));
    }

    #[test]
    fn extreme_values_survive_a_round_trip() {
        let mut encoded = String::new();
        write_value(&mut encoded, i64::MIN);
        write_value(&mut encoded, i64::MAX);
        let (min, next) = read_value(encoded.as_bytes(), 0).unwrap();
        let (max, end) = read_value(encoded.as_bytes(), next).unwrap();
        assert_eq!(min, i64::MIN);
        assert_eq!(max, i64::MAX);
        assert_eq!(end, encoded.len());
    }

    #[test]
    fn saturated_coordinates_encode_without_overflow() {
        // Both latitudes saturate the fixed-point conversion, so their delta wraps.
        let path = vec![
            GeoPos { lon: 0.0, lat: 1e300 },
            GeoPos { lon: 0.0, lat: -1e300 },
        ];
        let decoded = decode(&encode(&path)).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].lat, i64::MAX as f64 / 1e6);
        assert_eq!(decoded[1].lat, i64::MIN as f64 / 1e6);
        assert_eq!(decoded[1].lon, 0.0);
    }

    #[test]
    fn output_has_one_coordinate_per_pair_of_values() {
        // "?" is a complete zero value.
        for values in 0..9 {
            let encoded = "?".repeat(values);
            assert_eq!(decode(&encoded).unwrap().len(), values / 2, "{} values", values);
        }
        // A trailing unpaired value after the canonical three pairs.
        let path = decode_with_precision(&format!("{}_p~iF", CANONICAL), 5).unwrap();
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn zigzag_matches_reference_mapping() {
        let cases = [(0, 0), (1, -1), (2, 1), (3, -2), (4, 2)];
        for (magnitude, value) in cases {
            assert_eq!(unzigzag(magnitude), value);
            assert_eq!(zigzag(value), magnitude);
        }
    }
}
