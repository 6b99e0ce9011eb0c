//! Pulling a value out of a raw device response.
//!
//! Gauges answer with a fixed-layout ASCII frame; the value sits at a
//! configured character window. The pyrometer answers with two binary bytes.

use crate::config::ResponseEncoding;
use crate::utils::error::SensorError;

/// Returns the window `[start, start + length)` of `response` as text.
///
/// A response shorter than the window yields a shorter (possibly empty) string.
pub fn extract_value(
    response: &[u8],
    start: usize,
    length: usize,
    encoding: ResponseEncoding,
) -> Result<String, SensorError> {
    match encoding {
        ResponseEncoding::Ascii => {
            let text = std::str::from_utf8(response)?;
            Ok(text.chars().skip(start).take(length).collect())
        }
        ResponseEncoding::OffsetTenths => {
            let Some(bytes) = response.get(start..start + 2) else {
                return Ok(String::new());
            };
            let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
            Ok(format!("{:.1}", (raw as f64 - 1000.0) / 10.0))
        }
    }
}

/// Parses the leading decimal number of `text`.
///
/// Leading whitespace is skipped, then the longest prefix of the form
/// `[+-]? digits [. digits] [(e|E) [+-]? digits]` is taken. The mantissa needs
/// at least one digit; an exponent without digits is left out. Anything after
/// the number (units, padding, line endings) is ignored.
pub fn parse_leading_number(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }

    let int_end = digits_from(i);
    let mut digits = int_end - i;
    i = int_end;

    if bytes.get(i) == Some(&b'.') {
        let frac_end = digits_from(i + 1);
        digits += frac_end - (i + 1);
        i = frac_end;
    }

    if digits == 0 {
        return None;
    }

    let mut end = i;
    if matches!(bytes.get(i), Some(b'e') | Some(b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        let exp_end = digits_from(j);
        if exp_end > j {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_from_gauge_frame() {
        let response = b"ACK\r\n0012.3mbar......trailing";
        let value = extract_value(response, 5, 16, ResponseEncoding::Ascii).unwrap();
        assert_eq!(value, "0012.3mbar......");
        assert_eq!(parse_leading_number(&value), Some(12.3));
    }

    #[test]
    fn test_short_response_gives_short_window() {
        assert_eq!(extract_value(b"\x06\r\n0,1.5", 5, 16, ResponseEncoding::Ascii).unwrap(), "1.5");
        assert_eq!(extract_value(b"\x06\r", 5, 16, ResponseEncoding::Ascii).unwrap(), "");
        assert_eq!(extract_value(b"", 5, 16, ResponseEncoding::Ascii).unwrap(), "");
    }

    #[test]
    fn test_invalid_text_is_an_error() {
        let result = extract_value(&[0x06, 0xFF, 0xFE, b'1'], 0, 4, ResponseEncoding::Ascii);
        assert!(matches!(result, Err(SensorError::InvalidData(_))));
    }

    #[test]
    fn test_offset_tenths() {
        // 1234 - 1000 = 234 tenths
        let value = extract_value(&[0x04, 0xD2], 0, 2, ResponseEncoding::OffsetTenths).unwrap();
        assert_eq!(value, "23.4");
        assert_eq!(extract_value(&[0x04], 0, 2, ResponseEncoding::OffsetTenths).unwrap(), "");
    }

    #[test]
    fn test_leading_number_forms() {
        assert_eq!(parse_leading_number("1.0000E-03\r\n"), Some(0.001));
        assert_eq!(parse_leading_number("  -4.5e+2x"), Some(-450.0));
        assert_eq!(parse_leading_number("+.5"), Some(0.5));
        assert_eq!(parse_leading_number("7."), Some(7.0));
        assert_eq!(parse_leading_number("42"), Some(42.0));
        assert_eq!(parse_leading_number("3e"), Some(3.0));
        assert_eq!(parse_leading_number("3E+"), Some(3.0));
        assert_eq!(parse_leading_number("1,5"), Some(1.0));
    }

    #[test]
    fn test_leading_number_rejects_non_numeric() {
        assert_eq!(parse_leading_number(""), None);
        assert_eq!(parse_leading_number("mbar"), None);
        assert_eq!(parse_leading_number("."), None);
        assert_eq!(parse_leading_number("-"), None);
        assert_eq!(parse_leading_number("e5"), None);
    }
}
