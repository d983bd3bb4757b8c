//! Values with unit suffixes: byte sizes, CPU counts and durations.

use crate::error::MalformedSpecError;
use crate::model::Value;

use super::Normalized;

/// Sentinel for "no limit".
pub const UNLIMITED: i64 = -1;

const BYTE_UNITS: &[(&str, i128)] = &[
    ("", 1),
    ("b", 1),
    ("k", 1 << 10),
    ("kb", 1 << 10),
    ("kib", 1 << 10),
    ("m", 1 << 20),
    ("mb", 1 << 20),
    ("mib", 1 << 20),
    ("g", 1 << 30),
    ("gb", 1 << 30),
    ("gib", 1 << 30),
    ("t", 1 << 40),
    ("tb", 1 << 40),
    ("tib", 1 << 40),
    ("p", 1 << 50),
    ("pb", 1 << 50),
    ("pib", 1 << 50),
];

const NANOS_PER_CPU: i128 = 1_000_000_000;
const CPU_DECIMALS: usize = 9;

const DURATION_UNITS: &[(&str, i64)] = &[
    ("us", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
    ("d", 86_400 * 1_000_000_000),
];

/// Normalizes a byte size such as `64M`, `128MB`, `1.5g` or `67108864`.
///
/// With `unlimited`, the spellings `unlimited` and `-1` become [`UNLIMITED`].
pub fn bytes(field: &str, json: &serde_json::Value, unlimited: bool) -> Normalized<Value> {
    let expected = if unlimited {
        "a byte size such as 64M, or unlimited"
    } else {
        "a byte size such as 64M"
    };
    let invalid = || MalformedSpecError::invalid(field, expected, json);

    let text = match json {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_ascii_lowercase(),
        _ => return Err(invalid()),
    };

    if text == "unlimited" || text == "-1" {
        return if unlimited {
            Ok(Value::Int(UNLIMITED))
        } else {
            Err(invalid())
        };
    }

    let split = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let multiplier = BYTE_UNITS
        .iter()
        .find(|(name, _)| *name == unit.trim())
        .map(|(_, m)| *m)
        .ok_or_else(invalid)?;

    let (scaled, scale) = parse_decimal(number).ok_or_else(invalid)?;
    let total = scaled
        .checked_mul(multiplier)
        .and_then(|n| n.checked_add(scale / 2))
        .ok_or_else(invalid)?
        / scale;
    i64::try_from(total).map(Value::Int).map_err(|_| invalid())
}

/// Normalizes a CPU count into its shortest decimal spelling (`1.50` -> `1.5`).
pub fn cpus(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    let invalid = || MalformedSpecError::invalid(field, "a CPU count such as 1.5", json);

    let text = match json {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid()),
    };

    let (scaled, scale) = parse_decimal(&text).ok_or_else(invalid)?;
    if scale > NANOS_PER_CPU {
        return Err(invalid());
    }
    let nanos = scaled.checked_mul(NANOS_PER_CPU / scale).ok_or_else(invalid)?;

    let whole = nanos / NANOS_PER_CPU;
    let fraction = nanos % NANOS_PER_CPU;
    if fraction == 0 {
        return Ok(Value::Str(whole.to_string()));
    }
    let digits = format!("{fraction:0width$}", width = CPU_DECIMALS);
    Ok(Value::Str(format!("{whole}.{}", digits.trim_end_matches('0'))))
}

/// Normalizes a duration such as `1m30s` or `500ms` into nanoseconds.
///
/// A bare number is taken to be nanoseconds already.
pub fn duration(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    let invalid = || MalformedSpecError::invalid(field, "a duration such as 1m30s", json);

    let text = match json {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::Number(n) => return n.as_i64().filter(|n| *n >= 0).map(Value::Int).ok_or_else(invalid),
        serde_json::Value::String(s) => s.trim().to_ascii_lowercase(),
        _ => return Err(invalid()),
    };
    if text.is_empty() {
        return Err(invalid());
    }
    if text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse().map(Value::Int).map_err(|_| invalid());
    }

    let mut total: i64 = 0;
    let mut rest = text.as_str();
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let amount: i64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let letters = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..letters];
        rest = &rest[letters..];

        let (_, nanos) = DURATION_UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .ok_or_else(invalid)?;
        total = amount
            .checked_mul(*nanos)
            .and_then(|n| total.checked_add(n))
            .ok_or_else(invalid)?;
    }
    Ok(Value::Int(total))
}

/// Parses a non-negative decimal into `(digits, 10^fraction_len)`.
fn parse_decimal(text: &str) -> Option<(i128, i128)> {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    if fraction.len() > 18 {
        return None;
    }
    let digits = format!("{whole}{fraction}");
    let scaled: i128 = digits.parse().ok()?;
    let exponent = u32::try_from(fraction.len()).ok()?;
    Some((scaled, 10_i128.pow(exponent)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_byte_units() {
        assert_eq!(bytes("memory", &json!("64M"), false).unwrap(), Value::Int(67_108_864));
        assert_eq!(bytes("memory", &json!("64mb"), false).unwrap(), Value::Int(67_108_864));
        assert_eq!(bytes("memory", &json!(67_108_864), false).unwrap(), Value::Int(67_108_864));
        assert_eq!(bytes("memory", &json!("1.5g"), false).unwrap(), Value::Int(1_610_612_736));
        assert_eq!(bytes("memory", &json!("512"), false).unwrap(), Value::Int(512));
    }

    #[test]
    fn test_unlimited_sentinel() {
        assert_eq!(bytes("memory_swap", &json!("unlimited"), true).unwrap(), Value::Int(UNLIMITED));
        assert_eq!(bytes("memory_swap", &json!(-1), true).unwrap(), Value::Int(UNLIMITED));

        let err = bytes("memory", &json!("unlimited"), false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "memory: expected a byte size such as 64M, found \"unlimited\""
        );
    }

    #[test]
    fn test_bad_byte_sizes() {
        assert!(bytes("memory", &json!("64X"), false).is_err());
        assert!(bytes("memory", &json!("-5"), false).is_err());
        assert!(bytes("memory", &json!(true), false).is_err());
    }

    #[test]
    fn test_oversized_values_are_rejected() {
        let err = bytes("memory", &json!("99999999999999999999999999999999999p"), false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "memory: expected a byte size such as 64M, found \"99999999999999999999999999999999999p\""
        );
        assert!(bytes("memory", &json!("9999999999999t"), false).is_err());
        assert!(cpus("cpus", &json!("100000000000000000000000000000000")).is_err());
    }

    #[test]
    fn test_cpus_canonical() {
        assert_eq!(cpus("cpus", &json!("1.50")).unwrap(), Value::str("1.5"));
        assert_eq!(cpus("cpus", &json!(2)).unwrap(), Value::str("2"));
        assert_eq!(cpus("cpus", &json!(0.25)).unwrap(), Value::str("0.25"));
        assert_eq!(cpus("cpus", &json!("1.5")).unwrap(), cpus("cpus", &json!(1.5)).unwrap());
        assert!(cpus("cpus", &json!("1.0000000001")).is_err());
        assert!(cpus("cpus", &json!("lots")).is_err());
    }

    #[test]
    fn test_durations() {
        assert_eq!(duration("interval", &json!("1m30s")).unwrap(), Value::Int(90_000_000_000));
        assert_eq!(duration("interval", &json!("500ms")).unwrap(), Value::Int(500_000_000));
        assert_eq!(duration("interval", &json!(90_000_000_000_i64)).unwrap(), Value::Int(90_000_000_000));
        assert!(duration("interval", &json!("5 minutes")).is_err());
        assert!(duration("interval", &json!("ms")).is_err());
    }
}
