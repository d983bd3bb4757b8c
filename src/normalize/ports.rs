//! Published port bindings.
//!
//! Accepted string form: `[ip:][host[-end]:]container[-end][/protocol]`,
//! where `ip` is an IPv4 address or a bracketed IPv6 address. Object forms
//! name the same parts explicitly, and port ranges may be spelled as
//! `"start-end"`, `[start, end]` or `{start, end}`.
//!
//! Every binding normalizes to a map with `container_port`, `host_ip`,
//! `host_port` and `protocol`. Single ports are integers and ranges are
//! `"start-end"` strings, so identical ranges compare equal no matter how
//! they were spelled.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::MalformedSpecError;
use crate::model::Value;

use super::Normalized;

const DEFAULT_HOST_IP: &str = "0.0.0.0";
const DEFAULT_PROTOCOL: &str = "tcp";
const PROTOCOLS: &[&str] = &["tcp", "udp", "sctp"];

/// An inclusive port range; a single port has `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    const fn len(self) -> usize {
        (self.end - self.start) as usize + 1
    }

    fn to_value(self) -> Value {
        if self.start == self.end {
            Value::Int(i64::from(self.start))
        } else {
            Value::Str(format!("{}-{}", self.start, self.end))
        }
    }
}

/// Normalizes a published ports value into a list of binding maps.
pub fn normalize(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| normalize_binding(field, item))
            .collect::<Normalized<Vec<_>>>()
            .map(Value::List),
        single => Ok(Value::List(vec![normalize_binding(field, single)?])),
    }
}

fn normalize_binding(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    match json {
        serde_json::Value::String(s) => parse_binding(field, s.trim()),
        serde_json::Value::Number(_) => {
            let container = range_from_json(field, json)?;
            Ok(binding(container, None, DEFAULT_HOST_IP.to_string(), DEFAULT_PROTOCOL))
        }
        serde_json::Value::Object(entries) => binding_from_object(field, entries),
        other => Err(MalformedSpecError::invalid(
            field,
            "a port description string or object",
            other,
        )),
    }
}

fn parse_binding(field: &str, input: &str) -> Normalized<Value> {
    let (spec, protocol) = match input.split_once('/') {
        Some((spec, protocol)) => (spec, parse_protocol(field, protocol)?),
        None => (input, DEFAULT_PROTOCOL),
    };

    let parts = split_colon_ipv6(field, spec)?;
    let (ip, host, container) = match parts.as_slice() {
        [container] => (None, None, container.as_str()),
        [host, container] => (None, Some(host.as_str()), container.as_str()),
        [ip, host, container] => (Some(ip.as_str()), Some(host.as_str()), container.as_str()),
        _ => {
            return Err(MalformedSpecError::PortSegments {
                field: field.to_string(),
                input: input.to_string(),
                found: parts.len(),
            });
        }
    };

    let host_ip = match ip {
        Some(ip) if !ip.is_empty() => parse_bind_address(field, ip)?,
        _ => DEFAULT_HOST_IP.to_string(),
    };
    let container = parse_port_range(field, container)?;
    let host = match host {
        Some(host) if !host.is_empty() => Some(parse_port_range(field, host)?),
        _ => None,
    };
    check_range_lengths(field, input, container, host)?;

    Ok(binding(container, host, host_ip, protocol))
}

fn binding_from_object(
    field: &str,
    entries: &serde_json::Map<String, serde_json::Value>,
) -> Normalized<Value> {
    let mut container = None;
    let mut host = None;
    let mut host_ip = DEFAULT_HOST_IP.to_string();
    let mut protocol = DEFAULT_PROTOCOL;

    for (key, value) in entries {
        match key.as_str() {
            "container_port" | "target_port" => container = Some(range_from_json(field, value)?),
            "host_port" | "published_port" => {
                if !value.is_null() {
                    host = Some(range_from_json(field, value)?);
                }
            }
            "host_ip" => {
                if let Some(ip) = value.as_str().map(str::trim).filter(|ip| !ip.is_empty()) {
                    host_ip = parse_bind_address(field, ip)?;
                }
            }
            "protocol" => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| MalformedSpecError::invalid(field, "a protocol string", value))?;
                protocol = parse_protocol(field, raw)?;
            }
            other => {
                return Err(MalformedSpecError::invalid(
                    field,
                    "one of container_port, host_port, host_ip, protocol",
                    other,
                ));
            }
        }
    }

    let container = container.ok_or_else(|| MalformedSpecError::MissingField {
        field: format!("{field}.container_port"),
        resource_type: String::from("port binding"),
    })?;
    let rendered = serde_json::Value::Object(entries.clone()).to_string();
    check_range_lengths(field, &rendered, container, host)?;

    Ok(binding(container, host, host_ip, protocol))
}

fn binding(container: PortRange, host: Option<PortRange>, host_ip: String, protocol: &str) -> Value {
    let mut map = BTreeMap::new();
    map.insert(String::from("container_port"), container.to_value());
    map.insert(String::from("host_ip"), Value::Str(host_ip));
    map.insert(
        String::from("host_port"),
        host.map_or(Value::Null, PortRange::to_value),
    );
    map.insert(String::from("protocol"), Value::str(protocol));
    Value::Map(map)
}

/// A container range must be published onto a host range of the same length.
/// A single container port may take a host range; the runtime picks one.
fn check_range_lengths(
    field: &str,
    input: &str,
    container: PortRange,
    host: Option<PortRange>,
) -> Normalized<()> {
    match host {
        Some(host) if container.len() > 1 && host.len() != container.len() => {
            Err(MalformedSpecError::RangeLengthMismatch {
                field: field.to_string(),
                input: input.to_string(),
                host_len: host.len(),
                container_len: container.len(),
            })
        }
        _ => Ok(()),
    }
}

fn parse_protocol(field: &str, raw: &str) -> Normalized<&'static str> {
    let lowered = raw.trim().to_ascii_lowercase();
    PROTOCOLS
        .iter()
        .copied()
        .find(|p| *p == lowered)
        .ok_or_else(|| MalformedSpecError::invalid(field, "protocol tcp, udp or sctp", raw))
}

/// Splits on colons while keeping bracketed IPv6 literals together.
fn split_colon_ipv6(field: &str, text: &str) -> Normalized<Vec<String>> {
    if !text.contains('[') {
        return Ok(text.split(':').map(str::to_string).collect());
    }

    let mut result: Vec<String> = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let Some(open) = text[start..].find('[').map(|i| i + start) else {
            result.extend(text[start..].split(':').map(str::to_string));
            break;
        };
        let Some(close) = text[open..].find(']').map(|i| i + open) else {
            return Err(MalformedSpecError::UnbalancedBracket {
                field: field.to_string(),
                input: text.to_string(),
                index: open + 1,
            });
        };
        result.extend(text[start..open].split(':').map(str::to_string));
        match text[close..].find(':').map(|i| i + close) {
            None => {
                if let Some(last) = result.last_mut() {
                    last.push_str(&text[open..]);
                }
                start = text.len();
            }
            Some(colon) => {
                if let Some(last) = result.last_mut() {
                    last.push_str(&text[open..colon]);
                }
                if colon + 1 == text.len() {
                    result.push(String::new());
                }
                start = colon + 1;
            }
        }
    }
    Ok(result)
}

/// Parses a bind address. Hostnames are rejected; no name resolution happens.
fn parse_bind_address(field: &str, raw: &str) -> Normalized<String> {
    let bracketed = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']'));
    if let Some(inner) = bracketed {
        return parse_ipv6(field, raw, inner);
    }
    if raw.contains(':') {
        return parse_ipv6(field, raw, raw);
    }
    raw.parse::<Ipv4Addr>()
        .map(|ip| ip.to_string())
        .map_err(|_| MalformedSpecError::HostnameNotAllowed {
            field: field.to_string(),
            host: raw.to_string(),
        })
}

fn parse_ipv6(field: &str, raw: &str, inner: &str) -> Normalized<String> {
    let invalid = || MalformedSpecError::invalid(field, "an IPv6 address", raw);
    let (address, zone) = match inner.split_once('%') {
        Some((address, zone)) if !zone.is_empty() => (address, Some(zone)),
        Some(_) => return Err(invalid()),
        None => (inner, None),
    };
    let address: Ipv6Addr = address.parse().map_err(|_| invalid())?;
    Ok(match zone {
        Some(zone) => format!("{address}%{zone}"),
        None => address.to_string(),
    })
}

/// Parses `PORT` or `START-END`.
fn parse_port_range(field: &str, raw: &str) -> Normalized<PortRange> {
    let invalid = || MalformedSpecError::port_range(field, raw);
    let (start, end) = match raw.split_once('-') {
        Some((start, end)) => (start.trim(), end.trim()),
        None => (raw.trim(), raw.trim()),
    };
    let start: u16 = start.parse().map_err(|_| invalid())?;
    let end: u16 = end.parse().map_err(|_| invalid())?;
    if start == 0 || end < start {
        return Err(invalid());
    }
    Ok(PortRange { start, end })
}

fn range_from_json(field: &str, json: &serde_json::Value) -> Normalized<PortRange> {
    let invalid = || MalformedSpecError::port_range(field, json.to_string());
    let port = |v: &serde_json::Value| -> Normalized<u16> {
        match v {
            serde_json::Value::Number(n) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .filter(|n| *n > 0)
                .ok_or_else(invalid),
            serde_json::Value::String(s) => s.trim().parse::<u16>().ok().filter(|n| *n > 0).ok_or_else(invalid),
            _ => Err(invalid()),
        }
    };

    let (start, end) = match json {
        serde_json::Value::String(s) => return parse_port_range(field, s),
        serde_json::Value::Number(_) => {
            let p = port(json)?;
            (p, p)
        }
        serde_json::Value::Array(bounds) => match bounds.as_slice() {
            [single] => {
                let p = port(single)?;
                (p, p)
            }
            [start, end] => (port(start)?, port(end)?),
            _ => return Err(invalid()),
        },
        serde_json::Value::Object(bounds) => {
            let start = bounds.get("start").ok_or_else(invalid)?;
            let end = bounds.get("end").unwrap_or(start);
            (port(start)?, port(end)?)
        }
        _ => return Err(invalid()),
    };
    if end < start {
        return Err(invalid());
    }
    Ok(PortRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn one(input: serde_json::Value) -> Value {
        match normalize("published_ports", &input).unwrap() {
            Value::List(mut items) => items.remove(0),
            other => panic!("expected a list, got {other}"),
        }
    }

    #[test]
    fn test_short_form_matches_object_form() {
        let short = one(json!("9001:9001"));
        let long = one(json!({"host_port": 9001, "container_port": 9001}));
        assert_eq!(short, long);
        assert_eq!(
            short.to_string(),
            r#"{"container_port":9001,"host_ip":"0.0.0.0","host_port":9001,"protocol":"tcp"}"#
        );
    }

    #[test]
    fn test_range_spellings_are_equal() {
        let short = one(json!("9010-9050:9010-9050"));
        let bounds = one(json!({
            "host_port": {"start": 9010, "end": 9050},
            "container_port": [9010, 9050]
        }));
        assert_eq!(short, bounds);
    }

    #[test]
    fn test_host_range_onto_single_port() {
        let narrow = one(json!("9010-9050:9010"));
        let wide = one(json!("9010-9051:9010"));
        assert_ne!(narrow, wide);
        assert_eq!(narrow.as_map().unwrap()["host_port"], Value::str("9010-9050"));
    }

    #[test]
    fn test_ipv6_bind_address() {
        let binding = one(json!("[::1]:8080:80/udp"));
        let map = binding.as_map().unwrap();
        assert_eq!(map["host_ip"], Value::str("::1"));
        assert_eq!(map["protocol"], Value::str("udp"));

        let zoned = one(json!("[fe80::1%eth0]:8080:80"));
        assert_eq!(zoned.as_map().unwrap()["host_ip"], Value::str("fe80::1%eth0"));
    }

    #[test]
    fn test_unbalanced_bracket() {
        let err = normalize("published_ports", &json!("[::1:80:80")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "published_ports: cannot find closing \"]\" in input \"[::1:80:80\" for opening \"[\" at index 1"
        );
    }

    #[test]
    fn test_unbracketed_ipv6_has_too_many_segments() {
        let err = normalize("published_ports", &json!("::1:80:80")).unwrap_err();
        assert!(matches!(err, MalformedSpecError::PortSegments { found: 5, .. }));
    }

    #[test]
    fn test_hostname_rejected() {
        let err = normalize("published_ports", &json!("localhost:80:80")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "published_ports: bind addresses for published ports must be IPv4 or IPv6 addresses, not hostnames (found hostname: localhost)"
        );
    }

    #[test]
    fn test_range_length_mismatch() {
        let err = normalize("published_ports", &json!("8000-8001:9000-9002")).unwrap_err();
        assert!(matches!(
            err,
            MalformedSpecError::RangeLengthMismatch {
                host_len: 2,
                container_len: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_port() {
        assert!(normalize("published_ports", &json!("0")).is_err());
        assert!(normalize("published_ports", &json!("70000")).is_err());
        assert!(normalize("published_ports", &json!("90-80")).is_err());
        assert!(normalize("published_ports", &json!("80/icmp")).is_err());
    }

    #[test]
    fn test_canonical_form_is_stable() {
        let first = normalize("published_ports", &json!(["127.0.0.1:8080:80", "53/udp"])).unwrap();
        let second = normalize("published_ports", &first.to_json()).unwrap();
        assert_eq!(first, second);
    }
}
