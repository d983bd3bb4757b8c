//! Lists, maps and nested objects: mounts, networks, secrets, environment,
//! labels, commands, image references and health checks.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::MalformedSpecError;
use crate::model::Value;

use super::{Normalized, units};

const SECRET_MODE: i64 = 0o444;

/// Normalizes a string list. A single scalar becomes a one-element list.
pub fn string_list(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| scalar_text(field, item).map(Value::Str))
            .collect::<Normalized<Vec<_>>>()
            .map(Value::List),
        single => Ok(Value::List(vec![Value::Str(scalar_text(field, single)?)])),
    }
}

/// Normalizes a command line. A string is split like a shell would, honoring quotes.
pub fn command(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    match json {
        serde_json::Value::String(s) => split_command(field, s)
            .map(|words| Value::List(words.into_iter().map(Value::Str).collect())),
        other => string_list(field, other),
    }
}

/// Normalizes a string map given as an object or a list of `key=value` items.
///
/// With `strict_values`, booleans are rejected so that `yes` and `true` never
/// silently become different strings.
pub fn string_map(field: &str, json: &serde_json::Value, strict_values: bool) -> Normalized<Value> {
    let mut map = BTreeMap::new();
    match json {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::Object(entries) => {
            for (key, value) in entries {
                let text = map_value(field, key, value, strict_values)?;
                map.insert(key.trim().to_string(), Value::Str(text));
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                let pair = item.as_str().and_then(|s| s.split_once('=')).ok_or_else(|| {
                    MalformedSpecError::invalid(field, "KEY=VALUE items", item)
                })?;
                map.insert(pair.0.trim().to_string(), Value::str(pair.1));
            }
        }
        other => {
            return Err(MalformedSpecError::invalid(
                field,
                "a mapping or a list of KEY=VALUE items",
                other,
            ));
        }
    }
    Ok(Value::Map(map))
}

fn map_value(
    field: &str,
    key: &str,
    value: &serde_json::Value,
    strict_values: bool,
) -> Normalized<String> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) if !strict_values => Ok(b.to_string()),
        other => Err(MalformedSpecError::invalid(
            format!("{field}.{key}"),
            "a string value (quote booleans and empty values)",
            other,
        )),
    }
}

/// Normalizes an image reference, appending `:latest` when no tag or digest is given.
pub fn image(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    let reference = match json {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::String(s) if !s.trim().is_empty() => s.trim(),
        other => return Err(MalformedSpecError::invalid(field, "an image reference", other)),
    };
    if reference.contains('@') {
        return Ok(Value::str(reference));
    }
    let last = reference.rsplit('/').next().unwrap_or(reference);
    if last.contains(':') {
        Ok(Value::str(reference))
    } else {
        Ok(Value::Str(format!("{reference}:latest")))
    }
}

/// Normalizes mounts given as `source:target[:options]` strings or objects.
pub fn mounts(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    list_of(field, json, mount)
}

fn mount(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    let mut source = None;
    let mut kind = None;
    let mut read_only = false;
    let mut options = BTreeSet::new();

    let target = match json {
        serde_json::Value::String(s) => {
            let parts: Vec<&str> = s.trim().split(':').collect();
            match parts.as_slice() {
                [target] => (*target).to_string(),
                [src, target] => {
                    source = Some((*src).to_string());
                    (*target).to_string()
                }
                [src, target, opts] => {
                    source = Some((*src).to_string());
                    for opt in opts.split(',').map(str::trim).filter(|o| !o.is_empty()) {
                        match opt {
                            "ro" => read_only = true,
                            "rw" => read_only = false,
                            other => {
                                options.insert(other.to_string());
                            }
                        }
                    }
                    (*target).to_string()
                }
                _ => {
                    return Err(MalformedSpecError::invalid(
                        field,
                        "SOURCE:TARGET[:OPTIONS]",
                        json,
                    ));
                }
            }
        }
        serde_json::Value::Object(entries) => {
            let mut target = None;
            for (key, value) in entries {
                match key.as_str() {
                    "source" => source = value.as_str().map(|s| s.trim().to_string()),
                    "target" => target = value.as_str().map(|s| s.trim().to_string()),
                    "type" => kind = value.as_str().map(|s| s.trim().to_ascii_lowercase()),
                    "read_only" => read_only = boolean(&format!("{field}.read_only"), value)?,
                    "options" => {
                        if let Value::List(items) = string_list(field, value)? {
                            options.extend(items.into_iter().filter_map(|v| v.as_str().map(str::to_string)));
                        }
                    }
                    other => {
                        return Err(MalformedSpecError::invalid(
                            field,
                            "one of source, target, type, read_only, options",
                            other,
                        ));
                    }
                }
            }
            target.ok_or_else(|| MalformedSpecError::MissingField {
                field: format!("{field}.target"),
                resource_type: String::from("mount"),
            })?
        }
        other => return Err(MalformedSpecError::invalid(field, "a mount string or object", other)),
    };

    if !target.starts_with('/') {
        return Err(MalformedSpecError::invalid(field, "an absolute container path", &target));
    }
    let source = source.filter(|s| !s.is_empty());
    let kind = match kind {
        Some(kind) if ["bind", "volume", "tmpfs"].contains(&kind.as_str()) => kind,
        Some(kind) => return Err(MalformedSpecError::invalid(field, "mount type bind, volume or tmpfs", kind)),
        None => match &source {
            Some(src) if src.starts_with(['/', '.', '~']) => String::from("bind"),
            _ => String::from("volume"),
        },
    };

    let mut map = BTreeMap::new();
    if let Some(source) = source {
        map.insert(String::from("source"), Value::Str(source));
    }
    map.insert(String::from("target"), Value::Str(target));
    map.insert(String::from("type"), Value::Str(kind));
    map.insert(String::from("read_only"), Value::Bool(read_only));
    if !options.is_empty() {
        map.insert(
            String::from("options"),
            Value::List(options.into_iter().map(Value::Str).collect()),
        );
    }
    Ok(Value::Map(map))
}

/// Normalizes network attachments given as names or objects.
pub fn networks(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    list_of(field, json, network)
}

fn network(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    let mut map = BTreeMap::new();
    match json {
        serde_json::Value::String(name) if !name.trim().is_empty() => {
            map.insert(String::from("name"), Value::str(name.trim()));
        }
        serde_json::Value::Object(entries) => {
            for (key, value) in entries {
                match key.as_str() {
                    "name" | "ipv4_address" | "ipv6_address" => {
                        if !value.is_null() {
                            map.insert(key.clone(), Value::Str(scalar_text(field, value)?));
                        }
                    }
                    "aliases" => {
                        let aliases: BTreeSet<Value> = string_list(field, value)?
                            .list_items()
                            .map(|items| items.iter().cloned().collect())
                            .unwrap_or_default();
                        if !aliases.is_empty() {
                            map.insert(key.clone(), Value::List(aliases.into_iter().collect()));
                        }
                    }
                    other => {
                        return Err(MalformedSpecError::invalid(
                            field,
                            "one of name, aliases, ipv4_address, ipv6_address",
                            other,
                        ));
                    }
                }
            }
            if !map.contains_key("name") {
                return Err(MalformedSpecError::MissingField {
                    field: format!("{field}.name"),
                    resource_type: String::from("network attachment"),
                });
            }
        }
        other => return Err(MalformedSpecError::invalid(field, "a network name or object", other)),
    }
    Ok(Value::Map(map))
}

/// Normalizes secret or config references given as names or objects.
pub fn secrets(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    list_of(field, json, secret)
}

fn secret(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    let mut name = None;
    let mut filename = None;
    let mut uid = String::from("0");
    let mut gid = String::from("0");
    let mut mode = SECRET_MODE;

    match json {
        serde_json::Value::String(s) if !s.trim().is_empty() => name = Some(s.trim().to_string()),
        serde_json::Value::Object(entries) => {
            for (key, value) in entries {
                match key.as_str() {
                    "secret_name" | "config_name" | "name" => name = Some(scalar_text(field, value)?),
                    "filename" => filename = Some(scalar_text(field, value)?),
                    "uid" => uid = scalar_text(field, value)?,
                    "gid" => gid = scalar_text(field, value)?,
                    "mode" => mode = file_mode(field, value)?,
                    other => {
                        return Err(MalformedSpecError::invalid(
                            field,
                            "one of secret_name, filename, uid, gid, mode",
                            other,
                        ));
                    }
                }
            }
        }
        other => return Err(MalformedSpecError::invalid(field, "a secret name or object", other)),
    }

    let name = name.ok_or_else(|| MalformedSpecError::MissingField {
        field: format!("{field}.secret_name"),
        resource_type: String::from("secret reference"),
    })?;
    let mut map = BTreeMap::new();
    map.insert(String::from("filename"), Value::Str(filename.unwrap_or_else(|| name.clone())));
    map.insert(String::from("gid"), Value::Str(gid));
    map.insert(String::from("mode"), Value::Int(mode));
    map.insert(String::from("secret_name"), Value::Str(name));
    map.insert(String::from("uid"), Value::Str(uid));
    Ok(Value::Map(map))
}

/// File modes are integers; strings are read as octal (`"0444"`).
fn file_mode(field: &str, json: &serde_json::Value) -> Normalized<i64> {
    let invalid = || MalformedSpecError::invalid(field, "a file mode such as 0444", json);
    match json {
        serde_json::Value::Number(n) => n.as_i64().filter(|m| (0..=0o7777).contains(m)).ok_or_else(invalid),
        serde_json::Value::String(s) => i64::from_str_radix(s.trim(), 8)
            .ok()
            .filter(|m| (0..=0o7777).contains(m))
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Normalizes a health check object. `test` strings run through the shell.
pub fn healthcheck(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    let entries = match json {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::Object(entries) => entries,
        other => return Err(MalformedSpecError::invalid(field, "a health check object", other)),
    };

    let mut map = BTreeMap::new();
    for (key, value) in entries {
        let path = format!("{field}.{key}");
        let normalized = match key.as_str() {
            "test" => match value {
                serde_json::Value::String(s) if s.trim().eq_ignore_ascii_case("none") => {
                    Value::List(vec![Value::str("NONE")])
                }
                serde_json::Value::String(s) => {
                    Value::List(vec![Value::str("CMD-SHELL"), Value::str(s.trim())])
                }
                other => string_list(&path, other)?,
            },
            "interval" | "timeout" | "start_period" | "start_interval" => units::duration(&path, value)?,
            "retries" => integer(&path, value)?,
            other => {
                return Err(MalformedSpecError::invalid(
                    field,
                    "one of test, interval, timeout, start_period, start_interval, retries",
                    other,
                ));
            }
        };
        if !normalized.is_null() {
            map.insert(key.clone(), normalized);
        }
    }
    Ok(Value::Map(map))
}

/// Renders a scalar as text. Lists and objects are rejected.
pub fn scalar_text(field: &str, json: &serde_json::Value) -> Normalized<String> {
    match json {
        serde_json::Value::String(s) => Ok(s.trim().to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(MalformedSpecError::invalid(field, "a string", other)),
    }
}

/// Parses an integer; numeric strings are accepted.
pub fn integer(field: &str, json: &serde_json::Value) -> Normalized<Value> {
    let invalid = || MalformedSpecError::invalid(field, "an integer", json);
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Number(n) => match Value::from_json(json) {
            Value::Int(i) => Ok(Value::Int(i)),
            _ => Err(MalformedSpecError::invalid(field, "an integer", n)),
        },
        serde_json::Value::String(s) => s.trim().parse().map(Value::Int).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Parses a boolean from the spellings YAML users commonly write.
pub fn boolean(field: &str, json: &serde_json::Value) -> Normalized<bool> {
    let invalid = || MalformedSpecError::invalid(field, "a boolean", json);
    match json {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(invalid()),
        },
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" | "y" => Ok(true),
            "false" | "no" | "off" | "0" | "n" => Ok(false),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

fn list_of(
    field: &str,
    json: &serde_json::Value,
    item: fn(&str, &serde_json::Value) -> Normalized<Value>,
) -> Normalized<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|i| item(field, i))
            .collect::<Normalized<Vec<_>>>()
            .map(Value::List),
        single => Ok(Value::List(vec![item(field, single)?])),
    }
}

fn split_command(field: &str, input: &str) -> Normalized<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err(MalformedSpecError::invalid(field, "a command with balanced quotes", input));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_env_list_and_map_agree() {
        let from_map = string_map("env", &json!({"A": "1", "B": 2}), true).unwrap();
        let from_list = string_map("env", &json!(["A=1", "B=2"]), true).unwrap();
        assert_eq!(from_map, from_list);
    }

    #[test]
    fn test_env_rejects_booleans() {
        let err = string_map("env", &json!({"DEBUG": true}), true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "env.DEBUG: expected a string value (quote booleans and empty values), found true"
        );
        assert!(string_map("labels", &json!({"debug": true}), false).is_ok());
    }

    #[test]
    fn test_image_default_tag() {
        assert_eq!(image("image", &json!("nginx")).unwrap(), Value::str("nginx:latest"));
        assert_eq!(
            image("image", &json!("localhost:5000/app")).unwrap(),
            Value::str("localhost:5000/app:latest")
        );
        assert_eq!(image("image", &json!("nginx:1.25")).unwrap(), Value::str("nginx:1.25"));
        assert_eq!(
            image("image", &json!("nginx@sha256:abcd")).unwrap(),
            Value::str("nginx@sha256:abcd")
        );
    }

    #[test]
    fn test_mount_short_form() {
        let value = mounts("mounts", &json!(["/srv/data:/data:ro,z", "cache:/cache"])).unwrap();
        let again = mounts("mounts", &value.to_json()).unwrap();
        assert_eq!(value, again);

        let items = value.list_items().unwrap();
        let bind = items[0].as_map().unwrap();
        assert_eq!(bind["type"], Value::str("bind"));
        assert_eq!(bind["read_only"], Value::Bool(true));
        assert_eq!(bind["options"], Value::List(vec![Value::str("z")]));
        assert_eq!(items[1].as_map().unwrap()["type"], Value::str("volume"));
    }

    #[test]
    fn test_mount_requires_absolute_target() {
        assert!(mounts("mounts", &json!("data:relative")).is_err());
    }

    #[test]
    fn test_network_aliases_sorted() {
        let value = networks("networks", &json!([{"name": "backend", "aliases": ["db", "api"]}])).unwrap();
        assert_eq!(value.to_string(), r#"[{"aliases":["api","db"],"name":"backend"}]"#);
    }

    #[test]
    fn test_secret_defaults() {
        let short = secrets("secrets", &json!("db_password")).unwrap();
        let long = secrets(
            "secrets",
            &json!({"secret_name": "db_password", "mode": "0444", "uid": 0}),
        )
        .unwrap();
        assert_eq!(short, long);
    }

    #[test]
    fn test_healthcheck_normalization() {
        let value = healthcheck(
            "healthcheck",
            &json!({"test": "curl -f http://localhost", "interval": "1m30s", "retries": "3"}),
        )
        .unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map["interval"], Value::Int(90_000_000_000));
        assert_eq!(map["retries"], Value::Int(3));
        assert_eq!(healthcheck("healthcheck", &value.to_json()).unwrap(), value);
    }

    #[test]
    fn test_command_splitting() {
        let value = command("command", &json!("sh -c 'echo hello world'")).unwrap();
        assert_eq!(value.to_string(), r#"["sh","-c","echo hello world"]"#);
        assert!(command("command", &json!("echo 'oops")).is_err());
    }

    #[test]
    fn test_booleans() {
        assert!(boolean("init", &json!("yes")).unwrap());
        assert!(!boolean("init", &json!(0)).unwrap());
        assert!(boolean("init", &json!("maybe")).is_err());
    }
}
