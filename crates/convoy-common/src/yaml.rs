//! YAML decoding on top of yaml-rust2
//!
//! Documents are loaded with yaml-rust2, converted to `serde_json::Value`,
//! then deserialized into typed structures with serde. Used for credential
//! blobs returned by the remote service and for reconciler configuration.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::Error;

/// Parse the first document of a YAML string into a `serde_json::Value`.
///
/// Returns `Value::Null` for empty input.
pub fn parse_yaml(input: &str) -> Result<Value, Error> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| Error::serialization(e.to_string()))?;
    docs.into_iter()
        .next()
        .map(yaml_to_json)
        .unwrap_or(Ok(Value::Null))
}

/// Decode a YAML document into `T`, tagging failures with the document kind.
pub fn from_yaml<T: DeserializeOwned>(input: &str, kind: &str) -> Result<T, Error> {
    let value = parse_yaml(input).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}

fn yaml_to_json(yaml: Yaml) -> Result<Value, Error> {
    let value = match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::Number(i.into()),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|_| Error::serialization(format!("invalid float '{s}'")))?;
            Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Hash(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (k, v) in entries {
                map.insert(yaml_key(k)?, yaml_to_json(v)?);
            }
            Value::Object(map)
        }
        Yaml::Alias(_) => return Err(Error::serialization("YAML aliases are not supported")),
        Yaml::BadValue => return Err(Error::serialization("bad YAML value")),
    };
    Ok(value)
}

fn yaml_key(key: Yaml) -> Result<String, Error> {
    match key {
        Yaml::String(s) | Yaml::Real(s) => Ok(s),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Boolean(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        _ => Err(Error::serialization("unsupported YAML key type")),
    }
}
