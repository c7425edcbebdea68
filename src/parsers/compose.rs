//! Docker Compose manifest parsing

use super::{ManifestParser, ParseError};
use crate::model::BuildRef;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// The services declared by one manifest, in manifest order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeFile {
    pub services: Vec<(String, ComposeService)>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComposeService {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub build: Option<BuildRef>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub environment: Environment,
}

/// A `ports` entry in short (`"8080:80"`, `8080`) or long syntax
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    Number(u64),
    Short(String),
    Long {
        #[serde(default)]
        target: Option<Value>,
        #[serde(default)]
        published: Option<Value>,
    },
}

impl PortSpec {
    /// The host-side port as declared, before normalization
    pub fn host_token(&self) -> Option<String> {
        match self {
            PortSpec::Number(port) => Some(port.to_string()),
            PortSpec::Short(spec) => {
                let mut fields = spec.rsplitn(3, ':');
                let container = fields.next()?;
                Some(fields.next().unwrap_or(container).to_string())
            }
            PortSpec::Long { target, published } => published
                .as_ref()
                .or(target.as_ref())
                .and_then(scalar_to_string),
        }
    }
}

/// A service `environment` block as a mapping or a `KEY=VALUE` list
///
/// Mapping keys stay raw YAML so numeric or boolean keys stringify like
/// values do.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Environment {
    Map(Mapping),
    List(Vec<String>),
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Map(Mapping::new())
    }
}

impl Environment {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            Environment::Map(map) => map
                .iter()
                .filter_map(|(key, value)| {
                    let key = scalar_to_string(key)?;
                    Some((key, scalar_to_string(value).unwrap_or_default()))
                })
                .collect(),
            Environment::List(entries) => entries
                .iter()
                .map(|entry| match entry.split_once('=') {
                    Some((key, value)) => (key.to_string(), value.to_string()),
                    None => (entry.clone(), String::new()),
                })
                .collect(),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ComposeParser;

impl ComposeParser {
    pub fn new() -> Self {
        Self
    }
}

impl ManifestParser for ComposeParser {
    fn parse(&self, text: &str) -> Result<ComposeFile, ParseError> {
        if text.trim().is_empty() {
            return Ok(ComposeFile::default());
        }

        let document: Value = serde_yaml::from_str(text)?;

        let services = match document {
            Value::Null => return Ok(ComposeFile::default()),
            Value::Mapping(mut root) => match root.remove("services") {
                None | Some(Value::Null) => return Ok(ComposeFile::default()),
                Some(Value::Mapping(services)) => services,
                Some(_) => {
                    return Err(ParseError::InvalidManifest(
                        "'services' must be a mapping".to_string(),
                    ))
                }
            },
            _ => {
                return Err(ParseError::InvalidManifest(
                    "top level must be a mapping".to_string(),
                ))
            }
        };

        let mut parsed = Vec::with_capacity(services.len());
        for (key, body) in services {
            let name = scalar_to_string(&key).ok_or_else(|| {
                ParseError::InvalidManifest(format!("service key {:?} is not a scalar", key))
            })?;

            let service = match body {
                Value::Null => ComposeService::default(),
                body => serde_yaml::from_value(body).map_err(|e| ParseError::InvalidService {
                    service: name.clone(),
                    message: e.to_string(),
                })?,
            };

            parsed.push((name, service));
        }

        Ok(ComposeFile { services: parsed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ComposeFile {
        ComposeParser::new().parse(text).unwrap()
    }

    #[test]
    fn test_parse_services_in_order() {
        let compose = parse(
            r#"
version: "3.8"
services:
  web:
    image: nginx:latest
    ports:
      - "8080:80"
  db:
    image: postgres:16
  api:
    build: ./api
"#,
        );

        let names: Vec<&str> = compose.services.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["web", "db", "api"]);
        assert_eq!(compose.services[0].1.image.as_deref(), Some("nginx:latest"));
        assert_eq!(
            compose.services[2].1.build,
            Some(BuildRef::Context("./api".to_string()))
        );
    }

    #[test]
    fn test_port_spec_host_tokens() {
        let compose = parse(
            r#"
services:
  web:
    ports:
      - "8080:80"
      - "127.0.0.1:9090:90"
      - 3000
      - "5000/udp"
      - target: 80
        published: "8081"
      - target: 9000
"#,
        );

        let tokens: Vec<Option<String>> = compose.services[0]
            .1
            .ports
            .iter()
            .map(PortSpec::host_token)
            .collect();

        assert_eq!(
            tokens,
            vec![
                Some("8080".to_string()),
                Some("9090".to_string()),
                Some("3000".to_string()),
                Some("5000/udp".to_string()),
                Some("8081".to_string()),
                Some("9000".to_string()),
            ]
        );
    }

    #[test]
    fn test_environment_map_and_list() {
        let compose = parse(
            r#"
services:
  a:
    environment:
      X: "1"
      DEBUG: true
      WORKERS: 4
      EMPTY:
  b:
    environment:
      - FOO=bar
      - URL=postgres://u:p@db/x?a=b
      - BARE
"#,
        );

        let a = compose.services[0].1.environment.to_map();
        assert_eq!(a["X"], "1");
        assert_eq!(a["DEBUG"], "true");
        assert_eq!(a["WORKERS"], "4");
        assert_eq!(a["EMPTY"], "");

        let b = compose.services[1].1.environment.to_map();
        assert_eq!(b["FOO"], "bar");
        assert_eq!(b["URL"], "postgres://u:p@db/x?a=b");
        assert_eq!(b["BARE"], "");
    }

    #[test]
    fn test_environment_non_string_keys() {
        let compose = parse(
            r#"
services:
  legacy:
    image: app
    ports: ["8080"]
    environment:
      1: one
      true: yes-really
      NAME: value
"#,
        );

        assert_eq!(compose.services.len(), 1);
        let env = compose.services[0].1.environment.to_map();
        assert_eq!(env["1"], "one");
        assert_eq!(env["true"], "yes-really");
        assert_eq!(env["NAME"], "value");
    }

    #[test]
    fn test_missing_or_empty_services() {
        assert!(parse("").services.is_empty());
        assert!(parse("version: '3'").services.is_empty());
        assert!(parse("services:").services.is_empty());
    }

    #[test]
    fn test_service_without_body() {
        let compose = parse("services:\n  worker:\n");
        assert_eq!(compose.services.len(), 1);
        assert_eq!(compose.services[0].1, ComposeService::default());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ComposeParser::new().parse("services: [unterminated").unwrap_err();
        assert!(matches!(err, ParseError::Yaml(_)));
    }

    #[test]
    fn test_services_not_a_mapping() {
        let err = ComposeParser::new().parse("services:\n  - web").unwrap_err();
        assert!(matches!(err, ParseError::InvalidManifest(_)));
    }

    #[test]
    fn test_invalid_service_body() {
        let err = ComposeParser::new()
            .parse("services:\n  web:\n    ports: 8080\n")
            .unwrap_err();

        match err {
            ParseError::InvalidService { service, .. } => assert_eq!(service, "web"),
            other => panic!("Expected InvalidService, got {other:?}"),
        }
    }
}
