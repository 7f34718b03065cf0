//! Connection descriptors handed over by the resource registry.
//!
//! A descriptor may carry plaintext credentials. It lives only long enough
//! to build a connector; anything persisted goes through [`sanitize_attributes`].

use crate::error::{ConnectorError, Result};
use crate::kind::ResourceKind;
use serde_json::{Map, Value};
use std::fmt;

/// Connection attributes as delivered by the system-of-record.
pub type Attributes = Map<String, Value>;

/// Rewrites `localhost` hosts when the engine runs inside a container.
pub const LOCALHOST_ALIAS_ENV: &str = "ATLAS_LOCALHOST_ALIAS";

const SECRET_KEYS: &[&str] = &["password", "secret_key", "access_key", "token", "secret"];

#[derive(Clone)]
pub struct ConnectionDescriptor {
    pub kind: ResourceKind,
    /// Kind string as declared upstream, kept for display
    pub engine: String,
    attributes: Attributes,
}

impl ConnectionDescriptor {
    pub fn new(declared_kind: &str, attributes: Attributes) -> Result<Self> {
        Ok(Self {
            kind: ResourceKind::parse(declared_kind)?,
            engine: declared_kind.trim().to_lowercase(),
            attributes,
        })
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Attributes with every credential removed.
    pub fn sanitized(&self) -> Attributes {
        sanitize_attributes(&self.attributes)
    }

    /// String attribute; numbers are accepted and blanks count as missing.
    pub fn string_attr(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn bool_attr(&self, key: &str) -> Option<bool> {
        match self.attributes.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Array of strings, or a comma separated string.
    pub fn list_attr(&self, key: &str) -> Vec<String> {
        let raw: Vec<String> = match self.attributes.get(key) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// First present attribute among `keys`, or a configuration error naming the first.
    fn require(&self, keys: &[&str]) -> Result<String> {
        keys.iter()
            .find_map(|key| self.string_attr(key))
            .ok_or_else(|| {
                ConnectorError::configuration(format!(
                    "{} resource is missing required attribute '{}'",
                    self.kind, keys[0]
                ))
            })
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("kind", &self.kind)
            .field("engine", &self.engine)
            .field("attributes", &self.sanitized())
            .finish()
    }
}

pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SECRET_KEYS.contains(&key.as_str()) || key.contains("secret") || key.contains("password")
}

pub fn sanitize_attributes(attributes: &Attributes) -> Attributes {
    attributes
        .iter()
        .filter(|(key, _)| !is_secret_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

// ============================================================================
// Relational
// ============================================================================

#[derive(Clone)]
pub struct RelationalSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: Option<String>,
}

impl RelationalSettings {
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let host = descriptor.require(&["host"])?;
        let port_raw = descriptor.require(&["port"])?;
        let port = port_raw.parse::<u16>().map_err(|_| {
            ConnectorError::configuration(format!("invalid port '{}'", port_raw))
        })?;

        Ok(Self {
            host: normalize_host(&host, std::env::var(LOCALHOST_ALIAS_ENV).ok().as_deref()),
            port,
            username: descriptor.require(&["username", "user"])?,
            password: descriptor.require(&["password"])?,
            database: descriptor.require(&["database", "dbname"])?,
            ssl_mode: descriptor.string_attr("sslmode"),
        })
    }
}

impl fmt::Debug for RelationalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

fn normalize_host(host: &str, alias: Option<&str>) -> String {
    match alias.map(str::trim).filter(|a| !a.is_empty()) {
        Some(alias) if host == "localhost" || host == "127.0.0.1" => alias.to_string(),
        _ => host.to_string(),
    }
}

// ============================================================================
// Object Storage
// ============================================================================

#[derive(Clone)]
pub struct S3Settings {
    /// Endpoint URL including scheme
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub path_style: bool,
    /// Explicit allow-list; empty means "whatever ListBuckets returns"
    pub buckets: Vec<String>,
}

impl S3Settings {
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let endpoint = descriptor.require(&["endpoint"])?;
        let use_ssl = descriptor.bool_attr("use_ssl").unwrap_or(false);
        let endpoint = if endpoint.contains("://") {
            endpoint
        } else if use_ssl {
            format!("https://{}", endpoint)
        } else {
            format!("http://{}", endpoint)
        };

        let mut buckets = descriptor.list_attr("buckets");
        buckets.extend(descriptor.list_attr("bucket"));
        buckets.sort();
        buckets.dedup();

        Ok(Self {
            endpoint,
            access_key: descriptor.require(&["access_key"])?,
            secret_key: descriptor.require(&["secret_key"])?,
            region: descriptor
                .string_attr("region")
                .unwrap_or_else(|| "us-east-1".to_string()),
            path_style: descriptor.bool_attr("path_style").unwrap_or(true),
            buckets,
        })
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("path_style", &self.path_style)
            .field("buckets", &self.buckets)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_relational_settings_accept_numeric_port_and_user_alias() {
        let descriptor = ConnectionDescriptor::new(
            "postgresql",
            attrs(json!({
                "host": "db.internal",
                "port": 5432,
                "user": "reader",
                "password": "hunter2",
                "database": "warehouse"
            })),
        )
        .unwrap();

        let settings = RelationalSettings::from_descriptor(&descriptor).unwrap();
        assert_eq!(settings.port, 5432);
        assert_eq!(settings.username, "reader");
        assert_eq!(descriptor.engine, "postgresql");
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }

    #[test]
    fn test_missing_attribute_is_configuration_error() {
        let descriptor =
            ConnectionDescriptor::new("mysql", attrs(json!({"host": "db", "port": "3306"})))
                .unwrap();
        let err = RelationalSettings::from_descriptor(&descriptor).unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn test_sanitized_strips_credentials() {
        let descriptor = ConnectionDescriptor::new(
            "minio",
            attrs(json!({
                "endpoint": "minio:9000",
                "access_key": "AK",
                "secret_key": "SK",
                "db_password": "x",
                "bucket": "archive"
            })),
        )
        .unwrap();

        let clean = descriptor.sanitized();
        assert!(clean.contains_key("endpoint"));
        assert!(clean.contains_key("bucket"));
        assert!(!clean.contains_key("access_key"));
        assert!(!clean.contains_key("secret_key"));
        assert!(!clean.contains_key("db_password"));
        assert!(!format!("{:?}", descriptor).contains("SK"));
    }

    #[test]
    fn test_s3_settings_defaults_and_bucket_merge() {
        let descriptor = ConnectionDescriptor::new(
            "s3",
            attrs(json!({
                "endpoint": "minio:9000",
                "access_key": "AK",
                "secret_key": "SK",
                "bucket": "archive",
                "buckets": ["logs", "archive", " "]
            })),
        )
        .unwrap();

        let settings = S3Settings::from_descriptor(&descriptor).unwrap();
        assert_eq!(settings.endpoint, "http://minio:9000");
        assert_eq!(settings.region, "us-east-1");
        assert!(settings.path_style);
        assert_eq!(settings.buckets, vec!["archive".to_string(), "logs".to_string()]);
    }

    #[test]
    fn test_s3_settings_use_ssl() {
        let descriptor = ConnectionDescriptor::new(
            "oss",
            attrs(json!({
                "endpoint": "oss.example.com",
                "access_key": "AK",
                "secret_key": "SK",
                "use_ssl": "true"
            })),
        )
        .unwrap();
        let settings = S3Settings::from_descriptor(&descriptor).unwrap();
        assert_eq!(settings.endpoint, "https://oss.example.com");
        assert!(settings.buckets.is_empty());
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("localhost", Some("host.docker.internal")), "host.docker.internal");
        assert_eq!(normalize_host("db.internal", Some("host.docker.internal")), "db.internal");
        assert_eq!(normalize_host("127.0.0.1", None), "127.0.0.1");
    }
}
