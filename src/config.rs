use std::env;
use std::net::SocketAddr;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    /// `None` when `KAFKA_BROKER_ADDRESS` is unset; the queue consumer is then not started.
    pub kafka: Option<KafkaSettings>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let bind_addr = parse_or("BIND_ADDR", var("BIND_ADDR"), SocketAddr::from(([0, 0, 0, 0], 8080)))?;
        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", var("DB_MAX_CONNECTIONS"), 5)?;
        let run_migrations = match var("RUN_MIGRATIONS") {
            None => true,
            Some(v) => parse_flag("RUN_MIGRATIONS", &v)?,
        };
        let kafka = var("KAFKA_BROKER_ADDRESS").map(|brokers| KafkaSettings {
            brokers,
            topic: var("KAFKA_TOPIC_NAME").unwrap_or_else(|| "feedback".into()),
            group_id: var("KAFKA_GROUP_ID").unwrap_or_else(|| "feedback-service".into()),
        });

        Ok(Self { database_url, bind_addr, db_max_connections, run_migrations, kafka })
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { name, value: value.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let s = settings(&[("DATABASE_URL", "postgres://localhost/feedback")]).unwrap();
        assert_eq!(s.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(s.db_max_connections, 5);
        assert!(s.run_migrations);
        assert!(s.kafka.is_none());
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(settings(&[]), Err(ConfigError::Missing("DATABASE_URL")));
        assert_eq!(settings(&[("DATABASE_URL", "  ")]), Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn kafka_enabled_by_broker_address() {
        let s = settings(&[
            ("DATABASE_URL", "postgres://localhost/feedback"),
            ("KAFKA_BROKER_ADDRESS", "kafka:9092"),
            ("KAFKA_TOPIC_NAME", "feedback-events"),
        ])
        .unwrap();
        let kafka = s.kafka.unwrap();
        assert_eq!(kafka.brokers, "kafka:9092");
        assert_eq!(kafka.topic, "feedback-events");
        assert_eq!(kafka.group_id, "feedback-service");
    }

    #[test]
    fn bad_values_are_reported() {
        let err = settings(&[("DATABASE_URL", "x"), ("DB_MAX_CONNECTIONS", "many")]).unwrap_err();
        assert_eq!(err, ConfigError::Invalid { name: "DB_MAX_CONNECTIONS", value: "many".into() });
        let err = settings(&[("DATABASE_URL", "x"), ("RUN_MIGRATIONS", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "RUN_MIGRATIONS", .. }));
        assert!(!settings(&[("DATABASE_URL", "x"), ("RUN_MIGRATIONS", "0")]).unwrap().run_migrations);
    }
}
