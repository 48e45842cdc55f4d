//! Server configuration.
//!
//! Loaded from a YAML file; every field has a default so the server also
//! runs with no file at all.

use crate::entities::Admin;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub listen: SocketAddr,

    /// Snapshot persistence settings.
    pub snapshot: SnapshotConfig,

    /// Seeded portal administrator.
    pub admin: AdminConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".parse().expect("valid default address"),
            snapshot: SnapshotConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.snapshot.enabled && self.snapshot.interval_secs == 0 {
            anyhow::bail!("snapshot.interval_secs must be at least 1");
        }
        if self.admin.username.is_empty() || self.admin.password.is_empty() {
            anyhow::bail!("admin.username and admin.password cannot be empty");
        }
        Ok(())
    }
}

/// Debounced snapshot persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SnapshotConfig {
    /// Disable to keep the dataset memory-only.
    pub enabled: bool,

    /// Snapshot file, rewritten wholesale on each changed tick.
    pub path: PathBuf,

    /// Writer interval. A crash can lose up to this many seconds of writes.
    pub interval_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("db.json"),
            interval_secs: 5,
        }
    }
}

/// Seed credentials for the portal administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
    pub name: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin123".to_string(),
            name: "Admin User".to_string(),
        }
    }
}

impl AdminConfig {
    /// Materialize the seeded admin entity.
    pub fn seed_admin(&self) -> Admin {
        Admin {
            id: "adm-0001".to_string(),
            name: self.name.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            role: "superadmin".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.listen.port(), 3000);
        assert_eq!(config.snapshot.interval_secs, 5);
        assert_eq!(config.admin.username, "admin");
    }

    #[test]
    fn parse_partial_yaml() {
        let yaml = r#"
listen: 127.0.0.1:8080
snapshot:
  path: /tmp/mock-studio.json
  interval_secs: 30
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.snapshot.path, PathBuf::from("/tmp/mock-studio.json"));
        assert_eq!(config.snapshot.interval_secs, 30);
        // Unspecified sections fall back to defaults.
        assert!(config.snapshot.enabled);
        assert_eq!(config.admin.password, "admin123");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let yaml = r#"
snapshot:
  interval_secs: 0
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_admin_credentials_are_rejected() {
        let yaml = r#"
admin:
  username: ""
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn seed_admin_carries_credentials() {
        let admin = AdminConfig::default().seed_admin();
        assert_eq!(admin.id, "adm-0001");
        assert_eq!(admin.role, "superadmin");
        assert_eq!(admin.username, "admin");
    }
}
