/// This module is used to parse and read from configuration files for the
/// server.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// This configuration object contains the database config.
#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    /// Database url, e.g. `sqlite://freeblog.db`.
    pub url: String,
    /// Maximum number of connections to the database.
    pub max_connections: u32,
}

/// Address the HTTP server binds to.
#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    /// Interface to listen on.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for Server {
    fn default() -> Self {
        Server {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Argon2 work factor used when hashing passwords and signatures.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Hashing {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of iterations.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for Hashing {
    fn default() -> Self {
        Hashing {
            m_cost: 4096,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

/// This configuration object contains the authentication config.
#[derive(Debug, Deserialize, Clone)]
pub struct Auth {
    /// Name of the cookie carrying `<userid>|<signature>`.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Adds the `Secure` attribute to the login cookie.
    #[serde(default)]
    pub secure_cookie: bool,
    /// The administrator's user id. Content of deleted accounts is handed
    /// over to this user.
    #[serde(default = "default_admin_id")]
    pub admin_id: i64,
    /// Password hashing work factor.
    #[serde(default)]
    pub hashing: Hashing,
}

fn default_cookie_name() -> String {
    "useridtok".to_string()
}

fn default_admin_id() -> i64 {
    1
}

impl Default for Auth {
    fn default() -> Self {
        Auth {
            cookie_name: default_cookie_name(),
            secure_cookie: false,
            admin_id: default_admin_id(),
            hashing: Hashing::default(),
        }
    }
}

/// Values shown by the rendered pages when nothing else is configured.
#[derive(Debug, Deserialize, Clone)]
pub struct Site {
    /// Title shown in the page heading.
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_title() -> String {
    "FreeBlog".to_string()
}

impl Default for Site {
    fn default() -> Self {
        Site {
            title: default_title(),
        }
    }
}

/// The app wide settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BaseSettings {
    /// The rust log parameter. Describes how much logging is wanted.
    pub rust_log: Option<String>,
}

/// This structure contains all the config parameters of the app.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Settings related to the database.
    pub database: Database,
    /// HTTP listener.
    #[serde(default)]
    pub server: Server,
    /// Authentication config.
    #[serde(default)]
    pub auth: Auth,
    /// Rendering defaults.
    #[serde(default)]
    pub site: Site,
    /// The app-wide config.
    #[serde(default)]
    pub base: BaseSettings,
}

impl Settings {
    /// Creates a new configuration form config files and environment variables.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(".env").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("freeblog").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Settings, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn should_fill_auth_and_site_defaults() {
        let settings = from_toml(
            r#"
            [database]
            url = "sqlite::memory:"
            max_connections = 1
            "#,
        )
        .unwrap();
        assert_eq!(settings.auth.cookie_name, "useridtok");
        assert_eq!(settings.auth.admin_id, 1);
        assert!(!settings.auth.secure_cookie);
        assert_eq!(settings.auth.hashing, Hashing::default());
        assert_eq!(settings.site.title, "FreeBlog");
        assert_eq!(settings.server.port, 8000);
        assert!(settings.base.rust_log.is_none());
    }

    #[test]
    fn should_read_hashing_work_factor() {
        let settings = from_toml(
            r#"
            [database]
            url = "sqlite://blog.db"
            max_connections = 4
            [server]
            port = 9000
            [auth]
            cookie_name = "tok"
            [auth.hashing]
            m_cost = 8192
            t_cost = 2
            p_cost = 1
            [base]
            rust_log = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(settings.auth.cookie_name, "tok");
        assert_eq!(settings.auth.hashing.m_cost, 8192);
        assert_eq!(settings.auth.hashing.t_cost, 2);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.base.rust_log.as_deref(), Some("debug"));
    }
}
