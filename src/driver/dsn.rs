//! Connection-string construction.

use std::fmt;

use crate::config::ConnectionConfig;

/// Time-parsing parameter that is always forced on.
pub const PARSE_TIME: &str = "parseTime";

/// A fully resolved connection string.
///
/// Renders as `user:password@address/database?k=v&parseTime=true`. Extra
/// parameters come out sorted by key (`ConnectionConfig::params` is a
/// `BTreeMap`), and a caller supplied `parseTime` is replaced by
/// `parseTime=true`.
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    database: String,
    address: String,
    username: String,
    password: String,
    params: Vec<(String, String)>,
}

impl Dsn {
    pub fn new(config: &ConnectionConfig) -> Self {
        let mut params: Vec<(String, String)> = config
            .params
            .iter()
            .filter(|(key, _)| key.as_str() != PARSE_TIME)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        params.push((PARSE_TIME.to_string(), "true".to_string()));

        Self {
            database: config.database.clone(),
            address: config.address.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            params,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Parameters in rendering order, `parseTime` last.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Connection string with the password masked, safe for logs.
    pub fn redacted(&self) -> String {
        self.render("***")
    }

    fn render(&self, password: &str) -> String {
        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!(
            "{}:{}@{}/{}?{}",
            self.username, password, self.address, self.database, query
        )
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&self.password))
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dsn").field(&self.redacted()).finish()
    }
}

impl From<&ConnectionConfig> for Dsn {
    fn from(config: &ConnectionConfig) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dsn_without_params() {
        let config = ConnectionConfig::new("app", "127.0.0.1:3306", "root", "pw");
        let dsn = Dsn::new(&config);
        assert_eq!(dsn.to_string(), "root:pw@127.0.0.1:3306/app?parseTime=true");
    }

    #[test]
    fn test_dsn_merges_params_and_forces_parse_time() {
        let config = ConnectionConfig::new("app", "db:3306", "u", "p")
            .with_param("parseTime", "false")
            .with_param("charset", "utf8mb4")
            .with_param("timeout", "5s");
        let dsn = Dsn::new(&config);
        assert_eq!(
            dsn.to_string(),
            "u:p@db:3306/app?charset=utf8mb4&timeout=5s&parseTime=true"
        );
        assert_eq!(dsn.param(PARSE_TIME), Some("true"));
    }

    #[test]
    fn test_params_render_in_key_order() {
        let config = ConnectionConfig::new("app", "db:3306", "u", "p")
            .with_param("timeout", "5s")
            .with_param("charset", "utf8mb4")
            .with_param("loc", "UTC");
        let dsn = Dsn::new(&config);
        assert_eq!(
            dsn.to_string(),
            "u:p@db:3306/app?charset=utf8mb4&loc=UTC&timeout=5s&parseTime=true"
        );
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ConnectionConfig::new("app", "db:3306", "u", "hunter2");
        let dsn = Dsn::new(&config);
        let shown = format!("{:?}", dsn);
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("u:***@db:3306/app"));
    }
}
