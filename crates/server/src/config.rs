use std::{collections::HashMap, fs};

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub public_url: Option<String>,
    pub session_secret: String,
    pub session_ttl_seconds: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/festiloc.db".into(),
            public_url: None,
            session_secret: "dev-session-secret".into(),
            session_ttl_seconds: 86_400,
        }
    }
}

/// Defaults, then the optional config file, then environment overrides.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    let config_path =
        std::env::var("FESTILOC_CONFIG").unwrap_or_else(|_| "server.toml".to_string());
    if let Ok(raw) = fs::read_to_string(&config_path) {
        apply_file_settings(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("FESTILOC_SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("FESTILOC_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("FESTILOC_PUBLIC_URL") {
        settings.public_url = Some(v);
    }
    if let Ok(v) = std::env::var("FESTILOC_SESSION_SECRET") {
        settings.session_secret = v;
    }
    if let Ok(v) = std::env::var("FESTILOC_SESSION_TTL_SECONDS") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.session_ttl_seconds = parsed;
        }
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };

    if let Some(v) = file_cfg.get("server_bind").and_then(|v| v.as_str()) {
        settings.server_bind = v.to_string();
    }
    if let Some(v) = file_cfg.get("database_url").and_then(|v| v.as_str()) {
        settings.database_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("public_url").and_then(|v| v.as_str()) {
        settings.public_url = Some(v.to_string());
    }
    if let Some(v) = file_cfg.get("session_secret").and_then(|v| v.as_str()) {
        settings.session_secret = v.to_string();
    }
    if let Some(v) = file_cfg.get("session_ttl_seconds").and_then(|v| v.as_integer()) {
        settings.session_ttl_seconds = v;
    }
}

/// Plain file paths are accepted and rewritten to `sqlite://` URLs; anything
/// already carrying a scheme passes through untouched.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plain_file_path_to_sqlite_url() {
        assert_eq!(
            normalize_database_url("./data/test.db"),
            "sqlite://./data/test.db"
        );
        assert_eq!(
            normalize_database_url("sqlite:.\\data\\test.db"),
            "sqlite://./data/test.db"
        );
    }

    #[test]
    fn urls_with_a_scheme_pass_through() {
        assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_database_url("sqlite:///var/lib/festiloc.db"),
            "sqlite:///var/lib/festiloc.db"
        );
    }

    #[test]
    fn empty_url_falls_back_to_the_default() {
        assert_eq!(
            normalize_database_url("   "),
            Settings::default().database_url
        );
    }

    #[test]
    fn file_settings_override_defaults() {
        let mut settings = Settings::default();
        apply_file_settings(
            &mut settings,
            r#"
server_bind = "0.0.0.0:9000"
public_url = "https://festiloc.example"
session_ttl_seconds = 600
"#,
        );
        assert_eq!(settings.server_bind, "0.0.0.0:9000");
        assert_eq!(
            settings.public_url.as_deref(),
            Some("https://festiloc.example")
        );
        assert_eq!(settings.session_ttl_seconds, 600);
        assert_eq!(settings.database_url, Settings::default().database_url);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let mut settings = Settings::default();
        apply_file_settings(&mut settings, "not [valid toml");
        assert_eq!(settings.server_bind, Settings::default().server_bind);
    }
}
