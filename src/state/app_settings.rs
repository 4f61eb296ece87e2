use crate::session::Role;
use log::{LevelFilter, warn};
use matchday_api::client::DEFAULT_BASE_URL;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_POLL_SECS: u64 = 30;
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    pub api_url: String,
    pub api_token: Option<String>,
    pub actor: String,
    pub role: Role,
    pub poll_interval: Duration,
    pub write_timeout: Duration,
    pub log_level: Option<LevelFilter>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_BASE_URL.to_string(),
            api_token: None,
            actor: "scorer".to_string(),
            role: Role::Viewer,
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            log_level: None,
        }
    }
}

/// Optional `settings.json`; every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FileSettings {
    api_url: Option<String>,
    api_token: Option<String>,
    actor: Option<String>,
    role: Option<String>,
    poll_secs: Option<u64>,
    write_timeout_secs: Option<u64>,
    log_level: Option<String>,
}

impl AppSettings {
    /// Defaults, then the settings file, then `MATCHDAY_*` environment variables.
    pub fn load() -> Self {
        let file = read_file(&settings_path());
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve(file: Option<FileSettings>, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(user) = env("USER").filter(|u| !u.trim().is_empty()) {
            settings.actor = user;
        }

        let file = file.unwrap_or_default();
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = env("MATCHDAY_API_URL").or(file.api_url) {
            settings.api_url = url;
        }
        settings.api_token = env("MATCHDAY_API_TOKEN").or(file.api_token);
        if let Some(actor) = env("MATCHDAY_ACTOR").or(file.actor) {
            settings.actor = actor;
        }
        if let Some(role) = env("MATCHDAY_ROLE").or(file.role) {
            match Role::parse(&role) {
                Some(role) => settings.role = role,
                None => warn!("ignoring unknown role {role:?}"),
            }
        }
        if let Some(secs) = seconds(env("MATCHDAY_POLL_SECS"), file.poll_secs) {
            settings.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = seconds(env("MATCHDAY_WRITE_TIMEOUT_SECS"), file.write_timeout_secs) {
            settings.write_timeout = Duration::from_secs(secs);
        }
        if let Some(level) = env("MATCHDAY_LOG").or(file.log_level) {
            match level.parse::<LevelFilter>() {
                Ok(level) => settings.log_level = Some(level),
                Err(_) => warn!("ignoring unknown log level {level:?}"),
            }
        }
        settings
    }
}

/// Zero and unparsable values fall through to the default.
fn seconds(env: Option<String>, file: Option<u64>) -> Option<u64> {
    env.and_then(|v| v.parse::<u64>().ok())
        .or(file)
        .filter(|secs| *secs > 0)
}

fn read_file(path: &Path) -> Option<FileSettings> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<FileSettings>(&content) {
        Ok(file) => Some(file),
        Err(e) => {
            warn!("{}: invalid settings json: {e}", path.display());
            None
        }
    }
}

fn settings_path() -> PathBuf {
    if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME")
        && !config_dir.trim().is_empty()
    {
        return PathBuf::from(config_dir).join("matchday").join("settings.json");
    }
    if let Ok(home) = std::env::var("HOME")
        && !home.trim().is_empty()
    {
        return PathBuf::from(home)
            .join(".config")
            .join("matchday")
            .join("settings.json");
    }
    PathBuf::from("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let settings = AppSettings::resolve(None, env_of(&[]));
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.role, Role::Viewer);
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.write_timeout, Duration::from_secs(12));
    }

    #[test]
    fn environment_overrides_the_file() {
        let file: FileSettings = serde_json::from_str(
            r#"{"apiUrl":"http://file/api","role":"scorer","actor":"Kim","pollSecs":10}"#,
        )
        .unwrap();
        let settings = AppSettings::resolve(
            Some(file),
            env_of(&[("MATCHDAY_ROLE", "management"), ("MATCHDAY_LOG", "debug"), ("USER", "root")]),
        );
        assert_eq!(settings.api_url, "http://file/api");
        assert_eq!(settings.role, Role::Management);
        assert_eq!(settings.actor, "Kim");
        assert_eq!(settings.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.log_level, Some(LevelFilter::Debug));
    }

    #[test]
    fn bad_values_are_ignored() {
        let settings = AppSettings::resolve(
            None,
            env_of(&[
                ("MATCHDAY_ROLE", "referee"),
                ("MATCHDAY_POLL_SECS", "0"),
                ("MATCHDAY_WRITE_TIMEOUT_SECS", "soon"),
                ("MATCHDAY_API_TOKEN", "  "),
            ]),
        );
        assert_eq!(settings.role, Role::Viewer);
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.write_timeout, Duration::from_secs(12));
        assert_eq!(settings.api_token, None);
    }

    #[test]
    fn user_names_the_actor_by_default() {
        let settings = AppSettings::resolve(None, env_of(&[("USER", "sam")]));
        assert_eq!(settings.actor, "sam");
    }
}
