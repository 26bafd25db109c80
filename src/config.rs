use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, Result};

pub const PRODUCTION_BASE_URL: &str = "https://nexpathbackend-1.onrender.com";
pub const LOCAL_BASE_URL: &str = "http://localhost:8000";

pub const BASE_URL_VAR: &str = "ASHA_API_BASE_URL";
pub const BASE_URL_FALLBACK_VAR: &str = "ASHA_API_URL";
pub const AUTH_DELAY_VAR: &str = "ASHA_AUTH_PROMPT_DELAY_SECS";
pub const SPEECH_COMMAND_VAR: &str = "ASHA_SPEECH_COMMAND";

const DEFAULT_AUTH_PROMPT_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub data_dir: PathBuf,
    pub auth_prompt_delay: Duration,
    /// External transcription command; `None` means no speech capability.
    pub speech_command: Option<String>,
}

impl Config {
    pub fn from_env(base_url_flag: Option<&str>, location: Option<&Url>) -> Result<Self> {
        Self::resolve(|key| std::env::var(key).ok(), base_url_flag, location)
    }

    /// Resolution with an injectable variable lookup so it can be exercised
    /// without touching the process environment.
    pub fn resolve<F>(lookup: F, base_url_flag: Option<&str>, location: Option<&Url>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = resolve_base_url(&lookup, base_url_flag, location)?;

        let auth_prompt_delay = match lookup(AUTH_DELAY_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ClientError::Config(format!("{} must be whole seconds, got '{}'", AUTH_DELAY_VAR, raw)))?,
            None => DEFAULT_AUTH_PROMPT_DELAY,
        };

        let speech_command = lookup(SPEECH_COMMAND_VAR).filter(|cmd| !cmd.trim().is_empty());

        Ok(Self {
            base_url,
            data_dir: default_data_dir(),
            auth_prompt_delay,
            speech_command,
        })
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("asha.db")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("asha.log")
    }
}

fn resolve_base_url<F>(lookup: &F, flag: Option<&str>, location: Option<&Url>) -> Result<Url>
where
    F: Fn(&str) -> Option<String>,
{
    let explicit = flag
        .map(str::to_string)
        .or_else(|| lookup(BASE_URL_VAR))
        .or_else(|| lookup(BASE_URL_FALLBACK_VAR))
        .filter(|raw| !raw.trim().is_empty());

    let raw = match explicit {
        Some(raw) => raw,
        None => {
            let on_vercel = location
                .and_then(|url| url.host_str())
                .is_some_and(|host| host.ends_with("vercel.app"));
            if on_vercel {
                PRODUCTION_BASE_URL.to_string()
            } else {
                LOCAL_BASE_URL.to_string()
            }
        }
    };

    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(trimmed).map_err(|e| ClientError::Config(format!("invalid base URL '{}': {}", trimmed, e)))
}

fn default_data_dir() -> PathBuf {
    // XDG data directory, falling back to the working directory
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "asha") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_flag_wins_over_env() {
        let config = Config::resolve(
            lookup_from(&[(BASE_URL_VAR, "http://env.example")]),
            Some("http://flag.example/"),
            None,
        )
        .unwrap();
        assert_eq!(config.base_url.as_str(), "http://flag.example/");
    }

    #[test]
    fn test_secondary_env_name_used_when_primary_missing() {
        let config = Config::resolve(lookup_from(&[(BASE_URL_FALLBACK_VAR, "http://api.example")]), None, None).unwrap();
        assert_eq!(config.base_url.host_str(), Some("api.example"));
    }

    #[test]
    fn test_fallback_depends_on_location() {
        let hosted = Url::parse("https://asha.vercel.app/chat").unwrap();
        let config = Config::resolve(lookup_from(&[]), None, Some(&hosted)).unwrap();
        assert_eq!(config.base_url.host_str(), Some("nexpathbackend-1.onrender.com"));

        let config = Config::resolve(lookup_from(&[]), None, None).unwrap();
        assert_eq!(config.base_url.as_str(), "http://localhost:8000/");
    }

    #[test]
    fn test_auth_delay_parsing() {
        let config = Config::resolve(lookup_from(&[(AUTH_DELAY_VAR, "3")]), None, None).unwrap();
        assert_eq!(config.auth_prompt_delay, Duration::from_secs(3));

        let config = Config::resolve(lookup_from(&[]), None, None).unwrap();
        assert_eq!(config.auth_prompt_delay, DEFAULT_AUTH_PROMPT_DELAY);

        assert!(Config::resolve(lookup_from(&[(AUTH_DELAY_VAR, "soon")]), None, None).is_err());
    }

    #[test]
    fn test_blank_speech_command_is_none() {
        let config = Config::resolve(lookup_from(&[(SPEECH_COMMAND_VAR, "  ")]), None, None).unwrap();
        assert!(config.speech_command.is_none());
    }
}
