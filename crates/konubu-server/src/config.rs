use std::path::PathBuf;

use anyhow::{Context, bail};

/// Secrets shipped in example `.env` files.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub trigger_secret: String,
    pub fcm_project_id: String,
    pub fcm_access_token: String,
    pub storage_dir: PathBuf,
    pub android_channel: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = or("KONUBU_PORT", "3000")
            .parse::<u16>()
            .context("KONUBU_PORT must be a port number")?;

        Ok(Self {
            host: or("KONUBU_HOST", "0.0.0.0"),
            port,
            db_path: or("KONUBU_DB_PATH", "konubu.db").into(),
            jwt_secret: secret(&get, "KONUBU_JWT_SECRET")?,
            trigger_secret: secret(&get, "KONUBU_TRIGGER_SECRET")?,
            fcm_project_id: required(&get, "KONUBU_FCM_PROJECT_ID")?,
            fcm_access_token: required(&get, "KONUBU_FCM_ACCESS_TOKEN")?,
            storage_dir: or("KONUBU_STORAGE_DIR", "./storage").into(),
            android_channel: or("KONUBU_ANDROID_CHANNEL", "konubu_channel"),
        })
    }
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    match get(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("{} is unset", key),
    }
}

fn secret(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    let value = required(get, key)?;
    if PLACEHOLDER_SECRETS.contains(&value.as_str()) {
        bail!("{} is still a placeholder; set it in your .env file", key);
    }
    Ok(value)
}
