use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use shared::schema::ResourceSchema;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "listsync.toml";
const USERS_BASE_URL: &str = "http://bus-api.students.poridhi.io";
const PAYMENTS_BASE_URL: &str = "http://payment-api.students.poridhi.io";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: Option<String>,
    pub resource: String,
    pub log_filter: String,
    /// Replaces the built-in schema named by `resource`.
    pub schema: Option<ResourceSchema>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: None,
            resource: "users".into(),
            log_filter: "info".into(),
            schema: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub base_url: String,
    pub schema: ResourceSchema,
    pub log_filter: String,
}

impl Settings {
    pub fn with_overrides(mut self, base_url: Option<String>, resource: Option<String>) -> Self {
        if let Some(v) = base_url {
            self.base_url = Some(v);
        }
        if let Some(v) = resource {
            self.resource = v;
            // an explicitly chosen resource wins over a file-level schema
            self.schema = None;
        }
        self
    }

    pub fn resolve(self) -> anyhow::Result<ResolvedSettings> {
        let schema = match self.schema {
            Some(schema) => schema,
            None => ResourceSchema::builtin(&self.resource).ok_or_else(|| {
                anyhow!(
                    "unknown resource '{}'; expected 'users' or 'payments'",
                    self.resource
                )
            })?,
        };
        if schema.fields.is_empty() {
            bail!("resource '{}' declares no fields", schema.collection);
        }

        let raw_base_url = match self.base_url.as_deref() {
            Some(v) => v,
            None if schema.collection == "payments" => PAYMENTS_BASE_URL,
            None => USERS_BASE_URL,
        };

        Ok(ResolvedSettings {
            base_url: normalize_base_url(raw_base_url)?,
            schema,
            log_filter: self.log_filter,
        })
    }
}

pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

/// File first, then environment. `env` is injectable for tests.
pub fn load_settings_with(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = match path {
        Some(path) => read_settings_file(path)?,
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                read_settings_file(&default_path)?
            } else {
                Settings::default()
            }
        }
    };

    if let Some(v) = env("LISTSYNC_BASE_URL") {
        settings.base_url = Some(v);
    }
    if let Some(v) = env("APP__BASE_URL") {
        settings.base_url = Some(v);
    }

    // a resource chosen outside the file also replaces the file's schema
    if let Some(v) = env("LISTSYNC_RESOURCE") {
        settings.resource = v;
        settings.schema = None;
    }
    if let Some(v) = env("APP__RESOURCE") {
        settings.resource = v;
        settings.schema = None;
    }

    if let Some(v) = env("RUST_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    Ok(settings)
}

fn read_settings_file(path: &Path) -> anyhow::Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config file '{}'", path.display()))
}

pub fn normalize_base_url(raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("base url must not be empty");
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let normalized = with_scheme.trim_end_matches('/').to_string();

    let parsed =
        Url::parse(&normalized).with_context(|| format!("invalid base url '{raw}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("base url '{raw}' must use http or https");
    }
    Ok(normalized)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
