use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, Context};
use shared::domain::ClusterId;
use tracing::warn;
use url::Url;

use crate::{error::FetchError, tabular::PartialLoadPolicy};

pub const DEFAULT_SETTINGS_FILE: &str = "dashboard.toml";
pub const DEFAULT_ROUTING_RANGE_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSettings {
    pub api_base_url: Url,
    pub data_files_url: Url,
    pub partial_load_policy: PartialLoadPolicy,
    pub routing_range_secs: i64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse("http://localhost:3001/").expect("static url"),
            data_files_url: Url::parse("http://localhost:3001/data-files/").expect("static url"),
            partial_load_policy: PartialLoadPolicy::Discard,
            routing_range_secs: DEFAULT_ROUTING_RANGE_SECS,
        }
    }
}

pub fn load_settings() -> anyhow::Result<DashboardSettings> {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then `path` (if readable), then environment overrides.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<DashboardSettings> {
    let mut settings = DashboardSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, &file_cfg)
                .with_context(|| format!("invalid settings in '{}'", path.display()))?,
            Err(err) => warn!(path = %path.display(), "ignoring unparseable settings file: {err}"),
        }
    }

    if let Some(v) = env("DASHBOARD_API_URL") {
        settings.api_base_url = parse_base_url(&v).context("DASHBOARD_API_URL")?;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = parse_base_url(&v).context("APP__API_BASE_URL")?;
    }

    if let Some(v) = env("DASHBOARD_DATA_URL") {
        settings.data_files_url = parse_base_url(&v).context("DASHBOARD_DATA_URL")?;
    }
    if let Some(v) = env("APP__DATA_FILES_URL") {
        settings.data_files_url = parse_base_url(&v).context("APP__DATA_FILES_URL")?;
    }

    if let Some(v) = env("APP__PARTIAL_LOAD_POLICY") {
        settings.partial_load_policy = v.parse().context("APP__PARTIAL_LOAD_POLICY")?;
    }

    if let Some(v) = env("APP__ROUTING_RANGE_SECS") {
        let parsed = v
            .trim()
            .parse::<i64>()
            .with_context(|| format!("invalid number '{v}'"))
            .and_then(positive_range)
            .context("APP__ROUTING_RANGE_SECS")?;
        settings.routing_range_secs = parsed;
    }

    Ok(settings)
}

fn apply_file_settings(
    settings: &mut DashboardSettings,
    file_cfg: &HashMap<String, toml::Value>,
) -> anyhow::Result<()> {
    if let Some(v) = file_cfg.get("api_base_url").and_then(toml::Value::as_str) {
        settings.api_base_url = parse_base_url(v)?;
    }
    if let Some(v) = file_cfg.get("data_files_url").and_then(toml::Value::as_str) {
        settings.data_files_url = parse_base_url(v)?;
    }
    if let Some(v) = file_cfg.get("partial_load_policy").and_then(toml::Value::as_str) {
        settings.partial_load_policy = v.parse()?;
    }
    if let Some(v) = file_cfg
        .get("routing_range_secs")
        .and_then(toml::Value::as_integer)
    {
        settings.routing_range_secs = positive_range(v).context("routing_range_secs")?;
    }
    Ok(())
}

fn positive_range(secs: i64) -> anyhow::Result<i64> {
    if secs <= 0 {
        return Err(anyhow!("routing range must be a positive number of seconds, got {secs}"));
    }
    Ok(secs)
}

/// Parses an http(s) base URL and makes sure relative joins append to its
/// path instead of replacing the last segment.
pub fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let raw = raw.trim();
    let mut url = Url::parse(raw).with_context(|| format!("invalid url '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("url '{raw}' must start with http:// or https://"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

impl DashboardSettings {
    pub fn config_url(&self) -> Result<Url, FetchError> {
        join(&self.api_base_url, "api/v1/config")
    }

    pub fn stats_url(&self) -> Result<Url, FetchError> {
        join(&self.api_base_url, "api/v1/stats")
    }

    pub fn status_url(&self) -> Result<Url, FetchError> {
        join(&self.api_base_url, "api/v1/status")
    }

    pub fn routing_url(&self) -> Result<Url, FetchError> {
        join(&self.api_base_url, "api/v1/routing")
    }

    pub fn clustered_stops_url(&self) -> Result<Url, FetchError> {
        join(&self.data_files_url, "tmp/stp/stops_clustered.csv")
    }

    pub fn transfer_patterns_url(&self, cluster: ClusterId) -> Result<Url, FetchError> {
        self.cluster_resource_url(cluster, "tp_vis.csv")
    }

    /// Per-cluster resource such as `lines_geo.arrow`.
    pub fn cluster_resource_url(&self, cluster: ClusterId, name: &str) -> Result<Url, FetchError> {
        join(
            &self.data_files_url,
            &format!("tmp/stp/clusters/{cluster}/{name}"),
        )
    }
}

fn join(base: &Url, path: &str) -> Result<Url, FetchError> {
    base.join(path).map_err(|source| FetchError::InvalidUrl {
        input: format!("{base}{path}"),
        source,
    })
}
