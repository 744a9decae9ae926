use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use time::{Duration, UtcOffset};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Todlex";
const APP_NAME: &str = "todlex";

pub const MAX_RETENTION_DAYS: u32 = 36_500;
pub const MAX_ACTIVITY_DAYS: u32 = 366;

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn from_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("TODLEX_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("TODLEX_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let database_path = data_root.join("todlex.db");

        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_root.join("state"));
        let log_dir = state_dir.join("logs");

        Ok(Self {
            config_dir,
            config_file,
            data_dir: data_root,
            database_path,
            log_dir,
            state_dir,
        })
    }

    /// Lays every path out under `root`; used by tests and portable installs.
    pub fn rooted_at(root: &Path) -> Self {
        let config_dir = root.join("config");
        let data_dir = root.join("data");
        let state_dir = root.join("state");
        Self {
            config_file: config_dir.join("config.toml"),
            config_dir,
            database_path: data_dir.join("todlex.db"),
            data_dir,
            log_dir: state_dir.join("logs"),
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.log_dir,
            &self.state_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub board: BoardOptions,
    pub history: HistoryOptions,
    pub analytics: AnalyticsOptions,
    pub metadata: MetadataOptions,
    pub storage: StorageOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        if self.board.try_utc_offset().is_none() {
            tracing::warn!(
                minutes = self.board.utc_offset_minutes,
                "invalid board utc offset in config, falling back to UTC"
            );
            self.board.utc_offset_minutes = 0;
        }
        if self.history.max_entries == 0 {
            tracing::warn!("history.max_entries must be positive, using default");
            self.history.max_entries = HistoryOptions::default().max_entries;
        }
        if self.history.retention_days > MAX_RETENTION_DAYS {
            tracing::warn!(
                days = self.history.retention_days,
                max = MAX_RETENTION_DAYS,
                "history.retention_days too large, clamping"
            );
            self.history.retention_days = MAX_RETENTION_DAYS;
        }
        if self.analytics.activity_days > MAX_ACTIVITY_DAYS {
            tracing::warn!(
                days = self.analytics.activity_days,
                max = MAX_ACTIVITY_DAYS,
                "analytics.activity_days too large, clamping"
            );
            self.analytics.activity_days = MAX_ACTIVITY_DAYS;
        }
        if self.analytics.max_entries == 0 {
            tracing::warn!("analytics.max_entries must be positive, using default");
            self.analytics.max_entries = AnalyticsOptions::default().max_entries;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardOptions {
    /// Offset from UTC that defines the board's calendar day.
    pub utc_offset_minutes: i32,
}

impl Default for BoardOptions {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
        }
    }
}

impl BoardOptions {
    fn try_utc_offset(&self) -> Option<UtcOffset> {
        UtcOffset::from_whole_seconds(self.utc_offset_minutes.checked_mul(60)?).ok()
    }

    pub fn utc_offset(&self) -> UtcOffset {
        self.try_utc_offset().unwrap_or(UtcOffset::UTC)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryOptions {
    pub retention_days: u32,
    pub max_entries: usize,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            retention_days: 24,
            max_entries: 200,
        }
    }
}

impl HistoryOptions {
    pub fn retention(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsOptions {
    pub max_entries: usize,
    /// Width of the per-day activity window in the summary view.
    pub activity_days: u32,
}

impl Default for AnalyticsOptions {
    fn default() -> Self {
        Self {
            max_entries: 100,
            activity_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataOptions {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 8_000,
        }
    }
}

impl MetadataOptions {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
    /// Upper bound on the summed size of all stored values, in bytes.
    pub quota_bytes: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
            quota_bytes: 5 * 1024 * 1024,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_load_writes_default_config() -> Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::from_paths(ConfigPaths::rooted_at(temp.path()));

        let cfg = loader.load_or_init()?;
        assert!(loader.paths().config_file.exists());
        assert_eq!(cfg.history.retention_days, 24);
        assert_eq!(cfg.history.max_entries, 200);
        assert_eq!(cfg.analytics.max_entries, 100);
        assert_eq!(cfg.metadata.timeout_ms, 8_000);
        assert_eq!(cfg.storage.database_path, loader.paths().database_path);

        let reloaded = loader.load()?;
        assert_eq!(reloaded.history.retention_days, 24);
        Ok(())
    }

    #[test]
    fn invalid_offset_falls_back_to_utc() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[board]\nutc_offset_minutes = 100000\n\n[history]\nretention_days = 3\n",
        )?;

        let cfg = ConfigLoader::from_paths(paths).load()?;
        assert_eq!(cfg.board.utc_offset_minutes, 0);
        assert_eq!(cfg.board.utc_offset(), UtcOffset::UTC);
        assert_eq!(cfg.history.retention_days, 3);
        assert_eq!(cfg.history.max_entries, 200);
        Ok(())
    }

    #[test]
    fn oversized_day_windows_are_clamped() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[history]\nretention_days = 4294967295\n\n[analytics]\nactivity_days = 4294967295\n",
        )?;

        let cfg = ConfigLoader::from_paths(paths).load()?;
        assert_eq!(cfg.history.retention_days, MAX_RETENTION_DAYS);
        assert_eq!(cfg.analytics.activity_days, MAX_ACTIVITY_DAYS);
        Ok(())
    }

    #[test]
    fn offset_minutes_convert_to_utc_offset() {
        let options = BoardOptions {
            utc_offset_minutes: 330,
        };
        assert_eq!(options.utc_offset().whole_minutes(), 330);
    }
}
