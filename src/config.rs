use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Matching-engine knobs. The score thresholds are empirically tuned
/// values inherited from production data; they are kept configurable
/// rather than re-derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum total score a candidate must reach to auto-match.
    pub min_score: u32,

    /// Word-overlap ratio for a full name match.
    pub name_threshold: f64,

    /// Looser ratio granting partial name credit during scoring.
    pub name_partial_threshold: f64,

    /// Candidate credits are taken from +/- this window around the
    /// receipt's declared timestamp.
    pub candidate_window_hours: i64,

    /// Candidate pool cap, nearest-in-time first, to bound scoring cost.
    pub candidate_limit: usize,

    /// Correction applied to timestamps of batch-imported credits before
    /// time-proximity scoring. Compensates a recording bug in historical
    /// imports; review with stakeholders before relying on it for new data.
    pub import_clock_skew_hours: i64,

    /// Two receipts with the same identity and amount inside this window
    /// are treated as one submission.
    pub duplicate_window_minutes: i64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_score: 50,
            name_threshold: 0.8,
            name_partial_threshold: 0.6,
            candidate_window_hours: 24,
            candidate_limit: 10,
            import_clock_skew_hours: -3,
            duplicate_window_minutes: 5,
        }
    }
}

/// Release-schedule knobs. All wall-clock rules run in a single fixed
/// business timezone expressed as a UTC offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub business_utc_offset_hours: i32,

    /// Credits received at or after this local hour count from the next day.
    pub cutoff_hour: u32,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            business_utc_offset_hours: -3,
            cutoff_hour: 15,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub release: ReleaseConfig,

    /// Pending receipts older than this many days may be expired by the
    /// explicit `receipt expire` command. None means receipts pend forever.
    #[serde(default)]
    pub receipt_expiry_days: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

pub fn app_paths(override_home: Option<PathBuf>) -> Result<AppPaths> {
    if let Some(home) = override_home {
        return Ok(AppPaths {
            config_dir: home.join("config"),
            data_dir: home.join("data"),
        });
    }

    let proj = ProjectDirs::from("com", "concilia", "concilia")
        .context("Failed to resolve platform directories")?;

    Ok(AppPaths {
        config_dir: proj.config_dir().to_path_buf(),
        data_dir: proj.data_dir().to_path_buf(),
    })
}

pub fn load_or_init_config(paths: &AppPaths) -> Result<(AppConfig, PathBuf)> {
    fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("Failed to create config dir {}", paths.config_dir.display()))?;

    let cfg_path = paths.config_dir.join("config.json");
    if !cfg_path.exists() {
        let cfg = AppConfig::default();
        write_config(&cfg_path, &cfg)?;
        return Ok((cfg, cfg_path));
    }

    let raw = fs::read_to_string(&cfg_path)
        .with_context(|| format!("Failed to read {}", cfg_path.display()))?;
    let cfg: AppConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", cfg_path.display()))?;

    Ok((cfg, cfg_path))
}

pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
