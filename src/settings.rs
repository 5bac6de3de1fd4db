use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "ENRICH";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Baserow,
    Sqlite,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: Backend,
    pub baserow: BaserowSettings,
    pub sqlite: SqliteSettings,
    pub catalogue: CatalogueSettings,
    pub scraper: ScraperSettings,
    pub checkpoint: CheckpointSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BaserowSettings {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub catalogue_table_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    pub path: Option<PathBuf>,
    pub table: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogueSettings {
    pub identifier_column: String,
}

impl Default for CatalogueSettings {
    fn default() -> Self {
        CatalogueSettings {
            identifier_column: "Marketplace ASIN/Product ID".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    pub domain: String,
    pub min_delay_seconds: f64,
    pub max_delay_seconds: f64,
    pub timeout_seconds: u64,
    /// 0 = no cap.
    pub max_items_to_scrape: usize,
    pub user_agent: String,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        ScraperSettings {
            domain: "amazon.in".into(),
            min_delay_seconds: 2.5,
            max_delay_seconds: 5.5,
            timeout_seconds: 15,
            max_items_to_scrape: 0,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    pub path: PathBuf,
    pub save_every: usize,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        CheckpointSettings {
            path: PathBuf::from("enrichment_checkpoint.json"),
            save_every: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: PathBuf,
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            dir: PathBuf::from("logs"),
            level: "info".into(),
        }
    }
}

/// Where the catalogue lives, resolved from a validated [`Settings`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreTarget {
    Baserow {
        base_url: String,
        api_token: String,
        table_id: u64,
    },
    Sqlite {
        path: PathBuf,
        table: String,
    },
}

impl Settings {
    /// Reads `path` (format from its extension), then `ENRICH__SECTION__KEY`
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store_target()?;

        if self.catalogue.identifier_column.trim().is_empty() {
            return Err(ConfigError::Missing("catalogue.identifier_column"));
        }
        let s = &self.scraper;
        if s.domain.trim().is_empty() {
            return Err(ConfigError::Missing("scraper.domain"));
        }
        if s.min_delay_seconds < 0.0 || s.min_delay_seconds > s.max_delay_seconds {
            return Err(ConfigError::Invalid(format!(
                "scraper delay window [{}, {}] is not a valid range",
                s.min_delay_seconds, s.max_delay_seconds
            )));
        }
        if s.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "scraper.timeout_seconds must be positive".into(),
            ));
        }
        if self.checkpoint.save_every == 0 {
            return Err(ConfigError::Invalid(
                "checkpoint.save_every must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn store_target(&self) -> Result<StoreTarget, ConfigError> {
        match self.backend {
            Backend::Baserow => {
                let b = &self.baserow;
                Ok(StoreTarget::Baserow {
                    base_url: non_blank(&b.base_url).ok_or(ConfigError::Missing("baserow.base_url"))?,
                    api_token: non_blank(&b.api_token)
                        .ok_or(ConfigError::Missing("baserow.api_token"))?,
                    table_id: b
                        .catalogue_table_id
                        .filter(|&id| id != 0)
                        .ok_or(ConfigError::Missing("baserow.catalogue_table_id"))?,
                })
            }
            Backend::Sqlite => {
                let s = &self.sqlite;
                Ok(StoreTarget::Sqlite {
                    path: s.path.clone().ok_or(ConfigError::Missing("sqlite.path"))?,
                    table: non_blank(&s.table).ok_or(ConfigError::Missing("sqlite.table"))?,
                })
            }
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
