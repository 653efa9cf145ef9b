use anyhow::{Context, Result};
use std::{net::SocketAddr, path::PathBuf};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind: SocketAddr,
    pub paging: Paging,
}

/// Bounds applied to every history read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub default_size: u32,
    pub max_size: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_PAGE_SIZE,
            max_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl Paging {
    /// Resolve a requested (page, limit) pair into a 1-based page and a bounded size.
    pub fn resolve(&self, page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
        let page = page.unwrap_or(1).max(1);
        let size = limit
            .unwrap_or(self.default_size)
            .clamp(1, self.max_size.max(1));
        (page, size)
    }
}

impl Config {
    /// Build the configuration from the process environment.
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        let db_path = match std::env::var("PAIRCHAT_DB_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".into());
                PathBuf::from(home_dir).join(".pairchat").join("pairchat.db")
            }
        };

        let bind = std::env::var("PAIRCHAT_BIND")
            .unwrap_or_else(|_| "0.0.0.0:3000".into())
            .parse()
            .context("PAIRCHAT_BIND is not a valid socket address")?;

        let default_size = env_u32("PAIRCHAT_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        let max_size = env_u32("PAIRCHAT_MAX_PAGE_SIZE", DEFAULT_MAX_PAGE_SIZE)?;
        if default_size == 0 || max_size == 0 {
            anyhow::bail!("page sizes must be greater than zero");
        }

        Ok(Self {
            db_path,
            bind,
            paging: Paging {
                default_size: default_size.min(max_size),
                max_size,
            },
        })
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a positive integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
