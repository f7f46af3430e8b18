use crate::{BrowseError, PageIndexStrategy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_items_per_page() -> u32 {
    20
}

fn default_pager_neighbours() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,

    #[serde(default)]
    pub page_index_strategy: PageIndexStrategy,

    /// Pages shown either side of the current one in the page selector.
    #[serde(default = "default_pager_neighbours")]
    pub pager_neighbours: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
            page_index_strategy: PageIndexStrategy::default(),
            pager_neighbours: default_pager_neighbours(),
        }
    }
}

impl BrowserConfig {
    pub fn with_items_per_page(mut self, items_per_page: u32) -> Self {
        self.items_per_page = items_per_page;
        self
    }

    pub fn with_strategy(mut self, strategy: PageIndexStrategy) -> Self {
        self.page_index_strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<(), BrowseError> {
        if self.items_per_page == 0 {
            return Err(BrowseError::InvalidPageSize(self.items_per_page));
        }
        Ok(())
    }
}

pub struct BrowserConfigStore {
    path: PathBuf,
}

impl BrowserConfigStore {
    pub fn new() -> Result<Self, BrowseError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| BrowseError::Config("Could not find config directory".to_string()))?;

        Ok(Self {
            path: config_dir.join("dbrowser").join("config.json"),
        })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing file means defaults.
    pub fn load(&self) -> Result<BrowserConfig, BrowseError> {
        if !self.path.exists() {
            return Ok(BrowserConfig::default());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| BrowseError::Config(e.to_string()))?;
        let config: BrowserConfig =
            serde_json::from_str(&content).map_err(|e| BrowseError::Config(e.to_string()))?;
        config.validate()?;

        log::debug!("Loaded browser config from {}", self.path.display());
        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
