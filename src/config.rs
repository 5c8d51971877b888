use serde::{Deserialize, Serialize};

use crate::file::{DEFAULT_BUFFER_POOL_PAGES, DEFAULT_PAGE_SIZE};

/// Engine parameters fixed for the lifetime of a [`Database`](crate::database::Database)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Bytes per page, identical for every table
    pub page_size: usize,
    /// Buffer pool capacity in pages
    pub buffer_pool_pages: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_BUFFER_POOL_PAGES,
        }
    }
}

impl DatabaseConfig {
    /// Apply command-line overrides on top of this config
    pub fn with_overrides(self, page_size: Option<usize>, buffer_pool_pages: Option<usize>) -> Self {
        Self {
            page_size: page_size.unwrap_or(self.page_size),
            buffer_pool_pages: buffer_pool_pages.unwrap_or(self.buffer_pool_pages),
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page_size must be positive".to_string());
        }
        if self.buffer_pool_pages == 0 {
            return Err("buffer_pool_pages must be positive".to_string());
        }
        Ok(())
    }
}
