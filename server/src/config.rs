//! Construction-time settings of the master server

use crate::error::{MasterServerError, Result};
use shared::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Immutable once built; every constructor validates the page size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    allow_registration: bool,
    allow_deregistration: Option<bool>,
    page_size: usize,
    game_filter: u32,
}

impl ServerConfig {
    /// `game_filter` of 0 answers queries for every game.
    pub fn new(allow_registration: bool, page_size: usize, game_filter: u32) -> Result<Self> {
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(MasterServerError::InvalidPageSize(page_size));
        }

        Ok(Self {
            allow_registration,
            allow_deregistration: None,
            page_size,
            game_filter,
        })
    }

    /// Gates shutdown requests separately from registration. Without this,
    /// deregistration follows the registration flag.
    pub fn with_deregistration(mut self, allow: bool) -> Self {
        self.allow_deregistration = Some(allow);
        self
    }

    pub fn allow_registration(&self) -> bool {
        self.allow_registration
    }

    pub fn allow_deregistration(&self) -> bool {
        self.allow_deregistration.unwrap_or(self.allow_registration)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn game_filter(&self) -> u32 {
        self.game_filter
    }

    /// Whether a query for `game_id` should be answered.
    pub fn accepts_game(&self, game_id: Option<u32>) -> bool {
        self.game_filter == 0 || game_id == Some(self.game_filter)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allow_registration: true,
            allow_deregistration: None,
            page_size: DEFAULT_PAGE_SIZE,
            game_filter: 0,
        }
    }
}
