//! Ordered directory of registered game servers
//!
//! This module keeps the list the master server hands out to clients:
//! - Registration keyed by the textual endpoint, deduplicated
//! - Insertion order preserved, since it is the pagination order
//! - Cursor-based pages resumed from the last endpoint a client saw
//!
//! Entries are stored already packed into their 6-byte wire form so a page
//! can be copied straight into a reply.

use log::{debug, info};
use shared::{match_endpoint, PackedEndpoint, CURSOR_START};
use std::collections::HashSet;

/// A registered server and its wire encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Endpoint text the server was registered under, e.g. `10.0.0.1:27015`
    pub key: String,
    /// Address and port packed for replies
    pub packed: PackedEndpoint,
}

/// Insertion-ordered set of registered servers
///
/// A key appears at most once. Removing and re-adding a server moves it to
/// the end of the order.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
    keys: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a server by its endpoint text
    ///
    /// Returns true only if a new entry was appended. Already registered
    /// servers keep their position, and text that does not contain a
    /// `d.d.d.d:port` run is dropped without an error.
    pub fn add(&mut self, server: &str) -> bool {
        let server = server.trim();

        if self.keys.contains(server) {
            return false;
        }

        let Some(found) = match_endpoint(server) else {
            debug!("Ignoring malformed server endpoint {:?}", server);
            return false;
        };

        self.entries.push(RegistryEntry {
            key: server.to_string(),
            packed: found.pack(),
        });
        self.keys.insert(server.to_string());
        info!("Server {} registered ({} total)", server, self.entries.len());

        true
    }

    /// Registers every server in order, returning how many were new
    pub fn add_all<I, S>(&mut self, servers: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        servers
            .into_iter()
            .filter(|server| self.add(server.as_ref()))
            .count()
    }

    /// Removes a server, returning false if it was not registered
    pub fn remove(&mut self, server: &str) -> bool {
        if !self.keys.remove(server) {
            return false;
        }

        self.entries.retain(|entry| entry.key != server);
        info!("Server {} removed ({} total)", server, self.entries.len());
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }

    /// Returns up to `page_size` packed entries following `after`
    ///
    /// `0.0.0.0:0` starts at the first entry. An unknown cursor yields an
    /// empty page. A page shorter than `page_size` means the list is
    /// exhausted; signalling that to the client is left to the caller.
    pub fn page(&self, after: &str, page_size: usize) -> Vec<PackedEndpoint> {
        let start = if after == CURSOR_START {
            0
        } else {
            match self.position(after) {
                Some(index) => index + 1,
                None => return Vec::new(),
            }
        };

        self.entries
            .iter()
            .skip(start)
            .take(page_size)
            .map(|entry| entry.packed)
            .collect()
    }

    fn position(&self, server: &str) -> Option<usize> {
        if !self.keys.contains(server) {
            return None;
        }
        self.entries.iter().position(|entry| entry.key == server)
    }

    pub fn contains(&self, server: &str) -> bool {
        self.keys.contains(server)
    }

    /// Registered endpoint texts in pagination order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
