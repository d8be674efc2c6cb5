//! # Master Server Library
//!
//! This library implements a UDP master server: the directory game servers
//! announce themselves to and game clients query to find something to join.
//!
//! ## Core Responsibilities
//!
//! ### Server Registry
//! Game servers register by sending a single-byte request from the address
//! they serve on, and deregister with a two-byte request when they shut down.
//! The registry keeps them in insertion order, deduplicated by endpoint.
//!
//! ### Paginated Listing
//! Clients ask for the list page by page. Each query names the last server the
//! client already has (or `0.0.0.0:0` to start over), and the reply carries the
//! next page of packed 6-byte endpoints. A short page ends with six zero bytes.
//!
//! ### Extension Hooks
//! [`engine::RequestHooks`] lets an embedding application veto requests before
//! dispatch and handle opcodes the protocol does not define.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Poll Loop
//! One task reads a datagram, dispatches it, and sends the reply before reading
//! the next. Receives give up after one second so the loop can notice shutdown.
//! The engine owns the registry outright, which keeps insertion order and
//! deduplication intact without locking.
//!
//! ### Trust Model
//! The protocol is unauthenticated. A server is identified by nothing more than
//! the source address of its datagrams.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! Ordered endpoint list with idempotent add, remove and cursor-based pages.
//!
//! ### Engine Module (`engine`)
//! Opcode classification, query parsing, reply encoding and the hook trait.
//!
//! ### Network Module (`network`)
//! Socket setup (`SO_REUSEADDR`, receive timeout) and the poll loop.
//!
//! ### Config and Error Modules (`config`, `error`)
//! Validated construction-time settings and the fatal error type.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::MasterServer;
//! use std::net::Ipv4Addr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Ten servers per page, every game id accepted
//!     let config = ServerConfig::new(true, 10, 0)?;
//!     let mut server = MasterServer::new(config);
//!
//!     server.create(Ipv4Addr::UNSPECIFIED, 27010)?;
//!     server.engine_mut().registry_mut().add("203.0.113.7:27015");
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod network;
pub mod registry;
