//! # Master Server Client Library
//!
//! Client side of the master server protocol, used both by game servers that
//! announce themselves and by players browsing for a game.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! [`network::MasterClient`] owns a UDP socket pointed at one master server:
//! - `register` / `deregister` announce or withdraw the socket's own address
//! - `query_page` fetches one page of the server list
//! - `query_all` follows cursors until the list is exhausted
//!
//! ### Error Module (`error`)
//! Socket failures, malformed replies and reply timeouts.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::MasterClient;
//! use shared::{Endpoint, QueryRequest};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MasterClient::new("127.0.0.1:27010", Duration::from_secs(3)).await?;
//!
//!     // Start from the top of the list, any game
//!     let request = QueryRequest::new(Endpoint::UNSPECIFIED, 0);
//!     for server in client.query_all(&request, None).await? {
//!         println!("{}", server);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! The master only replies to queries, so there is no way to confirm a
//! registration other than finding the address in a later listing.

pub mod error;
pub mod network;
