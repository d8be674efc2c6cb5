//! Request dispatch for the master server protocol
//!
//! Every datagram is handled on its own: there are no sessions, and the only
//! state carried between requests is the registry owned by the engine.

use crate::config::ServerConfig;
use crate::registry::Registry;
use log::debug;
use shared::{Endpoint, Opcode, QueryReply, QueryRequest};

/// A datagram as received, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub sender: Endpoint,
    pub payload: Vec<u8>,
}

impl IncomingRequest {
    pub fn new(sender: Endpoint, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            sender,
            payload: payload.into(),
        }
    }
}

/// A datagram to send back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReply {
    pub destination: Endpoint,
    pub payload: Vec<u8>,
}

/// Extension points around dispatch
///
/// Both methods have defaults, so an implementation only overrides what it
/// needs: e.g. a ban list in `before_processing`, or a custom opcode in
/// `request_unprocessed`.
pub trait RequestHooks {
    /// Returning false drops the request before it is classified.
    fn before_processing(&mut self, _request: &IncomingRequest) -> bool {
        true
    }

    /// Called for payloads that are not a register, shutdown or query.
    fn request_unprocessed(&mut self, _request: &IncomingRequest) {}
}

/// Hooks that allow everything and ignore unknown requests
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl RequestHooks for DefaultHooks {}

pub struct ProtocolEngine<H: RequestHooks = DefaultHooks> {
    config: ServerConfig,
    registry: Registry,
    hooks: H,
}

impl ProtocolEngine<DefaultHooks> {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_hooks(config, DefaultHooks)
    }
}

impl<H: RequestHooks> ProtocolEngine<H> {
    pub fn with_hooks(config: ServerConfig, hooks: H) -> Self {
        Self {
            config,
            registry: Registry::new(),
            hooks,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Direct access for preloading or clearing the server list
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Processes one datagram, returning the reply to send if there is one
    ///
    /// Only queries are answered. Register and shutdown are fire-and-forget,
    /// and anything malformed or filtered out is dropped silently.
    pub fn handle(&mut self, request: &IncomingRequest) -> Option<OutgoingReply> {
        if !self.hooks.before_processing(request) {
            debug!("Request from {} rejected before processing", request.sender);
            return None;
        }

        match Opcode::classify(&request.payload) {
            Opcode::Register => {
                if self.config.allow_registration() {
                    self.registry.add(&request.sender.to_string());
                } else {
                    debug!("Registration from {} refused", request.sender);
                }
                None
            }

            Opcode::Shutdown => {
                if self.config.allow_deregistration() {
                    self.registry.remove(&request.sender.to_string());
                } else {
                    debug!("Deregistration from {} refused", request.sender);
                }
                None
            }

            Opcode::Query => self.handle_query(request),

            Opcode::Unrecognized => {
                debug!(
                    "Unrecognized {} byte request from {}",
                    request.payload.len(),
                    request.sender
                );
                self.hooks.request_unprocessed(request);
                None
            }
        }
    }

    fn handle_query(&mut self, request: &IncomingRequest) -> Option<OutgoingReply> {
        let query = QueryRequest::parse(&request.payload);

        if !self.config.accepts_game(query.game_id_number()) {
            debug!(
                "Ignoring query from {} for game {:?}",
                request.sender, query.game_id
            );
            return None;
        }

        let page_size = self.config.page_size();
        let page = self.registry.page(&query.cursor, page_size);
        debug!(
            "Sending {} servers after {:?} to {}",
            page.len(),
            query.cursor,
            request.sender
        );

        Some(OutgoingReply {
            destination: request.sender,
            payload: QueryReply::encode(&page, page_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{CURSOR_START, REPLY_HEADER, REPLY_TERMINATOR};
    use std::net::Ipv4Addr;

    const REGISTER: &[u8] = &[0x71];
    const SHUTDOWN: &[u8] = &[0x62, 0x0A];

    fn game_server(n: u8) -> Endpoint {
        Endpoint::new(Ipv4Addr::new(10, 0, 0, n), 27015)
    }

    fn player() -> Endpoint {
        Endpoint::new(Ipv4Addr::new(192, 168, 1, 50), 40000)
    }

    fn query(cursor: Endpoint, game_id: u32) -> IncomingRequest {
        IncomingRequest::new(player(), QueryRequest::new(cursor, game_id).encode())
    }

    fn engine_with(config: ServerConfig, servers: u8) -> ProtocolEngine {
        let mut engine = ProtocolEngine::new(config);
        for n in 1..=servers {
            engine.handle(&IncomingRequest::new(game_server(n), REGISTER));
        }
        engine
    }

    fn reply_servers(reply: &OutgoingReply) -> Vec<Endpoint> {
        QueryReply::decode(&reply.payload).unwrap().servers
    }

    #[derive(Default)]
    struct RecordingHooks {
        deny: bool,
        unprocessed: Vec<Vec<u8>>,
    }

    impl RequestHooks for RecordingHooks {
        fn before_processing(&mut self, _request: &IncomingRequest) -> bool {
            !self.deny
        }

        fn request_unprocessed(&mut self, request: &IncomingRequest) {
            self.unprocessed.push(request.payload.clone());
        }
    }

    #[test]
    fn test_register_adds_sender() {
        let mut engine = ProtocolEngine::new(ServerConfig::default());
        let reply = engine.handle(&IncomingRequest::new(game_server(1), REGISTER));

        assert!(reply.is_none());
        assert!(engine.registry().contains("10.0.0.1:27015"));
    }

    #[test]
    fn test_register_twice_keeps_one_entry() {
        let mut engine = engine_with(ServerConfig::default(), 1);
        engine.handle(&IncomingRequest::new(game_server(1), REGISTER));
        assert_eq!(engine.registry().len(), 1);
    }

    #[test]
    fn test_shutdown_removes_sender() {
        let mut engine = engine_with(ServerConfig::default(), 2);
        let reply = engine.handle(&IncomingRequest::new(game_server(1), SHUTDOWN));

        assert!(reply.is_none());
        assert!(!engine.registry().contains("10.0.0.1:27015"));
        assert_eq!(engine.registry().len(), 1);
    }

    #[test]
    fn test_registration_disabled() {
        let config = ServerConfig::new(false, 10, 0).unwrap();
        let mut engine = ProtocolEngine::new(config);
        engine.registry_mut().add("10.0.0.1:27015");

        engine.handle(&IncomingRequest::new(game_server(2), REGISTER));
        engine.handle(&IncomingRequest::new(game_server(1), SHUTDOWN));

        assert_eq!(engine.registry().keys().collect::<Vec<_>>(), vec!["10.0.0.1:27015"]);
    }

    #[test]
    fn test_deregistration_flag_is_independent() {
        let config = ServerConfig::new(false, 10, 0)
            .unwrap()
            .with_deregistration(true);
        let mut engine = ProtocolEngine::new(config);
        engine.registry_mut().add("10.0.0.1:27015");

        engine.handle(&IncomingRequest::new(game_server(1), SHUTDOWN));
        assert!(engine.registry().is_empty());

        engine.handle(&IncomingRequest::new(game_server(1), REGISTER));
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_query_first_page() {
        let mut engine = engine_with(ServerConfig::default(), 3);
        let reply = engine.handle(&query(Endpoint::UNSPECIFIED, 0)).unwrap();

        assert_eq!(reply.destination, player());
        assert_eq!(&reply.payload[..6], &REPLY_HEADER);
        assert_eq!(&reply.payload[reply.payload.len() - 6..], &REPLY_TERMINATOR);
        assert_eq!(
            reply_servers(&reply),
            vec![game_server(1), game_server(2), game_server(3)]
        );
    }

    #[test]
    fn test_query_pagination() {
        let mut engine = engine_with(ServerConfig::default(), 25);

        let first = engine.handle(&query(Endpoint::UNSPECIFIED, 0)).unwrap();
        assert_eq!(first.payload.len(), 6 + 10 * 6);
        let servers = reply_servers(&first);
        assert_eq!(servers.first(), Some(&game_server(1)));
        assert_eq!(servers.last(), Some(&game_server(10)));

        let second = engine.handle(&query(game_server(10), 0)).unwrap();
        assert_eq!(second.payload.len(), 6 + 10 * 6);
        let servers = reply_servers(&second);
        assert_eq!(servers.first(), Some(&game_server(11)));
        assert_eq!(servers.last(), Some(&game_server(20)));

        let third = engine.handle(&query(game_server(20), 0)).unwrap();
        assert_eq!(third.payload.len(), 6 + 5 * 6 + 6);
        let reply = QueryReply::decode(&third.payload).unwrap();
        assert!(reply.complete);
        assert_eq!(reply.servers.len(), 5);
        assert_eq!(reply.last(), Some(game_server(25)));
    }

    #[test]
    fn test_query_unknown_cursor() {
        let mut engine = engine_with(ServerConfig::default(), 5);
        let reply = engine.handle(&query(game_server(99), 0)).unwrap();

        assert_eq!(reply.payload, [REPLY_HEADER, REPLY_TERMINATOR].concat());
    }

    #[test]
    fn test_query_game_filter() {
        let config = ServerConfig::new(true, 10, 42).unwrap();
        let mut engine = engine_with(config, 2);

        assert!(engine.handle(&query(Endpoint::UNSPECIFIED, 7)).is_none());

        let reply = engine.handle(&query(Endpoint::UNSPECIFIED, 42)).unwrap();
        assert_eq!(reply_servers(&reply).len(), 2);
    }

    #[test]
    fn test_query_with_interior_fields() {
        let mut engine = engine_with(ServerConfig::new(true, 10, 42).unwrap(), 2);
        let payload = b"1\x03 0.0.0.0:0 \\region\\eu\\ 42\0".to_vec();

        let reply = engine.handle(&IncomingRequest::new(player(), payload)).unwrap();
        assert_eq!(reply_servers(&reply).len(), 2);
    }

    #[test]
    fn test_query_without_game_id() {
        let mut engine = engine_with(ServerConfig::default(), 1);
        let payload = [&[0x31, 0xFF][..], CURSOR_START.as_bytes()].concat();

        let reply = engine.handle(&IncomingRequest::new(player(), payload)).unwrap();
        assert_eq!(reply_servers(&reply), vec![game_server(1)]);

        let mut filtered = engine_with(ServerConfig::new(true, 10, 5).unwrap(), 1);
        let payload = [&[0x31, 0xFF][..], CURSOR_START.as_bytes()].concat();
        assert!(filtered.handle(&IncomingRequest::new(player(), payload)).is_none());
    }

    #[test]
    fn test_full_page_has_no_terminator() {
        let mut engine = engine_with(ServerConfig::new(true, 2, 0).unwrap(), 2);
        let reply = engine.handle(&query(Endpoint::UNSPECIFIED, 0)).unwrap();

        assert_eq!(reply.payload.len(), 6 + 2 * 6);
        assert!(!QueryReply::decode(&reply.payload).unwrap().complete);
    }

    #[test]
    fn test_unrecognized_goes_to_hook() {
        let mut engine = ProtocolEngine::with_hooks(ServerConfig::default(), RecordingHooks::default());

        assert!(engine
            .handle(&IncomingRequest::new(player(), b"status".to_vec()))
            .is_none());
        engine.handle(&IncomingRequest::new(player(), vec![0x71, 0x00]));

        assert_eq!(
            engine.hooks().unprocessed,
            vec![b"status".to_vec(), vec![0x71, 0x00]]
        );
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_before_processing_can_reject() {
        let hooks = RecordingHooks {
            deny: true,
            ..Default::default()
        };
        let mut engine = ProtocolEngine::with_hooks(ServerConfig::default(), hooks);

        engine.handle(&IncomingRequest::new(game_server(1), REGISTER));
        assert!(engine.registry().is_empty());

        assert!(engine.handle(&query(Endpoint::UNSPECIFIED, 0)).is_none());
        assert!(engine
            .handle(&IncomingRequest::new(player(), b"status".to_vec()))
            .is_none());
        assert!(engine.hooks().unprocessed.is_empty());
    }
}
