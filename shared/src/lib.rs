//! Wire protocol shared by the master server and its clients.
//!
//! Everything on the wire is raw bytes: single-byte or two-byte opcodes for
//! register/deregister, a backslash-delimited text query, and a reply made of
//! 6-byte packed endpoints behind a fixed header.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 27010;
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 677;
pub const MAX_DATAGRAM_SIZE: usize = 4096;
pub const PACKED_ENDPOINT_LEN: usize = 6;

pub const OP_REGISTER: &[u8] = &[0x71];
pub const OP_SHUTDOWN: &[u8] = &[0x62, 0x0A];
pub const OP_QUERY: u8 = 0x31;

pub const REPLY_HEADER: [u8; 6] = [0xFF, 0xFF, 0xFF, 0xFF, 0x66, 0x0A];
pub const REPLY_TERMINATOR: [u8; PACKED_ENDPOINT_LEN] = [0; PACKED_ENDPOINT_LEN];

/// Cursor meaning "start from the first registered server".
pub const CURSOR_START: &str = "0.0.0.0:0";
pub const FIELD_SEPARATOR: char = '\\';

/// Filter byte sent by clients that do not care about regions.
pub const FILTER_ALL_REGIONS: u8 = 0xFF;

pub type PackedEndpoint = [u8; PACKED_ENDPOINT_LEN];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid endpoint: {0:?}")]
    InvalidEndpoint(String),
    #[error("reply does not start with the server list header")]
    InvalidReplyHeader,
    #[error("reply body of {0} bytes is not a whole number of entries")]
    TruncatedReply(usize),
}

/// IPv4 address and port of a game server or requesting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub const UNSPECIFIED: Endpoint = Endpoint::new(Ipv4Addr::UNSPECIFIED, 0);

    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Converts a socket address, rejecting IPv6 senders.
    pub fn from_socket_addr(addr: SocketAddr) -> Option<Self> {
        match addr {
            SocketAddr::V4(v4) => Some(v4.into()),
            SocketAddr::V6(v6) => v6.ip().to_ipv4_mapped().map(|ip| Self::new(ip, v6.port())),
        }
    }

    /// Four address bytes followed by the port in network byte order.
    pub fn pack(&self) -> PackedEndpoint {
        let [a, b, c, d] = self.ip.octets();
        let [hi, lo] = self.port.to_be_bytes();
        [a, b, c, d, hi, lo]
    }

    pub fn unpack(bytes: &PackedEndpoint) -> Self {
        Self::new(
            Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]),
            u16::from_be_bytes([bytes[4], bytes[5]]),
        )
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4((*self).into())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<SocketAddrV4>()
            .map(Into::into)
            .map_err(|_| ProtocolError::InvalidEndpoint(s.to_string()))
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<Endpoint> for SocketAddrV4 {
    fn from(endpoint: Endpoint) -> Self {
        SocketAddrV4::new(endpoint.ip, endpoint.port)
    }
}

/// Request kind, decided from the leading bytes of a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Register,
    Shutdown,
    Query,
    Unrecognized,
}

impl Opcode {
    /// Register and shutdown must be the whole payload; a query only needs
    /// its first byte.
    pub fn classify(payload: &[u8]) -> Self {
        if payload == OP_REGISTER {
            Opcode::Register
        } else if payload == OP_SHUTDOWN {
            Opcode::Shutdown
        } else if payload.first() == Some(&OP_QUERY) {
            Opcode::Query
        } else {
            Opcode::Unrecognized
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Token {
    Digits { min: usize, max: usize },
    AnyByte,
    Byte(u8),
}

const OCTET: Token = Token::Digits { min: 1, max: 3 };

const ENDPOINT_PATTERN: [Token; 9] = [
    OCTET,
    Token::AnyByte,
    OCTET,
    Token::AnyByte,
    OCTET,
    Token::AnyByte,
    OCTET,
    Token::Byte(b':'),
    Token::Digits { min: 1, max: 5 },
];

/// Digit groups of a loose `d.d.d.d:p` match inside a larger string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointMatch<'a> {
    pub octets: [&'a str; 4],
    pub port: &'a str,
}

impl EndpointMatch<'_> {
    /// Packs the matched groups. Octets above 255 and ports above 65535 wrap,
    /// the same way the historical master servers packed them.
    pub fn pack(&self) -> PackedEndpoint {
        let [a, b, c, d] = self.octets.map(|octet| digits_value(octet) as u8);
        let [hi, lo] = (digits_value(self.port) as u16).to_be_bytes();
        [a, b, c, d, hi, lo]
    }
}

fn digits_value(digits: &str) -> u32 {
    digits
        .bytes()
        .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
}

/// Finds the leftmost `D{1,3}?D{1,3}?D{1,3}?D{1,3}:D{1,5}` run in `text`,
/// where `?` is any byte other than a newline.
///
/// The match is not anchored and octets are not range checked, so
/// `"x999-1-1-1:80y"` matches. Digit runs are greedy with backtracking.
pub fn match_endpoint(text: &str) -> Option<EndpointMatch<'_>> {
    let bytes = text.as_bytes();
    let mut groups = Vec::with_capacity(5);

    for start in 0..bytes.len() {
        groups.clear();
        if match_tokens(bytes, start, &ENDPOINT_PATTERN, &mut groups) {
            // Group bounds sit next to ASCII digits, so they are char boundaries.
            let slice = |(from, to): (usize, usize)| &text[from..to];
            return Some(EndpointMatch {
                octets: [
                    slice(groups[0]),
                    slice(groups[1]),
                    slice(groups[2]),
                    slice(groups[3]),
                ],
                port: slice(groups[4]),
            });
        }
    }

    None
}

fn match_tokens(
    text: &[u8],
    pos: usize,
    tokens: &[Token],
    groups: &mut Vec<(usize, usize)>,
) -> bool {
    let Some((token, rest)) = tokens.split_first() else {
        return true;
    };

    match *token {
        Token::Digits { min, max } => {
            let run = text[pos..]
                .iter()
                .take(max)
                .take_while(|b| b.is_ascii_digit())
                .count();

            for len in (min..=run).rev() {
                groups.push((pos, pos + len));
                if match_tokens(text, pos + len, rest, groups) {
                    return true;
                }
                groups.pop();
            }
            false
        }
        Token::AnyByte => {
            text.get(pos).is_some_and(|&b| b != b'\n') && match_tokens(text, pos + 1, rest, groups)
        }
        Token::Byte(expected) => {
            text.get(pos) == Some(&expected) && match_tokens(text, pos + 1, rest, groups)
        }
    }
}

/// Strips the characters legacy clients pad fields with, NUL included.
pub fn trim_field(field: &str) -> &str {
    field.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
}

/// Server list request: `0x31`, a filter byte, then `cursor \ ... \ game id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub filter: u8,
    pub cursor: String,
    /// Fields between the cursor and the game id. Carried but not interpreted.
    pub fields: Vec<String>,
    pub game_id: String,
}

impl QueryRequest {
    pub fn new(cursor: Endpoint, game_id: u32) -> Self {
        Self {
            filter: FILTER_ALL_REGIONS,
            cursor: cursor.to_string(),
            fields: Vec::new(),
            game_id: game_id.to_string(),
        }
    }

    pub fn with_filter(mut self, filter: u8) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut text = self.cursor.clone();
        for field in &self.fields {
            text.push(FIELD_SEPARATOR);
            text.push_str(field);
        }
        text.push(FIELD_SEPARATOR);
        text.push_str(&self.game_id);

        let mut payload = Vec::with_capacity(2 + text.len());
        payload.push(OP_QUERY);
        payload.push(self.filter);
        payload.extend_from_slice(text.as_bytes());
        payload
    }

    /// Lenient parse of a query datagram. Missing pieces come back empty
    /// instead of failing: a short payload yields an empty cursor, and a
    /// payload without any separator yields an empty game id.
    pub fn parse(payload: &[u8]) -> Self {
        let filter = payload.get(1).copied().unwrap_or(0);
        let text = String::from_utf8_lossy(payload.get(2..).unwrap_or_default());

        let mut parts: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
        let cursor = trim_field(parts.remove(0)).to_string();
        let game_id = parts.pop().map(trim_field).unwrap_or_default().to_string();
        let fields = parts.into_iter().map(|f| trim_field(f).to_string()).collect();

        Self {
            filter,
            cursor,
            fields,
            game_id,
        }
    }

    /// Numeric game id, if the field holds one.
    pub fn game_id_number(&self) -> Option<u32> {
        self.game_id.parse().ok()
    }
}

/// Decoded server list reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReply {
    pub servers: Vec<Endpoint>,
    /// True when the reply carried the zero terminator, meaning there is no
    /// further page to ask for.
    pub complete: bool,
}

impl QueryReply {
    /// Header, entries, and the terminator when the page is not full.
    pub fn encode(entries: &[PackedEndpoint], page_size: usize) -> Vec<u8> {
        let mut payload =
            Vec::with_capacity(REPLY_HEADER.len() + (entries.len() + 1) * PACKED_ENDPOINT_LEN);
        payload.extend_from_slice(&REPLY_HEADER);
        for entry in entries {
            payload.extend_from_slice(entry);
        }
        if entries.len() != page_size {
            payload.extend_from_slice(&REPLY_TERMINATOR);
        }
        payload
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let body = payload
            .strip_prefix(REPLY_HEADER.as_slice())
            .ok_or(ProtocolError::InvalidReplyHeader)?;

        if body.len() % PACKED_ENDPOINT_LEN != 0 {
            return Err(ProtocolError::TruncatedReply(body.len()));
        }

        let mut entries: Vec<PackedEndpoint> = body
            .chunks_exact(PACKED_ENDPOINT_LEN)
            .map(|chunk| {
                let mut entry = [0u8; PACKED_ENDPOINT_LEN];
                entry.copy_from_slice(chunk);
                entry
            })
            .collect();

        let complete = entries.last() == Some(&REPLY_TERMINATOR);
        if complete {
            entries.pop();
        }

        Ok(Self {
            servers: entries.iter().map(Endpoint::unpack).collect(),
            complete,
        })
    }

    /// Cursor for the follow-up query.
    pub fn last(&self) -> Option<Endpoint> {
        self.servers.last().copied()
    }
}
