//! Origin location lookup.
//!
//! Lookups never fail outward: anything that cannot be resolved becomes
//! [`Location::Unknown`]. [`GeoLookup`] consults, in order, the static CIDR
//! table from `[geo]` in the project config, an optional MaxMind City
//! database, and finally recognises private and loopback ranges.

use maxminddb::{Reader, geoip2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::Path;

use crate::error::ErrorCode;

/// Result of resolving an origin to a place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Location {
    /// A resolved place name, e.g. `"Germany, Berlin"`.
    Known(String),
    /// Loopback, RFC 1918, link-local or unique-local address.
    Private,
    /// Unparsable origin or no matching entry.
    Unknown,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(name) => f.write_str(name),
            Self::Private => f.write_str("Private network"),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Resolve an origin address to a [`Location`].
pub trait LocationLookup {
    fn locate(&self, origin: &str) -> Location;
}

/// Lookup that knows nothing; every origin is [`Location::Unknown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl LocationLookup for NoLookup {
    fn locate(&self, _origin: &str) -> Location {
        Location::Unknown
    }
}

/// One configured `[[geo.networks]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    /// CIDR block, e.g. `"203.0.113.0/24"`.
    pub cidr: String,
    /// Place name reported for matches.
    pub location: String,
}

/// A parsed CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Parse `addr/prefix`. A bare address is a host route (/32 or /128).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (addr, prefix) = match raw.split_once('/') {
            Some((addr, prefix)) => (
                addr.parse::<IpAddr>().ok()?,
                Some(prefix.parse::<u8>().ok()?),
            ),
            None => (raw.parse::<IpAddr>().ok()?, None),
        };
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = prefix.unwrap_or(max);
        (prefix <= max).then_some(Self {
            network: addr,
            prefix,
        })
    }

    /// True when `addr` falls inside this block. Families never cross-match.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }

    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }
}

fn mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

/// Parse an origin header value into an address.
///
/// Accepts bracketed IPv6 and `addr:port` forms as proxies sometimes emit.
#[must_use]
pub fn parse_origin(origin: &str) -> Option<IpAddr> {
    let origin = origin.trim();
    if let Ok(ip) = origin.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(sock) = origin.parse::<std::net::SocketAddr>() {
        return Some(sock.ip());
    }
    origin
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .and_then(|s| s.parse().ok())
}

/// True for loopback, private, link-local and unique-local addresses.
#[must_use]
pub fn is_private(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Longest-prefix-match lookup over configured networks.
#[derive(Debug, Clone, Default)]
pub struct StaticTable {
    entries: Vec<(Cidr, String)>,
}

impl StaticTable {
    /// Build from config entries. Unparsable CIDRs are skipped with a warning.
    #[must_use]
    pub fn from_entries(entries: &[NetworkEntry]) -> Self {
        let mut parsed = Vec::with_capacity(entries.len());
        for entry in entries {
            match Cidr::parse(&entry.cidr) {
                Some(cidr) => parsed.push((cidr, entry.location.clone())),
                None => tracing::warn!(cidr = %entry.cidr, "skipping unparsable geo network"),
            }
        }
        // Longest prefix first so the first hit is the most specific.
        parsed.sort_by(|a, b| b.0.prefix().cmp(&a.0.prefix()));
        Self { entries: parsed }
    }

    /// Most specific configured name for `addr`.
    #[must_use]
    pub fn find(&self, addr: IpAddr) -> Option<&str> {
        self.entries
            .iter()
            .find(|(cidr, _)| cidr.contains(addr))
            .map(|(_, name)| name.as_str())
    }
}

impl LocationLookup for StaticTable {
    fn locate(&self, origin: &str) -> Location {
        locate_with(origin, |addr| self.find(addr).map(str::to_string))
    }
}

/// MaxMind City database (e.g. `GeoLite2-City.mmdb`).
pub struct GeoDatabase {
    reader: Reader<Vec<u8>>,
}

impl fmt::Debug for GeoDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoDatabase")
            .field("database_type", &self.reader.metadata.database_type)
            .finish()
    }
}

impl GeoDatabase {
    /// Load the database at `path`. A missing or unreadable file logs a
    /// warning and yields `None`, so reports fall back to `Unknown`.
    #[must_use]
    pub fn open(path: &Path) -> Option<Self> {
        match Reader::open_readfile(path) {
            Ok(reader) => Some(Self { reader }),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    code = %ErrorCode::LookupFailed,
                    "geo database unavailable"
                );
                None
            }
        }
    }

    /// `"Country, Subdivision"`, or just the country when the record has
    /// no subdivision. `None` when the address is not in the database.
    #[must_use]
    pub fn find(&self, addr: IpAddr) -> Option<String> {
        let city: geoip2::City<'_> = match self.reader.lookup(addr) {
            Ok(city) => city,
            Err(err) => {
                tracing::debug!(
                    %addr,
                    error = %err,
                    code = %ErrorCode::LookupFailed,
                    "geo lookup failed"
                );
                return None;
            }
        };
        let country = city.country.and_then(|c| c.names).and_then(|n| n.get("en").copied())?;
        let subdivision = city
            .subdivisions
            .and_then(|mut subs| subs.pop())
            .and_then(|s| s.names)
            .and_then(|n| n.get("en").copied());
        Some(match subdivision {
            Some(subdivision) => format!("{country}, {subdivision}"),
            None => country.to_string(),
        })
    }
}

/// Static table first, then the database when one is configured.
#[derive(Debug, Default)]
pub struct GeoLookup {
    table: StaticTable,
    database: Option<GeoDatabase>,
}

impl GeoLookup {
    #[must_use]
    pub const fn new(table: StaticTable, database: Option<GeoDatabase>) -> Self {
        Self { table, database }
    }
}

impl LocationLookup for GeoLookup {
    fn locate(&self, origin: &str) -> Location {
        locate_with(origin, |addr| {
            self.table
                .find(addr)
                .map(str::to_string)
                .or_else(|| self.database.as_ref().and_then(|db| db.find(addr)))
        })
    }
}

fn locate_with(origin: &str, resolve: impl FnOnce(IpAddr) -> Option<String>) -> Location {
    let Some(addr) = parse_origin(origin) else {
        tracing::debug!(origin, code = %ErrorCode::LookupFailed, "origin is not an address");
        return Location::Unknown;
    };
    if let Some(name) = resolve(addr) {
        return Location::Known(name);
    }
    if is_private(addr) {
        return Location::Private;
    }
    Location::Unknown
}
