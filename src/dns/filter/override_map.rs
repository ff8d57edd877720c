//! Static domain to IPv4 overrides
//!
//! The override file holds one `domain<whitespace>ipv4` pair per line. Blank
//! lines are skipped. A missing file is not an error: the map is simply
//! empty. The pipeline only consults the map when it is explicitly attached.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::Path;

use tracing::info;

use crate::dns::error::LoadError;

/// Fixed domain to address mapping
#[derive(Debug, Clone, Default)]
pub struct OverrideMap {
    entries: HashMap<String, Ipv4Addr>,
}

impl OverrideMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from `path`
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file exists but cannot be opened or read,
    /// or if a non-blank line is not exactly a domain followed by an IPv4
    /// address.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No override file found, continuing with empty map");
                return Ok(Self::new());
            }
            Err(e) => return Err(LoadError::open(path, e)),
        };

        let mut map = Self::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| LoadError::read(path, e))?;
            let mut fields = line.split_whitespace();
            let Some(domain) = fields.next() else {
                continue;
            };
            let address = fields
                .next()
                .ok_or_else(|| LoadError::malformed(path, index + 1, "missing address"))?;
            if fields.next().is_some() {
                return Err(LoadError::malformed(path, index + 1, "trailing fields"));
            }
            let address: Ipv4Addr = address.parse().map_err(|_| {
                LoadError::malformed(path, index + 1, format!("invalid IPv4 address '{address}'"))
            })?;
            map.insert(domain, address);
        }

        info!(path = %path.display(), entries = map.len(), "Loaded override map");
        Ok(map)
    }

    /// Add or replace an override; the domain is stored lowercased without a trailing dot
    pub fn insert(&mut self, domain: &str, address: Ipv4Addr) {
        self.entries.insert(normalize(domain), address);
    }

    /// Look up the override for `domain`, ignoring case and a trailing dot
    #[must_use]
    pub fn lookup(&self, domain: &str) -> Option<Ipv4Addr> {
        self.entries.get(&normalize(domain)).copied()
    }

    /// Number of overrides
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no overrides
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}
