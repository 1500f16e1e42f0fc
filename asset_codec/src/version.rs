use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::CodecError;

/// Dotted numeric client version. Components compare numerically, so
/// `2.4.01` equals `2.4.1` and sorts below `2.4.21`.
#[derive(Clone, Debug)]
pub struct ClientVersion {
    raw: String,
    parts: Vec<u32>,
}

impl ClientVersion {
    pub fn parse(input: &str) -> Result<Self, CodecError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(CodecError::InvalidVersion(input.to_string()));
        }
        let mut parts = Vec::new();
        for part in raw.split('.') {
            let value = part
                .parse::<u32>()
                .map_err(|_| CodecError::InvalidVersion(input.to_string()))?;
            parts.push(value);
        }
        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn parts(&self) -> &[u32] {
        &self.parts
    }

    fn component(&self, index: usize) -> u32 {
        self.parts.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for ClientVersion {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClientVersion::parse(s)
    }
}

impl fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Ord for ClientVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for index in 0..len {
            match self.component(index).cmp(&other.component(index)) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for ClientVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ClientVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ClientVersion {}

/// True when `version < threshold`. An unparsable threshold is never "after".
pub fn is_before(version: &ClientVersion, threshold: &str) -> bool {
    match ClientVersion::parse(threshold) {
        Ok(threshold) => *version < threshold,
        Err(_) => false,
    }
}
