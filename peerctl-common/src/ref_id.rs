//! Composite reference ids
//!
//! Records mirrored from external directories are keyed by a composite id of
//! the form `"{source}:{id}"`, e.g. `"pdbctl:441"` or `"ixctl:12"`. All
//! parsing and formatting of that key happens here so the encoding cannot
//! drift between call sites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// External system a reference record originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefSource {
    /// peeringdb mirror
    Pdbctl,
    /// exchange-member directory
    Ixctl,
}

impl RefSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefSource::Pdbctl => "pdbctl",
            RefSource::Ixctl => "ixctl",
        }
    }
}

impl fmt::Display for RefSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdbctl" => Ok(RefSource::Pdbctl),
            "ixctl" => Ok(RefSource::Ixctl),
            other => Err(Error::InvalidInput(format!(
                "unknown reference source: {other}"
            ))),
        }
    }
}

/// Typed form of a composite `"{source}:{id}"` reference id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefId {
    pub source: RefSource,
    pub id: i64,
}

impl RefId {
    pub fn new(source: RefSource, id: i64) -> Self {
        Self { source, id }
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        let (source, id) = value
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("malformed reference id: {value}")))?;
        let id = id
            .parse::<i64>()
            .map_err(|_| Error::InvalidInput(format!("malformed reference id: {value}")))?;
        Ok(Self {
            source: source.parse()?,
            id,
        })
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

impl FromStr for RefId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let ref_id = RefId::parse("pdbctl:441").unwrap();
        assert_eq!(ref_id.source, RefSource::Pdbctl);
        assert_eq!(ref_id.id, 441);
        assert_eq!(ref_id.to_string(), "pdbctl:441");

        let ref_id = RefId::parse("ixctl:12").unwrap();
        assert_eq!(ref_id.source, RefSource::Ixctl);
        assert_eq!(ref_id.id, 12);
    }

    #[test]
    fn test_unknown_source_rejected() {
        assert!(RefId::parse("sot:1").is_err());
        assert!(RefId::parse("pdbctl:abc").is_err());
        assert!(RefId::parse("pdbctl").is_err());
    }
}
