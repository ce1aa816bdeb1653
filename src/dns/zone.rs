//! Which query names a proxy block forwards.

use hickory_proto::error::ProtoError;
use hickory_proto::rr::Name;
use thiserror::Error;

use crate::config::ProxyBlockConfig;

/// A `from` or `except` entry that is not a domain name.
#[derive(Debug, Error)]
#[error("invalid zone `{zone}`: {source}")]
pub struct ZoneError {
    pub zone: String,
    #[source]
    pub source: ProtoError,
}

/// Names under `from` are forwarded unless they fall under an `except` zone.
#[derive(Debug, Clone)]
pub struct ZoneMatcher {
    from: Name,
    except: Vec<Name>,
}

impl ZoneMatcher {
    pub fn new(from: Name, except: Vec<Name>) -> Self {
        Self { from, except }
    }

    pub fn from_config(config: &ProxyBlockConfig) -> Result<Self, ZoneError> {
        let from = zone(&config.from)?;
        let except = config
            .except
            .iter()
            .map(|z| zone(z))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(from, except))
    }

    /// Matches the root zone with no exceptions.
    pub fn any() -> Self {
        Self::new(Name::root(), Vec::new())
    }

    pub fn matches(&self, name: &Name) -> bool {
        self.from.zone_of(name) && !self.except.iter().any(|zone| zone.zone_of(name))
    }
}

fn zone(input: &str) -> Result<Name, ZoneError> {
    let mut name = Name::from_ascii(input).map_err(|source| ZoneError {
        zone: input.to_string(),
        source,
    })?;
    name.set_fqdn(true);
    Ok(name)
}
