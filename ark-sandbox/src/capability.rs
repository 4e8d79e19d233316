use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::violation::SandboxViolation;

/// Comma-separated list of granted tokens, read once at startup.
pub const CAPS_ENV: &str = "ARK_CAPABILITIES";

/// Legacy switch that grants every token.
pub const GRANT_ALL_ENV: &str = "ARK_GRANT_ALL";

/// A named permission token gating an effectful intrinsic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Exec,
    Net,
    FsWrite,
    FsRead,
    Thread,
    Ai,
    Crypto,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Exec,
        Capability::Net,
        Capability::FsWrite,
        Capability::FsRead,
        Capability::Thread,
        Capability::Ai,
        Capability::Crypto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Exec => "exec",
            Capability::Net => "net",
            Capability::FsWrite => "fs_write",
            Capability::FsRead => "fs_read",
            Capability::Thread => "thread",
            Capability::Ai => "ai",
            Capability::Crypto => "crypto",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = SandboxViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SandboxViolation::UnknownToken {
                token: s.to_string(),
            })
    }
}

/// The process-wide set of granted tokens. Built once from configuration;
/// the type deliberately has no mutation API, so runtime elevation is
/// impossible by construction.
#[derive(Clone, Debug, Default)]
pub struct CapabilitySet {
    granted: HashSet<Capability>,
}

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn grant_all() -> Self {
        Self {
            granted: Capability::ALL.iter().copied().collect(),
        }
    }

    pub fn from_tokens(tokens: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            granted: tokens.into_iter().collect(),
        }
    }

    /// Parses a comma-separated token list; an unknown token is a
    /// configuration error, not a silent skip.
    pub fn parse_list(list: &str) -> Result<Self, SandboxViolation> {
        let mut granted = HashSet::new();
        for token in list.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            granted.insert(token.parse::<Capability>()?);
        }
        Ok(Self { granted })
    }

    /// Reads `ARK_CAPABILITIES`, or the legacy `ARK_GRANT_ALL` switch.
    pub fn from_env() -> Result<Self, SandboxViolation> {
        if let Ok(v) = std::env::var(GRANT_ALL_ENV) {
            if v == "1" || v.eq_ignore_ascii_case("true") {
                return Ok(Self::grant_all());
            }
        }
        match std::env::var(CAPS_ENV) {
            Ok(list) => Self::parse_list(&list),
            Err(_) => Ok(Self::empty()),
        }
    }

    pub fn is_granted(&self, cap: Capability) -> bool {
        self.granted.contains(&cap)
    }

    pub fn check(&self, cap: Capability) -> Result<(), SandboxViolation> {
        if self.is_granted(cap) {
            Ok(())
        } else {
            Err(SandboxViolation::MissingCapability(cap))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_list() {
        let caps = CapabilitySet::parse_list("net, fs_read").unwrap();
        assert!(caps.is_granted(Capability::Net));
        assert!(caps.is_granted(Capability::FsRead));
        assert!(!caps.is_granted(Capability::Exec));
    }

    #[test]
    fn rejects_unknown_token() {
        let err = CapabilitySet::parse_list("net,root").unwrap_err();
        assert_eq!(
            err,
            SandboxViolation::UnknownToken {
                token: "root".to_string()
            }
        );
    }

    #[test]
    fn empty_list_grants_nothing() {
        let caps = CapabilitySet::parse_list("").unwrap();
        for cap in Capability::ALL {
            assert!(caps.check(cap).is_err());
        }
    }

    #[test]
    fn grant_all_covers_every_token() {
        let caps = CapabilitySet::grant_all();
        for cap in Capability::ALL {
            assert!(caps.check(cap).is_ok());
        }
    }
}
