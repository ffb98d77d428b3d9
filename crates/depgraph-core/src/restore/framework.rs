//! Target framework monikers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const NETCOREAPP: &str = "netcoreapp";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid target framework '{0}'")]
pub struct FrameworkError(pub String);

/// A parsed target framework such as `net46`, `netstandard2.0` or `net8.0-windows`.
///
/// The moniker is kept lowercase; family, version and platform are derived
/// from it and used for compatibility checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetFramework {
    moniker: String,
    family: String,
    version: Vec<u32>,
    platform: Option<String>,
}

impl TargetFramework {
    /// Parse a moniker.
    ///
    /// Dotless versions spell one digit per component (`net462` is 4.6.2);
    /// dotted versions are split on dots (`net8.0`). `net` at version 5 and
    /// above joins the `netcoreapp` family.
    pub fn parse(moniker: &str) -> Result<Self, FrameworkError> {
        let moniker = moniker.trim().to_ascii_lowercase();
        let invalid = || FrameworkError(moniker.clone());

        let (base, platform) = match moniker.split_once('-') {
            Some((base, platform)) if !platform.is_empty() => (base, Some(platform.to_string())),
            Some(_) => return Err(invalid()),
            None => (moniker.as_str(), None),
        };

        let split = base
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (family, version_text) = base.split_at(split);
        if family.is_empty() || !family.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }

        let version: Vec<u32> = if version_text.contains('.') {
            version_text
                .split('.')
                .map(|p| p.parse::<u32>().map_err(|_| invalid()))
                .collect::<Result<_, _>>()?
        } else {
            version_text
                .chars()
                .map(|c| c.to_digit(10).ok_or_else(invalid))
                .collect::<Result<_, _>>()?
        };

        let family = if family == "net" && version.first().is_some_and(|major| *major >= 5) {
            NETCOREAPP.to_string()
        } else {
            family.to_string()
        };
        Ok(Self {
            moniker: moniker.clone(),
            family,
            version: trim_trailing_zeros(version),
            platform,
        })
    }

    /// The normalized (lowercase) moniker.
    #[must_use]
    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    #[must_use]
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Whether assets built for `self` can be consumed by a project targeting `target`.
    #[must_use]
    pub fn is_compatible_with(&self, target: &Self) -> bool {
        self.family == target.family
            && self.version <= target.version
            && (self.platform.is_none() || self.platform == target.platform)
    }

    /// Pick the candidate that `target` can consume with the highest version.
    ///
    /// An exact moniker match always wins.
    #[must_use]
    pub fn nearest<'a>(target: &Self, candidates: &'a [Self]) -> Option<&'a Self> {
        if let Some(exact) = candidates.iter().find(|c| *c == target) {
            return Some(exact);
        }
        candidates
            .iter()
            .filter(|c| c.is_compatible_with(target))
            .max_by(|a, b| {
                a.version
                    .cmp(&b.version)
                    .then_with(|| a.platform.is_some().cmp(&b.platform.is_some()))
            })
    }
}

/// `[4, 6, 0]` and `[4, 6]` name the same framework version.
fn trim_trailing_zeros(mut version: Vec<u32>) -> Vec<u32> {
    while version.len() > 1 && version.last() == Some(&0) {
        version.pop();
    }
    version
}

impl fmt::Display for TargetFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.moniker)
    }
}

impl Serialize for TargetFramework {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.moniker)
    }
}

impl<'de> Deserialize<'de> for TargetFramework {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tf(s: &str) -> TargetFramework {
        TargetFramework::parse(s).unwrap()
    }

    #[test]
    fn test_parse_monikers() {
        let net46 = tf("NET46");
        assert_eq!(net46.moniker(), "net46");
        assert_eq!(net46.family(), "net");

        let ns = tf("netstandard2.0");
        assert_eq!(ns.family(), "netstandard");

        let win = tf("net8.0-windows");
        assert_eq!(win.family(), "netcoreapp");
        assert_eq!(win.to_string(), "net8.0-windows");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(TargetFramework::parse("").is_err());
        assert!(TargetFramework::parse("net").is_err());
        assert!(TargetFramework::parse("46").is_err());
        assert!(TargetFramework::parse("net4x").is_err());
        assert!(TargetFramework::parse("net8.0-").is_err());
    }

    #[test]
    fn test_compatibility() {
        assert!(tf("net45").is_compatible_with(&tf("net46")));
        assert!(!tf("net47").is_compatible_with(&tf("net46")));
        assert!(!tf("netstandard2.0").is_compatible_with(&tf("net46")));
        assert!(tf("netstandard1.6").is_compatible_with(&tf("netstandard2.0")));
        assert!(tf("net8.0").is_compatible_with(&tf("net8.0-windows")));
        assert!(!tf("net8.0-windows").is_compatible_with(&tf("net8.0")));
    }

    #[test]
    fn test_framework_and_core_do_not_mix() {
        assert_eq!(tf("net48").family(), "net");
        assert_eq!(tf("net5.0").family(), "netcoreapp");
        assert!(!tf("net46").is_compatible_with(&tf("net8.0")));
        assert!(!tf("net8.0").is_compatible_with(&tf("net48")));
        assert!(tf("netcoreapp3.1").is_compatible_with(&tf("net8.0")));
        assert!(tf("net6.0").is_compatible_with(&tf("net8.0-windows")));
        assert!(!tf("net8.0").is_compatible_with(&tf("netcoreapp3.1")));

        let candidates = vec![tf("net48"), tf("netcoreapp3.1"), tf("net6.0")];
        assert_eq!(
            TargetFramework::nearest(&tf("net8.0"), &candidates).unwrap().moniker(),
            "net6.0"
        );
    }

    #[test]
    fn test_dotless_and_dotted_agree() {
        assert!(tf("net4.6").is_compatible_with(&tf("net46")));
        assert!(tf("net46").is_compatible_with(&tf("net4.6.0")));
    }

    #[test]
    fn test_nearest() {
        let candidates = vec![tf("net45"), tf("net40"), tf("net48")];
        assert_eq!(
            TargetFramework::nearest(&tf("net46"), &candidates).unwrap().moniker(),
            "net45"
        );
        assert!(TargetFramework::nearest(&tf("netstandard2.0"), &candidates).is_none());

        let exact = vec![tf("net46"), tf("net45")];
        assert_eq!(
            TargetFramework::nearest(&tf("net46"), &exact).unwrap().moniker(),
            "net46"
        );
    }
}
