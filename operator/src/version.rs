//! Dotted version handling and the "does this operator need upgrading" call.
//!
//! Malformed versions are treated as needing an upgrade.

use std::{cmp::Ordering, fmt};

use crate::crd::{Subscription, olm::SUBSCRIPTION_AT_LATEST};

const COMPONENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// Strict parse: exactly `MAJOR.MINOR.PATCH`, all numeric.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<u64> = raw
            .split('.')
            .map(|p| p.parse().ok())
            .collect::<Option<_>>()?;
        match parts.as_slice() {
            [major, minor, patch] => Some(Version::new(*major, *minor, *patch)),
            _ => None,
        }
    }

    /// Lenient parse: missing components are 0, unparseable components are 0,
    /// extra components are ignored.
    pub fn normalized(raw: &str) -> Self {
        let mut parts = [0u64; COMPONENTS];
        for (slot, piece) in parts.iter_mut().zip(raw.trim().split('.')) {
            *slot = piece.trim().parse().unwrap_or(0);
        }
        Version::new(parts[0], parts[1], parts[2])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// `true` iff `v1` is strictly greater than `v2`, both normalised to three
/// components.
pub fn compare_version(v1: &str, v2: &str) -> bool {
    Version::normalized(v1).cmp(&Version::normalized(v2)) == Ordering::Greater
}

/// Version embedded in a CSV name of the form `name.vMAJOR.MINOR.PATCH`.
pub fn parse_csv_version(csv_name: &str) -> Option<Version> {
    let (_, raw) = csv_name.rsplit_once(".v")?;
    Version::parse(raw)
}

/// Why an installed operator should be reinstalled, if it should.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeReason {
    NotInstalled,
    CsvMismatch { installed: String, current: String },
    NotAtLatest(String),
    MalformedVersion(String),
    BelowMinimum { installed: Version, minimum: Version },
}

impl fmt::Display for UpgradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeReason::NotInstalled => write!(f, "no installed CSV"),
            UpgradeReason::CsvMismatch { installed, current } => {
                write!(f, "installed CSV {installed} differs from current {current}")
            }
            UpgradeReason::NotAtLatest(state) => write!(f, "subscription state is {state}"),
            UpgradeReason::MalformedVersion(csv) => write!(f, "cannot parse version of {csv}"),
            UpgradeReason::BelowMinimum { installed, minimum } => {
                write!(f, "installed {installed} is below minimum {minimum}")
            }
        }
    }
}

/// Decides whether the operator behind `sub` must be upgraded to reach
/// `minimum`. `None` means it is fine as is.
pub fn upgrade_reason(sub: &Subscription, minimum: Version) -> Option<UpgradeReason> {
    let Some(installed) = sub.installed_csv() else {
        return Some(UpgradeReason::NotInstalled);
    };

    let current = sub.current_csv().unwrap_or_default();
    if installed != current {
        return Some(UpgradeReason::CsvMismatch {
            installed: installed.into(),
            current: current.into(),
        });
    }

    let state = sub.state().unwrap_or_default();
    if state != SUBSCRIPTION_AT_LATEST {
        return Some(UpgradeReason::NotAtLatest(state.into()));
    }

    match parse_csv_version(installed) {
        None => Some(UpgradeReason::MalformedVersion(installed.into())),
        Some(v) if v < minimum => Some(UpgradeReason::BelowMinimum {
            installed: v,
            minimum,
        }),
        Some(_) => None,
    }
}

pub fn needs_upgrade(sub: &Subscription, minimum: Version) -> bool {
    upgrade_reason(sub, minimum).is_some()
}
