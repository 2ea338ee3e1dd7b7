//! Release version parsing and ordering
//!
//! Accepted form: `[v]MAJOR[.MINOR[.PATCH]][-label]`. Missing components are
//! zero. Ordering is numeric over `(major, minor, patch)`; the label is kept for
//! display only, so `1.1.0-beta` and `1.1.0` compare equal.
//!
//! Version strings end up as directory and file names on both the registry
//! and the client, so labels are limited to ASCII alphanumerics, `.` and `-`,
//! and `validate_version` is the gate for anything taken off the wire.

use crate::paths::is_path_segment;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub label: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid version: {0:?}")]
pub struct VersionParseError(pub String);

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            label: None,
        }
    }

    /// Parse a version string, `None` when it is empty or malformed.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return None;
        }

        let (core, label) = match trimmed.split_once('-') {
            Some((core, label)) if is_valid_label(label) => (core, Some(label.to_string())),
            Some(_) => return None,
            None => (trimmed, None),
        };

        let mut parts = core.split('.');
        let mut numbers = [0u64; 3];
        for (idx, slot) in numbers.iter_mut().enumerate() {
            match parts.next() {
                Some(part) => *slot = part.parse().ok()?,
                None if idx > 0 => break,
                None => return None,
            }
        }
        // More than three numeric components
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            label,
        })
    }

    fn key(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(label) = &self.label {
            write!(f, "-{}", label)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| VersionParseError(s.to_string()))
    }
}

/// Parse a version that will be used as a path segment.
///
/// Stricter than `Version::parse`: no surrounding whitespace, and the whole
/// string must be a single plain path component.
pub fn validate_version(input: &str) -> Result<Version, VersionParseError> {
    let invalid = || VersionParseError(input.to_string());
    if input != input.trim() || !is_path_segment(input) {
        return Err(invalid());
    }
    Version::parse(input).ok_or_else(invalid)
}

/// Compare versions, returns true if `candidate` is strictly newer.
/// Empty or invalid versions are never reported as newer.
pub fn is_newer_version(current: &str, candidate: &str) -> bool {
    match (Version::parse(current), Version::parse(candidate)) {
        (Some(current), Some(candidate)) => candidate > current,
        _ => false,
    }
}

/// True when both strings name the same version (numerically), or are
/// byte-identical when either fails to parse.
pub fn same_version(a: &str, b: &str) -> bool {
    match (Version::parse(a), Version::parse(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a.trim() == b.trim(),
    }
}
