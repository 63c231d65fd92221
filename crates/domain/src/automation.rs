//! Automation — a hashed unit of natural-language task text.
//!
//! Automations are parsed from plain-text files; multiple units in one file
//! are separated by a line containing only `---`. Identity is the SHA-256
//! digest of the trimmed body, so re-parsing unchanged text always yields
//! the same hash. Automations are never persisted: they are recomputed on
//! every reparse and held in memory for the runtime's current lifetime.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A hashed unit of natural-language task text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    /// Lowercase hex SHA-256 of the trimmed contents.
    pub hash: String,
    /// The trimmed body of the unit.
    pub contents: String,
    /// The source file this unit came from.
    pub file_name: String,
}

impl Automation {
    /// Build an automation from a trimmed unit body.
    #[must_use]
    pub fn from_contents(contents: impl Into<String>, file_name: impl Into<String>) -> Self {
        let contents = contents.into();
        Self {
            hash: content_hash(&contents),
            contents,
            file_name: file_name.into(),
        }
    }
}

/// Lowercase hex SHA-256 of the given text.
#[must_use]
pub fn content_hash(contents: &str) -> String {
    let digest = Sha256::digest(contents.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Split a source file into automation units.
///
/// Units are separated by a line whose trimmed content is exactly `---`.
/// Each unit is trimmed and hashed independently; empty units are dropped.
#[must_use]
pub fn parse_source(file_name: &str, contents: &str) -> Vec<Automation> {
    let mut units = Vec::new();
    let mut current = String::new();

    for line in contents.lines() {
        if line.trim() == "---" {
            push_unit(&mut units, &current, file_name);
            current.clear();
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    push_unit(&mut units, &current, file_name);

    units
}

fn push_unit(units: &mut Vec<Automation>, raw: &str, file_name: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        units.push(Automation::from_contents(trimmed, file_name));
    }
}
