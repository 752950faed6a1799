//! Scan report parsing.
//!
//! The engine's summary block carries an `Infected files: N` counter and, for
//! each detection, a `<path>: <signature> FOUND` line optionally followed by a
//! `<path>: Removed.` line when in-place remediation succeeded. The counter
//! and the detection lines are read independently and are not reconciled: the
//! counter decides clean vs threat, the lines populate the detail list.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static INFECTED_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Infected files:\s*(\d+)")
        .expect("infected count pattern is valid")
});

static FOUND_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<path>.+):\s+(?P<threat>\S+)\s+FOUND\s*$")
        .expect("detection line pattern is valid")
});

const REMOVAL_MARKER: &str = "Removed.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatRecord {
    pub path: String,
    pub threat_name: String,
    pub removed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub infected_count: u64,
    pub infected_files: Vec<ThreatRecord>,
}

impl ScanReport {
    pub fn parse(text: &str) -> Self {
        Self {
            infected_count: infected_count(text),
            infected_files: threat_records(text),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.infected_count == 0
    }
}

/// First `Infected files: N` counter in the text; zero when absent or out of
/// range.
pub fn infected_count(text: &str) -> u64 {
    INFECTED_COUNT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|count| count.as_str().parse().ok())
        .unwrap_or(0)
}

pub fn threat_records(text: &str) -> Vec<ThreatRecord> {
    let lines: Vec<&str> = text.lines().collect();

    lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| {
            let caps = FOUND_LINE.captures(line.trim_end())?;
            let removed = lines
                .get(index + 1)
                .is_some_and(|next| next.contains(REMOVAL_MARKER));

            Some(ThreatRecord {
                path: caps["path"].to_string(),
                threat_name: caps["threat"].to_string(),
                removed,
            })
        })
        .collect()
}
