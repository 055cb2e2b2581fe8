use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kellgren-Lawrence style arthrosis grade, in ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Healthy,
    Doubtful,
    Minimal,
    Moderate,
    Severe,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Healthy,
        Severity::Doubtful,
        Severity::Minimal,
        Severity::Moderate,
        Severity::Severe,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Severity> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Healthy => "Healthy",
            Severity::Doubtful => "Doubtful",
            Severity::Minimal => "Minimal",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
        }
    }

    /// Short clinical description shown next to the label.
    pub fn caption(self) -> &'static str {
        match self {
            Severity::Healthy => "No signs of arthrosis",
            Severity::Doubtful => "Questionable findings",
            Severity::Minimal => "Early stage changes",
            Severity::Moderate => "Clear arthrotic changes",
            Severity::Severe => "Advanced arthrosis",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|sev| sev.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown severity class: {wanted}"))
    }
}

/// Coarse reading of the winning probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfidenceLevel {
    High,
    Moderate,
    Low,
}

impl ConfidenceLevel {
    /// `percent` is the winning probability scaled to 0..=100.
    pub fn from_percent(percent: f32) -> Self {
        if percent > 80.0 {
            ConfidenceLevel::High
        } else if percent > 60.0 {
            ConfidenceLevel::Moderate
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Moderate => "Moderate",
            ConfidenceLevel::Low => "Low",
        }
    }
}
