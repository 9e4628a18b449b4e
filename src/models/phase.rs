use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a scheduled session.
///
/// Variants are declared in chronological order, so `Ord` follows the
/// lifecycle: `NotStarted < Preparation < Session < Overtime < Ended`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotStarted,
    Preparation,
    Session,
    Overtime,
    Ended,
}

/// Display metadata attached to each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseInfo {
    pub label: &'static str,
    pub icon: &'static str,
    pub class_name: &'static str,
    pub counts_down: bool,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::NotStarted,
        Phase::Preparation,
        Phase::Session,
        Phase::Overtime,
        Phase::Ended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NotStarted => "not_started",
            Phase::Preparation => "preparation",
            Phase::Session => "session",
            Phase::Overtime => "overtime",
            Phase::Ended => "ended",
        }
    }

    pub fn info(&self) -> PhaseInfo {
        match self {
            Phase::NotStarted => PhaseInfo {
                label: "في انتظار الجلسة",
                icon: "⏳",
                class_name: "waiting",
                counts_down: true,
            },
            Phase::Preparation => PhaseInfo {
                label: "وقت التحضير",
                icon: "🔔",
                class_name: "preparation",
                counts_down: true,
            },
            Phase::Session => PhaseInfo {
                label: "الجلسة المباشرة",
                icon: "🎓",
                class_name: "active",
                counts_down: true,
            },
            // Overtime is a bounded grace window, shown as what is left of it.
            Phase::Overtime => PhaseInfo {
                label: "وقت إضافي",
                icon: "⏰",
                class_name: "overtime",
                counts_down: true,
            },
            Phase::Ended => PhaseInfo {
                label: "انتهت الجلسة",
                icon: "✅",
                class_name: "ended",
                counts_down: false,
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Ended)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_order_chronologically() {
        let mut sorted = Phase::ALL;
        sorted.sort();
        assert_eq!(sorted, Phase::ALL);
        assert!(Phase::Preparation < Phase::Overtime);
    }

    #[test]
    fn serializes_as_snake_case_tags() {
        let json = serde_json::to_string(&Phase::NotStarted).unwrap();
        assert_eq!(json, "\"not_started\"");
        let parsed: Phase = serde_json::from_str("\"overtime\"").unwrap();
        assert_eq!(parsed, Phase::Overtime);
    }

    #[test]
    fn every_phase_has_a_distinct_style_class() {
        let mut classes: Vec<_> = Phase::ALL.iter().map(|p| p.info().class_name).collect();
        classes.sort();
        classes.dedup();
        assert_eq!(classes.len(), Phase::ALL.len());
        assert!(!Phase::Ended.info().counts_down);
        assert!(Phase::Overtime.info().counts_down);
    }
}
