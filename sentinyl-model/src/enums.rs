use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a stored or submitted string does not name a known variant.
#[derive(Debug, Error)]
#[error("invalid {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    ($(#[$doc:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseEnumError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

wire_enum!(
    /// Priority assigned to a monitored domain
    Priority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
);

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

wire_enum!(
    /// Kind of detection a scan job runs
    ScanKind {
        Typosquat => "typosquat",
        Leak => "leak",
    }
);

wire_enum!(
    /// Lifecycle of a scan job. Progression is monotonic:
    /// `pending -> processing -> {completed | failed}`.
    JobStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
);

impl JobStatus {
    /// Terminal states carry `completed_at` and are never re-dispatched.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving to `next` respects the monotonic progression.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, JobStatus::Processing)
                | (Self::Pending, JobStatus::Failed)
                | (Self::Processing, JobStatus::Completed)
                | (Self::Processing, JobStatus::Failed)
        )
    }
}

wire_enum!(
    /// Severity bucket shared by threats, leaks, and guard events
    Severity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
);

impl Severity {
    /// Fan-out is suppressed for findings below this rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

wire_enum!(
    /// Behavioral anomaly category reported by the host agent
    AnomalyKind {
        Geo => "geo",
        Process => "process",
        Resource => "resource",
    }
);

wire_enum!(
    /// Operator verdict on a guard event
    OperatorResponse {
        None => "none",
        Safe => "safe",
        Block => "block",
    }
);

wire_enum!(
    /// Subscription tier
    Tier {
        Free => "free",
        ScoutPro => "scout_pro",
        GuardLite => "guard_lite",
        FullStack => "full_stack",
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_progression_is_monotonic() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));

        // Backward and out-of-terminal transitions are invalid.
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn wire_values_round_trip() {
        for kind in [ScanKind::Typosquat, ScanKind::Leak] {
            assert_eq!(kind.as_str().parse::<ScanKind>().unwrap(), kind);
        }
        assert_eq!("scout_pro".parse::<Tier>().unwrap(), Tier::ScoutPro);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn severity_ranks_order_buckets() {
        assert!(Severity::Critical.rank() > Severity::High.rank());
        assert!(Severity::High.rank() > Severity::Medium.rank());
        assert!(Severity::Medium.rank() > Severity::Low.rank());
    }

    #[test]
    fn serde_uses_snake_case_strings() {
        assert_eq!(
            serde_json::to_string(&AnomalyKind::Geo).unwrap(),
            "\"geo\""
        );
        let parsed: OperatorResponse = serde_json::from_str("\"block\"").unwrap();
        assert_eq!(parsed, OperatorResponse::Block);
    }
}
