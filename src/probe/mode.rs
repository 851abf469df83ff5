//! Health-check modes and their probe arguments.
//!
//! The query string is untrusted input. It is only ever used to pick one of
//! the fixed [`ProbeMode`] variants; the argument handed to the probe always
//! comes from the table below, never from the request.

use std::fmt;

/// A named health-check category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProbeMode {
    #[default]
    All,
    DailySummary,
    Cluster,
    Heap,
    Shards,
    Search,
    MonthlyRestart,
}

impl ProbeMode {
    /// Every mode, in display order.
    pub const ALL: [ProbeMode; 7] = [
        ProbeMode::All,
        ProbeMode::DailySummary,
        ProbeMode::Cluster,
        ProbeMode::Heap,
        ProbeMode::Shards,
        ProbeMode::Search,
        ProbeMode::MonthlyRestart,
    ];

    /// Resolve a raw `mode` query value. Missing, empty or unknown values become `All`.
    pub fn resolve(raw: Option<&str>) -> Self {
        raw.and_then(Self::from_name).unwrap_or_default()
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.as_str() == name)
    }

    /// Name used in the query string and in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMode::All => "all",
            ProbeMode::DailySummary => "daily-summary",
            ProbeMode::Cluster => "cluster",
            ProbeMode::Heap => "heap",
            ProbeMode::Shards => "shards",
            ProbeMode::Search => "search",
            ProbeMode::MonthlyRestart => "monthly-restart",
        }
    }

    /// Positional argument passed to the probe executable.
    pub fn argument(&self) -> &'static str {
        match self {
            ProbeMode::All => "all",
            ProbeMode::DailySummary => "--daily-summary",
            ProbeMode::Cluster => "cluster",
            ProbeMode::Heap => "heap",
            ProbeMode::Shards => "shards",
            ProbeMode::Search => "search",
            ProbeMode::MonthlyRestart => "monthly-restart",
        }
    }
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
