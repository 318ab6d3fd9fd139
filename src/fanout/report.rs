//! Fan-out results.

use std::fmt;
use std::time::Duration;

use crate::dispatch::{DispatchOutcome, DispatchResult};
use crate::error::ErrorKind;
use crate::transport::Payload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Succeeded(Payload),
    Failed(ErrorKind),
    /// Still running when the deadline fired; its result was discarded.
    TimedOut,
}

impl EntryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EntryStatus::Succeeded(_) => "succeeded",
            EntryStatus::Failed(_) => "failed",
            EntryStatus::TimedOut => "timed_out",
        }
    }
}

/// One candidate's contribution to a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutEntry {
    pub service_id: String,
    pub latency: Duration,
    pub attempts: u32,
    pub status: EntryStatus,
}

impl FanoutEntry {
    pub fn timed_out(service_id: impl Into<String>, latency: Duration) -> Self {
        Self {
            service_id: service_id.into(),
            latency,
            attempts: 0,
            status: EntryStatus::TimedOut,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, EntryStatus::Succeeded(_))
    }
}

impl From<DispatchResult> for FanoutEntry {
    fn from(result: DispatchResult) -> Self {
        let status = match result.outcome {
            DispatchOutcome::Success(payload) => EntryStatus::Succeeded(payload),
            DispatchOutcome::Failure { kind, .. } => EntryStatus::Failed(kind),
        };
        Self {
            service_id: result.service_id,
            latency: result.latency,
            attempts: result.attempts,
            status,
        }
    }
}

/// Everything a fan-out produced, in presentation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub capability: String,
    /// Ascending latency, ties broken by ascending service id.
    pub entries: Vec<FanoutEntry>,
    pub elapsed: Duration,
}

impl FanoutReport {
    pub fn new(capability: impl Into<String>, mut entries: Vec<FanoutEntry>, elapsed: Duration) -> Self {
        entries.sort_by(|a, b| {
            a.latency
                .cmp(&b.latency)
                .then_with(|| a.service_id.cmp(&b.service_id))
        });
        Self {
            capability: capability.into(),
            entries,
            elapsed,
        }
    }

    pub fn successes(&self) -> impl Iterator<Item = &FanoutEntry> {
        self.entries.iter().filter(|e| e.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Failed(_)))
            .count()
    }

    pub fn timed_out_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::TimedOut)
            .count()
    }
}

impl fmt::Display for FanoutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capability '{}': {} candidates, {} succeeded, {} failed, {} timed out",
            self.capability,
            self.entries.len(),
            self.success_count(),
            self.failed_count(),
            self.timed_out_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, ms: u64, status: EntryStatus) -> FanoutEntry {
        FanoutEntry {
            service_id: id.to_string(),
            latency: Duration::from_millis(ms),
            attempts: 1,
            status,
        }
    }

    #[test]
    fn test_order_by_latency_then_id() {
        let report = FanoutReport::new(
            "search",
            vec![
                entry("c", 30, EntryStatus::Failed(ErrorKind::Server)),
                entry("b", 10, EntryStatus::Succeeded(Payload::new(200, "b"))),
                entry("a", 10, EntryStatus::Succeeded(Payload::new(200, "a"))),
                FanoutEntry::timed_out("d", Duration::from_millis(200)),
            ],
            Duration::from_millis(200),
        );

        let order: Vec<&str> = report.entries.iter().map(|e| e.service_id.as_str()).collect();
        assert_eq!(order, ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_counts_and_display() {
        let report = FanoutReport::new(
            "search",
            vec![
                entry("a", 10, EntryStatus::Succeeded(Payload::new(200, "a"))),
                entry("b", 20, EntryStatus::Failed(ErrorKind::Timeout)),
                FanoutEntry::timed_out("c", Duration::from_millis(50)),
            ],
            Duration::from_millis(50),
        );

        assert_eq!(report.success_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.timed_out_count(), 1);
        assert_eq!(
            report.to_string(),
            "capability 'search': 3 candidates, 1 succeeded, 1 failed, 1 timed out"
        );
    }
}
