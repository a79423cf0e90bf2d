//! Run report: append-only observations and the sinks that receive them

use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, Utc};

/// Script step that produced an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Resolve,
    RevealOwner,
    Balances,
    ClaimOwnership,
    Withdraw,
    Aftermath,
    Verdict,
    Inspect,
}

impl Step {
    /// Position in the exploit script (1-based)
    pub fn number(&self) -> Option<u8> {
        match self {
            Step::Resolve => Some(1),
            Step::RevealOwner => Some(2),
            Step::Balances => Some(3),
            Step::ClaimOwnership => Some(4),
            Step::Withdraw => Some(5),
            Step::Aftermath => Some(6),
            Step::Verdict => Some(7),
            Step::Inspect => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Resolve => "resolve",
            Step::RevealOwner => "owner",
            Step::Balances => "balances",
            Step::ClaimOwnership => "claim",
            Step::Withdraw => "withdraw",
            Step::Aftermath => "aftermath",
            Step::Verdict => "verdict",
            Step::Inspect => "inspect",
        };
        f.write_str(name)
    }
}

/// One observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub step: Step,
    pub label: String,
    pub value: String,
    pub at: DateTime<Utc>,
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step.number() {
            Some(n) => write!(f, "[{}/7 {}] {}: {}", n, self.step, self.label, self.value),
            None => write!(f, "[{}] {}: {}", self.step, self.label, self.value),
        }
    }
}

/// Observations in issuance order
#[derive(Debug, Clone, Default)]
pub struct Report {
    entries: Vec<ReportEntry>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries produced by one step
    pub fn for_step(&self, step: Step) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(move |e| e.step == step)
    }

    /// First value reported under `label`
    pub fn value_of(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.value.as_str())
    }
}

/// Receives observations as they are made
pub trait ReportSink {
    fn observe(&mut self, entry: &ReportEntry);
}

/// Writes each observation as a plain text line prefixed with its UTC time
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for ConsoleSink<W> {
    fn observe(&mut self, entry: &ReportEntry) {
        // Narration only; a closed stdout must not abort a half-finished exploit
        let _ = writeln!(self.out, "{} {}", entry.at.format("%H:%M:%S"), entry);
        let _ = self.out.flush();
    }
}

/// Discards observations (the report itself still keeps them)
#[derive(Debug, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn observe(&mut self, _entry: &ReportEntry) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(step: Step, label: &str, value: &str) -> ReportEntry {
        ReportEntry {
            step,
            label: label.to_string(),
            value: value.to_string(),
            at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap(),
        }
    }

    #[test]
    fn test_report_keeps_order() {
        let mut report = Report::new();
        report.push(entry(Step::Resolve, "target", "0xabc"));
        report.push(entry(Step::Balances, "target balance", "10.0 ETH"));
        report.push(entry(Step::Balances, "caller balance", "1.0 ETH"));

        assert_eq!(report.len(), 3);
        assert_eq!(report.entries()[0].label, "target");
        assert_eq!(report.for_step(Step::Balances).count(), 2);
        assert_eq!(report.value_of("caller balance"), Some("1.0 ETH"));
        assert_eq!(report.value_of("missing"), None);
    }

    #[test]
    fn test_console_line_format() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.observe(&entry(Step::Withdraw, "tx", "0x01"));
        sink.observe(&entry(Step::Inspect, "nonce", "3"));

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["09:30:05 [5/7 withdraw] tx: 0x01", "09:30:05 [inspect] nonce: 3"]
        );
    }
}
