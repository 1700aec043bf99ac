use std::collections::BTreeMap;

use dashmap::DashMap;
use log::warn;

use super::TraceEntry;

/// Per-run call-site counts.
///
/// Any number of application threads may record concurrently; each
/// increment happens under the owning shard's lock, so no update is lost.
#[derive(Debug, Default)]
pub struct TraceLog {
    counts: DashMap<TraceEntry, u64>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: TraceEntry) {
        *self.counts.entry(entry).or_insert(0) += 1;
    }

    pub fn count(&self, entry: &TraceEntry) -> u64 {
        self.counts.get(entry).map(|c| *c).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Copies the current counts out, ordered by entry.
    pub fn snapshot(&self) -> Vec<(TraceEntry, u64)> {
        let mut entries: Vec<(TraceEntry, u64)> = self
            .counts
            .iter()
            .map(|kv| (kv.key().clone(), *kv.value()))
            .collect();
        entries.sort();
        entries
    }
}

/// Result of folding one run into an existing log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedLog {
    pub lines: Vec<String>,
    /// Entries that were already present and had their counts added to.
    pub updated: usize,
    /// Entries that appear for the first time.
    pub added: usize,
    /// Existing lines that could not be parsed and were kept as they were.
    pub preserved: usize,
}

impl MergedLog {
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Folds `run` into the text of an existing log.
///
/// Counts of entries present in both are summed. Existing lines without a
/// count contribute zero. Lines that do not parse are carried over verbatim
/// after the merged entries.
///
/// A line keeps its count column once it has one, so a run with `counting`
/// off still adds to totals written by earlier counted runs. Only entries
/// never counted are written without it.
pub fn merge_log(existing: &str, run: &[(TraceEntry, u64)], counting: bool) -> MergedLog {
    let mut merged: BTreeMap<TraceEntry, Tally> = BTreeMap::new();
    let mut verbatim = Vec::new();

    for raw in existing.lines() {
        let line = raw.trim_end();
        if line.is_empty() {
            continue;
        }
        match TraceEntry::parse_line(line) {
            Ok((entry, count)) => {
                let tally = merged.entry(entry).or_default();
                tally.total += count.unwrap_or(0);
                tally.counted |= count.is_some();
            }
            Err(e) => {
                warn!("keeping unparseable trace line {line:?}: {e}");
                verbatim.push(line.to_owned());
            }
        }
    }

    let mut updated = 0;
    let mut added = 0;
    for (entry, count) in run {
        let tally = match merged.get_mut(entry) {
            Some(tally) => {
                updated += 1;
                tally
            }
            None => {
                added += 1;
                merged.entry(entry.clone()).or_default()
            }
        };
        tally.total += count;
        tally.counted |= counting;
    }

    let preserved = verbatim.len();
    let mut lines: Vec<String> = merged
        .into_iter()
        .map(|(entry, tally)| entry.to_line(tally.counted.then_some(tally.total)))
        .collect();
    lines.extend(verbatim);

    MergedLog { lines, updated, added, preserved }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: u64,
    /// Whether the line carries a count column.
    counted: bool,
}
