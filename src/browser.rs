//! Selection state machine behind the run browser.
//!
//! The browser is driven one [`Event`] at a time. It starts in the browsing
//! phase and ends, exactly once, with an [`Outcome`]. Nothing here touches the
//! terminal; the TUI layer feeds events in and renders the state.
//! Without the `tui` feature only the plain listing is used.
#![cfg_attr(not(feature = "tui"), allow(dead_code))]

use crate::model::{IndexEntry, RunResult};
use crate::store::{Store, StoreError};
use std::io::{self, Write};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const LISTING_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
);

/// Resolves the stored output for a (target, start_time) key.
pub trait OutputSource {
    fn output(&self, target: &str, start_time: OffsetDateTime) -> Result<String, StoreError>;
}

impl OutputSource for Store {
    fn output(&self, target: &str, start_time: OffsetDateTime) -> Result<String, StoreError> {
        self.get_output(target, start_time)
    }
}

/// A row in the browser: either just the index key, or the whole run.
#[derive(Debug, Clone)]
pub enum Entry {
    Indexed(IndexEntry),
    Loaded(RunResult),
}

impl Entry {
    pub fn target(&self) -> &str {
        match self {
            Entry::Indexed(e) => &e.target,
            Entry::Loaded(r) => r.invocation.target(),
        }
    }

    pub fn start_time(&self) -> OffsetDateTime {
        match self {
            Entry::Indexed(e) => e.start_time,
            Entry::Loaded(r) => r.start_time,
        }
    }

    fn resolve(&self, source: &dyn OutputSource) -> Result<String, StoreError> {
        match self {
            Entry::Indexed(e) => source.output(&e.target, e.start_time),
            Entry::Loaded(r) => Ok(r.output.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    MoveUp,
    MoveDown,
    Confirm,
    Cancel,
}

#[derive(Debug)]
pub enum Outcome {
    Selected(String),
    /// The selection could not be resolved; reported, not fatal.
    Failed(StoreError),
    Cancelled,
}

#[derive(Debug)]
enum Phase {
    Browsing,
    Terminated(Outcome),
}

#[derive(Debug)]
pub struct Browser {
    entries: Vec<Entry>,
    cursor: usize,
    phase: Phase,
}

impl Browser {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            cursor: 0,
            phase: Phase::Browsing,
        }
    }

    pub fn from_index(index: Vec<IndexEntry>) -> Self {
        Self::new(index.into_iter().map(Entry::Indexed).collect())
    }

    pub fn from_results(results: Vec<RunResult>) -> Self {
        Self::new(results.into_iter().map(Entry::Loaded).collect())
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_browsing(&self) -> bool {
        matches!(self.phase, Phase::Browsing)
    }

    /// Apply one event. Events after termination are ignored.
    pub fn apply(&mut self, event: Event, source: &dyn OutputSource) {
        if !self.is_browsing() {
            return;
        }
        match event {
            Event::MoveUp => self.cursor = self.cursor.saturating_sub(1),
            Event::MoveDown => {
                self.cursor = (self.cursor + 1).min(self.entries.len().saturating_sub(1));
            }
            Event::Confirm => {
                let outcome = match self.entries.get(self.cursor) {
                    Some(entry) => match entry.resolve(source) {
                        Ok(output) => Outcome::Selected(output),
                        Err(e) => Outcome::Failed(e),
                    },
                    None => Outcome::Cancelled,
                };
                self.phase = Phase::Terminated(outcome);
            }
            Event::Cancel => self.phase = Phase::Terminated(Outcome::Cancelled),
        }
    }

    /// The outcome once terminated, `None` while still browsing.
    pub fn into_outcome(self) -> Option<Outcome> {
        match self.phase {
            Phase::Browsing => None,
            Phase::Terminated(outcome) => Some(outcome),
        }
    }
}

/// Print the outcome: output verbatim to `out`, failures to `err`.
pub fn emit(outcome: &Outcome, out: &mut impl Write, err: &mut impl Write) -> io::Result<()> {
    match outcome {
        Outcome::Selected(output) => {
            out.write_all(output.as_bytes())?;
            out.flush()
        }
        Outcome::Failed(e) => writeln!(err, "Failed to retrieve output: {e}"),
        Outcome::Cancelled => Ok(()),
    }
}

/// Offset used to show timestamps; UTC when the local offset can't be determined.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// One `target:start time` line per entry, for non-interactive listing.
pub fn write_listing(
    entries: &[IndexEntry],
    offset: UtcOffset,
    out: &mut impl Write,
) -> io::Result<()> {
    for e in entries {
        let local = e.start_time.to_offset(offset);
        let stamp = local
            .format(LISTING_FORMAT)
            .unwrap_or_else(|_| local.to_string());
        writeln!(out, "{}:{}", e.target, stamp)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Invocation;
    use std::cell::Cell;
    use time::macros::{datetime, offset};

    /// Store stand-in that counts lookups.
    struct Fixed {
        result: fn() -> Result<String, StoreError>,
        calls: Cell<usize>,
    }

    impl OutputSource for Fixed {
        fn output(&self, _target: &str, _start_time: OffsetDateTime) -> Result<String, StoreError> {
            self.calls.set(self.calls.get() + 1);
            (self.result)()
        }
    }

    fn ok_source() -> Fixed {
        Fixed {
            result: || Ok("stored output\n".to_string()),
            calls: Cell::new(0),
        }
    }

    fn index(n: usize) -> Vec<IndexEntry> {
        (0..n)
            .map(|i| IndexEntry {
                target: format!("play{i}.yml"),
                start_time: datetime!(2024-03-01 10:00:00 UTC) + time::Duration::minutes(i as i64),
            })
            .collect()
    }

    fn store_with(runs: &[(&str, OffsetDateTime, &str)]) -> Store {
        let store = match Store::open_in_memory() {
            Ok(s) => s,
            Err(e) => panic!("open: {e}"),
        };
        match store.init() {
            Ok(()) => {}
            Err(e) => panic!("init: {e}"),
        }
        for (target, start_time, output) in runs {
            let invocation = match Invocation::new(*target, Vec::new()) {
                Ok(inv) => inv,
                Err(e) => panic!("invocation: {e}"),
            };
            let r = RunResult {
                invocation,
                start_time: *start_time,
                output: output.to_string(),
            };
            match store.insert(&r) {
                Ok(()) => {}
                Err(e) => panic!("insert: {e}"),
            }
        }
        store
    }

    #[test]
    fn cursor_clamps_at_both_ends() {
        let source = ok_source();
        let mut b = Browser::from_index(index(5));

        b.apply(Event::MoveUp, &source);
        assert_eq!(b.cursor(), 0);

        for _ in 0..4 {
            b.apply(Event::MoveDown, &source);
        }
        assert_eq!(b.cursor(), 4);
        b.apply(Event::MoveDown, &source);
        assert_eq!(b.cursor(), 4);
        assert!(b.is_browsing());
    }

    #[test]
    fn cursor_stays_put_without_entries() {
        let source = ok_source();
        let mut b = Browser::new(Vec::new());
        b.apply(Event::MoveDown, &source);
        b.apply(Event::MoveUp, &source);
        assert_eq!(b.cursor(), 0);
    }

    #[test]
    fn cancel_terminates_without_lookup() {
        let source = ok_source();
        let mut b = Browser::from_index(index(3));
        b.apply(Event::MoveDown, &source);
        b.apply(Event::Cancel, &source);
        assert!(!b.is_browsing());
        assert_eq!(source.calls.get(), 0);
        assert!(matches!(b.into_outcome(), Some(Outcome::Cancelled)));
    }

    #[test]
    fn events_after_termination_are_ignored() {
        let source = ok_source();
        let mut b = Browser::from_index(index(3));
        b.apply(Event::Cancel, &source);
        b.apply(Event::MoveDown, &source);
        b.apply(Event::Confirm, &source);
        assert_eq!(b.cursor(), 0);
        assert_eq!(source.calls.get(), 0);
        assert!(matches!(b.into_outcome(), Some(Outcome::Cancelled)));
    }

    #[test]
    fn still_browsing_has_no_outcome() {
        let b = Browser::from_index(index(1));
        assert!(b.into_outcome().is_none());
    }

    #[test]
    fn lookup_failure_terminates_and_reports() {
        let source = Fixed {
            result: || {
                Err(StoreError::NotFound {
                    target: "gone.yml".into(),
                    start_time: "2024-03-01T10:00:00.000000000Z".into(),
                })
            },
            calls: Cell::new(0),
        };
        let mut b = Browser::from_index(index(2));
        b.apply(Event::Confirm, &source);
        assert!(!b.is_browsing());

        let outcome = match b.into_outcome() {
            Some(o) => o,
            None => panic!("expected an outcome"),
        };
        let mut out = Vec::new();
        let mut err = Vec::new();
        match emit(&outcome, &mut out, &mut err) {
            Ok(()) => {}
            Err(e) => panic!("emit: {e}"),
        }
        assert!(out.is_empty());
        let err = String::from_utf8_lossy(&err);
        assert!(err.starts_with("Failed to retrieve output: "), "{err}");
        assert!(err.contains("gone.yml"), "{err}");
    }

    #[test]
    fn loaded_entries_resolve_without_source() {
        let source = ok_source();
        let store = store_with(&[("a.yml", datetime!(2024-03-01 10:00:00 UTC), "preloaded\n")]);
        let results = match store.get_all_results() {
            Ok(r) => r,
            Err(e) => panic!("get_all_results: {e}"),
        };
        let mut b = Browser::from_results(results);
        b.apply(Event::Confirm, &source);
        assert_eq!(source.calls.get(), 0);
        match b.into_outcome() {
            Some(Outcome::Selected(o)) => assert_eq!(o, "preloaded\n"),
            other => panic!("expected Selected, got {other:?}"),
        }
    }

    #[test]
    fn selecting_second_run_prints_its_output() {
        let t1 = datetime!(2024-03-01 10:00:00 UTC);
        let t2 = datetime!(2024-03-01 10:05:00 UTC);
        let store = store_with(&[("a.yml", t1, "a output\n"), ("b.yml", t2, "\u{1b}[33mb output\u{1b}[0m\n")]);

        let idx = match store.list_index() {
            Ok(i) => i,
            Err(e) => panic!("list: {e}"),
        };
        let keys: Vec<(&str, OffsetDateTime)> =
            idx.iter().map(|e| (e.target.as_str(), e.start_time)).collect();
        assert_eq!(keys, vec![("a.yml", t1), ("b.yml", t2)]);

        let mut b = Browser::from_index(idx);
        b.apply(Event::MoveDown, &store);
        b.apply(Event::Confirm, &store);
        let outcome = match b.into_outcome() {
            Some(o) => o,
            None => panic!("expected an outcome"),
        };

        let mut out = Vec::new();
        let mut err = Vec::new();
        match emit(&outcome, &mut out, &mut err) {
            Ok(()) => {}
            Err(e) => panic!("emit: {e}"),
        }
        assert_eq!(out, "\u{1b}[33mb output\u{1b}[0m\n".as_bytes());
        assert!(err.is_empty());
    }

    #[test]
    fn listing_uses_given_offset() {
        let mut out = Vec::new();
        let entries = vec![IndexEntry {
            target: "/srv/site.yml".into(),
            start_time: datetime!(2024-03-01 23:30:00 UTC),
        }];
        match write_listing(&entries, offset!(+2), &mut out) {
            Ok(()) => {}
            Err(e) => panic!("listing: {e}"),
        }
        assert_eq!(
            String::from_utf8_lossy(&out),
            "/srv/site.yml:2024-03-02 01:30:00 +02:00\n"
        );
    }
}
