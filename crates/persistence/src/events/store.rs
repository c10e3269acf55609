//! JSONL Event Store - append-only writer
//!
//! Writes audit events into one JSONL file per day.

use crate::error::{PersistenceError, PersistenceResult};
use chrono::Utc;
use sacco_core::Event;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Event Store - appends events to JSONL files.
///
/// Files are organised by day: `data/events/2026-10-16.jsonl`
pub struct EventStore {
    base_path: PathBuf,
    /// Next event sequence number
    event_counter: AtomicU64,
    current_writer: Mutex<Option<EventWriter>>,
}

struct EventWriter {
    date: String,
    writer: BufWriter<File>,
}

impl EventStore {
    /// Open the store, creating the directory if needed.
    ///
    /// The id counter resumes after the highest id found on disk.
    pub fn new<P: AsRef<Path>>(base_path: P) -> PersistenceResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        fs::create_dir_all(&base_path)?;

        let event_counter = Self::load_event_counter(&base_path)?;

        Ok(Self {
            base_path,
            event_counter: AtomicU64::new(event_counter),
            current_writer: Mutex::new(None),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn load_event_counter(base_path: &Path) -> PersistenceResult<u64> {
        let mut max_id: u64 = 0;

        for entry in fs::read_dir(base_path)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                let content = fs::read_to_string(&path)?;
                for line in content.lines() {
                    // EVT_000123 -> 123; unreadable lines do not stop the scan
                    let Ok(event) = serde_json::from_str::<Event>(line) else {
                        continue;
                    };
                    if let Some(num) = event
                        .event_id
                        .strip_prefix("EVT_")
                        .and_then(|n| n.parse::<u64>().ok())
                    {
                        max_id = max_id.max(num);
                    }
                }
            }
        }

        Ok(max_id + 1)
    }

    fn get_file_path(&self, date: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", date))
    }

    fn current_date() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    fn lock_writer(&self) -> PersistenceResult<MutexGuard<'_, Option<EventWriter>>> {
        self.current_writer
            .lock()
            .map_err(|_| PersistenceError::Other("event writer lock poisoned".into()))
    }

    /// Reserve the next event id
    pub fn next_event_id(&self) -> String {
        let id = self.event_counter.fetch_add(1, Ordering::SeqCst);
        Event::generate_id(id)
    }

    /// Append one event to today's file
    pub fn append(&self, event: &Event) -> PersistenceResult<()> {
        let date = Self::current_date();
        let json = event.to_json()?;

        let mut guard = self.lock_writer()?;

        let needs_new_file = guard.as_ref().map_or(true, |w| w.date != date);
        if needs_new_file {
            let path = self.get_file_path(&date);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            *guard = Some(EventWriter {
                date,
                writer: BufWriter::new(file),
            });
        }

        if let Some(ref mut w) = *guard {
            writeln!(w.writer, "{}", json)?;
            w.writer.flush()?;
        }

        Ok(())
    }

    pub fn append_batch(&self, events: &[Event]) -> PersistenceResult<()> {
        for event in events {
            self.append(event)?;
        }
        Ok(())
    }

    /// All event files, oldest day first
    pub fn list_files(&self) -> PersistenceResult<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    pub fn get_file_for_date(&self, date: &str) -> Option<PathBuf> {
        let path = self.get_file_path(date);
        path.exists().then_some(path)
    }

    pub fn flush(&self) -> PersistenceResult<()> {
        let mut guard = self.lock_writer()?;
        if let Some(ref mut w) = *guard {
            w.writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sacco_core::{EventType, MemberRole};
    use tempfile::tempdir;

    fn confirmed(store: &EventStore, amount: rust_decimal::Decimal) -> Event {
        Event::new(
            store.next_event_id(),
            EventType::InvestmentConfirmed,
            "MEM_0001",
            MemberRole::Admin,
            "INV_000001",
        )
        .for_member("MEM_0002")
        .with_amount(amount, "KES")
    }

    #[test]
    fn test_event_store_append() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path()).unwrap();

        let event = confirmed(&store, dec!(100));
        store.append(&event).unwrap();
        store.flush().unwrap();

        let files = store.list_files().unwrap();
        assert_eq!(files.len(), 1);

        let content = fs::read_to_string(&files[0]).unwrap();
        assert!(content.contains("EVT_000001"));
        assert!(content.contains("investment_confirmed"));
    }

    #[test]
    fn test_event_store_counter() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path()).unwrap();

        assert_eq!(store.next_event_id(), "EVT_000001");
        assert_eq!(store.next_event_id(), "EVT_000002");
    }

    #[test]
    fn test_event_store_reload_counter() {
        let dir = tempdir().unwrap();

        {
            let store = EventStore::new(dir.path()).unwrap();
            store.append(&confirmed(&store, dec!(100))).unwrap();
            store.append(&confirmed(&store, dec!(50))).unwrap();
        }

        let store = EventStore::new(dir.path()).unwrap();
        assert_eq!(store.next_event_id(), "EVT_000003");
    }
}
