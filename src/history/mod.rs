//! Soft-delete ledger for links removed from the board.
//!
//! Entries are kept newest first and pruned on every load and every write:
//! first by the retention window, then by the entry cap.

use crossbeam_channel::Receiver;
use indexmap::IndexMap;
use serde_json::Value;
use time::{Duration, OffsetDateTime};

use crate::config::HistoryOptions;
use crate::model::{HistoryData, LinkItem, TrashedLinkItem};
use crate::storage::{Record, Shape, StorageHandle, HISTORY_KEY};

/// Trashed links that came from the same tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryGroup {
    pub date_string: String,
    /// Tab title captured at deletion time.
    pub title: String,
    pub items: Vec<TrashedLinkItem>,
}

pub struct HistoryLedger {
    record: Record<HistoryData>,
    retention: Duration,
    max_entries: usize,
}

impl HistoryLedger {
    pub fn new(storage: StorageHandle, options: &HistoryOptions) -> Self {
        Self {
            record: Record::new(storage, HISTORY_KEY).with_validator(history_shape),
            retention: options.retention(),
            max_entries: options.max_entries,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.record.is_initialized()
    }

    /// Loads and prunes the ledger. Calling it again is a no-op.
    pub fn init(&mut self) -> &HistoryData {
        if !self.record.is_initialized() {
            self.prune_loaded(OffsetDateTime::now_utc());
        }
        self.record.init()
    }

    pub fn snapshot(&mut self) -> HistoryData {
        self.init();
        self.record.snapshot()
    }

    pub fn len(&mut self) -> usize {
        self.init().trashed_links.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&mut self) -> Receiver<HistoryData> {
        self.record.subscribe()
    }

    pub fn add_one(&mut self, link: LinkItem, original_group: &str, original_title: &str) {
        self.add_many_at(
            vec![link],
            original_group,
            original_title,
            OffsetDateTime::now_utc(),
        );
    }

    /// Trashes a batch under one shared `deletedAt`.
    pub fn add_many(&mut self, links: Vec<LinkItem>, original_group: &str, original_title: &str) {
        self.add_many_at(links, original_group, original_title, OffsetDateTime::now_utc());
    }

    pub fn remove_by_id(&mut self, id: &str) -> usize {
        self.remove_where(|entry| entry.link.id == id, OffsetDateTime::now_utc())
    }

    pub fn remove_by_original_group(&mut self, date_string: &str) -> usize {
        self.remove_where(
            |entry| entry.original_date_group == date_string,
            OffsetDateTime::now_utc(),
        )
    }

    pub fn clear_all(&mut self) -> usize {
        self.remove_where(|_| true, OffsetDateTime::now_utc())
    }

    /// Entries grouped by originating tab, newest tab first, each group's
    /// items newest deletion first.
    pub fn grouped(&mut self) -> Vec<HistoryGroup> {
        let mut groups: IndexMap<String, HistoryGroup> = IndexMap::new();
        for entry in &self.init().trashed_links {
            groups
                .entry(entry.original_date_group.clone())
                .or_insert_with(|| HistoryGroup {
                    date_string: entry.original_date_group.clone(),
                    title: entry.original_title.clone(),
                    items: Vec::new(),
                })
                .items
                .push(entry.clone());
        }
        groups.sort_by(|a, _, b, _| b.cmp(a));
        groups
            .into_values()
            .map(|mut group| {
                group.items.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
                group
            })
            .collect()
    }

    fn add_many_at(
        &mut self,
        links: Vec<LinkItem>,
        original_group: &str,
        original_title: &str,
        now: OffsetDateTime,
    ) {
        if links.is_empty() {
            return;
        }
        self.init();
        let count = links.len();
        let (retention, max_entries) = (self.retention, self.max_entries);
        self.record.update(|data| {
            let trashed = links.into_iter().map(|link| TrashedLinkItem {
                link,
                deleted_at: now,
                original_date_group: original_group.to_string(),
                original_title: original_title.to_string(),
            });
            let mut next: Vec<TrashedLinkItem> = trashed.collect();
            next.append(&mut data.trashed_links);
            data.trashed_links = next;
            prune(&mut data.trashed_links, now, retention, max_entries);
        });
        tracing::debug!(count, group = original_group, "links moved to history");
    }

    fn remove_where(
        &mut self,
        predicate: impl Fn(&TrashedLinkItem) -> bool,
        now: OffsetDateTime,
    ) -> usize {
        self.init();
        let (retention, max_entries) = (self.retention, self.max_entries);
        self.record
            .try_update(|data| {
                let before = data.trashed_links.len();
                if !data.trashed_links.iter().any(&predicate) {
                    return None;
                }
                data.trashed_links.retain(|entry| !predicate(entry));
                let removed = before - data.trashed_links.len();
                prune(&mut data.trashed_links, now, retention, max_entries);
                Some(removed)
            })
            .unwrap_or(0)
    }

    fn prune_loaded(&mut self, now: OffsetDateTime) {
        let (retention, max_entries) = (self.retention, self.max_entries);
        let pruned = self.record.try_update(|data| {
            let removed = prune(&mut data.trashed_links, now, retention, max_entries);
            (removed > 0).then_some(removed)
        });
        if let Some(removed) = pruned {
            tracing::debug!(removed, "pruned expired history entries on load");
        }
    }
}

/// Drops entries deleted before `now - retention`, then keeps the first
/// `max_entries`. A window reaching past the calendar keeps every entry.
pub fn prune(
    entries: &mut Vec<TrashedLinkItem>,
    now: OffsetDateTime,
    retention: Duration,
    max_entries: usize,
) -> usize {
    let before = entries.len();
    if let Some(cutoff) = now.checked_sub(retention) {
        entries.retain(|entry| entry.deleted_at >= cutoff);
    }
    entries.truncate(max_entries);
    before - entries.len()
}

fn history_shape(value: &Value) -> Shape {
    match value.get("trashedLinks") {
        Some(Value::Array(_)) => Shape::Current,
        Some(_) => Shape::Invalid("trashedLinks is not an array".into()),
        None => Shape::Invalid("missing trashedLinks".into()),
    }
}
