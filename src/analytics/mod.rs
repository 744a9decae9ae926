//! Capped, newest-first log of board events.
//!
//! The log only observes; nothing in the board consults it before acting.

use crossbeam_channel::Receiver;
use serde_json::Value;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use crate::config::{AnalyticsOptions, MAX_ACTIVITY_DAYS};
use crate::dates;
use crate::model::{new_id, AnalyticsEvent, AnalyticsEventType, EventDetails};
use crate::storage::{Record, Shape, StorageHandle, ANALYTICS_KEY};

const RECENT_IN_SUMMARY: usize = 20;
const CLEARED_MESSAGE: &str = "Analytics log was cleared by user.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyActivity {
    pub date: Date,
    pub links_created: usize,
    pub links_deleted: usize,
    pub tabs_created: usize,
    pub tabs_deleted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsSummary {
    /// Created minus deleted links across the retained log.
    pub net_links: i64,
    pub net_tabs: i64,
    /// Oldest day first, ending today.
    pub daily: Vec<DailyActivity>,
    pub recent: Vec<AnalyticsEvent>,
}

pub struct AnalyticsLog {
    record: Record<Vec<AnalyticsEvent>>,
    max_entries: usize,
    activity_days: u32,
}

impl AnalyticsLog {
    pub fn new(storage: StorageHandle, options: &AnalyticsOptions) -> Self {
        Self {
            record: Record::new(storage, ANALYTICS_KEY).with_validator(analytics_shape),
            max_entries: options.max_entries,
            activity_days: options.activity_days.min(MAX_ACTIVITY_DAYS),
        }
    }

    /// Loads the log, trimming an oversized stored log. Idempotent.
    pub fn init(&mut self) -> &[AnalyticsEvent] {
        if !self.record.is_initialized() {
            let max_entries = self.max_entries;
            self.record.try_update(|events| {
                (events.len() > max_entries).then(|| events.truncate(max_entries))
            });
        }
        self.record.init()
    }

    pub fn events(&mut self) -> Vec<AnalyticsEvent> {
        self.init().to_vec()
    }

    pub fn len(&mut self) -> usize {
        self.init().len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&mut self) -> Receiver<Vec<AnalyticsEvent>> {
        self.record.subscribe()
    }

    pub fn record(&mut self, kind: AnalyticsEventType, details: EventDetails) {
        self.record_at(kind, details, OffsetDateTime::now_utc());
    }

    /// Leaves exactly one `ANALYTICS_CLEARED` entry behind.
    pub fn clear(&mut self) {
        self.init();
        let event = AnalyticsEvent {
            id: new_id(),
            kind: AnalyticsEventType::AnalyticsCleared,
            timestamp: OffsetDateTime::now_utc(),
            details: EventDetails::message(CLEARED_MESSAGE),
        };
        self.record.update(|events| *events = vec![event]);
        tracing::info!("analytics log cleared");
    }

    /// The `n` most recent events by timestamp.
    pub fn recent(&mut self, n: usize) -> Vec<AnalyticsEvent> {
        let mut events = self.events();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(n);
        events
    }

    pub fn summary(&mut self, now: OffsetDateTime, offset: UtcOffset) -> AnalyticsSummary {
        let days = self.activity_days;
        let events = self.events();
        let count = |kind: AnalyticsEventType| {
            events.iter().filter(|event| event.kind == kind).count() as i64
        };
        let net_links = count(AnalyticsEventType::LinkCreated) - count(AnalyticsEventType::LinkDeleted);
        let net_tabs = count(AnalyticsEventType::TabCreated) - count(AnalyticsEventType::TabDeleted);

        let today = dates::day_of(now, offset);
        let mut daily: Vec<DailyActivity> = (0..i64::from(days))
            .rev()
            .filter_map(|back| today.checked_sub(Duration::days(back)))
            .map(|date| DailyActivity {
                date,
                links_created: 0,
                links_deleted: 0,
                tabs_created: 0,
                tabs_deleted: 0,
            })
            .collect();
        for event in &events {
            let day = dates::day_of(event.timestamp, offset);
            let Some(bucket) = daily.iter_mut().find(|bucket| bucket.date == day) else {
                continue;
            };
            match event.kind {
                AnalyticsEventType::LinkCreated => bucket.links_created += 1,
                AnalyticsEventType::LinkDeleted => bucket.links_deleted += 1,
                AnalyticsEventType::TabCreated => bucket.tabs_created += 1,
                AnalyticsEventType::TabDeleted => bucket.tabs_deleted += 1,
                AnalyticsEventType::AnalyticsCleared => {}
            }
        }

        AnalyticsSummary {
            net_links,
            net_tabs,
            daily,
            recent: self.recent(RECENT_IN_SUMMARY),
        }
    }

    fn record_at(&mut self, kind: AnalyticsEventType, details: EventDetails, now: OffsetDateTime) {
        self.init();
        let event = AnalyticsEvent {
            id: new_id(),
            kind,
            timestamp: now,
            details,
        };
        let max_entries = self.max_entries;
        self.record.update(|events| {
            events.insert(0, event);
            events.truncate(max_entries);
        });
        tracing::debug!(%kind, "analytics event recorded");
    }
}

fn analytics_shape(value: &Value) -> Shape {
    if value.is_array() {
        Shape::Current
    } else {
        Shape::Invalid("analytics log is not an array".into())
    }
}
