use std::sync::Arc;

use time::{Date, OffsetDateTime};
use url::Url;

use crate::analytics::{AnalyticsLog, AnalyticsSummary};
use crate::config::AppConfig;
use crate::error::CommandError;
use crate::groups::CardGroups;
use crate::history::{HistoryGroup, HistoryLedger};
use crate::metadata::{fetch_with_timeout, MetadataFetcher, NoopFetcher};
use crate::model::{
    AnalyticsEvent, AnalyticsEventType, BoardData, CardGroup, EventDetails, HistoryData, LinkItem,
};
use crate::storage::StorageHandle;

pub mod actions;
pub mod state;

pub use actions::{Outcome, OutcomeLevel};
pub use state::{BoardState, EditOutcome, RemovedLink, RemovedTab, SessionState, TabCreation};

/// Composition root: the board engine plus its observers, each owning one
/// stored record.
pub struct App {
    pub config: Arc<AppConfig>,
    pub storage: StorageHandle,
    board: BoardState,
    history: HistoryLedger,
    analytics: AnalyticsLog,
    groups: CardGroups,
    fetcher: Arc<dyn MetadataFetcher>,
}

impl App {
    pub fn new(config: Arc<AppConfig>, storage: StorageHandle) -> Self {
        let board = BoardState::new(storage.clone(), config.board.utc_offset());
        let history = HistoryLedger::new(storage.clone(), &config.history);
        let analytics = AnalyticsLog::new(storage.clone(), &config.analytics);
        let groups = CardGroups::new(storage.clone());
        Self {
            config,
            storage,
            board,
            history,
            analytics,
            groups,
            fetcher: Arc::new(NoopFetcher),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Loads every record. Safe to call repeatedly.
    pub fn init(&mut self) {
        self.board.init();
        self.history.init();
        self.analytics.init();
        self.groups.init();
    }

    pub fn board_state(&mut self) -> &mut BoardState {
        &mut self.board
    }

    pub fn board(&mut self) -> BoardData {
        self.board.snapshot()
    }

    pub fn active_tab(&mut self) -> Option<String> {
        self.board.active_tab()
    }

    pub fn find_link(&mut self, id: &str) -> Option<LinkItem> {
        self.board.board().find_link(id).cloned()
    }

    pub fn history(&mut self) -> HistoryData {
        self.history.snapshot()
    }

    pub fn history_groups(&mut self) -> Vec<HistoryGroup> {
        self.history.grouped()
    }

    pub fn analytics(&mut self) -> Vec<AnalyticsEvent> {
        self.analytics.events()
    }

    pub fn recent_events(&mut self, n: usize) -> Vec<AnalyticsEvent> {
        self.analytics.recent(n)
    }

    pub fn analytics_summary(&mut self) -> AnalyticsSummary {
        self.analytics
            .summary(OffsetDateTime::now_utc(), self.config.board.utc_offset())
    }

    /// Card groups of `tab`, or of the active tab when none is given.
    pub fn card_groups(&mut self, tab: Option<&str>) -> Vec<CardGroup> {
        match tab.map(str::to_string).or_else(|| self.board.active_tab()) {
            Some(tab) => self.groups.for_tab(&tab),
            None => Vec::new(),
        }
    }

    pub fn all_card_groups(&mut self) -> Vec<CardGroup> {
        self.groups.all()
    }

    /// Adds a link to the active tab, then enriches it with fetched
    /// metadata when the collaborator answers in time.
    pub fn add_link(&mut self, url: &str, title: Option<&str>) -> Outcome {
        let title = title.map(str::trim).filter(|title| !title.is_empty());
        let link = match self.board.add_link(url, title) {
            Ok(link) => link,
            Err(err) => return err.into(),
        };

        let fetched = if self.config.metadata.enabled {
            Url::parse(&link.url).ok().and_then(|parsed| {
                fetch_with_timeout(
                    Arc::clone(&self.fetcher),
                    &parsed,
                    self.config.metadata.timeout(),
                )
            })
        } else {
            None
        };
        let enriched = match &fetched {
            Some(metadata) if !metadata.is_empty() => {
                self.board.apply_metadata(&link.id, metadata, title)
            }
            _ => false,
        };
        let final_title = self
            .find_link(&link.id)
            .map(|current| current.title)
            .unwrap_or_else(|| link.title.clone());

        self.analytics.record(
            AnalyticsEventType::LinkCreated,
            EventDetails::titled(final_title.as_str(), link.id.as_str()),
        );
        tracing::info!(id = %link.id, url = %link.url, enriched, "link added");

        if enriched {
            Outcome::success("Link Added", format!("\"{final_title}\" has been added."))
        } else if self.config.metadata.enabled {
            Outcome::info(
                "Link Added (No Metadata)",
                format!("\"{final_title}\" was added, but no metadata could be fetched."),
            )
        } else {
            Outcome::success("Link Added", format!("\"{final_title}\" has been added."))
        }
    }

    pub fn edit_link(&mut self, updated: LinkItem) -> Outcome {
        match self.board.edit_link(updated) {
            EditOutcome::NotFound => link_not_found(),
            EditOutcome::UpdatedInPlace => Outcome::success("Link Updated", "Changes saved."),
            EditOutcome::Moved { to, .. } => Outcome::success(
                "Link Updated",
                format!("Changes saved and the link moved to the {to} tab."),
            ),
        }
    }

    /// Removes a link from the board and trashes it.
    pub fn delete_link(&mut self, id: &str) -> Outcome {
        let Some(removed) = self.board.delete_link(id) else {
            return link_not_found();
        };
        let title = removed.link.title.clone();
        let link_id = removed.link.id.clone();
        self.history
            .add_one(removed.link, &removed.group_date, &removed.group_title);
        self.analytics.record(
            AnalyticsEventType::LinkDeleted,
            EventDetails::titled(title.as_str(), link_id),
        );
        Outcome::success(
            "Link Moved to History",
            format!("\"{title}\" has been moved to history."),
        )
    }

    pub fn update_link_todo_date(&mut self, id: &str, todo: Option<OffsetDateTime>) -> Outcome {
        if !self.board.update_todo_date(id, todo) {
            return link_not_found();
        }
        let description = match todo {
            Some(_) => "To-do date has been set.",
            None => "To-do date has been cleared.",
        };
        Outcome::success("Date Updated", description)
    }

    pub fn swap_items(&mut self, source_id: &str, target_id: &str) -> Outcome {
        if self.board.swap_items(source_id, target_id) {
            Outcome::success("Links Reordered", "The two links swapped places.")
        } else {
            Outcome::info("Nothing Reordered", "Both links must be distinct and in the active tab.")
        }
    }

    pub fn select_tab(&mut self, date_string: &str) -> Outcome {
        match self.board.select_tab(date_string) {
            Ok(()) => Outcome::success("Tab Selected", format!("{date_string} is now active.")),
            Err(err) => err.into(),
        }
    }

    pub fn create_tab(&mut self, date: Date) -> Outcome {
        match self.board.create_tab(date) {
            Ok(TabCreation::Created(group)) => {
                self.analytics.record(
                    AnalyticsEventType::TabCreated,
                    EventDetails::titled(group.title.as_str(), group.date_string.as_str()),
                );
                Outcome::success("Tab Created", format!("New tab for {} added.", group.title))
            }
            Ok(TabCreation::AlreadyExists(group)) => Outcome::info(
                "Tab Exists",
                format!("A tab for {} already exists. Switched to it.", group.title),
            ),
            Err(err) => err.into(),
        }
    }

    /// First phase of tab deletion; the returned outcome is the question to
    /// put to the user.
    pub fn attempt_delete_tab(&mut self, date_string: &str) -> Outcome {
        match self.board.attempt_delete_tab(date_string) {
            Ok(title) => Outcome::info(
                "Delete Tab?",
                format!("Delete the tab \"{title}\" and move all its links to history?"),
            ),
            Err(err) => err.into(),
        }
    }

    pub fn confirm_delete_tab(&mut self) -> Outcome {
        let removed = match self.board.confirm_delete_tab() {
            Ok(removed) => removed,
            Err(err) => return err.into(),
        };
        let count = removed.items.len();
        self.history
            .add_many(removed.items, &removed.date_string, &removed.title);
        self.analytics.record(
            AnalyticsEventType::TabDeleted,
            EventDetails::titled(removed.title.as_str(), removed.date_string.as_str()),
        );
        tracing::info!(tab = %removed.date_string, links = count, "tab deleted");
        Outcome::success(
            "Tab Moved to History",
            format!("Tab \"{}\" and its {count} link(s) moved to history.", removed.title),
        )
    }

    pub fn cancel_delete_tab(&mut self) -> Outcome {
        match self.board.cancel_delete_tab() {
            Some(tab) => Outcome::info("Deletion Cancelled", format!("Tab {tab} was kept.")),
            None => CommandError::NoPendingDeletion.into(),
        }
    }

    pub fn remove_history_item(&mut self, id: &str) -> Outcome {
        match self.history.remove_by_id(id) {
            0 => Outcome::info("Not In History", format!("No history entry with id {id}.")),
            _ => Outcome::success(
                "Link Deleted",
                "The link has been permanently removed from history.",
            ),
        }
    }

    pub fn remove_history_group(&mut self, date_string: &str) -> Outcome {
        match self.history.remove_by_original_group(date_string) {
            0 => Outcome::info("Not In History", format!("No history entries from {date_string}.")),
            removed => Outcome::success(
                "Group Cleared",
                format!("{removed} link(s) from {date_string} permanently removed."),
            ),
        }
    }

    pub fn clear_history(&mut self) -> Outcome {
        let removed = self.history.clear_all();
        Outcome::success(
            "History Cleared",
            format!("{removed} link(s) permanently removed."),
        )
    }

    pub fn clear_analytics(&mut self) -> Outcome {
        self.analytics.clear();
        Outcome::success("Analytics Cleared", "The analytics log has been reset.")
    }

    /// Saves a selection of links under `name`, scoped to `tab` or the
    /// active tab.
    pub fn create_card_group(
        &mut self,
        name: &str,
        card_ids: Vec<String>,
        tab: Option<&str>,
    ) -> Outcome {
        let Some(tab) = tab.map(str::to_string).or_else(|| self.board.active_tab()) else {
            return CommandError::NoActiveTab.into();
        };
        let count = card_ids.len();
        match self.groups.create(name, card_ids, &tab) {
            Ok(group) => Outcome::success(
                "Group Saved",
                format!("Group \"{}\" has been saved with {count} card(s).", group.name),
            ),
            Err(err) => err.into(),
        }
    }

    pub fn delete_card_group(&mut self, id: &str) -> Outcome {
        if self.groups.delete(id) {
            Outcome::success("Group Deleted", format!("Group {id} removed."))
        } else {
            Outcome::info("Group Not Found", format!("No group with id {id}."))
        }
    }
}

fn link_not_found() -> Outcome {
    Outcome::info("Link Not Found", "The link no longer exists on the board.")
}
