use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::dates;
use crate::error::CommandError;
use crate::metadata::{parse_link_url, LinkMetadata};
use crate::model::{new_id, BoardData, DateGroup, LinkItem};
use crate::storage::{Record, Shape, StorageHandle, BOARD_KEY, SESSION_KEY};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub active_tab: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabCreation {
    Created(DateGroup),
    AlreadyExists(DateGroup),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedLink {
    pub link: LinkItem,
    pub group_date: String,
    pub group_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedTab {
    pub date_string: String,
    pub title: String,
    pub items: Vec<LinkItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    NotFound,
    UpdatedInPlace,
    Moved {
        from: String,
        to: String,
        created_group: bool,
        removed_source: bool,
    },
}

pub struct BoardState {
    board: Record<BoardData>,
    session: Record<SessionState>,
    offset: UtcOffset,
    pending_tab_delete: Option<String>,
}

impl BoardState {
    pub fn new(storage: StorageHandle, offset: UtcOffset) -> Self {
        Self {
            board: Record::new(storage.clone(), BOARD_KEY).with_validator(board_shape),
            session: Record::new(storage, SESSION_KEY),
            offset,
            pending_tab_delete: None,
        }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn init(&mut self) -> &BoardData {
        if !self.board.is_initialized() {
            self.board.init();
            self.reconcile_active();
        }
        self.board.init()
    }

    pub fn board(&mut self) -> &BoardData {
        self.init()
    }

    pub fn snapshot(&mut self) -> BoardData {
        self.init().clone()
    }

    pub fn subscribe(&mut self) -> Receiver<BoardData> {
        self.board.subscribe()
    }

    pub fn active_tab(&mut self) -> Option<String> {
        self.init();
        self.session.init().active_tab.clone()
    }

    pub fn active_group(&mut self) -> Option<DateGroup> {
        let active = self.active_tab()?;
        self.board().group(&active).cloned()
    }

    pub fn select_tab(&mut self, date_string: &str) -> Result<(), CommandError> {
        if self.board().group(date_string).is_none() {
            return Err(CommandError::TabNotFound(date_string.to_string()));
        }
        self.set_active(Some(date_string.to_string()));
        Ok(())
    }

    pub fn add_link(&mut self, url: &str, title: Option<&str>) -> Result<LinkItem, CommandError> {
        self.add_link_at(url, title, OffsetDateTime::now_utc())
    }

    pub fn apply_metadata(
        &mut self,
        id: &str,
        metadata: &LinkMetadata,
        supplied_title: Option<&str>,
    ) -> bool {
        if metadata.is_empty() {
            return self.board().find_link(id).is_some();
        }
        self.init();
        self.board
            .try_update(|board| {
                let (g, i) = board.locate(id)?;
                let link = &mut board.date_groups[g].items[i];
                if let Some(title) = &metadata.title {
                    if supplied_title.map_or(true, |supplied| supplied == link.url) {
                        link.title = title.clone();
                    }
                }
                if metadata.description.is_some() {
                    link.description = metadata.description.clone();
                }
                if metadata.favicon_url.is_some() {
                    link.favicon = metadata.favicon_url.clone();
                }
                if metadata.og_image_url.is_some() {
                    link.og_image_url = metadata.og_image_url.clone();
                }
                Some(())
            })
            .is_some()
    }

    /// Replaces a link by id. A changed `createdAt` day relocates the link to
    /// that day's tab, creating it when needed, and activates it.
    pub fn edit_link(&mut self, updated: LinkItem) -> EditOutcome {
        self.init();
        let offset = self.offset;
        let today = dates::today(offset);
        let outcome = self.board.try_update(|board| {
            let (g, i) = board.locate(&updated.id)?;
            let from = board.date_groups[g].date_string.clone();
            let target_day = dates::day_of(updated.created_at, offset);
            let to = dates::day_key(target_day);

            if from == to {
                let group = &mut board.date_groups[g];
                group.items[i] = updated;
                group.sort_items();
                return Some(EditOutcome::UpdatedInPlace);
            }

            board.date_groups[g].items.remove(i);
            let removed_source = board.date_groups[g].items.is_empty();
            if removed_source {
                board.date_groups.remove(g);
            }

            let (index, created_group) = match board.group_index(&to) {
                Some(index) => (index, false),
                None => {
                    board
                        .date_groups
                        .push(DateGroup::new(&to, dates::group_title(target_day, today)));
                    (board.date_groups.len() - 1, true)
                }
            };
            let group = &mut board.date_groups[index];
            let mut moved = updated;
            moved.order_in_tab = Some(group.next_order());
            group.items.insert(0, moved);
            group.sort_items();
            board.sort_groups();

            Some(EditOutcome::Moved {
                from,
                to,
                created_group,
                removed_source,
            })
        });

        match outcome {
            Some(outcome) => {
                if let EditOutcome::Moved { to, .. } = &outcome {
                    self.set_active(Some(to.clone()));
                }
                outcome
            }
            None => EditOutcome::NotFound,
        }
    }

    pub fn delete_link(&mut self, id: &str) -> Option<RemovedLink> {
        self.init();
        self.board.try_update(|board| {
            let (g, i) = board.locate(id)?;
            let group = &mut board.date_groups[g];
            let link = group.items.remove(i);
            Some(RemovedLink {
                link,
                group_date: group.date_string.clone(),
                group_title: group.title.clone(),
            })
        })
    }

    pub fn update_todo_date(&mut self, id: &str, todo: Option<OffsetDateTime>) -> bool {
        self.init();
        self.board
            .try_update(|board| {
                let (g, i) = board.locate(id)?;
                board.date_groups[g].items[i].todo_date = todo;
                Some(())
            })
            .is_some()
    }

    /// Exchanges two links of the active tab, both their `orderInTab` and
    /// their list positions. Same id on both sides marks a drag start and
    /// changes nothing.
    pub fn swap_items(&mut self, source_id: &str, target_id: &str) -> bool {
        if source_id == target_id {
            return false;
        }
        let Some(active) = self.active_tab() else {
            return false;
        };
        self.board
            .try_update(|board| {
                let group = board.group_mut(&active)?;
                let source = group.position(source_id)?;
                let target = group.position(target_id)?;
                let source_order = group.items[source].order_in_tab;
                group.items[source].order_in_tab = group.items[target].order_in_tab;
                group.items[target].order_in_tab = source_order;
                group.items.swap(source, target);
                Some(())
            })
            .is_some()
    }

    pub fn create_tab(&mut self, date: Date) -> Result<TabCreation, CommandError> {
        self.create_tab_at(date, OffsetDateTime::now_utc())
    }

    pub fn attempt_delete_tab(&mut self, date_string: &str) -> Result<String, CommandError> {
        let Some(group) = self.board().group(date_string) else {
            return Err(CommandError::TabNotFound(date_string.to_string()));
        };
        let title = group.title.clone();
        self.pending_tab_delete = Some(date_string.to_string());
        Ok(title)
    }

    pub fn pending_tab_delete(&self) -> Option<&str> {
        self.pending_tab_delete.as_deref()
    }

    pub fn cancel_delete_tab(&mut self) -> Option<String> {
        self.pending_tab_delete.take()
    }

    pub fn confirm_delete_tab(&mut self) -> Result<RemovedTab, CommandError> {
        let target = self
            .pending_tab_delete
            .take()
            .ok_or(CommandError::NoPendingDeletion)?;
        self.init();
        let removed = self.board.try_update(|board| {
            let index = board.group_index(&target)?;
            let group = board.date_groups.remove(index);
            Some(RemovedTab {
                date_string: group.date_string,
                title: group.title,
                items: group.items,
            })
        });
        let removed = removed.ok_or(CommandError::TabNotFound(target))?;
        self.reconcile_active();
        Ok(removed)
    }

    fn add_link_at(
        &mut self,
        url: &str,
        title: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<LinkItem, CommandError> {
        if self.board().is_empty() {
            return Err(CommandError::NoTabs);
        }
        let active = self.active_tab().ok_or(CommandError::NoActiveTab)?;
        parse_link_url(url)?;
        let raw_url = url.trim().to_string();
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(raw_url.as_str())
            .to_string();

        let offset = self.offset;
        let created_at = match dates::parse_day_key(&active) {
            Ok(day) if day != dates::day_of(now, offset) => dates::at_day(day, now, offset),
            _ => now,
        };

        self.board
            .try_update(|board| {
                let group = board.group_mut(&active)?;
                let link = LinkItem {
                    id: new_id(),
                    url: raw_url.clone(),
                    title,
                    description: None,
                    favicon: None,
                    og_image_url: None,
                    created_at,
                    todo_date: None,
                    order_in_tab: Some(group.next_order()),
                };
                group.items.insert(0, link.clone());
                Some(link)
            })
            .ok_or(CommandError::TabNotFound(active))
    }

    fn create_tab_at(&mut self, date: Date, now: OffsetDateTime) -> Result<TabCreation, CommandError> {
        let key = dates::day_key(date);
        if dates::is_future_day(date, now, self.offset) {
            return Err(CommandError::FutureDate(key));
        }
        if let Some(existing) = self.board().group(&key).cloned() {
            self.set_active(Some(key));
            return Ok(TabCreation::AlreadyExists(existing));
        }

        let group = DateGroup::new(&key, dates::group_title(date, dates::day_of(now, self.offset)));
        let created = group.clone();
        self.board.update(|board| {
            board.date_groups.push(group);
            board.sort_groups();
        });
        self.set_active(Some(key));
        Ok(TabCreation::Created(created))
    }

    fn reconcile_active(&mut self) {
        let board = self.board.init();
        let current = self.session.init().active_tab.clone();
        let valid = current
            .as_deref()
            .is_some_and(|active| board.group(active).is_some());
        if valid {
            return;
        }
        let next = board.most_recent().map(|group| group.date_string.clone());
        if next != current {
            tracing::debug!(?current, ?next, "reassigning active tab");
            self.set_active(next);
        }
    }

    fn set_active(&mut self, next: Option<String>) {
        if self.session.init().active_tab == next {
            return;
        }
        self.session.update(|session| session.active_tab = next);
    }
}

fn board_shape(value: &Value) -> Shape {
    match (value.get("dateGroups"), value.get("columns")) {
        (Some(Value::Array(_)), _) => Shape::Current,
        (None, Some(_)) => Shape::Legacy("columns"),
        (Some(_), _) => Shape::Invalid("dateGroups is not an array".into()),
        (None, None) => Shape::Invalid("missing dateGroups".into()),
    }
}
