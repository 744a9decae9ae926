use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// A single saved link.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkItem {
    pub id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub favicon: Option<String>,
    #[serde(default)]
    pub og_image_url: Option<String>,
    /// Doubles as the grouping key: its calendar day selects the tab.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub todo_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub order_in_tab: Option<u32>,
}

impl LinkItem {
    pub fn order(&self) -> u32 {
        self.order_in_tab.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateGroup {
    pub date_string: String,
    pub title: String,
    #[serde(default)]
    pub items: Vec<LinkItem>,
}

impl DateGroup {
    pub fn new(date_string: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            date_string: date_string.into(),
            title: title.into(),
            items: Vec::new(),
        }
    }

    pub fn max_order(&self) -> u32 {
        self.items.iter().map(LinkItem::order).max().unwrap_or(0)
    }

    pub fn next_order(&self) -> u32 {
        self.max_order() + 1
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn sort_items(&mut self) {
        self.items.sort_by_key(LinkItem::order);
    }

    /// Display order: ascending `orderInTab`, stable for ties.
    pub fn sorted_items(&self) -> Vec<&LinkItem> {
        let mut items: Vec<&LinkItem> = self.items.iter().collect();
        items.sort_by_key(|item| item.order());
        items
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardData {
    #[serde(default)]
    pub date_groups: Vec<DateGroup>,
}

impl BoardData {
    pub fn is_empty(&self) -> bool {
        self.date_groups.is_empty()
    }

    pub fn group(&self, date_string: &str) -> Option<&DateGroup> {
        self.date_groups
            .iter()
            .find(|group| group.date_string == date_string)
    }

    pub fn group_mut(&mut self, date_string: &str) -> Option<&mut DateGroup> {
        self.date_groups
            .iter_mut()
            .find(|group| group.date_string == date_string)
    }

    pub fn group_index(&self, date_string: &str) -> Option<usize> {
        self.date_groups
            .iter()
            .position(|group| group.date_string == date_string)
    }

    /// Returns `(group index, item index)` for a link id.
    pub fn locate(&self, id: &str) -> Option<(usize, usize)> {
        self.date_groups
            .iter()
            .enumerate()
            .find_map(|(g, group)| group.position(id).map(|i| (g, i)))
    }

    pub fn find_link(&self, id: &str) -> Option<&LinkItem> {
        self.locate(id)
            .map(|(g, i)| &self.date_groups[g].items[i])
    }

    pub fn sort_groups(&mut self) {
        self.date_groups
            .sort_by(|a, b| b.date_string.cmp(&a.date_string));
    }

    pub fn most_recent(&self) -> Option<&DateGroup> {
        self.date_groups
            .iter()
            .max_by(|a, b| a.date_string.cmp(&b.date_string))
    }

    pub fn link_count(&self) -> usize {
        self.date_groups.iter().map(|group| group.items.len()).sum()
    }
}

/// A soft-deleted link, remembered with the tab it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashedLinkItem {
    #[serde(flatten)]
    pub link: LinkItem,
    #[serde(with = "time::serde::rfc3339")]
    pub deleted_at: OffsetDateTime,
    pub original_date_group: String,
    pub original_title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryData {
    #[serde(default)]
    pub trashed_links: Vec<TrashedLinkItem>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsEventType {
    LinkCreated,
    LinkDeleted,
    TabCreated,
    TabDeleted,
    AnalyticsCleared,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub related_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl EventDetails {
    pub fn titled(title: impl Into<String>, related_id: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            related_id: Some(related_id.into()),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AnalyticsEventType,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub details: EventDetails,
}

/// A named selection of links saved under one tab. Ids are not checked
/// against the board and may dangle after deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardGroup {
    pub id: String,
    pub name: String,
    pub card_ids: Vec<String>,
    pub date_string: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use time::macros::datetime;

    fn link(id: &str, order: Option<u32>) -> LinkItem {
        LinkItem {
            id: id.into(),
            url: format!("https://{id}.example"),
            title: id.into(),
            description: None,
            favicon: None,
            og_image_url: None,
            created_at: datetime!(2024-05-20 09:00 UTC),
            todo_date: None,
            order_in_tab: order,
        }
    }

    #[test]
    fn link_json_uses_camel_case_and_omits_absent_fields() -> anyhow::Result<()> {
        let value = serde_json::to_value(link("a", Some(3)))?;
        assert_eq!(value["orderInTab"], 3);
        assert_eq!(value["createdAt"], "2024-05-20T09:00:00Z");
        assert!(value.get("description").is_none());
        assert!(value.get("todoDate").is_none());
        Ok(())
    }

    #[test]
    fn reads_browser_style_timestamps() -> anyhow::Result<()> {
        let raw = r#"{"id":"x","url":"https://x.io","title":"X","createdAt":"2024-05-20T10:00:00.000Z"}"#;
        let item: LinkItem = serde_json::from_str(raw)?;
        assert_eq!(item.created_at, datetime!(2024-05-20 10:00 UTC));
        assert_eq!(item.order_in_tab, None);
        assert_eq!(item.order(), 0);
        Ok(())
    }

    #[test]
    fn trashed_link_flattens_link_fields() -> anyhow::Result<()> {
        let trashed = TrashedLinkItem {
            link: link("t", Some(1)),
            deleted_at: datetime!(2024-05-21 08:00 UTC),
            original_date_group: "2024-05-20".into(),
            original_title: "Yesterday".into(),
        };
        let value = serde_json::to_value(&trashed)?;
        assert_eq!(value["id"], "t");
        assert_eq!(value["originalDateGroup"], "2024-05-20");
        let back: TrashedLinkItem = serde_json::from_value(value)?;
        assert_eq!(back, trashed);
        Ok(())
    }

    #[test]
    fn event_type_names_match_stored_form() -> anyhow::Result<()> {
        assert_eq!(AnalyticsEventType::TabCreated.to_string(), "TAB_CREATED");
        assert_eq!(
            AnalyticsEventType::from_str("ANALYTICS_CLEARED")?,
            AnalyticsEventType::AnalyticsCleared
        );
        let json = serde_json::to_string(&AnalyticsEventType::LinkDeleted)?;
        assert_eq!(json, "\"LINK_DELETED\"");
        Ok(())
    }

    #[test]
    fn group_ordering_helpers() {
        let mut group = DateGroup::new("2024-05-20", "Today");
        group.items = vec![link("c", Some(3)), link("a", Some(1)), link("b", None)];
        assert_eq!(group.next_order(), 4);
        let ids: Vec<_> = group.sorted_items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn board_locates_links_and_sorts_descending() {
        let mut board = BoardData::default();
        let mut older = DateGroup::new("2024-05-18", "older");
        older.items.push(link("x", Some(1)));
        board.date_groups.push(older);
        board.date_groups.push(DateGroup::new("2024-05-20", "newer"));
        board.sort_groups();
        assert_eq!(board.date_groups[0].date_string, "2024-05-20");
        assert_eq!(board.locate("x"), Some((1, 0)));
        assert_eq!(board.most_recent().map(|g| g.date_string.as_str()), Some("2024-05-20"));
        assert_eq!(board.link_count(), 1);
    }
}
