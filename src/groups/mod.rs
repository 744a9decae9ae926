use serde_json::Value;
use time::OffsetDateTime;

use crate::error::CommandError;
use crate::model::{new_id, CardGroup};
use crate::storage::{Record, Shape, StorageHandle, CARD_GROUPS_KEY};

/// Saved selections of links, persisted apart from the board.
pub struct CardGroups {
    record: Record<Vec<CardGroup>>,
}

impl CardGroups {
    pub fn new(storage: StorageHandle) -> Self {
        Self {
            record: Record::new(storage, CARD_GROUPS_KEY).with_validator(groups_shape),
        }
    }

    pub fn init(&mut self) -> &[CardGroup] {
        self.record.init()
    }

    pub fn all(&mut self) -> Vec<CardGroup> {
        self.init().to_vec()
    }

    pub fn create(
        &mut self,
        name: &str,
        card_ids: Vec<String>,
        date_string: &str,
    ) -> Result<CardGroup, CommandError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::EmptyGroupName);
        }
        let group = CardGroup {
            id: format!("group-{}", new_id()),
            name: name.to_string(),
            card_ids,
            date_string: date_string.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        let stored = group.clone();
        self.record.update(|groups| groups.push(stored));
        Ok(group)
    }

    /// Returns whether a group was removed.
    pub fn delete(&mut self, id: &str) -> bool {
        self.record
            .try_update(|groups| {
                let position = groups.iter().position(|group| group.id == id)?;
                groups.remove(position);
                Some(())
            })
            .is_some()
    }

    pub fn for_tab(&mut self, date_string: &str) -> Vec<CardGroup> {
        self.init()
            .iter()
            .filter(|group| group.date_string == date_string)
            .cloned()
            .collect()
    }
}

fn groups_shape(value: &Value) -> Shape {
    if value.is_array() {
        Shape::Current
    } else {
        Shape::Invalid("card groups record is not an array".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{init_storage, reopen};
    use assert_matches::assert_matches;

    #[test]
    fn create_rejects_blank_names() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut groups = CardGroups::new(storage);
        assert_matches!(
            groups.create("   ", vec!["a".into()], "2024-05-20"),
            Err(CommandError::EmptyGroupName)
        );
        assert!(groups.all().is_empty());
        Ok(())
    }

    #[test]
    fn groups_persist_and_filter_by_tab() -> anyhow::Result<()> {
        let (temp, storage) = init_storage()?;
        let mut groups = CardGroups::new(storage);
        let reading = groups.create(" Reading ", vec!["a".into(), "b".into()], "2024-05-20")?;
        groups.create("Later", vec!["c".into()], "2024-05-19")?;
        assert_eq!(reading.name, "Reading");
        assert!(reading.id.starts_with("group-"));

        let mut reloaded = CardGroups::new(reopen(&temp)?);
        let today = reloaded.for_tab("2024-05-20");
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].card_ids, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn delete_reports_misses() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut groups = CardGroups::new(storage);
        let group = groups.create("Keep", vec![], "2024-05-20")?;
        assert!(!groups.delete("group-missing"));
        assert!(groups.delete(&group.id));
        assert!(groups.all().is_empty());
        Ok(())
    }
}
