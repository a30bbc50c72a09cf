//! Validated, immutable item catalog.
//!
//! A bank is built once per locale and then shared read-only (typically
//! behind an `Arc`) by any number of sessions.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::error::ItemBankError;
use crate::model::{Category, Item};

#[derive(Debug, Clone, Serialize)]
pub struct ItemBank {
    id: String,
    name: String,
    locale: String,
    items: Vec<Item>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ItemBank {
    /// Validate every item and build the bank. Fails on the first malformed
    /// item; nothing is clamped or repaired.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        locale: impl Into<String>,
        items: Vec<Item>,
    ) -> Result<Self, ItemBankError> {
        let id = id.into();
        if items.is_empty() {
            return Err(ItemBankError::Empty(id));
        }

        let mut index = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            validate_item(item)?;
            if index.insert(item.id.clone(), position).is_some() {
                return Err(ItemBankError::DuplicateId(item.id.clone()));
            }
        }

        Ok(Self {
            id,
            name: name.into(),
            locale: locale.into(),
            items,
            index,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locale the item content was resolved for.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    /// Categories with at least one item.
    pub fn categories(&self) -> BTreeSet<Category> {
        self.items.iter().map(|i| i.category).collect()
    }

    pub fn count_in(&self, category: Category) -> usize {
        self.items.iter().filter(|i| i.category == category).count()
    }
}

fn validate_item(item: &Item) -> Result<(), ItemBankError> {
    let p = &item.params;
    if !(p.a.is_finite() && p.a > 0.0) {
        return Err(ItemBankError::InvalidDiscrimination {
            item_id: item.id.clone(),
            a: p.a,
        });
    }
    if !p.b.is_finite() {
        return Err(ItemBankError::InvalidDifficulty {
            item_id: item.id.clone(),
            b: p.b,
        });
    }
    if !(p.c >= 0.0 && p.c < 1.0) {
        return Err(ItemBankError::InvalidGuessing {
            item_id: item.id.clone(),
            c: p.c,
        });
    }
    if item.correct_option >= item.content.options.len() {
        return Err(ItemBankError::InvalidCorrectOption {
            item_id: item.id.clone(),
            index: item.correct_option,
            options: item.content.options.len(),
        });
    }
    if item.usage.times_correct > item.usage.times_administered {
        return Err(ItemBankError::InconsistentUsage {
            item_id: item.id.clone(),
            correct: item.usage.times_correct,
            administered: item.usage.times_administered,
        });
    }
    Ok(())
}
