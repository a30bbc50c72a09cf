//! Maximum-information item selection with category balancing.
//!
//! Eligibility, in order:
//! 1. not yet administered in this session;
//! 2. category still under its quota, unless every under-quota category
//!    has run dry, in which case any remaining item is eligible.
//!
//! Among eligible items the one with the most Fisher information at the
//! current theta wins. Ties go to the item whose difficulty label is closest
//! to theta's position on the label scale, then (with exposure control) to
//! the least-administered item, then to the lowest ID.

use std::collections::{BTreeMap, HashSet};

use crate::bank::ItemBank;
use crate::config::{EstimationConfig, SelectionConfig};
use crate::error::SelectionExhausted;
use crate::irt;
use crate::model::{Category, Item};

/// Information values within this distance count as tied.
const INFORMATION_TIE_TOLERANCE: f64 = 1e-9;

/// Maximum items per category for a session of `max_items`.
///
/// With no explicit targets every category present in the bank gets an
/// equal share. Shares are rounded up so quotas never sum below the budget.
pub fn category_caps(
    bank: &ItemBank,
    selection: &SelectionConfig,
    max_items: usize,
) -> BTreeMap<Category, usize> {
    let quota = |share: f64| (share * max_items as f64).ceil() as usize;
    if selection.category_targets.is_empty() {
        let present = bank.categories();
        let share = 1.0 / present.len().max(1) as f64;
        present.into_iter().map(|c| (c, quota(share))).collect()
    } else {
        selection
            .category_targets
            .iter()
            .map(|(&c, &share)| (c, quota(share)))
            .collect()
    }
}

/// Position of `theta` on the 1-10 difficulty label scale.
pub fn label_position(theta: f64, estimation: &EstimationConfig) -> f64 {
    let span = estimation.ability_max - estimation.ability_min;
    (1.0 + 9.0 * (theta - estimation.ability_min) / span).clamp(1.0, 10.0)
}

/// The chosen item and its information at the selection theta.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub item: &'a Item,
    pub information: f64,
}

/// Chooses the next item for a session.
pub struct ItemSelector<'a> {
    bank: &'a ItemBank,
    selection: &'a SelectionConfig,
    estimation: &'a EstimationConfig,
    caps: BTreeMap<Category, usize>,
}

impl<'a> ItemSelector<'a> {
    pub fn new(
        bank: &'a ItemBank,
        selection: &'a SelectionConfig,
        estimation: &'a EstimationConfig,
        max_items: usize,
    ) -> Self {
        Self {
            bank,
            selection,
            estimation,
            caps: category_caps(bank, selection, max_items),
        }
    }

    /// Pick the best eligible item at `theta`.
    ///
    /// `administered` holds IDs already used in the session and
    /// `category_counts` how many items each category has received.
    pub fn select(
        &self,
        theta: f64,
        administered: &HashSet<&str>,
        category_counts: &BTreeMap<Category, usize>,
    ) -> Result<Selection<'a>, SelectionExhausted> {
        let theta = self.estimation.clamp(theta);
        let remaining: Vec<&'a Item> = self
            .bank
            .items()
            .iter()
            .filter(|item| !administered.contains(item.id.as_str()))
            .collect();
        if remaining.is_empty() {
            return Err(SelectionExhausted);
        }

        let under_quota: Vec<&'a Item> = remaining
            .iter()
            .copied()
            .filter(|item| self.has_quota(item.category, category_counts))
            .collect();
        let pool = if under_quota.is_empty() {
            tracing::debug!("all category quotas met; relaxing balance");
            remaining
        } else {
            under_quota
        };

        let scored: Vec<(&'a Item, f64)> = pool
            .into_iter()
            .map(|item| (item, irt::information(&item.params, theta)))
            .collect();
        let best_info = scored
            .iter()
            .map(|(_, info)| *info)
            .fold(f64::NEG_INFINITY, f64::max);

        let target_label = label_position(theta, self.estimation);
        let chosen = scored
            .into_iter()
            .filter(|(_, info)| *info >= best_info - INFORMATION_TIE_TOLERANCE)
            .min_by(|(x, _), (y, _)| {
                let dx = (x.difficulty as f64 - target_label).abs();
                let dy = (y.difficulty as f64 - target_label).abs();
                dx.total_cmp(&dy)
                    .then_with(|| {
                        if self.selection.exposure_control {
                            x.usage.times_administered.cmp(&y.usage.times_administered)
                        } else {
                            std::cmp::Ordering::Equal
                        }
                    })
                    .then_with(|| x.id.cmp(&y.id))
            })
            .ok_or(SelectionExhausted)?;

        tracing::debug!(item = %chosen.0.id, theta, information = chosen.1, "selected item");
        Ok(Selection {
            item: chosen.0,
            information: chosen.1,
        })
    }

    fn has_quota(&self, category: Category, counts: &BTreeMap<Category, usize>) -> bool {
        match self.caps.get(&category) {
            Some(&cap) => counts.get(&category).copied().unwrap_or(0) < cap,
            // Unlisted categories are unconstrained when targets are explicit.
            None => !self.selection.category_targets.is_empty(),
        }
    }
}
