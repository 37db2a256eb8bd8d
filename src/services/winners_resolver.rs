use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::models::{Category, Entry, Table, WinnersByCategory};
use crate::services::field_normalizer::{cell, resolve_column};

/// Groups entries by award category from the winners sheet and ranks each
/// bucket by its category score. The sheet's place column is decorative and
/// does not influence ordering.
pub fn resolve_winners(table: &Table, entries: &HashMap<String, Entry>) -> WinnersByCategory {
    let category_col = resolve_column(&table.header, &["Category"]);
    let entry_col = resolve_column(&table.header, &["EntryID", "Entry ID"]);
    let place_col = resolve_column(&table.header, &["Place"]);

    let mut winners = WinnersByCategory::default();
    let mut seen: HashSet<(Category, String)> = HashSet::new();

    for row in &table.rows {
        let raw_category = cell(row, category_col);
        let entry_id = cell(row, entry_col);
        if raw_category.is_empty() || entry_id.is_empty() {
            continue;
        }
        let Some(category) = Category::parse(raw_category) else {
            warn!("Unknown winner category {:?} for {}", raw_category, entry_id);
            continue;
        };
        let Some(entry) = entries.get(entry_id) else {
            warn!(
                "Winner {} in {} references an unknown entry, dropped",
                entry_id, category
            );
            continue;
        };
        if !seen.insert((category, entry_id.to_string())) {
            debug!("Duplicate winner row {} in {}", entry_id, category);
            continue;
        }
        debug!(
            "Winner {} in {} (place {:?})",
            entry_id,
            category,
            cell(row, place_col)
        );
        winners.get_mut(category).push(entry.clone());
    }

    for category in Category::ALL {
        let bucket = winners.get_mut(category);
        bucket.sort_by(|a, b| a.category_cmp(b, category));
        info!("Category {}: {} winner(s)", category, bucket.len());
    }

    winners
}
