// crates/core/src/filter.rs
//! Post-query filtering of matrix results.

use std::collections::HashSet;

use crate::element::DropMatrixElement;

/// Parse a comma-separated id list. Blank entries are dropped.
pub fn parse_id_filter(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keep elements of the listed stages. An empty filter keeps everything.
pub fn retain_stages(elements: &mut Vec<DropMatrixElement>, stage_ids: &HashSet<String>) {
    if !stage_ids.is_empty() {
        elements.retain(|el| stage_ids.contains(&el.stage_id));
    }
}

/// Keep elements of the listed items. An empty filter keeps everything.
pub fn retain_items(elements: &mut Vec<DropMatrixElement>, item_ids: &HashSet<String>) {
    if !item_ids.is_empty() {
        elements.retain(|el| item_ids.contains(&el.item_id));
    }
}

/// Drop elements whose stage is not currently open.
pub fn remove_closed_stages(elements: &mut Vec<DropMatrixElement>, open_stages: &HashSet<String>) {
    elements.retain(|el| open_stages.contains(&el.stage_id));
}
