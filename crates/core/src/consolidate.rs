use crate::models::{ConsolidatedDocument, Fragment};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Consolidation {
    pub page_oriented: Vec<Fragment>,
    pub consolidated: Vec<ConsolidatedDocument>,
}

/// Splits fragments into page-level passthroughs and one merged document per
/// filename stem (case-insensitive). Groups and texts keep arrival order.
pub fn consolidate(fragments: Vec<Fragment>) -> Consolidation {
    let mut page_oriented = Vec::new();
    let mut consolidated: Vec<ConsolidatedDocument> = Vec::new();
    let mut positions = HashMap::<String, usize>::new();

    for fragment in fragments {
        if fragment.is_page_oriented() {
            page_oriented.push(fragment);
            continue;
        }

        let key = fragment.metadata.filename_stem.to_lowercase();
        match positions.get(&key) {
            Some(&position) => consolidated[position].text.push_str(&fragment.text),
            None => {
                positions.insert(key.clone(), consolidated.len());
                consolidated.push(ConsolidatedDocument {
                    filename_stem: key,
                    text: fragment.text,
                    metadata: fragment.metadata,
                });
            }
        }
    }

    Consolidation {
        page_oriented,
        consolidated,
    }
}
