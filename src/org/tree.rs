use std::collections::{HashMap, HashSet, VecDeque};

use super::OrgUnit;
use crate::codec::CompositeId;

pub const EXPORT_HEADER: [&str; 8] = [
    "Org code",
    "Org name",
    "Parent code",
    "Domain",
    "Created",
    "Created by",
    "Maintained",
    "Maintained by",
];

/// Breadth-first walk below `root`. Units are visited once even if the
/// stored parent links contain a cycle.
pub fn descendants(units: &[OrgUnit], root: &CompositeId) -> Vec<OrgUnit> {
    let mut children: HashMap<&CompositeId, Vec<&OrgUnit>> = HashMap::new();
    for unit in units {
        if let Some(parent) = &unit.parent {
            children.entry(parent).or_default().push(unit);
        }
    }

    let mut seen: HashSet<&CompositeId> = HashSet::from([root]);
    let mut queue: VecDeque<&CompositeId> = VecDeque::from([root]);
    let mut found = Vec::new();

    while let Some(current) = queue.pop_front() {
        for child in children.get(current).into_iter().flatten() {
            if seen.insert(&child.id) {
                found.push((*child).clone());
                queue.push_back(&child.id);
            }
        }
    }

    found
}

/// Would hanging `id` under `new_parent` close a loop?
pub fn would_cycle(units: &[OrgUnit], id: &CompositeId, new_parent: &CompositeId) -> bool {
    let parents: HashMap<&CompositeId, &CompositeId> = units
        .iter()
        .filter_map(|u| u.parent.as_ref().map(|p| (&u.id, p)))
        .collect();

    let mut seen = HashSet::new();
    let mut cursor = Some(new_parent);
    while let Some(current) = cursor {
        if current == id {
            return true;
        }
        if !seen.insert(current) {
            break;
        }
        cursor = parents.get(current).copied();
    }
    false
}

pub fn export_rows(units: &[OrgUnit]) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(units.len() + 1);
    rows.push(EXPORT_HEADER.iter().map(|h| h.to_string()).collect());

    for unit in units {
        rows.push(vec![
            unit.code().to_string(),
            unit.description.clone(),
            unit.parent
                .as_ref()
                .map(|p| p.local_code().to_string())
                .unwrap_or_default(),
            unit.domain_id().to_string(),
            unit.create_date.format("%Y-%m-%d").to_string(),
            unit.create_user.clone(),
            unit.maintain_date.format("%Y-%m-%d").to_string(),
            unit.maintain_user.clone(),
        ]);
    }

    rows
}
