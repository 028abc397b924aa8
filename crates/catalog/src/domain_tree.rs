//! Преобразование дерева доменов в плоские строки и обратно.
//!
//! Обе стороны итеративны, глубина дерева ограничена только памятью.

use crate::types::DomainNode;
use std::collections::{HashMap, VecDeque};
use tracing::warn;

/// Строка таблицы `domains`
///
/// `parent_id == None` означает корневой домен. `position` - индекс среди
/// братьев, только он хранит порядок.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub position: i64,
}

/// Развернуть дерево в строки (обход в глубину, pre-order)
pub fn flatten_domain_tree(tree: &[DomainNode]) -> Vec<DomainRow> {
    let mut rows = Vec::new();
    let mut stack: Vec<(&DomainNode, Option<&str>, usize)> = tree
        .iter()
        .enumerate()
        .rev()
        .map(|(position, node)| (node, None, position))
        .collect();

    while let Some((node, parent_id, position)) = stack.pop() {
        rows.push(DomainRow {
            id: node.id.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
            parent_id: parent_id.map(str::to_string),
            position: position as i64,
        });

        stack.extend(
            node.children
                .iter()
                .enumerate()
                .rev()
                .map(|(child_position, child)| (child, Some(node.id.as_str()), child_position)),
        );
    }

    rows
}

struct PendingNode {
    row: DomainRow,
    children: Vec<usize>,
}

/// Собрать дерево из строк в любом порядке
///
/// Строки группируются по `parent_id` и сортируются по `position`.
/// Строки, чей родитель отсутствует, пропускаются с предупреждением.
pub fn rebuild_domain_tree(rows: Vec<DomainRow>) -> Vec<DomainNode> {
    let mut groups: HashMap<Option<String>, Vec<DomainRow>> = HashMap::new();
    for row in rows {
        groups.entry(row.parent_id.clone()).or_default().push(row);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|row| row.position);
    }

    // Арена в порядке обхода в ширину: индекс родителя всегда меньше индекса ребёнка
    let mut arena: Vec<PendingNode> = Vec::new();
    let mut root_indices = Vec::new();
    let mut queue = VecDeque::new();

    for row in groups.remove(&None).unwrap_or_default() {
        root_indices.push(arena.len());
        queue.push_back(arena.len());
        arena.push(PendingNode {
            row,
            children: Vec::new(),
        });
    }

    while let Some(idx) = queue.pop_front() {
        let key = Some(arena[idx].row.id.clone());
        let Some(children) = groups.remove(&key) else {
            continue;
        };
        for row in children {
            let child_idx = arena.len();
            arena[idx].children.push(child_idx);
            queue.push_back(child_idx);
            arena.push(PendingNode {
                row,
                children: Vec::new(),
            });
        }
    }

    let orphaned: usize = groups.values().map(Vec::len).sum();
    if orphaned > 0 {
        warn!(orphaned, "Skipping domain rows whose parent does not exist");
    }

    let mut built: Vec<Option<DomainNode>> = (0..arena.len()).map(|_| None).collect();
    for (idx, pending) in arena.into_iter().enumerate().rev() {
        let children = pending
            .children
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[idx] = Some(DomainNode {
            id: pending.row.id,
            name: pending.row.name,
            description: pending.row.description,
            children,
        });
    }

    root_indices
        .into_iter()
        .filter_map(|idx| built[idx].take())
        .collect()
}
