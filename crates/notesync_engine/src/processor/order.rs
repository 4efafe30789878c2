//! Parent-first ordering of hierarchical items.

use notesync_protocol::SyncEntity;
use std::collections::HashMap;
use tracing::warn;

/// Splits `items` into generations: every item's parent (if it is part of
/// `items`) lies in an earlier generation. Items of one generation keep
/// their relative input order.
///
/// Every item is visited once. Items caught in a parent cycle are appended
/// as a final generation in input order.
pub(crate) fn generations<E: SyncEntity>(items: Vec<E>) -> Vec<Vec<E>> {
    let index: HashMap<&str, usize> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| item.guid().map(|g| (g, i)))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    let mut roots = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match item.parent_guid().and_then(|p| index.get(p)) {
            Some(&parent) if parent != i => children[parent].push(i),
            _ => roots.push(i),
        }
    }

    let mut order: Vec<Vec<usize>> = Vec::new();
    let mut visited = vec![false; items.len()];
    let mut current = roots;
    while !current.is_empty() {
        current.sort_unstable();
        for &i in &current {
            visited[i] = true;
        }
        let next: Vec<usize> = current
            .iter()
            .flat_map(|&i| children[i].iter().copied())
            .filter(|&c| !visited[c])
            .collect();
        order.push(std::mem::replace(&mut current, next));
    }

    let stranded: Vec<usize> = (0..items.len()).filter(|&i| !visited[i]).collect();
    if !stranded.is_empty() {
        warn!(
            count = stranded.len(),
            kind = %E::KIND,
            "parent cycle among sync items, writing them last"
        );
        order.push(stranded);
    }

    let mut slots: Vec<Option<E>> = items.into_iter().map(Some).collect();
    order
        .into_iter()
        .map(|generation| {
            generation
                .into_iter()
                .filter_map(|i| slots[i].take())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_protocol::Tag;

    fn names(generations: &[Vec<Tag>]) -> Vec<Vec<&str>> {
        generations
            .iter()
            .map(|g| g.iter().map(|t| t.name.as_str()).collect())
            .collect()
    }

    #[test]
    fn children_follow_parents() {
        let items = vec![
            Tag::new("grandchild").with_guid("t3", 1).with_parent("t2"),
            Tag::new("child").with_guid("t2", 2).with_parent("t1"),
            Tag::new("root").with_guid("t1", 3),
            Tag::new("orphan").with_guid("t4", 4).with_parent("elsewhere"),
            Tag::new("sibling").with_guid("t5", 5).with_parent("t1"),
        ];

        let generations = generations(items);
        assert_eq!(
            names(&generations),
            vec![
                vec!["root", "orphan"],
                vec!["child", "sibling"],
                vec!["grandchild"],
            ]
        );
    }

    #[test]
    fn cycles_are_bounded() {
        let items = vec![
            Tag::new("a").with_guid("a", 1).with_parent("b"),
            Tag::new("b").with_guid("b", 2).with_parent("a"),
            Tag::new("self").with_guid("s", 3).with_parent("s"),
            Tag::new("c").with_guid("c", 4),
        ];

        let generations = generations(items);
        assert_eq!(names(&generations), vec![vec!["self", "c"], vec!["a", "b"]]);
    }
}
