//! Client-side filtering and ordering used without a session.

use std::cmp::Ordering;

use tasklist_types::{StatusFilter, Task};

/// Open tasks first, then earliest deadline; undated tasks go last.
pub fn display_order(a: &Task, b: &Task) -> Ordering {
    a.done.cmp(&b.done).then_with(|| match (&a.deadline, &b.deadline) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

/// Tasks whose title contains `search` (case-insensitive) and whose status
/// passes `status`, in display order. The sort is stable, so ties keep
/// collection order.
pub fn visible_tasks<'a>(tasks: &'a [Task], search: &str, status: StatusFilter) -> Vec<&'a Task> {
    let needle = search.trim().to_lowercase();
    let mut visible: Vec<&Task> = tasks
        .iter()
        .filter(|task| status.matches(task.done))
        .filter(|task| needle.is_empty() || task.title.to_lowercase().contains(&needle))
        .collect();
    visible.sort_by(|a, b| display_order(a, b));
    visible
}
