use crate::domain::duration::effective_duration;
use crate::domain::forest::TaskForest;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Idle time between two consecutive siblings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Gap {
    pub after_task_id: String,
    pub before_task_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub minutes: u32,
}

/// Recomputes `current_start_time`/`current_end_time` for every task
/// reachable from the day's roots.
///
/// Roots are chained end-to-start from `anchor`. A task with a fixed pin
/// starts at the pin and the cursor continues from there, which may jump
/// forward (a gap) or backward (an overlap). Containers chain their children
/// from their own start and end where the last child ends.
pub fn propagate(forest: &mut TaskForest, anchor: DateTime<Utc>) {
    let roots = forest.roots();
    chain(forest, &roots, anchor);
}

fn chain(forest: &mut TaskForest, ids: &[String], seed: DateTime<Utc>) -> DateTime<Utc> {
    let mut cursor = seed;
    for id in ids {
        cursor = place(forest, id, cursor);
    }
    cursor
}

fn place(forest: &mut TaskForest, task_id: &str, cursor: DateTime<Utc>) -> DateTime<Utc> {
    let Some(task) = forest.get_mut(task_id) else {
        return cursor;
    };
    let start = task.fixed_start_time.unwrap_or(cursor);
    task.current_start_time = Some(start);

    let children = forest.children(task_id);
    let end = if children.is_empty() {
        start + Duration::minutes(i64::from(effective_duration(forest, task_id)))
    } else {
        chain(forest, &children, start)
    };

    if let Some(task) = forest.get_mut(task_id) {
        task.current_end_time = Some(end);
    }
    end
}

/// Freezes the task's current schedule into its `initial_*` fields, then
/// does the same for its children. Returns `false` without touching
/// anything when the snapshot already exists.
pub fn capture_initial_schedule(forest: &mut TaskForest, task_id: &str) -> bool {
    let planned = effective_duration(forest, task_id);
    let Some(task) = forest.get_mut(task_id) else {
        return false;
    };
    if task.has_initial_snapshot() {
        return false;
    }

    task.initial_planned_duration = Some(planned);
    task.initial_start_time = task.current_start_time;
    task.initial_end_time = task.current_end_time;

    for child_id in forest.children(task_id) {
        capture_initial_schedule(forest, &child_id);
    }
    true
}

/// Positive deltas between consecutive siblings, roots first, then the
/// children of each root in order. Overlaps are not reported.
pub fn sibling_gaps(forest: &TaskForest) -> Vec<Gap> {
    let roots = forest.roots();
    let mut gaps = group_gaps(forest, &roots);
    for root_id in &roots {
        gaps.extend(group_gaps(forest, &forest.children(root_id)));
    }
    gaps
}

fn group_gaps(forest: &TaskForest, ids: &[String]) -> Vec<Gap> {
    ids.windows(2)
        .filter_map(|pair| {
            let previous = forest.get(&pair[0])?;
            let next = forest.get(&pair[1])?;
            let end = previous.current_end_time?;
            let start = next.current_start_time?;
            if start <= end {
                return None;
            }
            Some(Gap {
                after_task_id: previous.id.clone(),
                before_task_id: next.id.clone(),
                start: end,
                end: start,
                minutes: u32::try_from((start - end).num_minutes()).unwrap_or(u32::MAX),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn task(id: &str, parent: Option<&str>, order_index: u32, manual: u32) -> Task {
        let mut task = Task::new(
            id,
            id,
            NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date"),
            manual,
            fixed_time("2026-02-16T07:00:00Z"),
        );
        task.parent_id = parent.map(ToOwned::to_owned);
        task.order_index = order_index;
        task
    }

    fn start_of(forest: &TaskForest, id: &str) -> DateTime<Utc> {
        forest
            .get(id)
            .and_then(|task| task.current_start_time)
            .expect("start set")
    }

    fn end_of(forest: &TaskForest, id: &str) -> DateTime<Utc> {
        forest
            .get(id)
            .and_then(|task| task.current_end_time)
            .expect("end set")
    }

    #[test]
    fn day_schedule_honors_fixed_pin_and_leaves_gap() {
        let mut lunch = task("lunch", None, 1, 45);
        lunch.fixed_start_time = Some(fixed_time("2026-02-16T12:30:00Z"));
        let mut forest = TaskForest::from_tasks(vec![task("morning", None, 0, 60), lunch]);

        propagate(&mut forest, fixed_time("2026-02-16T09:00:00Z"));

        assert_eq!(start_of(&forest, "morning"), fixed_time("2026-02-16T09:00:00Z"));
        assert_eq!(end_of(&forest, "morning"), fixed_time("2026-02-16T10:00:00Z"));
        assert_eq!(start_of(&forest, "lunch"), fixed_time("2026-02-16T12:30:00Z"));
        assert_eq!(end_of(&forest, "lunch"), fixed_time("2026-02-16T13:15:00Z"));

        let gaps = sibling_gaps(&forest);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].minutes, 150);
        assert_eq!(gaps[0].after_task_id, "morning");
    }

    #[test]
    fn container_chains_children_from_its_start() {
        let mut forest = TaskForest::from_tasks(vec![
            task("project", None, 0, 0),
            task("c1", Some("project"), 0, 20),
            task("c2", Some("project"), 1, 40),
            task("after", None, 1, 15),
        ]);

        propagate(&mut forest, fixed_time("2026-02-16T09:00:00Z"));

        assert_eq!(start_of(&forest, "c1"), fixed_time("2026-02-16T09:00:00Z"));
        assert_eq!(end_of(&forest, "c1"), fixed_time("2026-02-16T09:20:00Z"));
        assert_eq!(start_of(&forest, "c2"), fixed_time("2026-02-16T09:20:00Z"));
        assert_eq!(end_of(&forest, "c2"), fixed_time("2026-02-16T10:00:00Z"));
        assert_eq!(end_of(&forest, "project"), fixed_time("2026-02-16T10:00:00Z"));
        assert_eq!(start_of(&forest, "after"), fixed_time("2026-02-16T10:00:00Z"));
    }

    #[test]
    fn pinned_child_moves_the_inner_cursor() {
        let mut pinned = task("c2", Some("project"), 1, 30);
        pinned.fixed_start_time = Some(fixed_time("2026-02-16T11:00:00Z"));
        let mut forest = TaskForest::from_tasks(vec![
            task("project", None, 0, 0),
            task("c1", Some("project"), 0, 20),
            pinned,
        ]);

        propagate(&mut forest, fixed_time("2026-02-16T09:00:00Z"));

        assert_eq!(start_of(&forest, "c2"), fixed_time("2026-02-16T11:00:00Z"));
        assert_eq!(end_of(&forest, "project"), fixed_time("2026-02-16T11:30:00Z"));
    }

    #[test]
    fn pin_earlier_than_cursor_overlaps_without_gap() {
        let mut early = task("early", None, 1, 30);
        early.fixed_start_time = Some(fixed_time("2026-02-16T09:30:00Z"));
        let mut forest = TaskForest::from_tasks(vec![task("long", None, 0, 120), early]);

        propagate(&mut forest, fixed_time("2026-02-16T09:00:00Z"));

        assert_eq!(start_of(&forest, "early"), fixed_time("2026-02-16T09:30:00Z"));
        assert!(sibling_gaps(&forest).is_empty());
    }

    #[test]
    fn empty_day_is_a_no_op() {
        let mut forest = TaskForest::default();
        propagate(&mut forest, fixed_time("2026-02-16T09:00:00Z"));
        assert!(forest.is_empty());
    }

    #[test]
    fn capture_is_write_once() {
        let mut forest = TaskForest::from_tasks(vec![
            task("project", None, 0, 0),
            task("c1", Some("project"), 0, 20),
        ]);
        propagate(&mut forest, fixed_time("2026-02-16T09:00:00Z"));
        assert!(capture_initial_schedule(&mut forest, "project"));

        let child = forest.get("c1").expect("child");
        assert_eq!(child.initial_start_time, Some(fixed_time("2026-02-16T09:00:00Z")));
        assert_eq!(child.initial_planned_duration, Some(20));

        propagate(&mut forest, fixed_time("2026-02-16T10:00:00Z"));
        assert!(!capture_initial_schedule(&mut forest, "project"));

        let project = forest.get("project").expect("project");
        assert_eq!(project.current_start_time, Some(fixed_time("2026-02-16T10:00:00Z")));
        assert_eq!(project.initial_start_time, Some(fixed_time("2026-02-16T09:00:00Z")));
        assert_eq!(project.initial_end_time, Some(fixed_time("2026-02-16T09:20:00Z")));
        assert_eq!(project.initial_planned_duration, Some(20));
    }

    proptest! {
        #[test]
        fn unpinned_roots_chain_end_to_start(
            durations in proptest::collection::vec(0u32..180u32, 1..10),
            anchor_offset in 0i64..600i64
        ) {
            let tasks = durations
                .iter()
                .enumerate()
                .map(|(index, minutes)| task(&format!("t{index}"), None, index as u32, *minutes))
                .collect::<Vec<_>>();
            let mut forest = TaskForest::from_tasks(tasks);
            let anchor = fixed_time("2026-02-16T06:00:00Z") + Duration::minutes(anchor_offset);

            propagate(&mut forest, anchor);

            let roots = forest.roots();
            prop_assert_eq!(start_of(&forest, &roots[0]), anchor);
            for pair in roots.windows(2) {
                prop_assert_eq!(start_of(&forest, &pair[1]), end_of(&forest, &pair[0]));
            }
            for id in &roots {
                let minutes = forest.get(id).map(|task| task.manual_duration).unwrap_or(0);
                prop_assert_eq!(
                    end_of(&forest, id),
                    start_of(&forest, id) + Duration::minutes(i64::from(minutes))
                );
            }
        }

        #[test]
        fn fixed_pin_overrides_incoming_cursor(
            first in 0u32..600u32,
            pin_offset in -300i64..600i64
        ) {
            let pin = fixed_time("2026-02-16T09:00:00Z") + Duration::minutes(pin_offset);
            let mut pinned = task("b", None, 1, 30);
            pinned.fixed_start_time = Some(pin);
            let mut forest = TaskForest::from_tasks(vec![task("a", None, 0, first), pinned]);

            propagate(&mut forest, fixed_time("2026-02-16T09:00:00Z"));

            prop_assert_eq!(start_of(&forest, "b"), pin);
            prop_assert_eq!(end_of(&forest, "b"), pin + Duration::minutes(30));
        }

        #[test]
        fn snapshot_is_frozen_after_first_capture(
            children in proptest::collection::vec(1u32..120u32, 0..6),
            second_offset in -600i64..600i64,
            stretch in 0u32..90u32
        ) {
            let mut tasks = vec![task("root", None, 0, 45)];
            for (index, minutes) in children.iter().enumerate() {
                tasks.push(task(&format!("c{index}"), Some("root"), index as u32, *minutes));
            }
            let mut forest = TaskForest::from_tasks(tasks);
            propagate(&mut forest, fixed_time("2026-02-16T09:00:00Z"));
            prop_assert!(capture_initial_schedule(&mut forest, "root"));
            let frozen = forest
                .tasks()
                .map(|task| (
                    task.id.clone(),
                    task.initial_start_time,
                    task.initial_end_time,
                    task.initial_planned_duration,
                ))
                .collect::<std::collections::BTreeSet<_>>();

            if let Some(child) = forest.get_mut("c0") {
                child.manual_duration += stretch;
            }
            let second = fixed_time("2026-02-16T09:00:00Z") + Duration::minutes(second_offset);
            propagate(&mut forest, second);
            prop_assert!(!capture_initial_schedule(&mut forest, "root"));

            prop_assert_eq!(start_of(&forest, "root"), second);
            let after = forest
                .tasks()
                .map(|task| (
                    task.id.clone(),
                    task.initial_start_time,
                    task.initial_end_time,
                    task.initial_planned_duration,
                ))
                .collect::<std::collections::BTreeSet<_>>();
            prop_assert_eq!(after, frozen);
        }
    }
}
