use crate::domain::duration::effective_duration;
use crate::domain::forest::TaskForest;
use crate::domain::models::Task;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const LIGHT_LOAD_MINUTES: u32 = 180;
const MEDIUM_LOAD_MINUTES: u32 = 360;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AccuracyTarget {
    pub low: f64,
    pub high: f64,
}

impl Default for AccuracyTarget {
    fn default() -> Self {
        Self {
            low: 80.0,
            high: 120.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyZone {
    TooLoose,
    PerfectZone,
    Overtime,
}

impl AccuracyTarget {
    /// Below the band the plan overestimated the work, above it the work ran over.
    pub fn classify(&self, accuracy: f64) -> AccuracyZone {
        if accuracy < self.low {
            AccuracyZone::TooLoose
        } else if accuracy > self.high {
            AccuracyZone::Overtime
        } else {
            AccuracyZone::PerfectZone
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub tasks_done: u32,
    pub planned_minutes: u32,
    pub actual_minutes: u32,
    pub time_saved_minutes: i64,
    pub accuracy: Option<f64>,
    pub smoothed_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatisticsSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub tasks_done: u32,
    pub planned_minutes: u32,
    pub actual_minutes: u32,
    pub time_saved_minutes: i64,
    pub smoothed_accuracy: Option<f64>,
    pub zone: Option<AccuracyZone>,
    pub days: Vec<DailyStats>,
}

#[derive(Debug, Clone, Copy, Default)]
struct DayTotals {
    tasks_done: u32,
    planned_minutes: u32,
    actual_minutes: u32,
}

impl DayTotals {
    fn accuracy(&self) -> Option<f64> {
        (self.planned_minutes > 0)
            .then(|| f64::from(self.actual_minutes) / f64::from(self.planned_minutes) * 100.0)
    }
}

/// Aggregates completed leaf tasks that carry an actual duration.
///
/// `tasks` may include days before `start`; they only feed the trailing
/// window used to smooth accuracy.
pub fn summarize(
    tasks: Vec<Task>,
    start: NaiveDate,
    end: NaiveDate,
    window_days: u32,
    target: AccuracyTarget,
) -> StatisticsSummary {
    let totals = daily_totals(tasks);
    let window = i64::from(window_days.max(1));

    let mut days = Vec::new();
    let mut day = start;
    while day <= end {
        let today = totals.get(&day).copied().unwrap_or_default();
        let window_start = day
            .checked_sub_signed(Duration::days(window - 1))
            .unwrap_or(NaiveDate::MIN);
        let window_values = totals
            .range(window_start..=day)
            .filter_map(|(_, totals)| totals.accuracy())
            .collect::<Vec<_>>();
        let smoothed_accuracy = (!window_values.is_empty())
            .then(|| window_values.iter().sum::<f64>() / window_values.len() as f64);

        days.push(DailyStats {
            date: day,
            tasks_done: today.tasks_done,
            planned_minutes: today.planned_minutes,
            actual_minutes: today.actual_minutes,
            time_saved_minutes: i64::from(today.planned_minutes) - i64::from(today.actual_minutes),
            accuracy: today.accuracy(),
            smoothed_accuracy,
        });

        let Some(next) = day.succ_opt() else {
            break;
        };
        day = next;
    }

    let tasks_done = days.iter().map(|day| day.tasks_done).sum();
    let planned_minutes = days.iter().map(|day| day.planned_minutes).sum::<u32>();
    let actual_minutes = days.iter().map(|day| day.actual_minutes).sum::<u32>();
    let smoothed_accuracy = days.iter().rev().find_map(|day| day.smoothed_accuracy);

    StatisticsSummary {
        start,
        end,
        tasks_done,
        planned_minutes,
        actual_minutes,
        time_saved_minutes: i64::from(planned_minutes) - i64::from(actual_minutes),
        smoothed_accuracy,
        zone: smoothed_accuracy.map(|accuracy| target.classify(accuracy)),
        days,
    }
}

/// 0 for an empty day, then 1..=3 by total planned minutes of the roots.
pub fn load_level(forest: &TaskForest) -> u8 {
    let roots = forest.roots();
    if roots.is_empty() {
        return 0;
    }
    let total = roots
        .iter()
        .map(|root_id| effective_duration(forest, root_id))
        .fold(0u32, u32::saturating_add);
    match total {
        minutes if minutes <= LIGHT_LOAD_MINUTES => 1,
        minutes if minutes <= MEDIUM_LOAD_MINUTES => 2,
        _ => 3,
    }
}

fn daily_totals(tasks: Vec<Task>) -> BTreeMap<NaiveDate, DayTotals> {
    let mut by_date: BTreeMap<NaiveDate, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        by_date.entry(task.date).or_default().push(task);
    }

    by_date
        .into_iter()
        .map(|(date, tasks)| {
            let forest = TaskForest::from_tasks(tasks);
            let mut totals = DayTotals::default();
            for task in forest.tasks() {
                if !task.is_completed || forest.has_children(&task.id) {
                    continue;
                }
                let Some(actual) = task.actual_duration else {
                    continue;
                };
                totals.tasks_done += 1;
                totals.planned_minutes += effective_duration(&forest, &task.id);
                totals.actual_minutes += actual;
            }
            (date, totals)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn done(id: &str, date: &str, planned: u32, actual: u32) -> Task {
        let mut task = Task::new(id, id, day(date), planned, fixed_time("2026-02-16T07:00:00Z"));
        task.is_completed = true;
        task.actual_duration = Some(actual);
        task
    }

    #[test]
    fn classify_uses_target_band() {
        let target = AccuracyTarget::default();
        assert_eq!(target.classify(79.9), AccuracyZone::TooLoose);
        assert_eq!(target.classify(80.0), AccuracyZone::PerfectZone);
        assert_eq!(target.classify(120.0), AccuracyZone::PerfectZone);
        assert_eq!(target.classify(150.0), AccuracyZone::Overtime);
    }

    #[test]
    fn summarize_counts_only_completed_leaves_with_actuals() {
        let mut parent = done("p", "2026-02-16", 0, 999);
        parent.actual_duration = Some(999);
        let mut child = done("c", "2026-02-16", 30, 20);
        child.parent_id = Some("p".to_string());
        let mut open = Task::new("open", "open", day("2026-02-16"), 60, fixed_time("2026-02-16T07:00:00Z"));
        open.actual_duration = Some(10);
        let mut no_actual = done("n", "2026-02-16", 60, 0);
        no_actual.actual_duration = None;

        let summary = summarize(
            vec![parent, child, open, no_actual],
            day("2026-02-16"),
            day("2026-02-16"),
            3,
            AccuracyTarget::default(),
        );

        assert_eq!(summary.tasks_done, 1);
        assert_eq!(summary.planned_minutes, 30);
        assert_eq!(summary.actual_minutes, 20);
        assert_eq!(summary.time_saved_minutes, 10);
    }

    #[test]
    fn smoothed_accuracy_averages_trailing_window() {
        let tasks = vec![
            done("a", "2026-02-13", 100, 200),
            done("b", "2026-02-14", 100, 50),
            done("c", "2026-02-15", 100, 100),
            done("d", "2026-02-16", 100, 150),
        ];

        let summary = summarize(
            tasks,
            day("2026-02-15"),
            day("2026-02-17"),
            3,
            AccuracyTarget::default(),
        );

        assert_eq!(summary.days.len(), 3);
        let by_day = summary
            .days
            .iter()
            .map(|stats| stats.smoothed_accuracy)
            .collect::<Vec<_>>();
        assert_eq!(by_day[0], Some((200.0 + 50.0 + 100.0) / 3.0));
        assert_eq!(by_day[1], Some((50.0 + 100.0 + 150.0) / 3.0));
        assert_eq!(by_day[2], Some((100.0 + 150.0) / 2.0));
        assert_eq!(summary.days[2].accuracy, None);
        assert_eq!(summary.smoothed_accuracy, Some(125.0));
        assert_eq!(summary.zone, Some(AccuracyZone::Overtime));
        assert_eq!(summary.tasks_done, 2);
    }

    #[test]
    fn window_at_earliest_date_is_clamped() {
        let first = NaiveDate::MIN;
        let second = first.succ_opt().expect("second day");
        let mut task = done("a", "2026-02-16", 60, 30);
        task.date = first;

        let summary = summarize(vec![task], first, second, 7, AccuracyTarget::default());

        assert_eq!(summary.days.len(), 2);
        assert_eq!(summary.days[0].smoothed_accuracy, Some(50.0));
        assert_eq!(summary.days[1].smoothed_accuracy, Some(50.0));
        assert_eq!(summary.zone, Some(AccuracyZone::TooLoose));
    }

    #[test]
    fn load_level_buckets_total_minutes() {
        let date = "2026-02-16";
        assert_eq!(load_level(&TaskForest::default()), 0);
        let light = TaskForest::from_tasks(vec![done("a", date, 120, 0)]);
        assert_eq!(load_level(&light), 1);
        let medium = TaskForest::from_tasks(vec![done("a", date, 120, 0), done("b", date, 120, 0)]);
        assert_eq!(load_level(&medium), 2);
        let heavy = TaskForest::from_tasks(vec![done("a", date, 400, 0)]);
        assert_eq!(load_level(&heavy), 3);
    }
}
