// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use icu_collator::{Collator, CollatorOptions, Strength};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{Task, TaskPriority};

/// An unknown value was given for one of the closed filter dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {field} value: {value:?}")]
pub struct ParseFilterError {
    field: &'static str,
    value: String,
}

impl ParseFilterError {
    pub(crate) fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

/// Which priority to keep in the view.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriorityFilter {
    #[default]
    All,
    Low,
    Medium,
    High,
}

impl PriorityFilter {
    /// A specific filter never matches a task without a priority.
    pub fn matches(self, priority: Option<TaskPriority>) -> bool {
        match self {
            PriorityFilter::All => true,
            PriorityFilter::Low => priority == Some(TaskPriority::Low),
            PriorityFilter::Medium => priority == Some(TaskPriority::Medium),
            PriorityFilter::High => priority == Some(TaskPriority::High),
        }
    }
}

impl FromStr for PriorityFilter {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(PriorityFilter::All),
            "low" => Ok(PriorityFilter::Low),
            "medium" => Ok(PriorityFilter::Medium),
            "high" => Ok(PriorityFilter::High),
            other => Err(ParseFilterError::new("priority", other)),
        }
    }
}

/// Ordering applied to the view.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    /// Earliest deadline first, tasks without one at the end.
    #[default]
    DueDate,
    /// Newest first.
    CreatedAt,
    /// Most severe first.
    Priority,
    Title,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::DueDate => "dueDate",
            SortBy::CreatedAt => "createdAt",
            SortBy::Priority => "priority",
            SortBy::Title => "title",
        }
    }

    fn compare(self, a: &Task, b: &Task, titles: &TitleCollator) -> Ordering {
        match self {
            SortBy::DueDate => match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            SortBy::CreatedAt => b.created_at.cmp(&a.created_at),
            SortBy::Priority => TaskPriority::weight(b.priority).cmp(&TaskPriority::weight(a.priority)),
            SortBy::Title => titles.compare(&a.title, &b.title),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dueDate" => Ok(SortBy::DueDate),
            "createdAt" => Ok(SortBy::CreatedAt),
            "priority" => Ok(SortBy::Priority),
            "title" => Ok(SortBy::Title),
            other => Err(ParseFilterError::new("sort_by", other)),
        }
    }
}

/// Locale-aware title order, using the root collation.
///
/// Base letters decide first, then accents, then case, so `eclair`,
/// `éclair` and `Émile` sort together before `fig`. Titles the collator
/// considers equal fall back to their raw text.
struct TitleCollator {
    collator: Option<Collator>,
}

impl TitleCollator {
    fn new() -> Self {
        let mut options = CollatorOptions::new();
        options.strength = Some(Strength::Tertiary);
        Self {
            collator: Collator::try_new(&Default::default(), options).ok(),
        }
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        let collated = match &self.collator {
            Some(collator) => collator.compare(a, b),
            // Only reachable without compiled collation data.
            None => a
                .chars()
                .flat_map(char::to_lowercase)
                .cmp(b.chars().flat_map(char::to_lowercase)),
        };
        collated.then_with(|| a.cmp(b))
    }
}

/// The view parameters picked in the UI. Never persisted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct FilterOptions {
    pub show_completed: bool,
    pub priority: PriorityFilter,
    pub sort_by: SortBy,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            show_completed: true,
            priority: PriorityFilter::All,
            sort_by: SortBy::DueDate,
        }
    }
}

impl FilterOptions {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Both predicates must hold for a task to stay in the view.
    pub fn keeps(&self, task: &Task) -> bool {
        (self.show_completed || !task.is_complete()) && self.priority.matches(task.priority)
    }
}

/// Filters and orders `tasks` for rendering.
///
/// The input is left untouched. The sort is stable, so tasks with equal
/// keys keep their input order and the output is fully determined by the
/// arguments.
pub fn derive_view(tasks: &[Task], options: &FilterOptions) -> Vec<Task> {
    let mut view: Vec<Task> = tasks.iter().filter(|task| options.keeps(task)).cloned().collect();
    let titles = TitleCollator::new();
    view.sort_by(|a, b| options.sort_by.compare(a, b, &titles));
    view
}

/// Number of tasks still to do, over the whole list rather than the view.
pub fn incomplete_count(tasks: &[Task]) -> usize {
    tasks.iter().filter(|task| !task.is_complete()).count()
}

/// Ids of the tasks past their deadline on `today`, in input order.
pub fn overdue_ids(tasks: &[Task], today: NaiveDate) -> Vec<Uuid> {
    tasks
        .iter()
        .filter(|task| task.is_overdue(today))
        .map(|task| task.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskStatus;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
    }

    fn task(title: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            status: TaskStatus::Todo,
            due_date: None,
            priority: None,
            tags: Vec::new(),
            user_id: "user-1".to_string(),
            created_at: base_time(),
        }
    }

    fn due(mut t: Task, date: &str) -> Task {
        t.due_date = Some(date.parse::<NaiveDate>().unwrap());
        t
    }

    fn prio(mut t: Task, priority: TaskPriority) -> Task {
        t.priority = Some(priority);
        t
    }

    fn done(mut t: Task) -> Task {
        t.status = TaskStatus::Completed;
        t
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.title.as_str()).collect()
    }

    fn sorted_by(sort_by: SortBy) -> FilterOptions {
        FilterOptions {
            sort_by,
            ..FilterOptions::default()
        }
    }

    fn mixed_tasks() -> Vec<Task> {
        vec![
            done(prio(due(task("e"), "2024-02-01"), TaskPriority::High)),
            task("d"),
            prio(due(task("c"), "2024-01-15"), TaskPriority::Low),
            done(task("b")),
            prio(task("a"), TaskPriority::High),
            prio(due(task("f"), "2024-01-15"), TaskPriority::Medium),
        ]
    }

    #[test]
    fn test_default_options() {
        let mut options = FilterOptions {
            show_completed: false,
            priority: PriorityFilter::High,
            sort_by: SortBy::Title,
        };
        options.reset();
        assert!(options.show_completed);
        assert_eq!(options.priority, PriorityFilter::All);
        assert_eq!(options.sort_by, SortBy::DueDate);
    }

    #[test]
    fn test_hide_completed() {
        let options = FilterOptions {
            show_completed: false,
            ..FilterOptions::default()
        };
        let view = derive_view(&mixed_tasks(), &options);
        assert_eq!(view.len(), 4);
        assert!(view.iter().all(|t| t.status != TaskStatus::Completed));
    }

    #[test]
    fn test_priority_filter_excludes_missing_priority() {
        for (filter, expected) in [
            (PriorityFilter::High, TaskPriority::High),
            (PriorityFilter::Medium, TaskPriority::Medium),
            (PriorityFilter::Low, TaskPriority::Low),
        ] {
            let options = FilterOptions {
                priority: filter,
                ..FilterOptions::default()
            };
            let view = derive_view(&mixed_tasks(), &options);
            assert!(!view.is_empty());
            assert!(view.iter().all(|t| t.priority == Some(expected)));
        }
    }

    #[test]
    fn test_both_filters_apply() {
        let options = FilterOptions {
            show_completed: false,
            priority: PriorityFilter::High,
            sort_by: SortBy::DueDate,
        };
        assert_eq!(titles(&derive_view(&mixed_tasks(), &options)), vec!["a"]);
    }

    #[test]
    fn test_sort_by_due_date_puts_undated_last() {
        let input = vec![task("B"), due(task("A"), "2024-01-01")];
        let view = derive_view(&input, &sorted_by(SortBy::DueDate));
        assert_eq!(titles(&view), vec!["A", "B"]);
    }

    #[test]
    fn test_sort_by_due_date_is_stable() {
        let view = derive_view(&mixed_tasks(), &sorted_by(SortBy::DueDate));
        // c and f share a date; d, b and a have none. Input order wins for both groups.
        assert_eq!(titles(&view), vec!["c", "f", "e", "d", "b", "a"]);

        let dated: Vec<NaiveDate> = view.iter().filter_map(|t| t.due_date).collect();
        assert!(dated.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_sort_by_priority() {
        let input = vec![
            prio(task("low"), TaskPriority::Low),
            prio(task("high"), TaskPriority::High),
            task("none"),
        ];
        let view = derive_view(&input, &sorted_by(SortBy::Priority));
        assert_eq!(titles(&view), vec!["high", "low", "none"]);
    }

    #[test]
    fn test_sort_by_priority_ties_keep_input_order() {
        let view = derive_view(&mixed_tasks(), &sorted_by(SortBy::Priority));
        assert_eq!(titles(&view), vec!["e", "a", "f", "c", "d", "b"]);
    }

    #[test]
    fn test_sort_by_created_at_newest_first() {
        let mut older = task("older");
        older.created_at = base_time();
        let mut newer = task("newer");
        newer.created_at = base_time() + Duration::hours(1);
        let mut newest = task("newest");
        newest.created_at = base_time() + Duration::days(1);

        let view = derive_view(&[older, newest, newer], &sorted_by(SortBy::CreatedAt));
        assert_eq!(titles(&view), vec!["newest", "newer", "older"]);
    }

    #[test]
    fn test_sort_by_title_ignores_case() {
        let input = vec![task("banana"), task("Cherry"), task("apple"), task("Apple")];
        let view = derive_view(&input, &sorted_by(SortBy::Title));
        // Case only breaks ties, lowercase first.
        assert_eq!(titles(&view), vec!["apple", "Apple", "banana", "Cherry"]);
    }

    #[test]
    fn test_sort_by_title_keeps_accented_titles_with_their_letter() {
        let input = vec![task("zebra"), task("éclair"), task("eclair"), task("Émile"), task("fig")];
        let view = derive_view(&input, &sorted_by(SortBy::Title));
        assert_eq!(titles(&view), vec!["eclair", "éclair", "Émile", "fig", "zebra"]);
    }

    #[test]
    fn test_derive_view_is_deterministic_and_pure() {
        let input = mixed_tasks();
        let snapshot = input.clone();
        for sort_by in [SortBy::DueDate, SortBy::CreatedAt, SortBy::Priority, SortBy::Title] {
            let options = sorted_by(sort_by);
            assert_eq!(derive_view(&input, &options), derive_view(&input, &options));
        }
        assert_eq!(input, snapshot);
    }

    #[test]
    fn test_incomplete_count() {
        assert_eq!(incomplete_count(&mixed_tasks()), 4);
        assert_eq!(incomplete_count(&[]), 0);
    }

    #[test]
    fn test_overdue_ids() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
        let tasks = mixed_tasks();
        // c and f are open and were due on the 15th. e is done.
        let overdue = overdue_ids(&tasks, today);
        let expected: Vec<Uuid> = tasks
            .iter()
            .filter(|t| t.title == "c" || t.title == "f")
            .map(|t| t.id)
            .collect();
        assert_eq!(overdue, expected);

        let on_deadline = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert!(overdue_ids(&tasks, on_deadline).is_empty());
    }

    #[test]
    fn test_parse_closed_values() {
        assert_eq!("dueDate".parse::<SortBy>().unwrap(), SortBy::DueDate);
        assert_eq!("all".parse::<PriorityFilter>().unwrap(), PriorityFilter::All);
        let err = "urgent".parse::<PriorityFilter>().unwrap_err();
        assert_eq!(err.to_string(), r#"unknown priority value: "urgent""#);
        assert!("due_date".parse::<SortBy>().is_err());
    }

    #[test]
    fn test_filter_options_deserialize_with_defaults() {
        let options: FilterOptions = serde_json::from_str(r#"{"sort_by": "title"}"#).unwrap();
        assert_eq!(options.sort_by, SortBy::Title);
        assert!(options.show_completed);
        assert_eq!(options.priority, PriorityFilter::All);

        assert!(serde_json::from_str::<FilterOptions>(r#"{"priority": "urgent"}"#).is_err());
    }
}
