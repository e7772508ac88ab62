use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::datetime::{project_midnight_utc, to_project_date, week_start, weekday_index};
use crate::model::{FocusSession, Task};

pub const WEEKDAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Session duration in whole seconds, floored, clamped at zero when the end
/// precedes the start.
pub fn session_duration_secs(session: &FocusSession) -> i64 {
    (session.ended_at - session.started_at).num_seconds().max(0)
}

/// Seconds rendered as `"02h 05m"`.
pub fn format_hm(secs: i64) -> String {
    let secs = secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    format!("{hours:02}h {minutes:02}m")
}

/// A Monday-anchored seven-day window. Paging recomputes the boundaries;
/// the caller re-fetches, nothing is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    start: NaiveDate,
}

impl WeekWindow {
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            start: week_start(date),
        }
    }

    pub fn current(now: DateTime<Utc>) -> Self {
        Self::containing(to_project_date(now))
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(6)
    }

    pub fn prev(self) -> Self {
        Self {
            start: self.start - Duration::days(7),
        }
    }

    pub fn next(self) -> Self {
        Self {
            start: self.start + Duration::days(7),
        }
    }

    pub fn back(self, weeks: u32) -> Self {
        Self {
            start: self.start - Duration::days(7 * i64::from(weeks)),
        }
    }

    /// Half-open `[start, start + 7 days)` in UTC, per the project timezone.
    pub fn bounds_utc(&self) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
        let from = project_midnight_utc(self.start)?;
        let to = project_midnight_utc(self.start + Duration::days(7))?;
        Ok((from, to))
    }

    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.start.format("%b %-d"),
            self.end().format("%b %-d")
        )
    }

    fn bucket_of(&self, date: NaiveDate) -> Option<usize> {
        if date < self.start || date > self.end() {
            return None;
        }
        Some(weekday_index(date))
    }
}

/// A calendar-month window with one bucket per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    year: i32,
    month: u32,
}

impl MonthWindow {
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn current(now: DateTime<Utc>) -> Self {
        Self::containing(to_project_date(now))
    }

    pub fn prev(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn back(self, months: u32) -> Self {
        let mut window = self;
        for _ in 0..months {
            window = window.prev();
        }
        window
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default())
    }

    pub fn day_count(&self) -> u32 {
        let next_first = self.next().first_day();
        (next_first - self.first_day()).num_days() as u32
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let first = self.first_day();
        (0..self.day_count()).map(move |offset| first + Duration::days(i64::from(offset)))
    }

    /// Half-open `[first day, first day of next month)` in UTC.
    pub fn bounds_utc(&self) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
        let from = project_midnight_utc(self.first_day())?;
        let to = project_midnight_utc(self.next().first_day())?;
        Ok((from, to))
    }

    pub fn label(&self) -> String {
        self.first_day().format("%B %Y").to_string()
    }
}

/// Per-weekday focus totals for one week, bucketed by session start.
pub fn weekly_focus_seconds(sessions: &[FocusSession], week: WeekWindow) -> [i64; 7] {
    let mut buckets = [0i64; 7];
    for session in sessions {
        let date = to_project_date(session.started_at);
        if let Some(idx) = week.bucket_of(date) {
            buckets[idx] += session_duration_secs(session);
        }
    }
    buckets
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayCounts {
    pub completed: u32,
    pub pending: u32,
}

/// Per-weekday completed/pending counts for one week, bucketed by deadline.
/// Tasks without a deadline never reach a bucket.
pub fn weekly_completion_trend(tasks: &[Task], week: WeekWindow) -> [DayCounts; 7] {
    let mut buckets = [DayCounts::default(); 7];
    for task in tasks {
        let Some(deadline) = task.deadline else {
            continue;
        };
        let date = to_project_date(deadline);
        if let Some(idx) = week.bucket_of(date) {
            if task.completed {
                buckets[idx].completed += 1;
            } else {
                buckets[idx].pending += 1;
            }
        }
    }
    buckets
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryUsage {
    /// `None` is the uncategorized sentinel bucket.
    pub category_id: Option<Uuid>,
    pub count: u32,
    pub total_secs: i64,
}

/// Group sessions by category, count occurrences, sum durations, sort by
/// descending count and truncate to the top `limit`.
pub fn top_focus_categories(sessions: &[FocusSession], limit: usize) -> Vec<CategoryUsage> {
    let mut buckets: HashMap<Option<Uuid>, CategoryUsage> = HashMap::new();

    for session in sessions {
        let entry = buckets
            .entry(session.category_id)
            .or_insert_with(|| CategoryUsage {
                category_id: session.category_id,
                count: 0,
                total_secs: 0,
            });
        entry.count += 1;
        entry.total_secs += session_duration_secs(session);
    }

    let mut usages: Vec<CategoryUsage> = buckets.into_values().collect();
    usages.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.total_secs.cmp(&a.total_secs))
            .then_with(|| a.category_id.cmp(&b.category_id))
    });
    usages.truncate(limit);
    usages
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub done: u32,
    pub pending: u32,
}

impl Progress {
    pub fn total(&self) -> u32 {
        self.done + self.pending
    }

    /// Rounded completion percentage; zero when there are no tasks.
    pub fn percent(&self) -> u32 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        ((f64::from(self.done) / f64::from(total)) * 100.0).round() as u32
    }
}

pub fn completion_progress(tasks: &[Task]) -> Progress {
    let mut progress = Progress::default();
    for task in tasks {
        if task.completed {
            progress.done += 1;
        } else {
            progress.pending += 1;
        }
    }
    progress
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusComparison {
    pub today_secs: i64,
    pub yesterday_secs: i64,
}

impl FocusComparison {
    /// The dashboard sentence comparing today with yesterday.
    pub fn summary(&self) -> String {
        if self.yesterday_secs > 0 {
            let diff = self.today_secs - self.yesterday_secs;
            let pct = ((diff.abs() as f64 / self.yesterday_secs as f64) * 100.0).round() as i64;
            if diff > 0 {
                format!("That's {pct}% more than yesterday.")
            } else if diff < 0 {
                format!("That's {pct}% less than yesterday.")
            } else {
                "Same as yesterday.".to_string()
            }
        } else if self.today_secs > 0 {
            "First session more than yesterday!".to_string()
        } else {
            "You haven't focused today.".to_string()
        }
    }
}

/// Split sessions into today's and yesterday's totals at local midnight.
pub fn split_today_yesterday(
    sessions: &[FocusSession],
    now: DateTime<Utc>,
) -> anyhow::Result<FocusComparison> {
    let today = to_project_date(now);
    let today_start = project_midnight_utc(today)?;
    let yesterday_start = project_midnight_utc(today - Duration::days(1))?;

    let mut comparison = FocusComparison::default();
    for session in sessions {
        if session.started_at >= today_start {
            comparison.today_secs += session_duration_secs(session);
        } else if session.started_at >= yesterday_start {
            comparison.yesterday_secs += session_duration_secs(session);
        }
    }
    Ok(comparison)
}

/// One flag per calendar day: set iff the day has at least one deadline
/// task and every one of them is completed.
pub fn perfect_completion_days(tasks: &[Task], month: MonthWindow) -> Vec<(NaiveDate, bool)> {
    let mut grouped: HashMap<NaiveDate, (u32, u32)> = HashMap::new();
    for task in tasks {
        let Some(deadline) = task.deadline else {
            continue;
        };
        let date = to_project_date(deadline);
        let entry = grouped.entry(date).or_default();
        entry.0 += 1;
        if task.completed {
            entry.1 += 1;
        }
    }

    month
        .days()
        .map(|day| {
            let complete = grouped
                .get(&day)
                .map(|(total, completed)| *total > 0 && total == completed)
                .unwrap_or(false);
            (day, complete)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use super::{
        FocusComparison, MonthWindow, WeekWindow, completion_progress, format_hm,
        perfect_completion_days, session_duration_secs, split_today_yesterday,
        top_focus_categories, weekly_completion_trend, weekly_focus_seconds,
    };
    use crate::model::{FocusSession, Task};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .expect("valid time")
    }

    fn session(
        category_id: Option<Uuid>,
        started_at: chrono::DateTime<Utc>,
        secs: i64,
    ) -> FocusSession {
        FocusSession {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            name: "session".to_string(),
            category_id,
            started_at,
            ended_at: started_at + Duration::seconds(secs),
        }
    }

    fn deadline_task(deadline: chrono::DateTime<Utc>, completed: bool) -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            title: "t".to_string(),
            description: String::new(),
            completed,
            deadline: Some(deadline),
            category_id: None,
            created_at: deadline - Duration::days(1),
        }
    }

    #[test]
    fn duration_clamps_to_zero_when_end_precedes_start() {
        let start = utc(2026, 3, 2, 12, 0);
        let mut s = session(None, start, 90);
        assert_eq!(session_duration_secs(&s), 90);

        s.ended_at = start - Duration::seconds(30);
        assert_eq!(session_duration_secs(&s), 0);

        s.ended_at = start;
        assert_eq!(session_duration_secs(&s), 0);
    }

    #[test]
    fn weekly_focus_buckets_monday_first() {
        // 2026-03-02 is a Monday, 2026-03-08 a Sunday.
        let week = WeekWindow::containing(NaiveDate::from_ymd_opt(2026, 3, 4).expect("date"));
        assert_eq!(week.start(), NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"));

        let sessions = vec![
            session(None, utc(2026, 3, 2, 9, 0), 600),
            session(None, utc(2026, 3, 2, 15, 0), 300),
            session(None, utc(2026, 3, 8, 20, 0), 120),
            // outside the window
            session(None, utc(2026, 3, 9, 9, 0), 999),
        ];

        let buckets = weekly_focus_seconds(&sessions, week);
        assert_eq!(buckets[0], 900);
        assert_eq!(buckets[6], 120);
        assert_eq!(buckets[1..6].iter().sum::<i64>(), 0);
    }

    #[test]
    fn trend_buckets_by_deadline_and_splits_by_completion() {
        let week = WeekWindow::containing(NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"));
        let tasks = vec![
            deadline_task(utc(2026, 3, 3, 12, 0), true),
            deadline_task(utc(2026, 3, 3, 13, 0), false),
            deadline_task(utc(2026, 3, 3, 14, 0), false),
            deadline_task(utc(2026, 2, 24, 12, 0), true), // previous week
        ];

        let buckets = weekly_completion_trend(&tasks, week);
        assert_eq!(buckets[1].completed, 1);
        assert_eq!(buckets[1].pending, 2);
        assert_eq!(buckets[0].completed + buckets[0].pending, 0);
    }

    #[test]
    fn week_paging_moves_by_seven_days() {
        let week = WeekWindow::containing(NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"));
        assert_eq!(
            week.prev().start(),
            NaiveDate::from_ymd_opt(2026, 2, 23).expect("date")
        );
        assert_eq!(
            week.next().start(),
            NaiveDate::from_ymd_opt(2026, 3, 9).expect("date")
        );
        assert_eq!(week.back(2), week.prev().prev());
    }

    #[test]
    fn top_categories_sorts_by_count_and_keeps_the_sentinel() {
        let reading = Some(Uuid::new_v4());
        let writing = Some(Uuid::new_v4());
        let start = utc(2026, 3, 2, 9, 0);

        let mut sessions = vec![
            session(reading, start, 100),
            session(reading, start, 100),
            session(reading, start, 100),
            session(writing, start, 500),
            session(None, start, 50),
            session(None, start, 50),
        ];
        // Sessions with a negative span contribute zero, not negative.
        sessions.push(FocusSession {
            ended_at: start - Duration::seconds(10),
            ..session(writing, start, 0)
        });

        let top = top_focus_categories(&sessions, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].category_id, reading);
        assert_eq!(top[0].count, 3);
        assert_eq!(top[0].total_secs, 300);
        // writing and the sentinel tie on count=2; writing has more seconds
        assert_eq!(top[1].category_id, writing);
        assert_eq!(top[1].total_secs, 500);
    }

    #[test]
    fn progress_percent_rounds_and_handles_empty() {
        let tasks = vec![
            deadline_task(utc(2026, 3, 3, 12, 0), true),
            deadline_task(utc(2026, 3, 3, 12, 0), true),
            deadline_task(utc(2026, 3, 3, 12, 0), false),
        ];
        let progress = completion_progress(&tasks);
        assert_eq!(progress.done, 2);
        assert_eq!(progress.pending, 1);
        assert_eq!(progress.percent(), 67);

        assert_eq!(completion_progress(&[]).percent(), 0);
    }

    #[test]
    fn today_yesterday_split_and_summary() {
        let now = utc(2026, 3, 3, 18, 0);
        let sessions = vec![
            session(None, utc(2026, 3, 3, 9, 0), 600),
            session(None, utc(2026, 3, 2, 9, 0), 1200),
            // before yesterday; ignored
            session(None, utc(2026, 3, 1, 9, 0), 999),
        ];

        let cmp = split_today_yesterday(&sessions, now).expect("split");
        assert_eq!(cmp.today_secs, 600);
        assert_eq!(cmp.yesterday_secs, 1200);
        assert_eq!(cmp.summary(), "That's 50% less than yesterday.");

        let first = FocusComparison {
            today_secs: 100,
            yesterday_secs: 0,
        };
        assert_eq!(first.summary(), "First session more than yesterday!");

        let idle = FocusComparison::default();
        assert_eq!(idle.summary(), "You haven't focused today.");
    }

    #[test]
    fn perfect_days_require_every_deadline_task_completed() {
        let month = MonthWindow::containing(NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"));
        let tasks = vec![
            deadline_task(utc(2026, 3, 5, 10, 0), true),
            deadline_task(utc(2026, 3, 5, 11, 0), true),
            deadline_task(utc(2026, 3, 6, 10, 0), true),
            deadline_task(utc(2026, 3, 6, 11, 0), false),
        ];

        let days = perfect_completion_days(&tasks, month);
        assert_eq!(days.len(), 31);

        let flag_of = |d: u32| {
            days.iter()
                .find(|(date, _)| *date == NaiveDate::from_ymd_opt(2026, 3, d).expect("date"))
                .map(|(_, flag)| *flag)
                .expect("day present")
        };
        assert!(flag_of(5));
        assert!(!flag_of(6));
        assert!(!flag_of(7));
    }

    #[test]
    fn month_paging_wraps_year_boundaries() {
        let january = MonthWindow::containing(NaiveDate::from_ymd_opt(2026, 1, 15).expect("date"));
        assert_eq!(january.prev().label(), "December 2025");
        assert_eq!(january.next().label(), "February 2026");
        assert_eq!(january.day_count(), 31);
        assert_eq!(january.next().day_count(), 28);
    }

    #[test]
    fn hours_minutes_formatting() {
        assert_eq!(format_hm(0), "00h 00m");
        assert_eq!(format_hm(7500), "02h 05m");
        assert_eq!(format_hm(59), "00h 00m");
        assert_eq!(format_hm(-5), "00h 00m");
    }
}
