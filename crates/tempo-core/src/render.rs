use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Datelike, Utc};
use unicode_width::UnicodeWidthStr;

use crate::aggregate::{
    CategoryUsage, DayCounts, MonthWindow, Progress, WEEKDAY_LABELS, format_hm,
};
use crate::categories::CategoryBook;
use crate::config::Config;
use crate::datetime::format_project_datetime;
use crate::model::{Category, FocusSession, Preferences, Task};

const BAR_WIDTH: usize = 40;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, book, prefs, now))]
    pub fn print_task_table(
        &mut self,
        tasks: &[&Task],
        book: &CategoryBook,
        prefs: &Preferences,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let mut headers = vec!["ID".to_string(), "Done".to_string(), "Deadline".to_string()];
        if prefs.show_categories {
            headers.push("Category".to_string());
        }
        headers.push("Title".to_string());
        if prefs.show_descriptions {
            headers.push("Description".to_string());
        }

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(&short_id(task.id), "33");
            let done = if task.completed { "x" } else { "" }.to_string();

            let deadline = task
                .deadline
                .map(format_project_datetime)
                .unwrap_or_default();
            let deadline = if task.is_overdue(now) {
                self.paint(&deadline, "31")
            } else {
                deadline
            };

            let mut row = vec![id, done, deadline];
            if prefs.show_categories {
                row.push(book.display_name(task.category_id).to_string());
            }
            row.push(task.title.clone());
            if prefs.show_descriptions {
                row.push(task.description.clone());
            }
            rows.push(row);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, categories))]
    pub fn print_category_table(&mut self, categories: &[Category]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Color".to_string(),
            "Created".to_string(),
        ];

        let rows = categories
            .iter()
            .map(|cat| {
                vec![
                    self.paint(&short_id(cat.id), "33"),
                    cat.name.clone(),
                    cat.color.clone().unwrap_or_default(),
                    format_project_datetime(cat.created_at),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, sessions, book))]
    pub fn print_session_table(
        &mut self,
        sessions: &[FocusSession],
        book: &CategoryBook,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Category".to_string(),
            "Started".to_string(),
            "Duration".to_string(),
        ];

        let rows = sessions
            .iter()
            .map(|session| {
                vec![
                    self.paint(&short_id(session.id), "33"),
                    session.name.clone(),
                    book.display_name(session.category_id).to_string(),
                    format_project_datetime(session.started_at),
                    format_hm(crate::aggregate::session_duration_secs(session)),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, usages, book))]
    pub fn print_top_categories(
        &mut self,
        usages: &[CategoryUsage],
        book: &CategoryBook,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "Name".to_string(),
            "Times".to_string(),
            "Duration".to_string(),
        ];

        let rows = usages
            .iter()
            .map(|usage| {
                vec![
                    book.display_name(usage.category_id).to_string(),
                    usage.count.to_string(),
                    format_hm(usage.total_secs),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    /// Weekly focus as horizontal bars, one row per weekday.
    #[tracing::instrument(skip(self, buckets))]
    pub fn print_weekly_focus(&mut self, label: &str, buckets: &[i64; 7]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "WEEKLY FOCUS  {label}")?;

        let max = buckets.iter().copied().max().unwrap_or(0).max(1);
        for (idx, secs) in buckets.iter().enumerate() {
            let filled = ((*secs as f64 / max as f64) * BAR_WIDTH as f64).round() as usize;
            let bar: String = "#".repeat(filled);
            writeln!(
                out,
                "{:>3}  {:<width$}  {}",
                WEEKDAY_LABELS[idx],
                self.paint(&bar, "34"),
                format_hm(*secs),
                width = BAR_WIDTH + self.paint_padding(&bar)
            )?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, buckets))]
    pub fn print_completion_trend(
        &mut self,
        label: &str,
        buckets: &[DayCounts; 7],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "TASK COMPLETION TREND  {label}")?;

        let headers = vec![
            "Day".to_string(),
            "Completed".to_string(),
            "Pending".to_string(),
        ];
        let rows = buckets
            .iter()
            .enumerate()
            .map(|(idx, counts)| {
                vec![
                    WEEKDAY_LABELS[idx].to_string(),
                    self.paint(&counts.completed.to_string(), "32"),
                    self.paint(&counts.pending.to_string(), "33"),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    /// Month grid of 100%-completion days: Monday-anchored 7-column layout.
    #[tracing::instrument(skip(self, month, days))]
    pub fn print_heatmap(
        &mut self,
        month: MonthWindow,
        days: &[(chrono::NaiveDate, bool)],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "100% COMPLETION DAYS  {}", month.label())?;
        for label in WEEKDAY_LABELS {
            write!(out, "{label:>4}")?;
        }
        writeln!(out)?;

        let leading = month.first_day().weekday().num_days_from_monday() as usize;
        let mut column = 0usize;
        for _ in 0..leading {
            write!(out, "{:>4}", "")?;
            column += 1;
        }

        for (date, complete) in days {
            let cell = format!("{:>2}{}", date.day(), if *complete { "*" } else { " " });
            if *complete {
                write!(out, " {}", self.paint(&cell, "32"))?;
            } else {
                write!(out, " {cell}")?;
            }
            column += 1;
            if column == 7 {
                writeln!(out)?;
                column = 0;
            }
        }
        if column != 0 {
            writeln!(out)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, progress))]
    pub fn print_progress(&mut self, scope: &str, progress: Progress) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let pct = format!("{}%", progress.percent());
        writeln!(
            out,
            "PROGRESS ({scope})  {}  {} done / {} pending",
            self.paint(&pct, "1;34"),
            progress.done,
            progress.pending
        )?;
        Ok(())
    }

    pub fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    // Padding correction when a painted value is wider than its visible text.
    fn paint_padding(&self, text: &str) -> usize {
        let painted = self.paint(text, "34");
        painted.len() - text.len()
    }
}

pub fn short_id(id: uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
