use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::aggregate::{
    MonthWindow, WeekWindow, completion_progress, format_hm, perfect_completion_days,
    split_today_yesterday, top_focus_categories, weekly_completion_trend, weekly_focus_seconds,
};
use crate::api;
use crate::board::{TaskBoard, TaskDraft, TaskEdit};
use crate::categories::CategoryBook;
use crate::cli::{CategoriesCommand, Command, FocusCommand, PrefsCommand, StatsCommand};
use crate::config::Config;
use crate::datastore::{ActiveFocus, AuthSession, PendingProfile, StateDir};
use crate::datetime::{parse_date_expr, project_midnight_utc, to_project_date};
use crate::model::{
    DEFAULT_AVATAR_URL, NewFocusSession, NewTask, PrefToggle, Preferences, Profile, TaskPatch,
};
use crate::realtime::{Debouncer, RealtimeFeed};
use crate::reconcile::Merge;
use crate::remote::Remote;
use crate::render::{Renderer, short_id};

const WATCH_POLL: Duration = Duration::from_millis(250);
const WATCH_DEBOUNCE: Duration = Duration::from_millis(750);

#[instrument(skip(cfg, state, renderer, command))]
pub fn dispatch(
    cfg: &Config,
    state: &StateDir,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Signup {
            name,
            email,
            password,
        } => cmd_signup(cfg, state, &name, &email, &password),
        Command::Signin { email, password } => cmd_signin(cfg, state, &email, &password),
        Command::Signout => cmd_signout(cfg, state),
        Command::Whoami => cmd_whoami(cfg, state),
        Command::ResendConfirmation { email } => cmd_resend_confirmation(cfg, state, email),
        Command::ResetPassword { email, redirect } => {
            cmd_reset_password(cfg, state, email, redirect)
        }
        Command::Add {
            title,
            desc,
            due,
            category,
        } => cmd_add(cfg, state, title, desc, due, category),
        Command::List { all } => cmd_list(cfg, state, renderer, all),
        Command::Toggle { id } => cmd_toggle(cfg, state, &id),
        Command::Edit {
            id,
            title,
            desc,
            due,
            no_due,
            category,
            no_category,
        } => cmd_edit(cfg, state, &id, title, desc, due, no_due, category, no_category),
        Command::Rm { id } => cmd_rm(cfg, state, &id),
        Command::ClearCompleted => cmd_clear_completed(cfg, state),
        Command::Categories { command } => match command {
            CategoriesCommand::List => cmd_categories_list(cfg, state, renderer),
            CategoriesCommand::Add { name, color } => {
                cmd_categories_add(cfg, state, &name, color.as_deref())
            }
            CategoriesCommand::Rm { name } => cmd_categories_rm(cfg, state, &name),
        },
        Command::Focus { command } => match command {
            FocusCommand::Start { name, category } => {
                cmd_focus_start(cfg, state, name, category)
            }
            FocusCommand::Status => cmd_focus_status(state),
            FocusCommand::Stop { name } => cmd_focus_stop(cfg, state, name),
            FocusCommand::Log { limit } => cmd_focus_log(cfg, state, renderer, limit),
        },
        Command::Stats { command } => match command {
            StatsCommand::Progress { all_time } => {
                cmd_stats_progress(cfg, state, renderer, all_time)
            }
            StatsCommand::Weekly { back } => cmd_stats_weekly(cfg, state, renderer, back),
            StatsCommand::Trend { back } => cmd_stats_trend(cfg, state, renderer, back),
            StatsCommand::Heatmap { back } => cmd_stats_heatmap(cfg, state, renderer, back),
            StatsCommand::Top { limit } => cmd_stats_top(cfg, state, renderer, limit),
            StatsCommand::Today => cmd_stats_today(cfg, state),
        },
        Command::Prefs { command } => match command {
            PrefsCommand::Show => cmd_prefs_show(cfg, state),
            PrefsCommand::Set { toggle, value } => cmd_prefs_set(cfg, state, &toggle, &value),
        },
        Command::Watch { table } => cmd_watch(cfg, state, renderer, &table),
    }
}

fn remote(cfg: &Config) -> anyhow::Result<Remote> {
    Remote::from_config(cfg)
}

fn load_board(remote: &Remote, session: &AuthSession) -> anyhow::Result<TaskBoard> {
    let tasks = api::tasks::fetch_all(remote, session).context("failed fetching tasks")?;
    Ok(TaskBoard::new(tasks))
}

fn load_categories(remote: &Remote, session: &AuthSession) -> anyhow::Result<CategoryBook> {
    let categories =
        api::categories::fetch_all(remote, session).context("failed fetching categories")?;
    Ok(CategoryBook::new(categories))
}

/// Resolve a category name to its id, creating the category when unknown.
fn resolve_category(
    remote: &Remote,
    session: &AuthSession,
    book: &mut CategoryBook,
    name: &str,
) -> anyhow::Result<Uuid> {
    let id = book
        .resolve_or_create(name, |trimmed| {
            api::categories::insert_or_existing(remote, session, trimmed, None)
        })
        .with_context(|| format!("failed resolving category {name}"))?;
    Ok(id)
}

#[instrument(skip(cfg, state, password))]
fn cmd_signup(
    cfg: &Config,
    state: &StateDir,
    name: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    info!("command signup");
    let remote = remote(cfg)?;

    remote
        .sign_up(email, password)
        .context("sign-up rejected")?;

    state.save_pending_profile(&PendingProfile {
        full_name: name.trim().to_string(),
        email: email.to_string(),
    })?;

    println!("Account created. Check {email} for a confirmation link, then run `tempo signin`.");
    Ok(())
}

#[instrument(skip(cfg, state, password))]
fn cmd_signin(cfg: &Config, state: &StateDir, email: &str, password: &str) -> anyhow::Result<()> {
    info!("command signin");
    let remote = remote(cfg)?;

    let tokens = remote
        .sign_in(email, password)
        .context("sign-in rejected")?;

    let session = AuthSession {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user_id: tokens.user.id,
        email: tokens.user.email.clone().unwrap_or_else(|| email.to_string()),
    };
    state.save_session(&session)?;

    // Sign-up completion: the pending profile becomes a profiles row once.
    if let Some(pending) = state.load_pending_profile()? {
        let existing = api::profiles::fetch(&remote, &session)
            .context("failed checking for an existing profile")?;
        if existing.is_none() {
            api::profiles::insert(
                &remote,
                &session,
                &Profile {
                    user_id: session.user_id,
                    full_name: pending.full_name,
                    email: pending.email,
                    avatar_url: DEFAULT_AVATAR_URL.to_string(),
                },
            )
            .context("failed creating the profile")?;
            info!("created profile from pending sign-up data");
        }
        state.clear_pending_profile()?;
    }

    println!("Signed in as {}.", session.email);
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_signout(cfg: &Config, state: &StateDir) -> anyhow::Result<()> {
    info!("command signout");

    if let Some(session) = state.load_session()? {
        match remote(cfg) {
            Ok(remote) => {
                if let Err(err) = remote.sign_out(&session.access_token) {
                    warn!(error = %err, "remote sign-out failed; clearing local session anyway");
                }
            }
            Err(err) => warn!(error = %err, "backend unreachable; clearing local session anyway"),
        }
    }

    state.clear_session()?;
    println!("Signed out.");
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_whoami(cfg: &Config, state: &StateDir) -> anyhow::Result<()> {
    info!("command whoami");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let user = remote
        .current_user(&session.access_token)
        .context("session is no longer valid; run `tempo signin`")?;

    println!("user      {}", user.id);
    println!("email     {}", user.email.unwrap_or_default());
    if let Some(confirmed) = user.email_confirmed_at {
        println!("confirmed {confirmed}");
    }

    if let Some(profile) = api::profiles::fetch(&remote, &session)? {
        println!("name      {}", profile.full_name);
        println!("avatar    {}", profile.avatar_url);
    }
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_resend_confirmation(
    cfg: &Config,
    state: &StateDir,
    email: Option<String>,
) -> anyhow::Result<()> {
    info!("command resend-confirmation");
    let email = match email {
        Some(email) => email,
        None => state
            .load_pending_profile()?
            .map(|pending| pending.email)
            .ok_or_else(|| anyhow!("no pending sign-up found; pass --email"))?,
    };

    remote(cfg)?
        .resend_confirmation(&email)
        .context("failed re-sending the confirmation email")?;
    println!("Confirmation email re-sent to {email}.");
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_reset_password(
    cfg: &Config,
    state: &StateDir,
    email: Option<String>,
    redirect: Option<String>,
) -> anyhow::Result<()> {
    info!("command reset-password");
    let email = match email {
        Some(email) => email,
        None => state
            .load_session()?
            .map(|session| session.email)
            .ok_or_else(|| anyhow!("not signed in; pass --email"))?,
    };

    remote(cfg)?
        .request_password_reset(&email, redirect.as_deref())
        .context("failed requesting the password reset")?;
    println!("Check {email} for a password reset link.");
    Ok(())
}

#[instrument(skip(cfg, state, title, desc, due, category))]
fn cmd_add(
    cfg: &Config,
    state: &StateDir,
    title: Vec<String>,
    desc: Option<String>,
    due: Option<String>,
    category: Option<String>,
) -> anyhow::Result<()> {
    info!("command add");

    let title = title.join(" ").trim().to_string();
    if title.is_empty() {
        return Err(anyhow!("add: title is required"));
    }

    let session = state.require_session()?;
    let remote = remote(cfg)?;
    let now = Utc::now();

    let deadline = due
        .as_deref()
        .map(|expr| parse_date_expr(expr, now))
        .transpose()
        .context("invalid --due expression")?;

    let category_id = match category.as_deref() {
        Some(name) => {
            let mut book = load_categories(&remote, &session)?;
            Some(resolve_category(&remote, &session, &mut book, name)?)
        }
        None => None,
    };

    let mut board = load_board(&remote, &session)?;
    let draft = TaskDraft {
        title,
        description: desc.unwrap_or_default(),
        deadline,
        category_id,
    };

    // Optimistic step first; the remote write settles through the
    // reconciler, which reverts the staged row on failure.
    let (temp_id, applied) = board.stage_add(&draft, session.user_id, now);
    let staged = board.get(temp_id).cloned().context("staged row missing")?;

    let outcome = api::tasks::insert(
        &remote,
        &session,
        &NewTask {
            user_id: staged.user_id,
            title: staged.title.clone(),
            description: staged.description.clone(),
            completed: staged.completed,
            deadline: staged.deadline,
            category_id: staged.category_id,
        },
    )
    .map(Merge::Row);

    board
        .settle(applied, outcome)
        .context("failed saving the task; local change reverted")?;

    let created = board
        .tasks()
        .iter()
        .find(|task| task.title == staged.title && task.created_at == staged.created_at)
        .map(|task| short_id(task.id))
        .unwrap_or_else(|| short_id(temp_id));
    println!("Created task {created}.");
    Ok(())
}

#[instrument(skip(cfg, state, renderer))]
fn cmd_list(
    cfg: &Config,
    state: &StateDir,
    renderer: &mut Renderer,
    all: bool,
) -> anyhow::Result<()> {
    info!("command list");
    let session = state.require_session()?;
    let remote = remote(cfg)?;
    let now = Utc::now();

    let board = load_board(&remote, &session)?;
    let book = load_categories(&remote, &session)?;
    let mut prefs =
        api::prefs::fetch_or_init(&remote, &session).context("failed loading preferences")?;
    if all {
        prefs.show_completed_tasks = true;
    }

    let rows: Vec<_> = board.visible(&prefs).collect();
    if rows.is_empty() {
        println!("No tasks yet");
        return Ok(());
    }

    renderer.print_task_table(&rows, &book, &prefs, now)?;
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_toggle(cfg: &Config, state: &StateDir, id: &str) -> anyhow::Result<()> {
    info!("command toggle");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let mut board = load_board(&remote, &session)?;
    let task_id = board.find_by_prefix(id)?.id;

    let (now_completed, applied) = board
        .stage_toggle(task_id)
        .ok_or_else(|| anyhow!("task disappeared while staging"))?;

    let outcome = api::tasks::set_completed(&remote, &session, task_id, now_completed)
        .map(|()| Merge::Acknowledged);
    board
        .settle(applied, outcome)
        .context("failed saving the completion flag; local change reverted")?;

    println!(
        "Marked task {} as {}.",
        short_id(task_id),
        if now_completed { "done" } else { "open" }
    );
    Ok(())
}

#[expect(clippy::too_many_arguments)]
#[instrument(skip_all)]
fn cmd_edit(
    cfg: &Config,
    state: &StateDir,
    id: &str,
    title: Option<String>,
    desc: Option<String>,
    due: Option<String>,
    no_due: bool,
    category: Option<String>,
    no_category: bool,
) -> anyhow::Result<()> {
    info!("command edit");
    let session = state.require_session()?;
    let remote = remote(cfg)?;
    let now = Utc::now();

    let deadline = if no_due {
        Some(None)
    } else {
        due.as_deref()
            .map(|expr| parse_date_expr(expr, now))
            .transpose()
            .context("invalid --due expression")?
            .map(Some)
    };

    let category_id = if no_category {
        Some(None)
    } else {
        match category.as_deref() {
            Some(name) => {
                let mut book = load_categories(&remote, &session)?;
                Some(Some(resolve_category(&remote, &session, &mut book, name)?))
            }
            None => None,
        }
    };

    let edit = TaskEdit {
        title,
        description: desc,
        deadline,
        category_id,
    };
    let patch = TaskPatch {
        title: edit.title.clone(),
        description: edit.description.clone(),
        completed: None,
        deadline: edit.deadline,
        category_id: edit.category_id,
    };
    if patch.is_empty() {
        return Err(anyhow!("edit: nothing to change"));
    }

    let mut board = load_board(&remote, &session)?;
    let task_id = board.find_by_prefix(id)?.id;

    let applied = board
        .stage_edit(task_id, &edit)
        .ok_or_else(|| anyhow!("task disappeared while staging"))?;

    let outcome =
        api::tasks::update(&remote, &session, task_id, &patch).map(|()| Merge::Acknowledged);
    board
        .settle(applied, outcome)
        .context("failed saving the edit; local change reverted")?;

    println!("Modified task {}.", short_id(task_id));
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_rm(cfg: &Config, state: &StateDir, id: &str) -> anyhow::Result<()> {
    info!("command rm");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let mut board = load_board(&remote, &session)?;
    let task_id = board.find_by_prefix(id)?.id;

    let applied = board
        .stage_delete(task_id)
        .ok_or_else(|| anyhow!("task disappeared while staging"))?;

    let outcome = api::tasks::delete(&remote, &session, task_id).map(|()| Merge::Acknowledged);
    board
        .settle(applied, outcome)
        .context("failed deleting the task; local change reverted")?;

    println!("Deleted task {}.", short_id(task_id));
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_clear_completed(cfg: &Config, state: &StateDir) -> anyhow::Result<()> {
    info!("command clear-completed");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let mut board = load_board(&remote, &session)?;
    let applied = board.stage_delete_completed();
    let count = match &applied {
        crate::reconcile::Applied::Removed { previous } => previous.len(),
        _ => 0,
    };

    if count == 0 {
        println!("No completed tasks to delete.");
        return Ok(());
    }

    let outcome = api::tasks::delete_completed(&remote, &session).map(|()| Merge::Acknowledged);
    board
        .settle(applied, outcome)
        .context("failed deleting completed tasks; local change reverted")?;

    println!("Deleted {count} completed task(s).");
    Ok(())
}

#[instrument(skip(cfg, state, renderer))]
fn cmd_categories_list(
    cfg: &Config,
    state: &StateDir,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    info!("command categories list");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let book = load_categories(&remote, &session)?;
    if book.is_empty() {
        println!("No categories yet");
        return Ok(());
    }
    renderer.print_category_table(book.all())?;
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_categories_add(
    cfg: &Config,
    state: &StateDir,
    name: &str,
    color: Option<&str>,
) -> anyhow::Result<()> {
    info!("command categories add");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let mut book = load_categories(&remote, &session)?;
    if let Some(existing) = book.find_case_insensitive(name) {
        println!("Category already exists: {} ({}).", existing.name, short_id(existing.id));
        return Ok(());
    }

    let id = book
        .resolve_or_create(name, |trimmed| {
            api::categories::insert_or_existing(&remote, &session, trimmed, color)
        })
        .with_context(|| format!("failed creating category {name}"))?;

    println!("Created category {}.", short_id(id));
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_categories_rm(cfg: &Config, state: &StateDir, name: &str) -> anyhow::Result<()> {
    info!("command categories rm");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let mut book = load_categories(&remote, &session)?;
    let id = match book.find_case_insensitive(name) {
        Some(category) => category.id,
        None => {
            let needle = name.trim().to_ascii_lowercase();
            let mut matches = book
                .all()
                .iter()
                .filter(|cat| cat.id.to_string().starts_with(&needle));
            let first = matches
                .next()
                .ok_or_else(|| anyhow!("no category matches {name}"))?;
            if matches.next().is_some() {
                return Err(anyhow!("category {name} is ambiguous"));
            }
            first.id
        }
    };

    api::categories::delete(&remote, &session, id)
        .context("failed deleting the category")?;
    book.remove(id);
    println!("Deleted category {}.", short_id(id));
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_focus_start(
    cfg: &Config,
    state: &StateDir,
    name: Option<String>,
    category: Option<String>,
) -> anyhow::Result<()> {
    info!("command focus start");

    if let Some(active) = state.load_active_focus()? {
        return Err(anyhow!(
            "a focus session is already running since {}; stop it first",
            active.started_at
        ));
    }

    let category_id = match category.as_deref() {
        Some(category_name) => {
            let session = state.require_session()?;
            let remote = remote(cfg)?;
            let mut book = load_categories(&remote, &session)?;
            Some(resolve_category(&remote, &session, &mut book, category_name)?)
        }
        None => None,
    };

    let active = ActiveFocus {
        name: name.unwrap_or_default(),
        category_id,
        started_at: Utc::now(),
    };
    state.save_active_focus(&active)?;

    println!("Focus started.");
    Ok(())
}

#[instrument(skip(state))]
fn cmd_focus_status(state: &StateDir) -> anyhow::Result<()> {
    info!("command focus status");

    let Some(active) = state.load_active_focus()? else {
        println!("No focus session running.");
        return Ok(());
    };

    let elapsed = (Utc::now() - active.started_at).num_seconds().max(0);
    let name = if active.name.trim().is_empty() {
        "(unnamed)".to_string()
    } else {
        active.name.clone()
    };
    println!("{}  {}", format_clock(elapsed), name);
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_focus_stop(cfg: &Config, state: &StateDir, name: Option<String>) -> anyhow::Result<()> {
    info!("command focus stop");

    let active = state
        .load_active_focus()?
        .ok_or_else(|| anyhow!("no focus session running"))?;

    let session = state.require_session()?;
    let remote = remote(cfg)?;
    let ended_at = Utc::now();

    let new_session = NewFocusSession::named(
        session.user_id,
        name.as_deref().unwrap_or(&active.name),
        active.category_id,
        active.started_at,
        ended_at,
    );

    let saved = api::focus_sessions::insert(&remote, &session, &new_session)
        .context("failed saving the focus session; the timer keeps running")?;
    state.clear_active_focus()?;

    println!(
        "Recorded {} ({}).",
        saved.name,
        format_hm(crate::aggregate::session_duration_secs(&saved))
    );
    Ok(())
}

#[instrument(skip(cfg, state, renderer))]
fn cmd_focus_log(
    cfg: &Config,
    state: &StateDir,
    renderer: &mut Renderer,
    limit: usize,
) -> anyhow::Result<()> {
    info!("command focus log");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let sessions = api::focus_sessions::fetch_recent(&remote, &session, limit)
        .context("failed fetching focus sessions")?;
    if sessions.is_empty() {
        println!("No sessions recorded yet");
        return Ok(());
    }

    let book = load_categories(&remote, &session)?;
    renderer.print_session_table(&sessions, &book)?;
    Ok(())
}

#[instrument(skip(cfg, state, renderer))]
fn cmd_stats_progress(
    cfg: &Config,
    state: &StateDir,
    renderer: &mut Renderer,
    all_time: bool,
) -> anyhow::Result<()> {
    info!("command stats progress");
    let session = state.require_session()?;
    let remote = remote(cfg)?;
    let now = Utc::now();

    let (scope, tasks) = if all_time {
        ("all time", api::tasks::fetch_all(&remote, &session)?)
    } else {
        let today_start = project_midnight_utc(to_project_date(now))?;
        (
            "today",
            api::tasks::fetch_created_since(&remote, &session, today_start)?,
        )
    };

    renderer.print_progress(scope, completion_progress(&tasks))?;
    Ok(())
}

#[instrument(skip(cfg, state, renderer))]
fn cmd_stats_weekly(
    cfg: &Config,
    state: &StateDir,
    renderer: &mut Renderer,
    back: u32,
) -> anyhow::Result<()> {
    info!("command stats weekly");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let week = WeekWindow::current(Utc::now()).back(back);
    let (from, to) = week.bounds_utc()?;
    let sessions = api::focus_sessions::fetch_started_window(&remote, &session, from, to)
        .context("failed fetching focus sessions")?;

    let buckets = weekly_focus_seconds(&sessions, week);
    renderer.print_weekly_focus(&week.label(), &buckets)?;
    Ok(())
}

#[instrument(skip(cfg, state, renderer))]
fn cmd_stats_trend(
    cfg: &Config,
    state: &StateDir,
    renderer: &mut Renderer,
    back: u32,
) -> anyhow::Result<()> {
    info!("command stats trend");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let week = WeekWindow::current(Utc::now()).back(back);
    let (from, to) = week.bounds_utc()?;
    let tasks = api::tasks::fetch_deadline_window(&remote, &session, from, to)
        .context("failed fetching tasks")?;

    let buckets = weekly_completion_trend(&tasks, week);
    renderer.print_completion_trend(&week.label(), &buckets)?;
    Ok(())
}

#[instrument(skip(cfg, state, renderer))]
fn cmd_stats_heatmap(
    cfg: &Config,
    state: &StateDir,
    renderer: &mut Renderer,
    back: u32,
) -> anyhow::Result<()> {
    info!("command stats heatmap");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let month = MonthWindow::current(Utc::now()).back(back);
    let (from, to) = month.bounds_utc()?;
    let tasks = api::tasks::fetch_deadline_window(&remote, &session, from, to)
        .context("failed fetching tasks")?;

    let days = perfect_completion_days(&tasks, month);
    renderer.print_heatmap(month, &days)?;
    Ok(())
}

#[instrument(skip(cfg, state, renderer))]
fn cmd_stats_top(
    cfg: &Config,
    state: &StateDir,
    renderer: &mut Renderer,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    info!("command stats top");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let limit = limit
        .or_else(|| cfg.get_usize("stats.top_limit"))
        .unwrap_or(7);

    let sessions =
        api::focus_sessions::fetch_all(&remote, &session).context("failed fetching sessions")?;
    if sessions.is_empty() {
        println!("No sessions recorded yet");
        return Ok(());
    }

    let book = load_categories(&remote, &session)?;
    let top = top_focus_categories(&sessions, limit);
    renderer.print_top_categories(&top, &book)?;
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_stats_today(cfg: &Config, state: &StateDir) -> anyhow::Result<()> {
    info!("command stats today");
    let session = state.require_session()?;
    let remote = remote(cfg)?;
    let now = Utc::now();

    let today = to_project_date(now);
    let from = project_midnight_utc(today - chrono::Duration::days(1))?;
    let to = project_midnight_utc(today + chrono::Duration::days(1))?;
    let sessions = api::focus_sessions::fetch_started_window(&remote, &session, from, to)
        .context("failed fetching focus sessions")?;

    let comparison = split_today_yesterday(&sessions, now)?;
    println!(
        "{} today's focus duration",
        format_hm(comparison.today_secs)
    );
    println!("{}", comparison.summary());
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_prefs_show(cfg: &Config, state: &StateDir) -> anyhow::Result<()> {
    info!("command prefs show");
    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let prefs =
        api::prefs::fetch_or_init(&remote, &session).context("failed loading preferences")?;
    print_prefs(&prefs);
    Ok(())
}

#[instrument(skip(cfg, state))]
fn cmd_prefs_set(cfg: &Config, state: &StateDir, toggle: &str, value: &str) -> anyhow::Result<()> {
    info!("command prefs set");

    let toggle = PrefToggle::parse(toggle)
        .ok_or_else(|| anyhow!("unknown toggle: {toggle} (completed|descriptions|categories)"))?;
    let value = match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => true,
        "off" | "false" | "0" | "no" => false,
        other => return Err(anyhow!("expected on/off, got: {other}")),
    };

    let session = state.require_session()?;
    let remote = remote(cfg)?;

    let mut prefs =
        api::prefs::fetch_or_init(&remote, &session).context("failed loading preferences")?;
    let previous = toggle.get(&prefs);
    toggle.set(&mut prefs, value);

    if let Err(err) = api::prefs::update_toggle(&remote, &session, toggle, value) {
        toggle.set(&mut prefs, previous);
        return Err(err).context("failed saving the preference; local change reverted");
    }

    print_prefs(&prefs);
    Ok(())
}

fn print_prefs(prefs: &Preferences) {
    let flag = |value: bool| if value { "ON" } else { "OFF" };
    println!("show_completed_tasks  {}", flag(prefs.show_completed_tasks));
    println!("show_descriptions     {}", flag(prefs.show_descriptions));
    println!("show_categories       {}", flag(prefs.show_categories));
}

#[instrument(skip(cfg, state, renderer))]
fn cmd_watch(
    cfg: &Config,
    state: &StateDir,
    renderer: &mut Renderer,
    table: &str,
) -> anyhow::Result<()> {
    info!("command watch");

    if table != api::tasks::TABLE && table != api::focus_sessions::TABLE {
        return Err(anyhow!("watch: unknown table {table} (tasks|focus_sessions)"));
    }

    let session = state.require_session()?;
    let remote = remote(cfg)?;

    render_watched(&remote, &session, renderer, table)?;

    let mut feed = RealtimeFeed::connect(remote.base_url(), remote.anon_key())?;
    if let Err(err) = feed.subscribe(table, Some(session.user_id)) {
        feed.close();
        return Err(err);
    }
    println!("Watching {table}; press Ctrl-C to stop.");

    let mut debouncer = Debouncer::new(WATCH_DEBOUNCE);
    loop {
        match feed.poll(WATCH_POLL) {
            Ok(Some(event)) => {
                info!(table = %event.table, kind = ?event.kind, "change event");
                debouncer.note(Instant::now());
            }
            Ok(None) => {}
            Err(err) => {
                feed.close();
                return Err(err).context("realtime feed failed");
            }
        }

        if debouncer.ready(Instant::now()) {
            if let Err(err) = render_watched(&remote, &session, renderer, table) {
                warn!(error = %err, "refetch after change event failed");
            }
        }
    }
}

fn render_watched(
    remote: &Remote,
    session: &AuthSession,
    renderer: &mut Renderer,
    table: &str,
) -> anyhow::Result<()> {
    let now = Utc::now();
    if table == api::tasks::TABLE {
        let board = load_board(remote, session)?;
        let book = load_categories(remote, session)?;
        let prefs = api::prefs::fetch_or_init(remote, session)?;
        let rows: Vec<_> = board.visible(&prefs).collect();
        renderer.print_task_table(&rows, &book, &prefs, now)?;
    } else {
        let sessions = api::focus_sessions::fetch_recent(remote, session, 20)?;
        let book = load_categories(remote, session)?;
        renderer.print_session_table(&sessions, &book)?;
    }
    Ok(())
}

fn format_clock(secs: i64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
