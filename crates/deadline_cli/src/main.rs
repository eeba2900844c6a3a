use clap::Parser;
use clap::error::ErrorKind;
use deadline_cli::cli::{Cli, Command, collect_config_overrides};
use deadline_core::config::{self, Config};
use deadline_core::error::AppError;
use deadline_core::logging;
use deadline_core::model::{Priority, Task};
use deadline_core::notify::{DeliveryResult, NotificationDispatcher};
use deadline_core::scheduler::{DispatchedReminder, ReminderEvent, ReminderScheduler};
use deadline_core::store::{
    ConflictPolicy, ImportSummary, ListFilter, NewTask, SortOrder, StatusFilter, TaskStore,
    TaskUpdate, json_store,
};
use deadline_core::time_math;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

const DISPLAY_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(200);

struct Runtime {
    config: Config,
    store: Arc<TaskStore>,
}

impl Runtime {
    fn load(raw_overrides: &[String]) -> Result<Self, AppError> {
        let loaded = config::load_config_with_fallback();
        if let Some(err) = loaded.error {
            eprintln!("WARNING: using default configuration: {err}");
        }

        let overrides = collect_config_overrides(raw_overrides)
            .map_err(|message| AppError::validation([format!("config-override: {message}")]))?;
        let config = config::merge_overrides(&loaded.config, &overrides);
        start_logging(&config);

        let path = json_store::store_path(config.store_path.as_deref())?;
        let store = Arc::new(TaskStore::open(path)?);
        Ok(Self { config, store })
    }

    fn scheduler(&self) -> ReminderScheduler {
        ReminderScheduler::new(
            Arc::clone(&self.store),
            NotificationDispatcher::from_config(&self.config, None),
            self.config.scan_interval(),
        )
    }
}

fn start_logging(config: &Config) {
    let Some(log_dir) = config.log_dir.as_deref() else {
        return;
    };
    let level = config
        .log_level
        .as_deref()
        .unwrap_or_else(|| logging::default_log_level());
    if let Err(err) = logging::init_logging(level, log_dir) {
        eprintln!("WARNING: file logging disabled: {err}");
    }
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Course")]
    course: String,
    #[tabled(rename = "Priority")]
    priority: Priority,
    #[tabled(rename = "Due")]
    due: String,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Reminder")]
    reminder: String,
}

impl TaskRow {
    fn new(task: &Task, now: OffsetDateTime) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            course: dash_if_empty(&task.course),
            priority: task.priority,
            due: format!(
                "{} ({})",
                local_time(task.due_at),
                time_math::format_countdown(now, task.due_at)
            ),
            status: status_label(task, now),
            reminder: reminder_label(task),
        }
    }
}

fn local_time(value: OffsetDateTime) -> String {
    let local = value.to_offset(time_math::local_offset());
    local
        .format(DISPLAY_FORMAT)
        .unwrap_or_else(|_| local.to_string())
}

fn status_label(task: &Task, now: OffsetDateTime) -> &'static str {
    if task.completed {
        "completed"
    } else if task.is_overdue(now) {
        "overdue"
    } else {
        "pending"
    }
}

fn reminder_label(task: &Task) -> String {
    match task.reminder_offset {
        Some(offset) => format!("{} before", time_math::format_duration(offset)),
        None => "-".to_string(),
    }
}

fn dash_if_empty(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

fn task_json(task: &Task, now: OffsetDateTime) -> Result<serde_json::Value, AppError> {
    Ok(serde_json::json!({
        "id": task.id,
        "title": task.title,
        "description": task.description,
        "course": task.course,
        "priority": task.priority.as_str(),
        "due_at": time_math::format_timestamp(task.due_at)?,
        "reminder_offset_seconds": task.reminder_offset.map(|offset| offset.whole_seconds()),
        "completed": task.completed,
        "notified": task.notified,
        "status": status_label(task, now),
        "countdown": time_math::format_countdown(now, task.due_at),
        "created_at": time_math::format_timestamp(task.created_at)?,
        "updated_at": time_math::format_timestamp(task.updated_at)?,
    }))
}

fn print_task(task: &Task, json: bool, verb: &str) -> Result<(), AppError> {
    let now = OffsetDateTime::now_utc();
    if json {
        println!("{}", task_json(task, now)?);
    } else {
        println!(
            "{verb} task {}: {} (due {})",
            task.id,
            task.title,
            local_time(task.due_at)
        );
    }
    Ok(())
}

fn print_task_detail(task: &Task, json: bool) -> Result<(), AppError> {
    let now = OffsetDateTime::now_utc();
    if json {
        println!("{}", task_json(task, now)?);
        return Ok(());
    }

    println!("ID:          {}", task.id);
    println!("Title:       {}", task.title);
    println!("Course:      {}", dash_if_empty(&task.course));
    println!("Priority:    {}", task.priority);
    println!(
        "Due:         {} ({})",
        local_time(task.due_at),
        time_math::format_countdown(now, task.due_at)
    );
    println!("Reminder:    {}", reminder_label(task));
    println!("Status:      {}", status_label(task, now));
    if !task.description.is_empty() {
        println!("Description: {}", task.description);
    }
    Ok(())
}

fn print_tasks(tasks: &[Task], json: bool) -> Result<(), AppError> {
    let now = OffsetDateTime::now_utc();
    if json {
        let payload = tasks
            .iter()
            .map(|task| task_json(task, now))
            .collect::<Result<Vec<_>, _>>()?;
        println!("{}", serde_json::Value::Array(payload));
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }

    let mut table = Table::new(tasks.iter().map(|task| TaskRow::new(task, now)));
    table.with(Style::psql());
    println!("{table}");
    Ok(())
}

fn print_import_summary(summary: &ImportSummary, json: bool) {
    if json {
        let failed: Vec<serde_json::Value> = summary
            .failed
            .iter()
            .map(|failure| {
                serde_json::json!({
                    "index": failure.index,
                    "id": failure.id,
                    "code": failure.error.code(),
                    "message": failure.error.message(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "imported": summary.imported,
                "skipped": summary.skipped,
                "failed": failed,
            })
        );
        return;
    }

    println!(
        "Imported {}, skipped {}, failed {}",
        summary.imported,
        summary.skipped,
        summary.failed.len()
    );
    for failure in &summary.failed {
        println!("  record {}: {}", failure.index, failure.error);
    }
}

fn describe_delivery(result: &DeliveryResult) -> String {
    if let Some(channel) = result.delivered_via {
        return format!("sent via {channel}");
    }
    if result.failures.is_empty() {
        return "not sent (no delivery channel enabled)".to_string();
    }
    let reasons: Vec<String> = result
        .failures
        .iter()
        .map(|failure| format!("{}: {}", failure.channel, failure.error.message()))
        .collect();
    format!("not sent ({})", reasons.join("; "))
}

fn reminder_json(reminder: &DispatchedReminder) -> serde_json::Value {
    let failures: Vec<serde_json::Value> = reminder
        .result
        .failures
        .iter()
        .map(|failure| {
            serde_json::json!({
                "channel": failure.channel.to_string(),
                "message": failure.error.message(),
            })
        })
        .collect();
    serde_json::json!({
        "task_id": reminder.task_id,
        "title": reminder.title,
        "delivered_via": reminder.result.delivered_via.map(|channel| channel.to_string()),
        "failures": failures,
    })
}

fn print_reminder(reminder: &DispatchedReminder, json: bool) {
    if json {
        println!("{}", reminder_json(reminder));
    } else {
        println!(
            "Reminder for task {}: {} ({})",
            reminder.task_id,
            reminder.title,
            describe_delivery(&reminder.result)
        );
    }
}

fn print_event(event: &ReminderEvent, json: bool) {
    match event {
        ReminderEvent::Reminder(reminder) => print_reminder(reminder, json),
        ReminderEvent::ScanFailed(err) => eprintln!("WARNING: reminder scan failed: {err}"),
    }
}

fn default_export_path() -> Result<PathBuf, AppError> {
    let now = OffsetDateTime::now_utc().to_offset(time_math::local_offset());
    Ok(PathBuf::from(time_math::export_file_name(now)?))
}

fn remind_once(runtime: &Runtime, json: bool) -> Result<(), AppError> {
    let report = runtime.scheduler().scan(OffsetDateTime::now_utc());
    if let Some(err) = report.error {
        return Err(err);
    }

    if json {
        let payload: Vec<serde_json::Value> = report.reminders.iter().map(reminder_json).collect();
        println!("{}", serde_json::Value::Array(payload));
    } else if report.reminders.is_empty() {
        println!("No reminders due.");
    } else {
        for reminder in &report.reminders {
            print_reminder(reminder, false);
        }
    }
    Ok(())
}

fn spawn_input_reader() -> Result<Receiver<String>, AppError> {
    let (sender, receiver) = mpsc::channel();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if sender.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|err| AppError::io(format!("failed to read stdin: {err}")))?;
    Ok(receiver)
}

fn is_quit(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit")
}

fn watch(runtime: &Runtime, json: bool) -> Result<(), AppError> {
    let handle = runtime.scheduler().spawn()?;
    let input = spawn_input_reader()?;
    if !json {
        println!(
            "Checking reminders every {} seconds; enter `quit` to stop.",
            runtime.config.scan_interval().as_secs()
        );
    }

    loop {
        match handle.events().recv_timeout(WATCH_POLL_INTERVAL) {
            Ok(event) => print_event(&event, json),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        match input.try_recv() {
            Ok(line) if is_quit(&line) => break,
            Ok(_) | Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }
    }

    for event in handle.stop() {
        print_event(&event, json);
    }
    Ok(())
}

fn export(store: &TaskStore, path: Option<PathBuf>, json: bool) -> Result<(), AppError> {
    let path = match path {
        Some(path) => path,
        None => default_export_path()?,
    };
    let count = store.export(&path)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "exported": count, "path": path.display().to_string() })
        );
    } else {
        println!("Exported {count} tasks to {}", path.display());
    }
    Ok(())
}

fn import(store: &TaskStore, path: &Path, on_conflict: &str, json: bool) -> Result<(), AppError> {
    let policy: ConflictPolicy = on_conflict.parse()?;
    let summary = store.import(path, policy)?;
    print_import_summary(&summary, json);
    Ok(())
}

fn run_command(cli: Cli) -> Result<(), AppError> {
    let runtime = Runtime::load(&cli.config_override)?;
    let store = runtime.store.as_ref();

    match cli.command {
        Command::Add {
            title,
            due,
            description,
            course,
            priority,
            remind,
        } => {
            let task = store.create(NewTask {
                title,
                description,
                course,
                priority,
                due_at: due,
                reminder_offset: remind,
            })?;
            print_task(&task, cli.json, "Added")?;
        }
        Command::Show { id } => {
            let task = store.get(id)?;
            print_task_detail(&task, cli.json)?;
        }
        Command::Edit {
            id,
            title,
            description,
            course,
            priority,
            due,
            remind,
            no_remind,
            reopen,
        } => {
            let changes = TaskUpdate {
                title,
                description,
                course,
                priority,
                due_at: due,
                reminder_offset: if no_remind { Some(None) } else { remind.map(Some) },
                completed: reopen.then_some(false),
            };
            if changes.is_empty() {
                return Err(AppError::validation([
                    "nothing to change; pass at least one field to edit",
                ]));
            }
            let task = store.update(id, changes)?;
            print_task(&task, cli.json, "Updated")?;
        }
        Command::Done { id } => {
            let task = store.complete(id)?;
            print_task(&task, cli.json, "Completed")?;
        }
        Command::Delete { id } => {
            let task = store.delete(id)?;
            print_task(&task, cli.json, "Deleted")?;
        }
        Command::List {
            course,
            priority,
            status,
            desc,
        } => {
            let filter = ListFilter {
                course,
                priority: priority
                    .as_deref()
                    .map(str::parse::<Priority>)
                    .transpose()?,
                status: status.parse::<StatusFilter>()?,
            };
            let order = if desc {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            };
            let tasks = store.list(&filter, order)?;
            print_tasks(&tasks, cli.json)?;
        }
        Command::Courses => {
            let courses = store.courses()?;
            if cli.json {
                println!("{}", serde_json::json!(courses));
            } else if courses.is_empty() {
                println!("No courses.");
            } else {
                for course in courses {
                    println!("{course}");
                }
            }
        }
        Command::Export { path } => export(store, path, cli.json)?,
        Command::Import { path, on_conflict } => import(store, &path, &on_conflict, cli.json)?,
        Command::Remind => remind_once(&runtime, cli.json)?,
        Command::Watch => watch(&runtime, cli.json)?,
    }

    Ok(())
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::validation([message])
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    if let Err(err) = run_command(cli) {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}
