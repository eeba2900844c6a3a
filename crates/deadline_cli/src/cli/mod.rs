use clap::{Parser, Subcommand};
use deadline_core::config::ConfigOverrides;
use deadline_core::time_math;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "deadline", author, version, about = "Course deadline tracker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a task
    ///
    /// Example: deadline add "Essay draft" --due "2025-03-10 09:00" --course "HIST 101" --remind "24 hours"
    Add {
        title: String,
        /// RFC 3339 timestamp or `YYYY-MM-DD HH:MM` in local time
        #[arg(long)]
        due: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        course: String,
        /// low, medium or high
        #[arg(long, default_value = "")]
        priority: String,
        /// How long before the deadline to remind, e.g. `48 hours`
        #[arg(long, value_name = "DURATION")]
        remind: Option<String>,
    },
    /// Show one task
    ///
    /// Example: deadline show 3
    Show { id: u64 },
    /// Change some fields of a task
    ///
    /// Example: deadline edit 3 --due "2025-03-12 09:00" --no-remind
    Edit {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long, value_name = "DURATION", conflicts_with = "no_remind")]
        remind: Option<String>,
        /// Remove the reminder
        #[arg(long)]
        no_remind: bool,
        /// Mark a completed task as pending again
        #[arg(long)]
        reopen: bool,
    },
    /// Mark a task as completed
    ///
    /// Example: deadline done 3
    Done { id: u64 },
    /// Delete a task
    ///
    /// Example: deadline delete 3
    Delete { id: u64 },
    /// List tasks ordered by deadline
    ///
    /// Example: deadline list --course "HIST 101" --status all
    List {
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// pending, completed or all
        #[arg(long, default_value = "pending")]
        status: String,
        /// Latest deadline first
        #[arg(long)]
        desc: bool,
    },
    /// List the course labels in use
    Courses,
    /// Export every task to a JSON file
    ///
    /// Example: deadline export backup.json
    Export {
        /// Defaults to tasks_export_<timestamp>.json in the current directory
        path: Option<PathBuf>,
    },
    /// Import tasks from a JSON file
    ///
    /// Example: deadline import backup.json --on-conflict overwrite
    Import {
        path: PathBuf,
        /// skip, overwrite or duplicate-as-new
        #[arg(long = "on-conflict", default_value = "skip")]
        on_conflict: String,
    },
    /// Send reminders that are due now
    Remind,
    /// Keep sending reminders until stdin closes or `quit` is entered
    Watch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    ScanInterval,
    LocalNotifications,
    RemotePushEnabled,
    RemotePushTarget,
    LogLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let (field, remainder) = key_raw
        .split_once('.')
        .map(|(field, rest)| (field.trim(), Some(rest.trim())))
        .unwrap_or((key_raw.trim(), None));

    let canonical_field =
        canonicalize_flag_name(field).ok_or_else(|| "override key cannot be empty".to_string())?;
    let subfield = remainder.map(canonicalize_flag_name);

    let target = match (canonical_field.as_str(), subfield) {
        ("scan_interval" | "scan_interval_secs", None) => ConfigOverrideTarget::ScanInterval,
        ("local_notifications", None) => ConfigOverrideTarget::LocalNotifications,
        ("log_level", None) => ConfigOverrideTarget::LogLevel,
        ("remote_push", Some(Some(sub))) => match sub.as_str() {
            "enabled" => ConfigOverrideTarget::RemotePushEnabled,
            "target" => ConfigOverrideTarget::RemotePushTarget,
            other => return Err(format!("unknown remote_push field '{other}'")),
        },
        ("remote_push", _) => {
            return Err("remote_push override requires a field name".to_string());
        }
        (other, Some(_)) if is_known_field(other) => {
            return Err(format!("{other} override cannot have subfields"));
        }
        (other, _) => return Err(format!("unknown config field '{other}'")),
    };

    Ok(ParsedConfigOverride { target, value })
}

/// Parses every raw override and folds them into one set; later values win.
pub fn collect_config_overrides(raws: &[String]) -> Result<ConfigOverrides, String> {
    let mut overrides = ConfigOverrides::default();

    for raw in raws {
        let parsed = parse_config_override(raw)?;
        match parsed.target {
            ConfigOverrideTarget::ScanInterval => {
                overrides.scan_interval_secs = Some(parse_interval_secs(&parsed.value)?);
            }
            ConfigOverrideTarget::LocalNotifications => {
                overrides.local_notifications = Some(parse_flag(&parsed.value)?);
            }
            ConfigOverrideTarget::RemotePushEnabled => {
                overrides.remote_push_enabled = Some(parse_flag(&parsed.value)?);
            }
            ConfigOverrideTarget::RemotePushTarget => {
                overrides.remote_push_target = Some(parsed.value);
            }
            ConfigOverrideTarget::LogLevel => {
                overrides.log_level = Some(parsed.value);
            }
        }
    }

    Ok(overrides)
}

fn is_known_field(name: &str) -> bool {
    matches!(
        name,
        "scan_interval" | "scan_interval_secs" | "local_notifications" | "log_level"
    )
}

/// Bare numbers are seconds; anything else goes through the duration parser.
fn parse_interval_secs(value: &str) -> Result<u64, String> {
    if let Ok(secs) = value.parse::<u64>() {
        return positive_secs(secs);
    }
    let duration = time_math::parse_duration(value).map_err(|err| err.message())?;
    positive_secs(duration.whole_seconds().unsigned_abs())
}

fn positive_secs(secs: u64) -> Result<u64, String> {
    if secs == 0 {
        Err("scan_interval must be at least one second".to_string())
    } else {
        Ok(secs)
    }
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(format!("expected true or false, got '{other}'")),
    }
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, Command, ConfigOverrideTarget, collect_config_overrides, parse_config_override,
    };
    use clap::Parser;

    #[test]
    fn parse_config_override_canonicalizes_field_names() {
        let parsed = parse_config_override(" Local-Notifications = off ").unwrap();

        assert_eq!(parsed.target, ConfigOverrideTarget::LocalNotifications);
        assert_eq!(parsed.value, "off");
    }

    #[test]
    fn parse_config_override_reads_remote_push_fields() {
        let parsed = parse_config_override("remote_push.Target = phone-1").unwrap();
        assert_eq!(parsed.target, ConfigOverrideTarget::RemotePushTarget);
        assert_eq!(parsed.value, "phone-1");

        let err = parse_config_override("remote_push.=true").unwrap_err();
        assert!(err.contains("requires a field name"));

        let err = parse_config_override("remote_push.region=eu").unwrap_err();
        assert!(err.contains("unknown remote_push field"));
    }

    #[test]
    fn parse_config_override_rejects_unknown_fields() {
        let err = parse_config_override("theme=noir").unwrap_err();
        assert!(err.contains("unknown config field"));

        let err = parse_config_override("log_level.file=debug").unwrap_err();
        assert!(err.contains("cannot have subfields"));
    }

    #[test]
    fn parse_config_override_rejects_missing_equals() {
        let err = parse_config_override("scan_interval").unwrap_err();
        assert!(err.contains("KEY=VALUE"));
    }

    #[test]
    fn collect_config_overrides_converts_values() {
        let raws = vec![
            "scan_interval=90".to_string(),
            "remote_push.enabled=yes".to_string(),
            "log_level=debug".to_string(),
            "scan_interval=2 minutes".to_string(),
        ];

        let overrides = collect_config_overrides(&raws).unwrap();

        assert_eq!(overrides.scan_interval_secs, Some(120));
        assert_eq!(overrides.remote_push_enabled, Some(true));
        assert_eq!(overrides.log_level.as_deref(), Some("debug"));
        assert_eq!(overrides.local_notifications, None);
    }

    #[test]
    fn collect_config_overrides_rejects_bad_values() {
        let err = collect_config_overrides(&["local_notifications=maybe".to_string()]).unwrap_err();
        assert!(err.contains("true or false"));

        let err = collect_config_overrides(&["scan_interval=0".to_string()]).unwrap_err();
        assert!(err.contains("at least one second"));
    }

    #[test]
    fn edit_rejects_remind_with_no_remind() {
        let result = Cli::try_parse_from([
            "deadline",
            "edit",
            "1",
            "--remind",
            "1 hour",
            "--no-remind",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn list_defaults_to_pending_ascending() {
        let cli = Cli::try_parse_from(["deadline", "list", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Command::List { status, desc, .. } => {
                assert_eq!(status, "pending");
                assert!(!desc);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
