use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn deadline(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_deadline"))
        .args(args)
        .env("DEADLINE_STORE_PATH", dir.join("tasks.json"))
        .env("DEADLINE_CONFIG_PATH", dir.join("config.json"))
        .env("DEADLINE_DISABLE_NOTIFICATIONS", "1")
        .output()
        .expect("failed to run deadline")
}

fn add(dir: &Path, title: &str, due: &str, course: &str, priority: &str) {
    let output = deadline(
        dir,
        &[
            "add", title, "--due", due, "--course", course, "--priority", priority,
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn list_titles(dir: &Path, args: &[&str]) -> Vec<String> {
    let mut full = vec!["list", "--json"];
    full.extend_from_slice(args);
    let output = deadline(dir, &full);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|task| task["title"].as_str().unwrap().to_string())
        .collect()
}

fn seed(dir: &Path) {
    add(dir, "Lab report", "2030-04-02T12:00:00Z", "CHEM 110", "low");
    add(dir, "Problem set", "2030-03-20T09:00:00Z", "MATH 201", "high");
    add(dir, "Reading notes", "2030-03-20T09:00:00Z", "HIST 101", "medium");
}

#[test]
fn list_orders_by_deadline_then_id() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    assert_eq!(
        list_titles(dir.path(), &[]),
        vec!["Problem set", "Reading notes", "Lab report"]
    );
    assert_eq!(
        list_titles(dir.path(), &["--desc"]),
        vec!["Lab report", "Reading notes", "Problem set"]
    );
}

#[test]
fn list_plain_prints_a_table() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    let output = deadline(dir.path(), &["list"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Title"));
    assert!(stdout.contains("Due"));
    let problem = stdout.find("Problem set").unwrap();
    let lab = stdout.find("Lab report").unwrap();
    assert!(problem < lab);
}

#[test]
fn empty_list_says_so() {
    let dir = TempDir::new().unwrap();

    let output = deadline(dir.path(), &["list"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No tasks."));
}

#[test]
fn status_filters_are_exclusive() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    assert!(deadline(dir.path(), &["done", "2"]).status.success());

    assert_eq!(
        list_titles(dir.path(), &[]),
        vec!["Reading notes", "Lab report"]
    );
    assert_eq!(
        list_titles(dir.path(), &["--status", "completed"]),
        vec!["Problem set"]
    );
    assert_eq!(list_titles(dir.path(), &["--status", "all"]).len(), 3);
}

#[test]
fn course_and_priority_filters() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());

    assert_eq!(
        list_titles(dir.path(), &["--course", "HIST 101"]),
        vec!["Reading notes"]
    );
    assert_eq!(
        list_titles(dir.path(), &["--priority", "low"]),
        vec!["Lab report"]
    );
}

#[test]
fn invalid_filters_are_validation_errors() {
    let dir = TempDir::new().unwrap();

    for args in [
        ["list", "--status", "archivedish"],
        ["list", "--priority", "urgent"],
    ] {
        let output = deadline(dir.path(), &args);
        assert_eq!(output.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&output.stderr).starts_with("ERROR: validation_error - "));
    }
}

#[test]
fn courses_are_sorted_and_distinct() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    add(dir.path(), "Quiz", "2030-03-25T09:00:00Z", "MATH 201", "medium");

    let output = deadline(dir.path(), &["courses", "--json"]);
    let courses: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(courses, vec!["CHEM 110", "HIST 101", "MATH 201"]);
}
