#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_plannerd");
    let mut child = Command::new(exe)
        .env_remove("PLANNERD_WORKSPACE")
        .env("PLANNERD_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn plannerd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

/// Sends a request that must fail and returns its error code.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Workspace with one course of `lesson_count` lessons and a one-period
/// Mon-Fri configuration over 2024-09-02..=`end_date`.
pub struct Seeded {
    pub course_id: i64,
    pub topic_id: i64,
    pub configuration_id: i64,
    pub lesson_ids: Vec<i64>,
}

pub fn seed_week(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    user_id: &str,
    lesson_count: usize,
    end_date: &str,
) -> Seeded {
    let course = request_ok(
        stdin,
        reader,
        "seed-course",
        "courses.create",
        json!({ "userId": user_id, "name": "Algebra I" }),
    );
    let course_id = course["courseId"].as_i64().expect("courseId");
    let topic = request_ok(
        stdin,
        reader,
        "seed-topic",
        "topics.create",
        json!({ "courseId": course_id, "title": "Linear equations" }),
    );
    let topic_id = topic["topicId"].as_i64().expect("topicId");
    let mut lesson_ids = Vec::new();
    for i in 1..=lesson_count {
        let lesson = request_ok(
            stdin,
            reader,
            &format!("seed-lesson-{}", i),
            "lessons.create",
            json!({ "topicId": topic_id, "title": format!("L{}", i) }),
        );
        lesson_ids.push(lesson["lessonId"].as_i64().expect("lessonId"));
    }
    let config = request_ok(
        stdin,
        reader,
        "seed-config",
        "configurations.create",
        json!({
            "userId": user_id,
            "name": "Fall",
            "startDate": "2024-09-02",
            "endDate": end_date,
            "periodsPerDay": 1,
            "teachingDays": ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"],
            "assignments": [{ "period": 1, "courseId": course_id }]
        }),
    );
    Seeded {
        course_id,
        topic_id,
        configuration_id: config["configurationId"].as_i64().expect("configurationId"),
        lesson_ids,
    }
}

pub fn titles(events: &serde_json::Value) -> Vec<String> {
    events
        .as_array()
        .expect("events array")
        .iter()
        .map(|e| e["title"].as_str().unwrap_or_default().to_string())
        .collect()
}
