mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use std::time::Duration;
use test_support::{request_err, request_ok, seed_week, spawn_sidecar, temp_dir, titles};

fn wait_for_job(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    job_id: &str,
) -> serde_json::Value {
    for attempt in 0..200 {
        let status = request_ok(
            stdin,
            reader,
            &format!("poll-{}", attempt),
            "rebuild.status",
            json!({ "jobId": job_id }),
        );
        match status["state"].as_str() {
            Some("Succeeded") | Some("Failed") => return status,
            _ => std::thread::sleep(Duration::from_millis(25)),
        }
    }
    panic!("rebuild job {} did not finish", job_id);
}

#[test]
fn lesson_added_rebuilds_generated_schedule() {
    let workspace = temp_dir("plannerd-rebuild");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seeded = seed_week(&mut stdin, &mut reader, "u1", 3, "2024-09-06");

    // No schedule yet, so nothing to rebuild.
    let early = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "lessons.create",
        json!({ "topicId": seeded.topic_id, "title": "L4" }),
    );
    assert_eq!(early["rebuildJobs"].as_array().map(Vec::len), Some(0));

    let generated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.generate",
        json!({ "configurationId": seeded.configuration_id, "userId": "u1" }),
    );
    let schedule_id = generated["scheduleId"].as_i64().expect("scheduleId");
    assert_eq!(
        titles(&generated["events"]),
        vec!["L1", "L2", "L3", "L4", "Error"]
    );

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lessons.create",
        json!({ "topicId": seeded.topic_id, "title": "L5" }),
    );
    let jobs = added["rebuildJobs"].as_array().expect("rebuildJobs");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["scheduleId"], schedule_id);
    let job_id = jobs[0]["jobId"].as_str().expect("jobId").to_string();

    let status = wait_for_job(&mut stdin, &mut reader, &job_id);
    assert_eq!(status["state"], "Succeeded", "{}", status);
    assert_eq!(status["scheduleId"], schedule_id);

    let stored = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.events",
        json!({ "scheduleId": schedule_id, "userId": "u1" }),
    );
    assert_eq!(
        titles(&stored["events"]),
        vec!["L1", "L2", "L3", "L4", "L5"]
    );

    let progress = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "rebuild.inProgress",
        json!({ "scheduleId": schedule_id }),
    );
    assert_eq!(progress["inProgress"], false);
}

#[test]
fn manual_enqueue_and_disabled_auto_rebuild() {
    let workspace = temp_dir("plannerd-rebuild-manual");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seeded = seed_week(&mut stdin, &mut reader, "u1", 5, "2024-09-06");
    let generated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.generate",
        json!({ "configurationId": seeded.configuration_id, "userId": "u1" }),
    );
    let schedule_id = generated["scheduleId"].as_i64().expect("scheduleId");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "rebuild.enqueue",
        json!({
            "scheduleId": schedule_id,
            "configurationId": seeded.configuration_id + 100,
            "userId": "u1"
        }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "rebuild.enqueue",
        json!({
            "scheduleId": schedule_id,
            "configurationId": seeded.configuration_id,
            "userId": "u2"
        }),
    );
    assert_eq!(code, "forbidden");

    let queued = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "rebuild.enqueue",
        json!({
            "scheduleId": schedule_id,
            "configurationId": seeded.configuration_id,
            "userId": "u1",
            "reason": "term dates changed"
        }),
    );
    let job_id = queued["jobId"].as_str().expect("jobId").to_string();
    let status = wait_for_job(&mut stdin, &mut reader, &job_id);
    assert_eq!(status["state"], "Succeeded", "{}", status);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "setup.update",
        json!({ "section": "scheduler", "patch": { "autoRebuildOnLessonChange": false } }),
    );
    let added = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "lessons.create",
        json!({ "topicId": seeded.topic_id, "title": "L6" }),
    );
    assert_eq!(added["rebuildJobs"].as_array().map(Vec::len), Some(0));

    // Schedule keeps its five lessons until a rebuild is asked for.
    let stored = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.events",
        json!({ "scheduleId": schedule_id, "userId": "u1" }),
    );
    assert_eq!(
        titles(&stored["events"]),
        vec!["L1", "L2", "L3", "L4", "L5"]
    );
}
