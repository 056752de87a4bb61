mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, seed_week, spawn_sidecar, temp_dir, titles};

#[test]
fn one_week_with_and_without_wednesday_assembly() {
    let workspace = temp_dir("plannerd-generate-week");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seeded = seed_week(&mut stdin, &mut reader, "u1", 3, "2024-09-06");

    let validation = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.validate",
        json!({ "configurationId": seeded.configuration_id, "userId": "u1" }),
    );
    assert_eq!(validation["canGenerate"], true);
    assert_eq!(validation["stats"]["totalCells"], 5);

    let dry = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.generate",
        json!({ "configurationId": seeded.configuration_id, "userId": "u1", "dryRun": true }),
    );
    assert_eq!(dry["success"], true);
    assert_eq!(dry["persisted"], false);
    assert!(dry["scheduleId"].is_null());

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.generate",
        json!({ "configurationId": seeded.configuration_id, "userId": "u1" }),
    );
    assert_eq!(first["success"], true);
    assert_eq!(first["fingerprint"], dry["fingerprint"]);
    assert_eq!(titles(&first["events"]), vec!["L1", "L2", "L3", "Error", "Error"]);
    let events = first["events"].as_array().expect("events");
    assert_eq!(events[0]["date"], "2024-09-02");
    assert_eq!(events[0]["lessonId"], seeded.lesson_ids[0]);
    assert_eq!(events[2]["scheduleSort"], 2);
    assert_eq!(events[3]["eventType"], "Error");
    assert_eq!(events[3]["comment"], "no more lessons");
    assert_eq!(first["eventsByPeriod"]["1"], 5);
    let schedule_id = first["scheduleId"].as_i64().expect("scheduleId");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "specialDays.create",
        json!({
            "scheduleId": schedule_id,
            "userId": "u1",
            "date": "2024-09-04",
            "periods": [1],
            "eventType": "Assembly",
            "title": "Assembly",
            "backgroundColor": "#ffcc00"
        }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.generate",
        json!({ "configurationId": seeded.configuration_id, "userId": "u1" }),
    );
    assert_eq!(second["scheduleId"], schedule_id);
    assert_eq!(titles(&second["events"]), vec!["L1", "L2", "Assembly", "L3", "Error"]);
    let wed = &second["events"][2];
    assert_eq!(wed["category"], "SpecialDay");
    assert_eq!(wed["backgroundColor"], "#ffcc00");
    assert!(wed["lessonId"].is_null());
    assert_ne!(second["fingerprint"], first["fingerprint"]);

    // Persisted state matches the last run.
    let stored = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.events",
        json!({ "scheduleId": schedule_id, "userId": "u1" }),
    );
    assert_eq!(titles(&stored["events"]), titles(&second["events"]));
    assert_eq!(stored["fingerprint"], second["fingerprint"]);
}

#[test]
fn validation_errors_and_ownership() {
    let workspace = temp_dir("plannerd-generate-invalid");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seeded = seed_week(&mut stdin, &mut reader, "u1", 2, "2024-09-06");

    let prep_only = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "configurations.create",
        json!({
            "userId": "u1",
            "name": "Prep only",
            "startDate": "2024-09-02",
            "endDate": "2024-09-06",
            "periodsPerDay": 2,
            "teachingDays": ["Mon", "Tue", "Wed", "Thu", "Fri"],
            "assignments": [{ "period": 1, "specialPeriodType": "Prep" }]
        }),
    );
    assert_eq!(prep_only["validation"]["canGenerate"], false);
    let refused = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.generate",
        json!({ "configurationId": prep_only["configurationId"], "userId": "u1" }),
    );
    assert_eq!(refused["success"], false);
    assert_eq!(refused["persisted"], false);
    let codes: Vec<&str> = refused["errors"]
        .as_array()
        .expect("errors")
        .iter()
        .filter_map(|e| e["code"].as_str())
        .collect();
    assert!(codes.contains(&"no_course_assignments"), "{:?}", codes);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "configurations.create",
        json!({
            "userId": "u1",
            "name": "Both",
            "startDate": "2024-09-02",
            "endDate": "2024-09-06",
            "periodsPerDay": 1,
            "teachingDays": ["Monday"],
            "assignments": [{ "period": 1, "courseId": seeded.course_id, "specialPeriodType": "Prep" }]
        }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "configurations.create",
        json!({
            "userId": "u2",
            "name": "Borrowed course",
            "startDate": "2024-09-02",
            "endDate": "2024-09-06",
            "periodsPerDay": 1,
            "teachingDays": ["Monday"],
            "assignments": [{ "period": 1, "courseId": seeded.course_id }]
        }),
    );
    assert_eq!(code, "forbidden");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.generate",
        json!({ "configurationId": seeded.configuration_id, "userId": "u2" }),
    );
    assert_eq!(code, "forbidden");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.generate",
        json!({ "configurationId": 9999, "userId": "u1" }),
    );
    assert_eq!(code, "not_found");
}

#[test]
fn custom_exhausted_comment_from_setup() {
    let workspace = temp_dir("plannerd-generate-setup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup["scheduler"]["exhaustedComment"], "no more lessons");
    assert_eq!(setup["scheduler"]["autoRebuildOnLessonChange"], true);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "scheduler", "patch": { "exhaustedComment": "plan more lessons" } }),
    );
    let seeded = seed_week(&mut stdin, &mut reader, "u1", 1, "2024-09-03");
    let out = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.generate",
        json!({ "configurationId": seeded.configuration_id, "userId": "u1" }),
    );
    assert_eq!(out["events"][1]["comment"], "plan more lessons");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "setup.update",
        json!({ "section": "scheduler", "patch": { "autoRebuildOnLessonChange": "often" } }),
    );
    assert_eq!(code, "bad_params");
}
