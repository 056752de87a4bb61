mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("plannerd-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["version"].is_string());
    assert!(health["workspacePath"].is_null());

    // Everything except health needs a workspace.
    for (i, method) in [
        "setup.get",
        "courses.list",
        "schedule.generate",
        "rebuild.status",
    ]
    .iter()
    .enumerate()
    {
        let code = request_err(&mut stdin, &mut reader, &format!("nw-{}", i), method, json!({}));
        assert_eq!(code, "no_workspace", "{}", method);
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("planner.sqlite3").exists());

    let methods = [
        ("setup.get", json!({})),
        ("courses.list", json!({ "userId": "u1" })),
        ("configurations.get", json!({ "configurationId": 1, "userId": "u1" })),
        ("specialDays.list", json!({ "scheduleId": 1, "userId": "u1" })),
        ("schedule.validate", json!({ "configurationId": 1, "userId": "u1" })),
        ("schedule.events", json!({ "scheduleId": 1, "userId": "u1" })),
        ("rebuild.status", json!({ "jobId": "missing" })),
        ("rebuild.inProgress", json!({ "scheduleId": 1 })),
    ];
    for (i, (method, params)) in methods.iter().enumerate() {
        let value = request(&mut stdin, &mut reader, &format!("m-{}", i), method, params.clone());
        if value["ok"] == json!(false) {
            assert_ne!(value["error"]["code"], "not_implemented", "{}", method);
        }
    }

    let code = request_err(&mut stdin, &mut reader, "3", "grades.compute", json!({}));
    assert_eq!(code, "not_implemented");

    let code = request_err(&mut stdin, &mut reader, "4", "courses.create", json!({ "userId": "u1" }));
    assert_eq!(code, "bad_params");

    let status = request_ok(&mut stdin, &mut reader, "5", "rebuild.status", json!({ "jobId": "missing" }));
    assert_eq!(status["state"], "NotFound");
}
