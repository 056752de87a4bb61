use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, owned_schedule, parse_opt_string, rebuilds, required_i64, required_str, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::rebuild::RebuildTask;
use serde_json::json;

fn handle_enqueue(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let coordinator = match rebuilds(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_i64(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let configuration_id = match required_i64(req, "configurationId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let reason = match parse_opt_string(req.params.get("reason")) {
        Ok(v) => v.unwrap_or_else(|| "manual".to_string()),
        Err(m) => return err(&req.id, "bad_params", format!("reason {}", m), None),
    };
    let (schedule, _) = match owned_schedule(conn, req, schedule_id, &user_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if schedule.configuration_id != configuration_id {
        return err(
            &req.id,
            "bad_params",
            format!(
                "schedule {} is built from configuration {}",
                schedule_id, schedule.configuration_id
            ),
            None,
        );
    }
    let job_id = coordinator.enqueue(RebuildTask {
        schedule_id,
        configuration_id,
        user_id,
        reason,
    });
    ok(&req.id, json!({ "jobId": job_id }))
}

fn handle_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let coordinator = match rebuilds(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let job_id = match required_str(req, "jobId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match to_json(req, &coordinator.status(&job_id)) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e,
    }
}

fn handle_in_progress(state: &mut AppState, req: &Request) -> serde_json::Value {
    let coordinator = match rebuilds(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_i64(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "scheduleId": schedule_id, "inProgress": coordinator.is_in_progress(schedule_id) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rebuild.enqueue" => Some(handle_enqueue(state, req)),
        "rebuild.status" => Some(handle_status(state, req)),
        "rebuild.inProgress" => Some(handle_in_progress(state, req)),
        _ => None,
    }
}
