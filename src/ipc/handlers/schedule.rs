use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, owned_schedule, parse_bool, parse_opt_date, parse_opt_i64, parse_periods,
    required_date, required_i64, required_str, service_err, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::generate::{events_by_period, fingerprint};
use crate::schedule::model::GenerationOptions;
use crate::schedule::service::{self, ContinueRequest, GenerateOptions};
use crate::schedule::store::ScheduleStore;
use crate::settings::SchedulerSettings;
use rusqlite::Connection;
use serde_json::json;

fn generation_options(conn: &Connection, req: &Request) -> Result<GenerationOptions, serde_json::Value> {
    SchedulerSettings::load(conn)
        .map(|s| s.generation)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn handle_validate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
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
    match service::validate(conn, configuration_id, &user_id) {
        Ok(report) => match to_json(req, &report) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e,
        },
        Err(e) => service_err(req, e),
    }
}

fn handle_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
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
    let dry_run = match parse_bool(req.params.get("dryRun"), false) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("dryRun {}", m), None),
    };
    let generation = match generation_options(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match service::generate(
        conn,
        configuration_id,
        &user_id,
        &GenerateOptions {
            dry_run,
            generation,
        },
    ) {
        Ok(outcome) => match to_json(req, &outcome) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e,
        },
        Err(e) => service_err(req, e),
    }
}

fn handle_events(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_i64(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period = match parse_opt_i64(req.params.get("period")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("period {}", m), None),
    };
    if let Err(e) = owned_schedule(conn, req, schedule_id, &user_id) {
        return e;
    }
    let mut events = match conn.load_schedule_events(schedule_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(p) = period {
        events.retain(|e| i64::from(e.period) == p);
    }
    let by_period = events_by_period(&events);
    let digest = fingerprint(&events);
    match to_json(req, &events) {
        Ok(v) => ok(
            &req.id,
            json!({
                "scheduleId": schedule_id,
                "events": v,
                "eventsByPeriod": by_period,
                "fingerprint": digest,
            }),
        ),
        Err(e) => e,
    }
}

fn handle_analyze_sequence_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_i64(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let after_date = match required_date(req, "afterDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match service::analyze_sequence_state(conn, schedule_id, after_date, &user_id) {
        Ok(report) => match to_json(req, &report) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e,
        },
        Err(e) => service_err(req, e),
    }
}

fn handle_continue_sequences(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_i64(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let after_date = match required_date(req, "afterDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let end_date = match parse_opt_date(req.params.get("endDate")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("endDate {}", m), None),
    };
    let specific_periods = match parse_periods(req.params.get("specificPeriods")) {
        Ok(v) => v.map(|p| p.into_iter().collect()),
        Err(m) => return err(&req.id, "bad_params", format!("specificPeriods {}", m), None),
    };
    let options = match generation_options(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let request = ContinueRequest {
        after_date,
        end_date,
        specific_periods,
    };
    match service::continue_sequences(conn, schedule_id, &request, &user_id, &options) {
        Ok(outcome) => match (to_json(req, &outcome.events), to_json(req, &outcome.unplaced)) {
            (Ok(events), Ok(unplaced)) => ok(
                &req.id,
                json!({
                    "scheduleId": schedule_id,
                    "added": outcome.events.len(),
                    "events": events,
                    "unplaced": unplaced,
                }),
            ),
            (Err(e), _) | (_, Err(e)) => e,
        },
        Err(e) => service_err(req, e),
    }
}

fn handle_regenerate_period(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_i64(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period = match required_i64(req, "period").map(u32::try_from) {
        Ok(Ok(v)) => v,
        Ok(Err(_)) => return err(&req.id, "bad_params", "period must be a positive integer", None),
        Err(e) => return e,
    };
    let from_date = match required_date(req, "fromDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let options = match generation_options(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match service::regenerate_period(conn, schedule_id, period, from_date, &user_id, &options) {
        Ok(events) => match to_json(req, &events) {
            Ok(v) => ok(
                &req.id,
                json!({ "scheduleId": schedule_id, "period": period, "events": v }),
            ),
            Err(e) => e,
        },
        Err(e) => service_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.validate" => Some(handle_validate(state, req)),
        "schedule.generate" => Some(handle_generate(state, req)),
        "schedule.events" => Some(handle_events(state, req)),
        "schedule.analyzeSequenceState" => Some(handle_analyze_sequence_state(state, req)),
        "schedule.continueSequences" => Some(handle_continue_sequences(state, req)),
        "schedule.regeneratePeriod" => Some(handle_regenerate_period(state, req)),
        _ => None,
    }
}
