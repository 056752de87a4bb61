use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, owned_schedule, parse_opt_string, parse_periods, required_date, required_i64,
    required_str, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::model::SpecialDay;
use crate::schedule::store::{self, ScheduleStore};
use serde_json::json;

fn handle_special_days_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let date = match required_date(req, "date") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let event_type = match required_str(req, "eventType") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let periods = match parse_periods(req.params.get("periods")) {
        Ok(Some(v)) if !v.is_empty() => v,
        Ok(_) => return err(&req.id, "bad_params", "periods must list at least one period", None),
        Err(m) => return err(&req.id, "bad_params", format!("periods {}", m), None),
    };
    let description = match parse_opt_string(req.params.get("description")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("description {}", m), None),
    };
    let background_color = match parse_opt_string(req.params.get("backgroundColor")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("backgroundColor {}", m), None),
    };
    let font_color = match parse_opt_string(req.params.get("fontColor")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("fontColor {}", m), None),
    };

    let (_, config) = match owned_schedule(conn, req, schedule_id, &user_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Some(bad) = periods
        .iter()
        .find(|p| **p < 1 || **p > config.periods_per_day)
    {
        return err(
            &req.id,
            "bad_params",
            format!("period {} is outside 1..={}", bad, config.periods_per_day),
            None,
        );
    }

    let day = SpecialDay {
        id: 0,
        schedule_id,
        date,
        periods: periods.into_iter().collect(),
        event_type,
        title,
        description,
        background_color,
        font_color,
    };
    match store::create_special_day(conn, &day) {
        Ok(id) => ok(&req.id, json!({ "specialDayId": id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_special_days_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let (schedule, _) = match owned_schedule(conn, req, schedule_id, &user_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let days = match conn.load_existing_special_days(schedule.configuration_id, &user_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match to_json(req, &days) {
        Ok(v) => ok(&req.id, json!({ "specialDays": v })),
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "specialDays.create" => Some(handle_special_days_create(state, req)),
        "specialDays.list" => Some(handle_special_days_list(state, req)),
        _ => None,
    }
}
