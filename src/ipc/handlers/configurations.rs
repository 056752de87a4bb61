use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, parse_opt_string, required_date, required_i64, required_str, service_err, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::model::{PeriodAssignment, PeriodContent, ScheduleConfiguration};
use crate::schedule::service;
use crate::schedule::store::{self, ScheduleStore, DATE_FMT};
use crate::schedule::weekdays::TeachingDays;
use serde_json::{json, Map, Value as JsonValue};

fn parse_teaching_days(v: &JsonValue, key: &str) -> Result<TeachingDays, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of weekday names", key))?;
    let mut names = Vec::with_capacity(arr.len());
    for item in arr {
        let s = item
            .as_str()
            .ok_or_else(|| format!("{} must be an array of weekday names", key))?;
        names.push(s.to_string());
    }
    TeachingDays::from_names(names).map_err(|e| format!("{}: {}", key, e))
}

fn parse_assignment(
    obj: &Map<String, JsonValue>,
    default_days: TeachingDays,
) -> Result<PeriodAssignment, String> {
    let period = obj
        .get("period")
        .and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| "period must be a positive integer".to_string())?;
    let course_id = match obj.get("courseId") {
        None | Some(JsonValue::Null) => None,
        Some(v) => Some(v.as_i64().ok_or("courseId must be integer or null")?),
    };
    let special = parse_opt_string(obj.get("specialPeriodType"))
        .map_err(|m| format!("specialPeriodType {}", m))?;
    let content = match (course_id, special) {
        (Some(_), Some(_)) => {
            return Err("courseId and specialPeriodType are mutually exclusive".to_string())
        }
        (Some(c), None) => PeriodContent::Course(c),
        (None, Some(s)) => PeriodContent::SpecialPeriod(s),
        (None, None) => PeriodContent::Unassigned,
    };
    let teaching_days = match obj.get("teachingDays") {
        None | Some(JsonValue::Null) => default_days,
        Some(v) => parse_teaching_days(v, "teachingDays")?,
    };
    let text = |key: &str| parse_opt_string(obj.get(key)).map_err(|m| format!("{} {}", key, m));
    Ok(PeriodAssignment {
        period,
        content,
        teaching_days,
        room: text("room")?,
        notes: text("notes")?,
        background_color: text("backgroundColor")?,
        text_color: text("textColor")?,
    })
}

fn configuration_json(config: &ScheduleConfiguration) -> JsonValue {
    let assignments: Vec<JsonValue> = config
        .ordered_assignments()
        .into_iter()
        .map(|a| {
            json!({
                "period": a.period,
                "courseId": a.course_id(),
                "specialPeriodType": a.special_period_type(),
                "teachingDays": a.teaching_days.names(),
                "room": a.room,
                "notes": a.notes,
                "backgroundColor": a.background_color,
                "textColor": a.text_color,
            })
        })
        .collect();
    json!({
        "id": config.id,
        "userId": config.user_id,
        "name": config.name,
        "startDate": config.start_date.format(DATE_FMT).to_string(),
        "endDate": config.end_date.format(DATE_FMT).to_string(),
        "periodsPerDay": config.periods_per_day,
        "teachingDays": config.teaching_days.names(),
        "assignments": assignments,
    })
}

fn handle_configurations_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let start_date = match required_date(req, "startDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let end_date = match required_date(req, "endDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let periods_per_day = match required_i64(req, "periodsPerDay").map(u32::try_from) {
        Ok(Ok(v)) => v,
        Ok(Err(_)) => return err(&req.id, "bad_params", "periodsPerDay must be >= 0", None),
        Err(e) => return e,
    };
    let teaching_days = match req.params.get("teachingDays") {
        Some(v) => match parse_teaching_days(v, "teachingDays") {
            Ok(d) => d,
            Err(m) => return err(&req.id, "bad_params", m, None),
        },
        None => return err(&req.id, "bad_params", "missing teachingDays", None),
    };
    let Some(raw_assignments) = req.params.get("assignments").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "assignments must be an array", None);
    };

    let mut assignments = Vec::with_capacity(raw_assignments.len());
    for (index, raw) in raw_assignments.iter().enumerate() {
        let Some(obj) = raw.as_object() else {
            return err(
                &req.id,
                "bad_params",
                "assignment must be an object",
                Some(json!({ "index": index })),
            );
        };
        match parse_assignment(obj, teaching_days) {
            Ok(a) => assignments.push(a),
            Err(m) => return err(&req.id, "bad_params", m, Some(json!({ "index": index }))),
        }
    }
    for a in &assignments {
        let Some(course_id) = a.course_id() else {
            continue;
        };
        match store::course_owner(conn, course_id) {
            Ok(Some(owner)) if owner == user_id => {}
            Ok(Some(_)) => {
                return err(
                    &req.id,
                    "forbidden",
                    format!("course {} belongs to another user", course_id),
                    None,
                )
            }
            Ok(None) => {
                return err(
                    &req.id,
                    "not_found",
                    format!("course {} not found", course_id),
                    None,
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    // One row per period in storage; report duplicates in the validation shape.
    let mut seen = std::collections::BTreeSet::new();
    if let Some(dup) = assignments.iter().find(|a| !seen.insert(a.period)) {
        let validation = json!({
            "isValid": false,
            "canGenerate": false,
            "errors": [{
                "code": "duplicate_period",
                "message": format!("period {} is assigned more than once", dup.period),
                "period": dup.period,
            }],
            "warnings": [],
        });
        return err(
            &req.id,
            "validation_failed",
            "configuration has duplicate periods",
            Some(validation),
        );
    }

    let config = ScheduleConfiguration {
        id: 0,
        user_id: user_id.clone(),
        name,
        start_date,
        end_date,
        periods_per_day,
        teaching_days,
        assignments,
    };
    let configuration_id = match store::create_configuration(conn, &config) {
        Ok(id) => id,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let report = match service::validate(conn, configuration_id, &user_id) {
        Ok(r) => r,
        Err(e) => return service_err(req, e),
    };
    match to_json(req, &report) {
        Ok(v) => ok(
            &req.id,
            json!({ "configurationId": configuration_id, "validation": v }),
        ),
        Err(e) => e,
    }
}

fn handle_configurations_get(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let config = match conn.load_configuration(configuration_id) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "configuration not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if config.user_id != user_id {
        return err(&req.id, "forbidden", "configuration belongs to another user", None);
    }
    let schedule_id = match conn.find_schedule_for_configuration(configuration_id) {
        Ok(s) => s.map(|s| s.id),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({ "configuration": configuration_json(&config), "scheduleId": schedule_id }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "configurations.create" => Some(handle_configurations_create(state, req)),
        "configurations.get" => Some(handle_configurations_get(state, req)),
        _ => None,
    }
}
