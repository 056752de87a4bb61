use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::rebuild::RebuildCoordinator;
use crate::schedule::model::ScheduleConfiguration;
use crate::schedule::service::ServiceError;
use crate::schedule::store::{ScheduleRecord, ScheduleStore, DATE_FMT};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value as JsonValue;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn rebuilds<'a>(state: &'a AppState, req: &Request) -> Result<&'a RebuildCoordinator, JsonValue> {
    state
        .rebuilds
        .as_ref()
        .map(|w| w.coordinator())
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Loads the schedule and its configuration, or the error response for a
/// missing or foreign schedule.
pub fn owned_schedule(
    conn: &Connection,
    req: &Request,
    schedule_id: i64,
    user_id: &str,
) -> Result<(ScheduleRecord, ScheduleConfiguration), serde_json::Value> {
    let schedule = match conn.load_schedule(schedule_id) {
        Ok(Some(s)) => s,
        Ok(None) => return Err(err(&req.id, "not_found", "schedule not found", None)),
        Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    };
    if schedule.user_id != user_id {
        return Err(err(&req.id, "forbidden", "schedule belongs to another user", None));
    }
    match conn.load_configuration(schedule.configuration_id) {
        Ok(Some(c)) => Ok((schedule, c)),
        Ok(None) => Err(err(&req.id, "not_found", "configuration not found", None)),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FMT).ok()
}

pub fn required_date(req: &Request, key: &str) -> Result<NaiveDate, JsonValue> {
    let raw = required_str(req, key)?;
    parse_date(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be a YYYY-MM-DD date", key),
            None,
        )
    })
}

pub fn parse_opt_date(v: Option<&JsonValue>) -> Result<Option<NaiveDate>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .and_then(parse_date)
            .map(Some)
            .ok_or("must be a YYYY-MM-DD date or null"),
    }
}

pub fn parse_bool(v: Option<&JsonValue>, default: bool) -> Result<bool, &'static str> {
    match v {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v.as_bool().ok_or("must be boolean"),
    }
}

pub fn parse_opt_string(v: Option<&JsonValue>) -> Result<Option<String>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v.as_str().ok_or("must be string or null")?.trim().to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
    }
}

pub fn parse_opt_i64(v: Option<&JsonValue>) -> Result<Option<i64>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or("must be integer or null"),
    }
}

/// Period numbers; duplicates collapse.
pub fn parse_periods(v: Option<&JsonValue>) -> Result<Option<Vec<u32>>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let arr = v.as_array().ok_or("must be array of period numbers")?;
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                let n = item
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or("must be array of period numbers")?;
                if !out.contains(&n) {
                    out.push(n);
                }
            }
            out.sort_unstable();
            Ok(Some(out))
        }
    }
}

pub fn service_err(req: &Request, e: ServiceError) -> JsonValue {
    err(&req.id, e.code(), e.to_string(), None)
}

pub fn to_json<T: serde::Serialize>(req: &Request, value: &T) -> Result<JsonValue, JsonValue> {
    serde_json::to_value(value)
        .map_err(|e| err(&req.id, "internal", format!("failed to encode result: {}", e), None))
}
