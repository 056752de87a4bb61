//! Workspace-level setup sections stored in `workspace_settings`.

use crate::db;
use crate::schedule::GenerationOptions;
use crate::schedule::model::{DEFAULT_EXHAUSTED_COMMENT, DEFAULT_UNASSIGNED_COMMENT};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Scheduler,
}

impl SetupSection {
    pub const ALL: [SetupSection; 1] = [SetupSection::Scheduler];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduler" => Some(Self::Scheduler),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Scheduler => "scheduler",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Scheduler => "setup.scheduler",
        }
    }
}

pub fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Scheduler => json!({
            "exhaustedComment": DEFAULT_EXHAUSTED_COMMENT,
            "unassignedComment": DEFAULT_UNASSIGNED_COMMENT,
            "autoRebuildOnLessonChange": true
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_comment(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

/// Applies `patch` field by field; the first invalid field aborts and
/// leaves the fields already applied in `current`.
pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Scheduler => match k.as_str() {
                "exhaustedComment" | "unassignedComment" => {
                    obj.insert(k.clone(), Value::String(parse_comment(v, k, 200)?));
                }
                "autoRebuildOnLessonChange" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown scheduler field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed saved values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let single = Map::from_iter([(k.clone(), v.clone())]);
                let _ = merge_section_patch(section, &mut current, &single);
            }
        }
    }
    Ok(current)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub generation: GenerationOptions,
    pub auto_rebuild_on_lesson_change: bool,
}

impl SchedulerSettings {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let obj = load_section(conn, SetupSection::Scheduler)?;
        let text = |key: &str, default: &str| {
            obj.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or(default)
                .to_string()
        };
        Ok(Self {
            generation: GenerationOptions {
                exhausted_comment: text("exhaustedComment", DEFAULT_EXHAUSTED_COMMENT),
                unassigned_comment: text("unassignedComment", DEFAULT_UNASSIGNED_COMMENT),
            },
            auto_rebuild_on_lesson_change: obj
                .get("autoRebuildOnLessonChange")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
        })
    }
}
