use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DB_FILE_NAME: &str = "planner.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates every table and index if missing. Safe to run on every open.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // The request loop and the rebuild worker hold separate connections.
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_user ON courses(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS topics(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topics_course ON topics(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sub_topics(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(topic_id) REFERENCES topics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sub_topics_topic ON sub_topics(topic_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic_id INTEGER NOT NULL,
            sub_topic_id INTEGER,
            title TEXT NOT NULL,
            description TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(topic_id) REFERENCES topics(id),
            FOREIGN KEY(sub_topic_id) REFERENCES sub_topics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_topic ON lessons(topic_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_sub_topic ON lessons(sub_topic_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_configurations(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            periods_per_day INTEGER NOT NULL,
            teaching_days_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // A period is bound to a course or to a special-period type, never both.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS period_assignments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            configuration_id INTEGER NOT NULL,
            period INTEGER NOT NULL,
            course_id INTEGER,
            special_period_type TEXT,
            teaching_days_json TEXT NOT NULL,
            room TEXT,
            notes TEXT,
            background_color TEXT,
            text_color TEXT,
            CHECK(course_id IS NULL OR special_period_type IS NULL),
            UNIQUE(configuration_id, period),
            FOREIGN KEY(configuration_id) REFERENCES schedule_configurations(id),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_period_assignments_course ON period_assignments(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedules(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            configuration_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(configuration_id) REFERENCES schedule_configurations(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS special_days(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            schedule_id INTEGER NOT NULL,
            event_date TEXT NOT NULL,
            periods_json TEXT NOT NULL,
            event_type TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            background_color TEXT,
            font_color TEXT,
            FOREIGN KEY(schedule_id) REFERENCES schedules(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_special_days_schedule_date ON special_days(schedule_id, event_date)",
        [],
    )?;

    // Lesson and special-day references are kept as plain values so history
    // survives later edits to the outline.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_events(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            schedule_id INTEGER NOT NULL,
            event_date TEXT NOT NULL,
            period INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            event_category TEXT,
            course_id INTEGER,
            lesson_id INTEGER,
            special_day_id INTEGER,
            title TEXT NOT NULL,
            comment TEXT,
            schedule_sort INTEGER NOT NULL DEFAULT 0,
            room TEXT,
            background_color TEXT,
            text_color TEXT,
            UNIQUE(schedule_id, event_date, period),
            FOREIGN KEY(schedule_id) REFERENCES schedules(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_events_schedule_period ON schedule_events(schedule_id, period, event_date)",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_is_idempotent_and_settings_roundtrip() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");

        assert!(settings_get_json(&conn, "setup.scheduler").expect("get").is_none());
        settings_set_json(&conn, "setup.scheduler", &json!({ "autoRebuildOnLessonChange": false }))
            .expect("set");
        settings_set_json(&conn, "setup.scheduler", &json!({ "autoRebuildOnLessonChange": true }))
            .expect("overwrite");
        assert_eq!(
            settings_get_json(&conn, "setup.scheduler").expect("get"),
            Some(json!({ "autoRebuildOnLessonChange": true }))
        );
    }

    #[test]
    fn assignment_cannot_hold_course_and_special_type() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("init");
        conn.execute(
            "INSERT INTO courses(user_id, name, created_at) VALUES('u', 'Math', '0')",
            [],
        )
        .expect("course");
        conn.execute(
            "INSERT INTO schedule_configurations(user_id, name, start_date, end_date, periods_per_day, teaching_days_json, created_at, updated_at)
             VALUES('u', 'c', '2024-09-02', '2024-09-06', 1, '[]', '0', '0')",
            [],
        )
        .expect("config");
        let res = conn.execute(
            "INSERT INTO period_assignments(configuration_id, period, course_id, special_period_type, teaching_days_json)
             VALUES(1, 1, 1, 'Prep', '[]')",
            [],
        );
        assert!(res.is_err());
    }
}
