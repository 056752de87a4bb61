//! Persistence boundary of the engine and its SQLite implementation.
//!
//! Replacing, appending and partially replacing events each run in a single
//! transaction: a failure leaves the previous event set untouched.

use super::model::{
    ConfigurationId, CourseId, EventCategory, Lesson, PeriodAssignment, PeriodContent,
    ScheduleConfiguration, ScheduleEvent, ScheduleId, SpecialDay,
};
use super::weekdays::TeachingDays;
use crate::db::now_ts;
use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeSet;

pub const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    pub id: ScheduleId,
    pub user_id: String,
    pub configuration_id: ConfigurationId,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct PersistedSchedule {
    pub schedule: ScheduleRecord,
    pub events: Vec<ScheduleEvent>,
}

pub trait ScheduleStore {
    fn load_configuration(
        &self,
        configuration_id: ConfigurationId,
    ) -> anyhow::Result<Option<ScheduleConfiguration>>;

    /// Lessons reachable from the course, unordered. Empty when the course
    /// does not exist or belongs to someone else.
    fn load_course_lessons(&self, course_id: CourseId, user_id: &str) -> anyhow::Result<Vec<Lesson>>;

    fn load_existing_special_days(
        &self,
        configuration_id: ConfigurationId,
        user_id: &str,
    ) -> anyhow::Result<Vec<SpecialDay>>;

    fn load_schedule(&self, schedule_id: ScheduleId) -> anyhow::Result<Option<ScheduleRecord>>;

    fn find_schedule_for_configuration(
        &self,
        configuration_id: ConfigurationId,
    ) -> anyhow::Result<Option<ScheduleRecord>>;

    /// Events ordered by date, then period.
    fn load_schedule_events(&self, schedule_id: ScheduleId) -> anyhow::Result<Vec<ScheduleEvent>>;

    /// Creates the configuration's schedule if needed and swaps its whole
    /// event set for `events`.
    fn replace_schedule_events(
        &self,
        configuration: &ScheduleConfiguration,
        events: &[ScheduleEvent],
    ) -> anyhow::Result<PersistedSchedule>;

    /// Inserts `events`; fails without writing anything if any cell is
    /// already taken.
    fn append_schedule_events(
        &self,
        schedule_id: ScheduleId,
        events: &[ScheduleEvent],
    ) -> anyhow::Result<Vec<ScheduleEvent>>;

    /// Deletes the period's events dated `from` or later, then inserts `events`.
    fn replace_period_events_from(
        &self,
        schedule_id: ScheduleId,
        period: u32,
        from: NaiveDate,
        events: &[ScheduleEvent],
    ) -> anyhow::Result<Vec<ScheduleEvent>>;
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FMT).map_err(|e| conversion_err(idx, e))
}

fn teaching_days_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<TeachingDays> {
    let raw: String = row.get(idx)?;
    let names: Vec<String> = serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))?;
    TeachingDays::from_names(names).map_err(|e| conversion_err(idx, e))
}

fn periods_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<BTreeSet<u32>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

pub fn teaching_days_json(days: &TeachingDays) -> String {
    serde_json::to_string(&days.names()).unwrap_or_else(|_| "[]".to_string())
}

fn schedule_from_row(r: &Row<'_>) -> rusqlite::Result<ScheduleRecord> {
    Ok(ScheduleRecord {
        id: r.get(0)?,
        user_id: r.get(1)?,
        configuration_id: r.get(2)?,
        name: r.get(3)?,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
    })
}

const SCHEDULE_COLUMNS: &str = "id, user_id, configuration_id, name, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, event_date, period, event_type, event_category, course_id, lesson_id, special_day_id, title, comment, schedule_sort, room, background_color, text_color";

fn event_from_row(r: &Row<'_>) -> rusqlite::Result<ScheduleEvent> {
    let category: Option<String> = r.get(4)?;
    Ok(ScheduleEvent {
        id: r.get(0)?,
        date: date_col(r, 1)?,
        period: r.get(2)?,
        event_type: r.get(3)?,
        category: category.as_deref().and_then(EventCategory::parse),
        course_id: r.get(5)?,
        lesson_id: r.get(6)?,
        special_day_id: r.get(7)?,
        title: r.get(8)?,
        comment: r.get(9)?,
        schedule_sort: r.get(10)?,
        room: r.get(11)?,
        background_color: r.get(12)?,
        text_color: r.get(13)?,
    })
}

fn insert_events(
    conn: &Connection,
    schedule_id: ScheduleId,
    events: &[ScheduleEvent],
) -> anyhow::Result<Vec<ScheduleEvent>> {
    let mut stmt = conn.prepare(
        "INSERT INTO schedule_events(
            schedule_id, event_date, period, event_type, event_category, course_id, lesson_id,
            special_day_id, title, comment, schedule_sort, room, background_color, text_color)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    let mut out = Vec::with_capacity(events.len());
    for e in events {
        let id = stmt
            .insert(params![
                schedule_id,
                e.date.format(DATE_FMT).to_string(),
                e.period,
                e.event_type,
                e.category.map(|c| c.as_str()),
                e.course_id,
                e.lesson_id,
                e.special_day_id,
                e.title,
                e.comment,
                e.schedule_sort,
                e.room,
                e.background_color,
                e.text_color,
            ])
            .with_context(|| format!("failed to insert event for {} period {}", e.date, e.period))?;
        let mut saved = e.clone();
        saved.id = id;
        out.push(saved);
    }
    Ok(out)
}

impl ScheduleStore for Connection {
    fn load_configuration(
        &self,
        configuration_id: ConfigurationId,
    ) -> anyhow::Result<Option<ScheduleConfiguration>> {
        let head = self
            .query_row(
                "SELECT id, user_id, name, start_date, end_date, periods_per_day, teaching_days_json
                 FROM schedule_configurations
                 WHERE id = ?",
                [configuration_id],
                |r| {
                    Ok(ScheduleConfiguration {
                        id: r.get(0)?,
                        user_id: r.get(1)?,
                        name: r.get(2)?,
                        start_date: date_col(r, 3)?,
                        end_date: date_col(r, 4)?,
                        periods_per_day: r.get(5)?,
                        teaching_days: teaching_days_col(r, 6)?,
                        assignments: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut config) = head else {
            return Ok(None);
        };

        let mut stmt = self.prepare(
            "SELECT period, course_id, special_period_type, teaching_days_json, room, notes, background_color, text_color
             FROM period_assignments
             WHERE configuration_id = ?
             ORDER BY period",
        )?;
        config.assignments = stmt
            .query_map([configuration_id], |r| {
                let course_id: Option<CourseId> = r.get(1)?;
                let special: Option<String> = r.get(2)?;
                let content = match (course_id, special) {
                    (Some(c), _) => PeriodContent::Course(c),
                    (None, Some(s)) => PeriodContent::SpecialPeriod(s),
                    (None, None) => PeriodContent::Unassigned,
                };
                Ok(PeriodAssignment {
                    period: r.get(0)?,
                    content,
                    teaching_days: teaching_days_col(r, 3)?,
                    room: r.get(4)?,
                    notes: r.get(5)?,
                    background_color: r.get(6)?,
                    text_color: r.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(config))
    }

    fn load_course_lessons(&self, course_id: CourseId, user_id: &str) -> anyhow::Result<Vec<Lesson>> {
        let mut stmt = self.prepare(
            "SELECT l.id, t.course_id, t.id, t.sort_order, l.sub_topic_id, st.sort_order, l.sort_order, l.title, l.description
             FROM lessons l
             JOIN topics t ON t.id = l.topic_id
             JOIN courses c ON c.id = t.course_id
             LEFT JOIN sub_topics st ON st.id = l.sub_topic_id
             WHERE c.id = ? AND c.user_id = ?",
        )?;
        let lessons = stmt
            .query_map(params![course_id, user_id], |r| {
                Ok(Lesson {
                    id: r.get(0)?,
                    course_id: r.get(1)?,
                    topic_id: r.get(2)?,
                    topic_sort_order: r.get(3)?,
                    sub_topic_id: r.get(4)?,
                    sub_topic_sort_order: r.get(5)?,
                    sort_order: r.get(6)?,
                    title: r.get(7)?,
                    description: r.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lessons)
    }

    fn load_existing_special_days(
        &self,
        configuration_id: ConfigurationId,
        user_id: &str,
    ) -> anyhow::Result<Vec<SpecialDay>> {
        let mut stmt = self.prepare(
            "SELECT sd.id, sd.schedule_id, sd.event_date, sd.periods_json, sd.event_type, sd.title, sd.description, sd.background_color, sd.font_color
             FROM special_days sd
             JOIN schedules s ON s.id = sd.schedule_id
             WHERE s.configuration_id = ? AND s.user_id = ?
             ORDER BY sd.event_date, sd.id",
        )?;
        let days = stmt
            .query_map(params![configuration_id, user_id], |r| {
                Ok(SpecialDay {
                    id: r.get(0)?,
                    schedule_id: r.get(1)?,
                    date: date_col(r, 2)?,
                    periods: periods_col(r, 3)?,
                    event_type: r.get(4)?,
                    title: r.get(5)?,
                    description: r.get(6)?,
                    background_color: r.get(7)?,
                    font_color: r.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(days)
    }

    fn load_schedule(&self, schedule_id: ScheduleId) -> anyhow::Result<Option<ScheduleRecord>> {
        let sql = format!("SELECT {} FROM schedules WHERE id = ?", SCHEDULE_COLUMNS);
        Ok(self.query_row(&sql, [schedule_id], schedule_from_row).optional()?)
    }

    fn find_schedule_for_configuration(
        &self,
        configuration_id: ConfigurationId,
    ) -> anyhow::Result<Option<ScheduleRecord>> {
        let sql = format!(
            "SELECT {} FROM schedules WHERE configuration_id = ?",
            SCHEDULE_COLUMNS
        );
        Ok(self
            .query_row(&sql, [configuration_id], schedule_from_row)
            .optional()?)
    }

    fn load_schedule_events(&self, schedule_id: ScheduleId) -> anyhow::Result<Vec<ScheduleEvent>> {
        let sql = format!(
            "SELECT {} FROM schedule_events WHERE schedule_id = ? ORDER BY event_date, period",
            EVENT_COLUMNS
        );
        let mut stmt = self.prepare(&sql)?;
        let events = stmt
            .query_map([schedule_id], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn replace_schedule_events(
        &self,
        configuration: &ScheduleConfiguration,
        events: &[ScheduleEvent],
    ) -> anyhow::Result<PersistedSchedule> {
        let tx = self
            .unchecked_transaction()
            .context("failed to begin schedule replace")?;
        let ts = now_ts();
        tx.execute(
            "INSERT INTO schedules(user_id, configuration_id, name, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(configuration_id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
            params![
                configuration.user_id,
                configuration.id,
                configuration.name,
                ts,
                ts
            ],
        )?;
        let sql = format!(
            "SELECT {} FROM schedules WHERE configuration_id = ?",
            SCHEDULE_COLUMNS
        );
        let schedule = tx.query_row(&sql, [configuration.id], schedule_from_row)?;
        tx.execute(
            "DELETE FROM schedule_events WHERE schedule_id = ?",
            [schedule.id],
        )?;
        let saved = insert_events(&tx, schedule.id, events)?;
        tx.commit().context("failed to commit schedule replace")?;
        Ok(PersistedSchedule {
            schedule,
            events: saved,
        })
    }

    fn append_schedule_events(
        &self,
        schedule_id: ScheduleId,
        events: &[ScheduleEvent],
    ) -> anyhow::Result<Vec<ScheduleEvent>> {
        let tx = self
            .unchecked_transaction()
            .context("failed to begin event append")?;
        let saved = insert_events(&tx, schedule_id, events)?;
        tx.execute(
            "UPDATE schedules SET updated_at = ? WHERE id = ?",
            params![now_ts(), schedule_id],
        )?;
        tx.commit().context("failed to commit event append")?;
        Ok(saved)
    }

    fn replace_period_events_from(
        &self,
        schedule_id: ScheduleId,
        period: u32,
        from: NaiveDate,
        events: &[ScheduleEvent],
    ) -> anyhow::Result<Vec<ScheduleEvent>> {
        let tx = self
            .unchecked_transaction()
            .context("failed to begin period replace")?;
        tx.execute(
            "DELETE FROM schedule_events WHERE schedule_id = ? AND period = ? AND event_date >= ?",
            params![schedule_id, period, from.format(DATE_FMT).to_string()],
        )?;
        let saved = insert_events(&tx, schedule_id, events)?;
        tx.execute(
            "UPDATE schedules SET updated_at = ? WHERE id = ?",
            params![now_ts(), schedule_id],
        )?;
        tx.commit().context("failed to commit period replace")?;
        Ok(saved)
    }
}

// Creation helpers used by the IPC layer and by tests. Ownership checks on
// the parent rows happen in the callers.

pub fn create_course(conn: &Connection, user_id: &str, name: &str) -> anyhow::Result<CourseId> {
    conn.execute(
        "INSERT INTO courses(user_id, name, created_at) VALUES(?, ?, ?)",
        params![user_id, name, now_ts()],
    )?;
    Ok(conn.last_insert_rowid())
}

fn next_sort_order(conn: &Connection, sql: &str, parent_id: i64) -> anyhow::Result<i64> {
    let next: i64 = conn.query_row(sql, [parent_id], |r| r.get(0))?;
    Ok(next.max(0))
}

pub fn create_topic(
    conn: &Connection,
    course_id: CourseId,
    title: &str,
    sort_order: Option<i64>,
) -> anyhow::Result<i64> {
    let sort_order = match sort_order {
        Some(v) => v,
        None => next_sort_order(
            conn,
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM topics WHERE course_id = ?",
            course_id,
        )?,
    };
    conn.execute(
        "INSERT INTO topics(course_id, title, sort_order) VALUES(?, ?, ?)",
        params![course_id, title, sort_order],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Next free position among a topic's direct lessons and sub-topics, which
/// share one ordering.
fn next_topic_position(conn: &Connection, topic_id: i64) -> anyhow::Result<i64> {
    next_sort_order(
        conn,
        "SELECT MAX(
            COALESCE((SELECT MAX(sort_order) FROM sub_topics WHERE topic_id = ?1), -1),
            COALESCE((SELECT MAX(sort_order) FROM lessons WHERE topic_id = ?1 AND sub_topic_id IS NULL), -1)
         ) + 1",
        topic_id,
    )
}

pub fn create_sub_topic(
    conn: &Connection,
    topic_id: i64,
    title: &str,
    sort_order: Option<i64>,
) -> anyhow::Result<i64> {
    let sort_order = match sort_order {
        Some(v) => v,
        None => next_topic_position(conn, topic_id)?,
    };
    conn.execute(
        "INSERT INTO sub_topics(topic_id, title, sort_order) VALUES(?, ?, ?)",
        params![topic_id, title, sort_order],
    )?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Clone)]
pub enum LessonParent {
    Topic(i64),
    SubTopic(i64),
}

pub fn create_lesson(
    conn: &Connection,
    parent: &LessonParent,
    title: &str,
    description: Option<&str>,
    sort_order: Option<i64>,
) -> anyhow::Result<i64> {
    let (topic_id, sub_topic_id) = match parent {
        LessonParent::Topic(id) => (*id, None),
        LessonParent::SubTopic(id) => {
            let topic_id: i64 = conn
                .query_row("SELECT topic_id FROM sub_topics WHERE id = ?", [id], |r| r.get(0))
                .with_context(|| format!("sub-topic {} not found", id))?;
            (topic_id, Some(*id))
        }
    };
    let sort_order = match (sort_order, sub_topic_id) {
        (Some(v), _) => v,
        (None, Some(st)) => next_sort_order(
            conn,
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM lessons WHERE sub_topic_id = ?",
            st,
        )?,
        (None, None) => next_topic_position(conn, topic_id)?,
    };
    conn.execute(
        "INSERT INTO lessons(topic_id, sub_topic_id, title, description, sort_order) VALUES(?, ?, ?, ?, ?)",
        params![topic_id, sub_topic_id, title, description, sort_order],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Course owning a topic or sub-topic, with that course's owner.
pub fn course_of_parent(
    conn: &Connection,
    parent: &LessonParent,
) -> anyhow::Result<Option<(CourseId, String)>> {
    let row = match parent {
        LessonParent::Topic(id) => conn
            .query_row(
                "SELECT c.id, c.user_id FROM topics t JOIN courses c ON c.id = t.course_id WHERE t.id = ?",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?,
        LessonParent::SubTopic(id) => conn
            .query_row(
                "SELECT c.id, c.user_id FROM sub_topics st
                 JOIN topics t ON t.id = st.topic_id
                 JOIN courses c ON c.id = t.course_id
                 WHERE st.id = ?",
                [id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?,
    };
    Ok(row)
}

pub fn course_owner(conn: &Connection, course_id: CourseId) -> anyhow::Result<Option<String>> {
    Ok(conn
        .query_row("SELECT user_id FROM courses WHERE id = ?", [course_id], |r| r.get(0))
        .optional()?)
}

pub fn create_configuration(
    conn: &Connection,
    config: &ScheduleConfiguration,
) -> anyhow::Result<ConfigurationId> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to begin configuration insert")?;
    let ts = now_ts();
    tx.execute(
        "INSERT INTO schedule_configurations(user_id, name, start_date, end_date, periods_per_day, teaching_days_json, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            config.user_id,
            config.name,
            config.start_date.format(DATE_FMT).to_string(),
            config.end_date.format(DATE_FMT).to_string(),
            config.periods_per_day,
            teaching_days_json(&config.teaching_days),
            ts,
            ts
        ],
    )?;
    let configuration_id = tx.last_insert_rowid();
    for a in &config.assignments {
        tx.execute(
            "INSERT INTO period_assignments(configuration_id, period, course_id, special_period_type, teaching_days_json, room, notes, background_color, text_color)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                configuration_id,
                a.period,
                a.course_id(),
                a.special_period_type(),
                teaching_days_json(&a.teaching_days),
                a.room,
                a.notes,
                a.background_color,
                a.text_color
            ],
        )
        .with_context(|| format!("failed to insert assignment for period {}", a.period))?;
    }
    tx.commit().context("failed to commit configuration insert")?;
    Ok(configuration_id)
}

pub fn create_special_day(conn: &Connection, day: &SpecialDay) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO special_days(schedule_id, event_date, periods_json, event_type, title, description, background_color, font_color)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            day.schedule_id,
            day.date.format(DATE_FMT).to_string(),
            serde_json::to_string(&day.periods)?,
            day.event_type,
            day.title,
            day.description,
            day.background_color,
            day.font_color
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Schedules whose configuration binds a period to `course_id`.
pub fn schedules_using_course(
    conn: &Connection,
    course_id: CourseId,
) -> anyhow::Result<Vec<ScheduleRecord>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.id, s.user_id, s.configuration_id, s.name, s.created_at, s.updated_at
         FROM schedules s
         JOIN period_assignments pa ON pa.configuration_id = s.configuration_id
         WHERE pa.course_id = ?
         ORDER BY s.id",
    )?;
    let rows = stmt
        .query_map([course_id], schedule_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
