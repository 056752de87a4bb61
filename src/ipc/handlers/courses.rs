use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, parse_opt_i64, parse_opt_string, required_i64, required_str, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::rebuild::RebuildTask;
use crate::schedule::sequencer::sequence_lessons;
use crate::schedule::store::{self, LessonParent, ScheduleStore};
use crate::settings::SchedulerSettings;
use rusqlite::OptionalExtension;
use serde_json::json;
use tracing::{debug, warn};

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match store::create_course(conn, &user_id, &name) {
        Ok(id) => ok(&req.id, json!({ "courseId": id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT c.id, c.name,
                (SELECT COUNT(*) FROM lessons l JOIN topics t ON t.id = l.topic_id WHERE t.course_id = c.id)
         FROM courses c
         WHERE c.user_id = ?
         ORDER BY c.name, c.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&user_id], |r| {
            let id: i64 = r.get(0)?;
            let name: String = r.get(1)?;
            let lesson_count: i64 = r.get(2)?;
            Ok(json!({ "id": id, "name": name, "lessonCount": lesson_count }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_topics_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let sort_order = match parse_opt_i64(req.params.get("sortOrder")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("sortOrder {}", m), None),
    };
    match store::course_owner(conn, course_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    match store::create_topic(conn, course_id, &title, sort_order) {
        Ok(id) => ok(&req.id, json!({ "topicId": id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_sub_topics_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match required_i64(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let sort_order = match parse_opt_i64(req.params.get("sortOrder")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("sortOrder {}", m), None),
    };
    let exists = match conn
        .query_row("SELECT 1 FROM topics WHERE id = ?", [topic_id], |_r| Ok(()))
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !exists {
        return err(&req.id, "not_found", "topic not found", None);
    }
    match store::create_sub_topic(conn, topic_id, &title, sort_order) {
        Ok(id) => ok(&req.id, json!({ "subTopicId": id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

/// Queues a rebuild of every generated schedule that teaches `course_id`,
/// unless the workspace turned automatic rebuilds off.
fn enqueue_course_rebuilds(
    state: &AppState,
    course_id: i64,
    reason: &str,
) -> anyhow::Result<Vec<serde_json::Value>> {
    let (Some(conn), Some(worker)) = (state.db.as_ref(), state.rebuilds.as_ref()) else {
        return Ok(Vec::new());
    };
    if !SchedulerSettings::load(conn)?.auto_rebuild_on_lesson_change {
        debug!(course_id, "automatic rebuild disabled");
        return Ok(Vec::new());
    }
    let mut jobs = Vec::new();
    for schedule in store::schedules_using_course(conn, course_id)? {
        let job_id = worker.coordinator().enqueue(RebuildTask {
            schedule_id: schedule.id,
            configuration_id: schedule.configuration_id,
            user_id: schedule.user_id.clone(),
            reason: reason.to_string(),
        });
        jobs.push(json!({ "scheduleId": schedule.id, "jobId": job_id }));
    }
    Ok(jobs)
}

fn handle_lessons_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let topic_id = match parse_opt_i64(req.params.get("topicId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("topicId {}", m), None),
    };
    let sub_topic_id = match parse_opt_i64(req.params.get("subTopicId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("subTopicId {}", m), None),
    };
    let parent = match (topic_id, sub_topic_id) {
        (_, Some(st)) => LessonParent::SubTopic(st),
        (Some(t), None) => LessonParent::Topic(t),
        (None, None) => {
            return err(&req.id, "bad_params", "topicId or subTopicId is required", None)
        }
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let description = match parse_opt_string(req.params.get("description")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("description {}", m), None),
    };
    let sort_order = match parse_opt_i64(req.params.get("sortOrder")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("sortOrder {}", m), None),
    };

    let course_id = match store::course_of_parent(conn, &parent) {
        Ok(Some((course_id, _))) => course_id,
        Ok(None) => return err(&req.id, "not_found", "topic or sub-topic not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let (LessonParent::SubTopic(st), Some(t)) = (&parent, topic_id) {
        match store::course_of_parent(conn, &LessonParent::Topic(t)) {
            Ok(Some((c, _))) if c == course_id => {}
            Ok(_) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("sub-topic {} does not belong to topic {}", st, t),
                    None,
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let lesson_id = match store::create_lesson(
        conn,
        &parent,
        &title,
        description.as_deref(),
        sort_order,
    ) {
        Ok(id) => id,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };

    let rebuild_jobs = match enqueue_course_rebuilds(state, course_id, "lesson added") {
        Ok(v) => v,
        Err(e) => {
            // The lesson is saved; a missed rebuild can be requested again.
            warn!(course_id, error = %e, "failed to queue schedule rebuilds");
            Vec::new()
        }
    };
    ok(
        &req.id,
        json!({ "lessonId": lesson_id, "courseId": course_id, "rebuildJobs": rebuild_jobs }),
    )
}

fn handle_lessons_sequence(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::course_owner(conn, course_id) {
        Ok(Some(owner)) if owner == user_id => {}
        Ok(Some(_)) => return err(&req.id, "forbidden", "course belongs to another user", None),
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let lessons = match conn.load_course_lessons(course_id, &user_id) {
        Ok(v) => sequence_lessons(v),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match to_json(req, &lessons) {
        Ok(v) => ok(&req.id, json!({ "courseId": course_id, "lessons": v })),
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.list" => Some(handle_courses_list(state, req)),
        "topics.create" => Some(handle_topics_create(state, req)),
        "subTopics.create" => Some(handle_sub_topics_create(state, req)),
        "lessons.create" => Some(handle_lessons_create(state, req)),
        "lessons.sequence" => Some(handle_lessons_sequence(state, req)),
        _ => None,
    }
}
