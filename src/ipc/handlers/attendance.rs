use crate::auth::{Profile, Role};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    class_in_scope, profile_scope, require_role, required_date, required_str, with_session,
};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, StudentFilter};
use crate::settings::RiskPolicy;
use crate::{db, risk};
use log::info;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

fn parse_presence(params: &serde_json::Value) -> Result<HashMap<String, bool>, HandlerErr> {
    let Some(obj) = params.get("present").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("present must be an object of studentId -> bool"));
    };
    let mut out = HashMap::with_capacity(obj.len());
    for (student_id, v) in obj {
        let Some(flag) = v.as_bool() else {
            return Err(HandlerErr::bad_params("present values must be booleans")
                .with_details(json!({ "studentId": student_id })));
        };
        out.insert(student_id.clone(), flag);
    }
    Ok(out)
}

fn attendance_record(
    conn: &Connection,
    profile: &Profile,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_role(profile, &[Role::Teacher], "record attendance")?;
    let scope = profile_scope(profile)?;
    let class_id = required_str(params, "classId")?;
    let date = required_date(params, "date")?;
    let presence = parse_presence(params)?;
    let class = class_in_scope(conn, &scope, &class_id)?;

    let students = roster::list_students(conn, &scope, StudentFilter::class(&class.id))
        .map_err(HandlerErr::query)?;
    let policy = RiskPolicy::load(conn).map_err(HandlerErr::query)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let now = db::now_timestamp();
    for student in &students {
        let present = presence.get(&student.id).copied().unwrap_or(false);
        tx.execute(
            "INSERT INTO attendance(student_id, date, present, recorded_by, updated_at)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(student_id, date) DO UPDATE SET
               present = excluded.present,
               recorded_by = excluded.recorded_by,
               updated_at = excluded.updated_at",
            (&student.id, &date, present as i64, &profile.id, &now),
        )
        .map_err(|e| HandlerErr::update("attendance", e))?;
    }

    let mut raised = Vec::new();
    for student in &students {
        if let Some(alert) = risk::evaluate_student(&tx, &student.id, policy.consecutive_absences)
            .map_err(|e| HandlerErr::update("alerts", e))?
        {
            raised.push(alert);
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    info!(
        "event=attendance_record module=attendance status=ok class_id={} date={} recorded={} alerts_raised={}",
        class.id,
        date,
        students.len(),
        raised.len()
    );
    Ok(json!({
        "recorded": students.len(),
        "date": date,
        "alertsRaised": raised
    }))
}

fn attendance_get(
    conn: &Connection,
    profile: &Profile,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let class_id = required_str(params, "classId")?;
    let date = required_date(params, "date")?;
    let class = class_in_scope(conn, &scope, &class_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.name, a.present
             FROM students s
             LEFT JOIN attendance a ON a.student_id = s.id AND a.date = ?
             WHERE s.class_id = ?
             ORDER BY s.name, s.id",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map((&date, &class.id), |r| {
            let present: Option<i64> = r.get(2)?;
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "present": present.map(|p| p != 0)
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({
        "classId": class.id,
        "className": class.name,
        "date": date,
        "rows": rows
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.record" => Some(with_session(state, req, attendance_record)),
        "attendance.get" => Some(with_session(state, req, attendance_get)),
        _ => None,
    }
}
