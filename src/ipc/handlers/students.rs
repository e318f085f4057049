use crate::auth::Profile;
use crate::calc::{self, Tally};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{optional_str, profile_scope, required_str, with_session};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, StudentFilter};
use crate::settings::{DashboardLimits, RiskPolicy};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn students_list(
    conn: &Connection,
    profile: &Profile,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let school_id = optional_str(params, "schoolId");
    let class_id = optional_str(params, "classId");
    let filter = StudentFilter {
        school_id: school_id.as_deref(),
        class_id: class_id.as_deref(),
        student_id: None,
    };
    let students = roster::list_students(conn, &scope, filter).map_err(HandlerErr::query)?;
    Ok(json!({ "students": students }))
}

fn students_detail(
    conn: &Connection,
    profile: &Profile,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let student_id = required_str(params, "studentId")?;
    let Some(student) = roster::get_student(conn, &scope, &student_id).map_err(HandlerErr::query)?
    else {
        let exists = conn
            .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()
            .map_err(HandlerErr::query)?
            .is_some();
        return Err(if exists {
            HandlerErr::forbidden("student is outside your scope")
        } else {
            HandlerErr::not_found("student not found")
        });
    };

    let limits = DashboardLimits::load(conn).map_err(HandlerErr::query)?;
    let policy = RiskPolicy::load(conn).map_err(HandlerErr::query)?;
    let history = roster::student_history(conn, &student.id, true, Some(limits.history))
        .map_err(HandlerErr::query)?;
    let window: Tally = history.iter().map(|e| e.present).collect();
    let rate = window.percent();
    let level = calc::risk_level(rate, policy.high_risk_below, policy.medium_risk_below);

    let filter = StudentFilter::student(&student.id);
    let alerts = roster::list_alerts(conn, &scope, filter).map_err(HandlerErr::query)?;
    let interventions =
        roster::list_interventions(conn, &scope, filter, None).map_err(HandlerErr::query)?;

    Ok(json!({
        "student": student,
        "attendanceHistory": history,
        "attendanceRate": rate,
        "riskLevel": level.as_str(),
        "alerts": alerts,
        "interventions": interventions
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_session(state, req, students_list)),
        "students.detail" => Some(with_session(state, req, students_detail)),
        _ => None,
    }
}
