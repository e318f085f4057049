use crate::auth::{Profile, Role};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{class_in_scope, optional_str, profile_scope, with_session};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, DateRange, StudentFilter};
use crate::settings::DashboardLimits;
use rusqlite::Connection;
use serde_json::json;

fn dashboard_summary(
    conn: &Connection,
    profile: &Profile,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let limits = DashboardLimits::load(conn).map_err(HandlerErr::query)?;
    let class_id = match optional_str(params, "classId") {
        Some(id) => Some(class_in_scope(conn, &scope, &id)?.id),
        None => None,
    };

    let students = roster::list_students(conn, &scope, StudentFilter::default())
        .map_err(HandlerErr::query)?;
    let tallies =
        roster::tallies_by_student(conn, &scope, StudentFilter::default(), DateRange::default())
            .map_err(HandlerErr::query)?;
    let overall = roster::overall_tally(conn, &scope, StudentFilter::default())
        .map_err(HandlerErr::query)?;
    let alerts = roster::list_alerts(conn, &scope, StudentFilter::default())
        .map_err(HandlerErr::query)?;
    let classes = roster::list_classes(conn, &scope).map_err(HandlerErr::query)?;

    let student_rates: Vec<serde_json::Value> = students
        .iter()
        .filter(|s| class_id.as_deref().map_or(true, |c| s.class_id == c))
        .map(|s| {
            let t = tallies.get(&s.id).copied().unwrap_or_default();
            json!({
                "studentId": s.id,
                "name": s.name,
                "classId": s.class_id,
                "className": s.class_name,
                "presentDays": t.present,
                "totalDays": t.total,
                "attendanceRate": t.percent()
            })
        })
        .collect();

    let recent: Vec<_> = alerts.iter().take(limits.recent_alerts).collect();
    let table: Vec<_> = alerts.iter().take(limits.alerts_table).collect();

    let mut out = json!({
        "metrics": {
            "totalStudents": students.len(),
            "avgAttendanceRate": overall.percent_1dp(),
            "atRiskCount": alerts.len()
        },
        "recentAlerts": recent,
        "alerts": table,
        "classes": classes,
        "studentRates": student_rates
    });

    if profile.role == Role::Head {
        let district = match profile.district_id.as_deref() {
            Some(id) => roster::get_district(conn, id).map_err(HandlerErr::query)?,
            None => None,
        };
        let schools = roster::list_schools(conn, &scope).map_err(HandlerErr::query)?;
        out["districtName"] = json!(district.map(|d| d.name));
        out["schools"] = json!(schools);
    }
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.summary" => Some(with_session(state, req, dashboard_summary)),
        _ => None,
    }
}
