use crate::auth::{Profile, Role};
use crate::calc::{self, Tally, WeekBucket};
use crate::export;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    class_in_scope, optional_date, optional_str, profile_scope, require_role, required_str,
    with_session,
};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, ClassRow, DateRange, StudentFilter};
use crate::scope::Scope;
use log::info;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryRow {
    student_id: String,
    name: String,
    days_present: usize,
    days_absent: usize,
    percent: i64,
}

struct ClassSummary {
    class: ClassRow,
    rows: Vec<SummaryRow>,
    trend: Vec<WeekBucket>,
}

fn date_range(params: &serde_json::Value) -> Result<(Option<String>, Option<String>), HandlerErr> {
    let start = optional_date(params, "start")?;
    let end = optional_date(params, "end")?;
    if let (Some(s), Some(e)) = (start.as_deref(), end.as_deref()) {
        if s > e {
            return Err(HandlerErr::bad_params("start must not be after end"));
        }
    }
    Ok((start, end))
}

fn class_summary(
    conn: &Connection,
    scope: &Scope,
    params: &serde_json::Value,
) -> Result<ClassSummary, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let (start, end) = date_range(params)?;
    let range = DateRange {
        start: start.as_deref(),
        end: end.as_deref(),
    };
    let class = class_in_scope(conn, scope, &class_id)?;
    let filter = StudentFilter::class(&class.id);

    let students = roster::list_students(conn, scope, filter).map_err(HandlerErr::query)?;
    let tallies =
        roster::tallies_by_student(conn, scope, filter, range).map_err(HandlerErr::query)?;
    let rows = students
        .into_iter()
        .map(|s| {
            let t = tallies.get(&s.id).copied().unwrap_or_default();
            SummaryRow {
                student_id: s.id,
                name: s.name,
                days_present: t.present,
                days_absent: t.absent(),
                percent: t.percent(),
            }
        })
        .collect();

    let records = roster::attendance_rows(conn, scope, filter, range).map_err(HandlerErr::query)?;
    let trend = calc::weekly_trend(
        records
            .into_iter()
            .filter_map(|r| calc::parse_date(&r.date).map(|d| (d, r.present))),
    );
    Ok(ClassSummary { class, rows, trend })
}

fn write_export(
    params: &serde_json::Value,
    default_name: &str,
    csv: &str,
) -> Result<String, HandlerErr> {
    let out_path = optional_str(params, "outPath");
    let out_dir = optional_str(params, "outDir");
    let path = export::resolve_out_path(out_path.as_deref(), out_dir.as_deref(), default_name)
        .ok_or_else(|| HandlerErr::bad_params("missing outPath or outDir"))?;
    let shown = path.to_string_lossy().to_string();
    export::write_csv(&path, csv).map_err(|e| HandlerErr::io(&shown, format!("{e:#}")))?;
    Ok(shown)
}

fn teacher_stats(conn: &Connection, profile: &Profile) -> Result<serde_json::Value, HandlerErr> {
    require_role(profile, &[Role::Teacher], "view teacher statistics")?;
    let scope = profile_scope(profile)?;
    let classes = roster::list_classes(conn, &scope).map_err(HandlerErr::query)?;
    let students = roster::list_students(conn, &scope, StudentFilter::default())
        .map_err(HandlerErr::query)?;
    let overall = roster::overall_tally(conn, &scope, StudentFilter::default())
        .map_err(HandlerErr::query)?;
    let alerts = roster::list_alerts(conn, &scope, StudentFilter::default())
        .map_err(HandlerErr::query)?;

    let mut class_rates = Vec::new();
    for class in classes.iter().filter(|c| c.student_count > 0) {
        let t = roster::overall_tally(conn, &scope, StudentFilter::class(&class.id))
            .map_err(HandlerErr::query)?;
        class_rates.push(json!({
            "classId": class.id,
            "className": class.name,
            "percent": t.percent()
        }));
    }

    Ok(json!({
        "totalClasses": classes.len(),
        "totalStudents": students.len(),
        "avgAttendance": overall.percent(),
        "atRisk": alerts.len(),
        "classRates": class_rates
    }))
}

fn district_stats(conn: &Connection, profile: &Profile) -> Result<serde_json::Value, HandlerErr> {
    require_role(profile, &[Role::Head], "view district statistics")?;
    let scope = profile_scope(profile)?;
    let district = match profile.district_id.as_deref() {
        Some(id) => roster::get_district(conn, id).map_err(HandlerErr::query)?,
        None => None,
    };
    let schools = roster::list_schools(conn, &scope).map_err(HandlerErr::query)?;
    let classes = roster::list_classes(conn, &scope).map_err(HandlerErr::query)?;
    let students = roster::list_students(conn, &scope, StudentFilter::default())
        .map_err(HandlerErr::query)?;
    let tallies =
        roster::tallies_by_student(conn, &scope, StudentFilter::default(), DateRange::default())
            .map_err(HandlerErr::query)?;
    let alerts = roster::list_alerts(conn, &scope, StudentFilter::default())
        .map_err(HandlerErr::query)?;

    let mut overall = Tally::default();
    let mut by_school: HashMap<&str, Tally> = HashMap::new();
    for s in &students {
        let t = tallies.get(&s.id).copied().unwrap_or_default();
        overall.merge(t);
        by_school.entry(s.school_id.as_str()).or_default().merge(t);
    }
    let school_rates: Vec<serde_json::Value> = schools
        .iter()
        .filter_map(|sc| {
            by_school.get(sc.id.as_str()).map(|t| {
                json!({
                    "schoolId": sc.id,
                    "schoolName": sc.name,
                    "percent": t.percent()
                })
            })
        })
        .collect();

    Ok(json!({
        "districtName": district.map(|d| d.name),
        "schools": schools,
        "totalClasses": classes.len(),
        "totalStudents": students.len(),
        "avgAttendance": overall.percent(),
        "atRiskCount": alerts.len(),
        "schoolRates": school_rates
    }))
}

fn reports_class_summary(
    conn: &Connection,
    profile: &Profile,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let summary = class_summary(conn, &scope, params)?;
    Ok(json!({
        "class": summary.class,
        "rows": summary.rows,
        "trend": summary.trend
    }))
}

fn export_class_summary(
    conn: &Connection,
    profile: &Profile,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let summary = class_summary(conn, &scope, params)?;
    let rows: Vec<Vec<String>> = summary
        .rows
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                summary.class.name.clone(),
                r.days_present.to_string(),
                r.days_absent.to_string(),
                r.percent.to_string(),
            ]
        })
        .collect();
    let csv = export::to_csv(&export::CLASS_SUMMARY_HEADERS, &rows);
    let path = write_export(params, "attendance_summary.csv", &csv)?;
    info!(
        "event=export_class_summary module=reports status=ok class_id={} rows={} path={}",
        summary.class.id,
        rows.len(),
        path
    );
    Ok(json!({ "path": path, "rowsExported": rows.len() }))
}

fn export_class_attendance(
    conn: &Connection,
    profile: &Profile,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let class_id = required_str(params, "classId")?;
    let class = class_in_scope(conn, &scope, &class_id)?;
    let filter = StudentFilter::class(&class.id);
    let students = roster::list_students(conn, &scope, filter).map_err(HandlerErr::query)?;
    if students.is_empty() {
        return Err(HandlerErr::new("empty_class", "no students found in this class")
            .with_details(json!({ "classId": class.id })));
    }
    let tallies = roster::tallies_by_student(conn, &scope, filter, DateRange::default())
        .map_err(HandlerErr::query)?;
    let rows: Vec<Vec<String>> = students
        .iter()
        .map(|s| {
            let t = tallies.get(&s.id).copied().unwrap_or_default();
            vec![
                s.name.clone(),
                t.present.to_string(),
                t.absent().to_string(),
                t.total.to_string(),
                t.percent().to_string(),
            ]
        })
        .collect();
    let csv = export::to_csv(&export::CLASS_ATTENDANCE_HEADERS, &rows);
    let default_name = format!("{}_attendance.csv", export::file_stem(&class.name));
    let path = write_export(params, &default_name, &csv)?;
    info!(
        "event=export_class_attendance module=reports status=ok class_id={} rows={} path={}",
        class.id,
        rows.len(),
        path
    );
    Ok(json!({ "path": path, "rowsExported": rows.len() }))
}

fn at_risk(conn: &Connection, profile: &Profile) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?.school_wide();
    let alerts = roster::list_alerts(conn, &scope, StudentFilter::default())
        .map_err(HandlerErr::query)?;
    let mut out = Vec::with_capacity(alerts.len());
    for alert in alerts {
        let missed = roster::absent_dates(conn, &alert.student_id).map_err(HandlerErr::query)?;
        let mut row = json!(alert);
        row["missedDates"] = json!(missed);
        out.push(row);
    }
    Ok(json!({ "alerts": out }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.teacherStats" => Some(with_session(state, req, |conn, profile, _| {
            teacher_stats(conn, profile)
        })),
        "reports.districtStats" => Some(with_session(state, req, |conn, profile, _| {
            district_stats(conn, profile)
        })),
        "reports.classSummary" => Some(with_session(state, req, reports_class_summary)),
        "reports.exportClassSummary" => Some(with_session(state, req, export_class_summary)),
        "reports.exportClassAttendance" => {
            Some(with_session(state, req, export_class_attendance))
        }
        "reports.atRisk" => Some(with_session(state, req, |conn, profile, _| {
            at_risk(conn, profile)
        })),
        _ => None,
    }
}
