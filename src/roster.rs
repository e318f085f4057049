//! Read-side queries over the directory, attendance and alert tables.
//!
//! Every list query takes a [`Scope`] so callers never see rows outside the
//! signed-in profile's district, school or classes.

use crate::calc::Tally;
use crate::scope::Scope;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct District {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: String,
    pub name: String,
    pub district_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: String,
    pub name: String,
    pub school_id: String,
    pub school_name: String,
    pub teacher_id: Option<String>,
    pub teacher_name: Option<String>,
    pub student_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub name: String,
    pub class_id: String,
    pub class_name: String,
    pub school_id: String,
    pub school_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRow {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub class_name: String,
    pub school_id: String,
    pub school_name: String,
    pub reason: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionRow {
    pub id: String,
    pub student_id: String,
    pub alert_id: String,
    pub recorded_by: String,
    pub recorded_by_name: Option<String>,
    pub intervention_type: String,
    pub description: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub date: String,
    pub present: bool,
}

/// Extra narrowing on top of a scope. All set fields must match.
#[derive(Debug, Clone, Copy, Default)]
pub struct StudentFilter<'a> {
    pub school_id: Option<&'a str>,
    pub class_id: Option<&'a str>,
    pub student_id: Option<&'a str>,
}

impl<'a> StudentFilter<'a> {
    pub fn class(class_id: &'a str) -> Self {
        StudentFilter {
            class_id: Some(class_id),
            ..Default::default()
        }
    }

    pub fn student(student_id: &'a str) -> Self {
        StudentFilter {
            student_id: Some(student_id),
            ..Default::default()
        }
    }
}

/// Inclusive `YYYY-MM-DD` bounds; ISO dates compare correctly as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange<'a> {
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
}

fn student_where(scope: &Scope, filter: StudentFilter<'_>) -> (String, Vec<Value>) {
    let (pred, mut params) = scope.student_predicate();
    let mut clauses = vec![pred.to_string()];
    let narrowing = [
        ("s.school_id = ?", filter.school_id),
        ("s.class_id = ?", filter.class_id),
        ("s.id = ?", filter.student_id),
    ];
    for (clause, v) in narrowing {
        if let Some(v) = v {
            clauses.push(clause.to_string());
            params.push(Value::Text(v.to_string()));
        }
    }
    (clauses.join(" AND "), params)
}

fn push_range(sql: &mut String, params: &mut Vec<Value>, range: DateRange<'_>) {
    if let Some(start) = range.start {
        sql.push_str(" AND a.date >= ?");
        params.push(Value::Text(start.to_string()));
    }
    if let Some(end) = range.end {
        sql.push_str(" AND a.date <= ?");
        params.push(Value::Text(end.to_string()));
    }
}

pub fn get_district(conn: &Connection, id: &str) -> rusqlite::Result<Option<District>> {
    conn.query_row(
        "SELECT id, name FROM districts WHERE id = ?",
        [id],
        |r| {
            Ok(District {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        },
    )
    .optional()
}

pub fn get_school(conn: &Connection, id: &str) -> rusqlite::Result<Option<School>> {
    conn.query_row(
        "SELECT id, name, district_id FROM schools WHERE id = ?",
        [id],
        |r| {
            Ok(School {
                id: r.get(0)?,
                name: r.get(1)?,
                district_id: r.get(2)?,
            })
        },
    )
    .optional()
}

pub fn list_schools(conn: &Connection, scope: &Scope) -> rusqlite::Result<Vec<School>> {
    let (pred, params) = scope.school_predicate();
    let sql = format!(
        "SELECT sc.id, sc.name, sc.district_id FROM schools sc WHERE {} ORDER BY sc.name, sc.id",
        pred
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |r| {
            Ok(School {
                id: r.get(0)?,
                name: r.get(1)?,
                district_id: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_classes(
    conn: &Connection,
    scope: &Scope,
    class_id: Option<&str>,
) -> rusqlite::Result<Vec<ClassRow>> {
    let (pred, mut params) = scope.class_predicate();
    let mut sql = format!(
        "SELECT
           c.id,
           c.name,
           c.school_id,
           sc.name,
           c.teacher_id,
           p.name,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
         FROM classes c
         JOIN schools sc ON sc.id = c.school_id
         LEFT JOIN profiles p ON p.id = c.teacher_id
         WHERE {}",
        pred
    );
    if let Some(id) = class_id {
        sql.push_str(" AND c.id = ?");
        params.push(Value::Text(id.to_string()));
    }
    sql.push_str(" ORDER BY sc.name, c.name, c.id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                name: r.get(1)?,
                school_id: r.get(2)?,
                school_name: r.get(3)?,
                teacher_id: r.get(4)?,
                teacher_name: r.get(5)?,
                student_count: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_classes(conn: &Connection, scope: &Scope) -> rusqlite::Result<Vec<ClassRow>> {
    query_classes(conn, scope, None)
}

pub fn get_class(
    conn: &Connection,
    scope: &Scope,
    class_id: &str,
) -> rusqlite::Result<Option<ClassRow>> {
    Ok(query_classes(conn, scope, Some(class_id))?.into_iter().next())
}

pub fn list_students(
    conn: &Connection,
    scope: &Scope,
    filter: StudentFilter<'_>,
) -> rusqlite::Result<Vec<StudentRow>> {
    let (where_sql, params) = student_where(scope, filter);
    let sql = format!(
        "SELECT s.id, s.name, s.class_id, c.name, s.school_id, sc.name
         FROM students s
         JOIN classes c ON c.id = s.class_id
         JOIN schools sc ON sc.id = s.school_id
         WHERE {}
         ORDER BY s.name, s.id",
        where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |r| {
            Ok(StudentRow {
                id: r.get(0)?,
                name: r.get(1)?,
                class_id: r.get(2)?,
                class_name: r.get(3)?,
                school_id: r.get(4)?,
                school_name: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(
    conn: &Connection,
    scope: &Scope,
    student_id: &str,
) -> rusqlite::Result<Option<StudentRow>> {
    Ok(list_students(conn, scope, StudentFilter::student(student_id))?
        .into_iter()
        .next())
}

/// Present/total counts per student, for students matching scope and filter.
/// Students without records are absent from the map.
pub fn tallies_by_student(
    conn: &Connection,
    scope: &Scope,
    filter: StudentFilter<'_>,
    range: DateRange<'_>,
) -> rusqlite::Result<HashMap<String, Tally>> {
    let (where_sql, mut params) = student_where(scope, filter);
    let mut sql = format!(
        "SELECT a.student_id, COALESCE(SUM(a.present), 0), COUNT(*)
         FROM attendance a
         JOIN students s ON s.id = a.student_id
         WHERE {}",
        where_sql
    );
    push_range(&mut sql, &mut params, range);
    sql.push_str(" GROUP BY a.student_id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |r| {
            let present: i64 = r.get(1)?;
            let total: i64 = r.get(2)?;
            Ok((
                r.get::<_, String>(0)?,
                Tally {
                    present: present.max(0) as usize,
                    total: total.max(0) as usize,
                },
            ))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

/// Sum of all tallies in scope.
pub fn overall_tally(
    conn: &Connection,
    scope: &Scope,
    filter: StudentFilter<'_>,
) -> rusqlite::Result<Tally> {
    let mut out = Tally::default();
    for t in tallies_by_student(conn, scope, filter, DateRange::default())?.into_values() {
        out.merge(t);
    }
    Ok(out)
}

/// Raw `(date, present)` rows for students in scope, oldest first.
pub fn attendance_rows(
    conn: &Connection,
    scope: &Scope,
    filter: StudentFilter<'_>,
    range: DateRange<'_>,
) -> rusqlite::Result<Vec<AttendanceEntry>> {
    let (where_sql, mut params) = student_where(scope, filter);
    let mut sql = format!(
        "SELECT a.date, a.present
         FROM attendance a
         JOIN students s ON s.id = a.student_id
         WHERE {}",
        where_sql
    );
    push_range(&mut sql, &mut params, range);
    sql.push_str(" ORDER BY a.date, a.student_id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |r| {
            Ok(AttendanceEntry {
                date: r.get(0)?,
                present: r.get::<_, i64>(1)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// One student's history. Unscoped: callers check visibility first.
pub fn student_history(
    conn: &Connection,
    student_id: &str,
    newest_first: bool,
    limit: Option<usize>,
) -> rusqlite::Result<Vec<AttendanceEntry>> {
    let order = if newest_first { "DESC" } else { "ASC" };
    let limit = limit.map(|n| n as i64).unwrap_or(-1);
    let sql = format!(
        "SELECT date, present FROM attendance WHERE student_id = ? ORDER BY date {} LIMIT ?",
        order
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((student_id, limit), |r| {
            Ok(AttendanceEntry {
                date: r.get(0)?,
                present: r.get::<_, i64>(1)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn absent_dates(conn: &Connection, student_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT date FROM attendance WHERE student_id = ? AND present = 0 ORDER BY date",
    )?;
    let rows = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_alerts(
    conn: &Connection,
    scope: &Scope,
    filter: StudentFilter<'_>,
    alert_id: Option<&str>,
) -> rusqlite::Result<Vec<AlertRow>> {
    let (where_sql, mut params) = student_where(scope, filter);
    let mut sql = format!(
        "SELECT al.id, al.student_id, s.name, s.class_id, c.name, s.school_id, sc.name,
                al.reason, al.created_at
         FROM alerts al
         JOIN students s ON s.id = al.student_id
         JOIN classes c ON c.id = s.class_id
         JOIN schools sc ON sc.id = s.school_id
         WHERE {}",
        where_sql
    );
    if let Some(id) = alert_id {
        sql.push_str(" AND al.id = ?");
        params.push(Value::Text(id.to_string()));
    }
    sql.push_str(" ORDER BY al.created_at DESC, al.rowid DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |r| {
            Ok(AlertRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                student_name: r.get(2)?,
                class_id: r.get(3)?,
                class_name: r.get(4)?,
                school_id: r.get(5)?,
                school_name: r.get(6)?,
                reason: r.get(7)?,
                created_at: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Alerts in scope, newest first.
pub fn list_alerts(
    conn: &Connection,
    scope: &Scope,
    filter: StudentFilter<'_>,
) -> rusqlite::Result<Vec<AlertRow>> {
    query_alerts(conn, scope, filter, None)
}

pub fn get_alert(
    conn: &Connection,
    scope: &Scope,
    alert_id: &str,
) -> rusqlite::Result<Option<AlertRow>> {
    Ok(query_alerts(conn, scope, StudentFilter::default(), Some(alert_id))?
        .into_iter()
        .next())
}

pub fn list_interventions(
    conn: &Connection,
    scope: &Scope,
    filter: StudentFilter<'_>,
    alert_id: Option<&str>,
) -> rusqlite::Result<Vec<InterventionRow>> {
    let (where_sql, mut params) = student_where(scope, filter);
    let mut sql = format!(
        "SELECT i.id, i.student_id, i.alert_id, i.recorded_by, p.name,
                i.intervention_type, i.description, i.status, i.created_at
         FROM interventions i
         JOIN students s ON s.id = i.student_id
         LEFT JOIN profiles p ON p.id = i.recorded_by
         WHERE {}",
        where_sql
    );
    if let Some(id) = alert_id {
        sql.push_str(" AND i.alert_id = ?");
        params.push(Value::Text(id.to_string()));
    }
    sql.push_str(" ORDER BY i.created_at DESC, i.rowid DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |r| {
            Ok(InterventionRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                alert_id: r.get(2)?,
                recorded_by: r.get(3)?,
                recorded_by_name: r.get(4)?,
                intervention_type: r.get(5)?,
                description: r.get(6)?,
                status: r.get(7)?,
                created_at: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
