use crate::{calc, db, roster};
use log::info;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaisedAlert {
    pub alert_id: String,
    pub student_id: String,
}

pub fn alert_reason(threshold: usize) -> String {
    format!("Missed {} consecutive days", threshold)
}

/// Flags `student_id` when their history contains `threshold` absences in a
/// row. A student carries at most one alert; an existing one is left alone.
///
/// Returns the new alert when one was raised.
pub fn evaluate_student(
    conn: &Connection,
    student_id: &str,
    threshold: usize,
) -> rusqlite::Result<Option<RaisedAlert>> {
    let history: Vec<bool> = roster::student_history(conn, student_id, false, None)?
        .into_iter()
        .map(|e| e.present)
        .collect();
    if calc::first_absence_run(&history, threshold).is_none() {
        return Ok(None);
    }

    let location: Option<(String, String)> = conn
        .query_row(
            "SELECT s.school_id, sc.district_id
             FROM students s
             JOIN schools sc ON sc.id = s.school_id
             WHERE s.id = ?",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((school_id, district_id)) = location else {
        return Ok(None);
    };

    let alert_id = Uuid::new_v4().to_string();
    let inserted = conn.execute(
        "INSERT INTO alerts(id, student_id, reason, school_id, district_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id) DO NOTHING",
        (
            &alert_id,
            student_id,
            alert_reason(threshold),
            &school_id,
            &district_id,
            db::now_timestamp(),
        ),
    )?;
    if inserted == 0 {
        return Ok(None);
    }
    info!(
        "event=alert_raised module=risk status=ok alert_id={} student_id={} school_id={} threshold={}",
        alert_id, student_id, school_id, threshold
    );
    Ok(Some(RaisedAlert {
        alert_id,
        student_id: student_id.to_string(),
    }))
}
