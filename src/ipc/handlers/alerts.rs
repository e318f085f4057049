use crate::auth::Profile;
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{optional_str, profile_scope, required_str, with_session};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, StudentFilter};
use log::info;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

const DEFAULT_INTERVENTION_TYPE: &str = "dropout_prevention";
const DEFAULT_INTERVENTION_STATUS: &str = "active";

fn alerts_list(conn: &Connection, profile: &Profile) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let alerts = roster::list_alerts(conn, &scope, StudentFilter::default())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "alerts": alerts }))
}

fn interventions_create(
    conn: &Connection,
    profile: &Profile,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let alert_id = required_str(params, "alertId")?;
    let description = optional_str(params, "description")
        .ok_or_else(|| HandlerErr::bad_params("description must not be empty"))?;
    let intervention_type = optional_str(params, "interventionType")
        .unwrap_or_else(|| DEFAULT_INTERVENTION_TYPE.to_string());

    let alert = roster::get_alert(conn, &scope, &alert_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("alert not found"))?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO interventions(id, student_id, alert_id, recorded_by, intervention_type, description, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &alert.student_id,
            &alert.id,
            &profile.id,
            &intervention_type,
            &description,
            DEFAULT_INTERVENTION_STATUS,
            db::now_timestamp(),
        ),
    )
    .map_err(|e| HandlerErr::update("interventions", e))?;
    info!(
        "event=intervention_create module=alerts status=ok intervention_id={} alert_id={} recorded_by={}",
        id, alert.id, profile.id
    );
    Ok(json!({ "interventionId": id }))
}

fn interventions_list(
    conn: &Connection,
    profile: &Profile,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let student_id = optional_str(params, "studentId");
    let alert_id = optional_str(params, "alertId");
    let filter = StudentFilter {
        student_id: student_id.as_deref(),
        ..Default::default()
    };
    let interventions =
        roster::list_interventions(conn, &scope, filter, alert_id.as_deref())
            .map_err(HandlerErr::query)?;
    Ok(json!({ "interventions": interventions }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "alerts.list" => Some(with_session(state, req, |conn, profile, _| {
            alerts_list(conn, profile)
        })),
        "interventions.create" => Some(with_session(state, req, interventions_create)),
        "interventions.list" => Some(with_session(state, req, interventions_list)),
        _ => None,
    }
}
