use crate::auth::{self, Profile, Role};
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, required_str, respond, with_session};
use crate::ipc::types::{AppState, Request, Session};
use crate::roster;
use crate::scope::Scope;
use log::{info, warn};
use rusqlite::Connection;
use serde_json::json;

fn login(conn: &Connection, params: &serde_json::Value) -> Result<Profile, HandlerErr> {
    let email = required_str(params, "email")?;
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing password"))?;
    match auth::authenticate(conn, &email, password).map_err(HandlerErr::query)? {
        Some(profile) => Ok(profile),
        None => {
            warn!("event=auth_login module=auth status=rejected");
            Err(HandlerErr::new("auth_failed", "invalid email or password"))
        }
    }
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| login(conn, &req.params));
    let result = result.map(|profile| {
        info!(
            "event=auth_login module=auth status=ok profile_id={} role={}",
            profile.id,
            profile.role.as_str()
        );
        let body = json!({ "profile": profile });
        state.session = Some(Session {
            profile,
            started_at: db::now_timestamp(),
        });
        body
    });
    respond(req, result)
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(session) = state.session.take() {
        info!(
            "event=auth_logout module=auth status=ok profile_id={}",
            session.profile.id
        );
    }
    respond(req, Ok(json!({ "ok": true })))
}

fn handle_session(state: &mut AppState, req: &Request) -> serde_json::Value {
    let body = match state.session.as_ref() {
        Some(s) => json!({ "profile": s.profile, "startedAt": s.started_at }),
        None => json!({ "profile": null }),
    };
    respond(req, Ok(body))
}

fn profile_get(conn: &Connection, profile: &Profile) -> Result<serde_json::Value, HandlerErr> {
    let school = match profile.school_id.as_deref() {
        Some(id) => roster::get_school(conn, id).map_err(HandlerErr::query)?,
        None => None,
    };
    // Heads carry a district directly; everyone else inherits the school's.
    let district_id = match profile.role {
        Role::Head => profile.district_id.clone(),
        _ => school
            .as_ref()
            .map(|s| s.district_id.clone())
            .or_else(|| profile.district_id.clone()),
    };
    let district = match district_id.as_deref() {
        Some(id) => roster::get_district(conn, id).map_err(HandlerErr::query)?,
        None => None,
    };
    let classes_taught: Vec<String> = match (profile.role, Scope::for_profile(profile)) {
        (Role::Teacher, Ok(scope)) => roster::list_classes(conn, &scope)
            .map_err(HandlerErr::query)?
            .into_iter()
            .map(|c| c.name)
            .collect(),
        _ => Vec::new(),
    };

    let school = school.filter(|_| profile.role != Role::Head);

    Ok(json!({
        "profile": profile,
        "roleLabel": profile.role.label(),
        "school": school,
        "district": district,
        "classesTaught": classes_taught
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.session" => Some(handle_session(state, req)),
        "profile.get" => Some(with_session(state, req, |conn, profile, _| {
            profile_get(conn, profile)
        })),
        _ => None,
    }
}
