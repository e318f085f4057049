use crate::auth::{Profile, Role};
use crate::calc;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, ClassRow};
use crate::scope::Scope;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    optional_str(params, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Trimmed string param; blank counts as absent.
pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn optional_date(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    let Some(raw) = optional_str(params, key) else {
        return Ok(None);
    };
    calc::parse_date(&raw)
        .map(|d| Some(d.format("%Y-%m-%d").to_string()))
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn required_date(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    optional_date(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn session_profile(state: &AppState) -> Result<&Profile, HandlerErr> {
    state
        .session
        .as_ref()
        .map(|s| &s.profile)
        .ok_or_else(|| HandlerErr::new("not_authenticated", "log in first"))
}

pub fn profile_scope(profile: &Profile) -> Result<Scope, HandlerErr> {
    Scope::for_profile(profile).map_err(HandlerErr::forbidden)
}

pub fn require_role(profile: &Profile, allowed: &[Role], action: &str) -> Result<(), HandlerErr> {
    if allowed.contains(&profile.role) {
        return Ok(());
    }
    Err(HandlerErr::forbidden(format!(
        "{} may not {}",
        profile.role.label(),
        action
    )))
}

/// Resolves `class_id` inside `scope`, telling apart a class that does not
/// exist from one the profile may not touch.
pub fn class_in_scope(conn: &Connection, scope: &Scope, class_id: &str) -> Result<ClassRow, HandlerErr> {
    if let Some(class) = roster::get_class(conn, scope, class_id).map_err(HandlerErr::query)? {
        return Ok(class);
    }
    let exists = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::query)?
        .is_some();
    if exists {
        Err(HandlerErr::forbidden("class is outside your scope")
            .with_details(json!({ "classId": class_id })))
    } else {
        Err(HandlerErr::not_found("class not found"))
    }
}

/// Runs `f` against the open workspace with the signed-in profile and
/// renders the response envelope.
pub fn with_session<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &Profile, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let result = db_conn(state).and_then(|conn| {
        let profile = session_profile(state)?;
        f(conn, profile, &req.params)
    });
    respond(req, result)
}

pub fn respond(
    req: &Request,
    result: Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            log::debug!(
                "event=request_failed module=ipc status=error method={} code={}",
                req.method,
                e.code
            );
            e.response(&req.id)
        }
    }
}
