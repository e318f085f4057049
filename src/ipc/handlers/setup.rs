use crate::auth::{Profile, Role};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{require_role, required_str, with_session};
use crate::ipc::types::{AppState, Request};
use crate::settings::{self, SetupSection, UpdateError};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

fn setup_get(conn: &Connection) -> Result<Value, HandlerErr> {
    let mut out = Map::new();
    for section in SetupSection::ALL {
        let v = settings::load_section(conn, section).map_err(|e| HandlerErr::query(format!("{e:#}")))?;
        out.insert(section.name().to_string(), v);
    }
    Ok(Value::Object(out))
}

fn setup_update(conn: &Connection, profile: &Profile, params: &Value) -> Result<Value, HandlerErr> {
    require_role(profile, &[Role::Head], "change settings")?;
    let section_raw = required_str(params, "section")?;
    let section = SetupSection::parse(&section_raw).ok_or_else(|| {
        HandlerErr::bad_params("unknown section").with_details(json!({ "section": section_raw }))
    })?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let updated = settings::update_section(conn, section, patch).map_err(|e| match e {
        UpdateError::Invalid(msg) => HandlerErr::bad_params(msg),
        UpdateError::Storage(e) => HandlerErr::update("settings", format!("{e:#}")),
    })?;
    info!(
        "event=setup_update module=setup status=ok section={} profile_id={}",
        section.name(),
        profile.id
    );
    Ok(json!({ "section": section.name(), "value": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(with_session(state, req, |conn, _, _| setup_get(conn))),
        "setup.update" => Some(with_session(state, req, setup_update)),
        _ => None,
    }
}
