use crate::auth::{self, Profile, Role};
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    db_conn, optional_str, profile_scope, required_str, respond, session_profile, with_session,
};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, School};
use log::info;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Who is allowed to change the directory. `None` means the workspace has no
/// district official yet and anything may be created to bootstrap it.
fn directory_admin(state: &AppState) -> Result<Option<&Profile>, HandlerErr> {
    let conn = db_conn(state)?;
    if auth::head_count(conn).map_err(HandlerErr::query)? == 0 {
        return Ok(None);
    }
    let profile = session_profile(state)?;
    if profile.role != Role::Head {
        return Err(HandlerErr::forbidden(format!(
            "{} may not change the directory",
            profile.role.label()
        )));
    }
    Ok(Some(profile))
}

fn with_admin<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, Option<&Profile>, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let result = db_conn(state).and_then(|conn| {
        let admin = directory_admin(state)?;
        f(conn, admin, &req.params)
    });
    respond(req, result)
}

fn ensure_district_access(admin: Option<&Profile>, district_id: &str) -> Result<(), HandlerErr> {
    match admin {
        Some(head) if head.district_id.as_deref() != Some(district_id) => Err(
            HandlerErr::forbidden("outside your district").with_details(json!({ "districtId": district_id })),
        ),
        _ => Ok(()),
    }
}

fn require_school(conn: &Connection, school_id: &str) -> Result<School, HandlerErr> {
    roster::get_school(conn, school_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("school not found"))
}

fn district_exists(conn: &Connection, district_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM districts WHERE id = ?", [district_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::query)
}

fn create_district(
    conn: &Connection,
    admin: Option<&Profile>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    if admin.is_some() {
        return Err(HandlerErr::forbidden(
            "districts can only be created while bootstrapping a workspace",
        ));
    }
    let name = required_str(params, "name")?;
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO districts(id, name) VALUES(?, ?)", (&id, &name))
        .map_err(|e| HandlerErr::update("districts", e))?;
    info!("event=district_create module=directory status=ok district_id={}", id);
    Ok(json!({ "districtId": id }))
}

fn create_school(
    conn: &Connection,
    admin: Option<&Profile>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let district_id = required_str(params, "districtId")?;
    ensure_district_access(admin, &district_id)?;
    if !district_exists(conn, &district_id)? {
        return Err(HandlerErr::not_found("district not found"));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO schools(id, name, district_id) VALUES(?, ?, ?)",
        (&id, &name, &district_id),
    )
    .map_err(|e| HandlerErr::update("schools", e))?;
    info!(
        "event=school_create module=directory status=ok school_id={} district_id={}",
        id, district_id
    );
    Ok(json!({ "schoolId": id }))
}

fn create_user(
    conn: &Connection,
    admin: Option<&Profile>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let email = auth::normalize_email(&required_str(params, "email")?);
    if !email.contains('@') {
        return Err(HandlerErr::bad_params("email must contain @"));
    }
    let name = required_str(params, "name")?;
    let role_raw = required_str(params, "role")?;
    let role = Role::parse(&role_raw).ok_or_else(|| {
        HandlerErr::bad_params("role must be one of: head, teacher, staff")
            .with_details(json!({ "role": role_raw }))
    })?;
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing password"))?;
    auth::validate_password(password).map_err(HandlerErr::bad_params)?;

    let (school_id, district_id) = match role {
        Role::Head => {
            let district_id = required_str(params, "districtId")?;
            if !district_exists(conn, &district_id)? {
                return Err(HandlerErr::not_found("district not found"));
            }
            (None, district_id)
        }
        Role::Teacher | Role::Staff => {
            let school_id = required_str(params, "schoolId")?;
            let school = require_school(conn, &school_id)?;
            (Some(school.id), school.district_id)
        }
    };
    ensure_district_access(admin, &district_id)?;

    let taken = conn
        .query_row("SELECT 1 FROM profiles WHERE email = ?", [&email], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::query)?
        .is_some();
    if taken {
        return Err(HandlerErr::new("conflict", "email already registered"));
    }

    let id = Uuid::new_v4().to_string();
    let salt = auth::new_salt();
    let hash = auth::hash_password(&salt, password);
    conn.execute(
        "INSERT INTO profiles(id, email, name, role, school_id, district_id, password_salt, password_hash, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &email,
            &name,
            role.as_str(),
            &school_id,
            &district_id,
            &salt,
            &hash,
            db::now_timestamp(),
        ),
    )
    .map_err(|e| HandlerErr::update("profiles", e))?;
    info!(
        "event=user_create module=directory status=ok profile_id={} role={}",
        id,
        role.as_str()
    );
    Ok(json!({ "userId": id }))
}

fn create_class(
    conn: &Connection,
    admin: Option<&Profile>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let school_id = required_str(params, "schoolId")?;
    let school = require_school(conn, &school_id)?;
    ensure_district_access(admin, &school.district_id)?;

    let teacher_id = optional_str(params, "teacherId");
    if let Some(tid) = teacher_id.as_deref() {
        let teacher = auth::load_profile(conn, tid)
            .map_err(HandlerErr::query)?
            .ok_or_else(|| HandlerErr::not_found("teacher not found"))?;
        if teacher.role != Role::Teacher || teacher.school_id.as_deref() != Some(school.id.as_str()) {
            return Err(HandlerErr::bad_params(
                "teacherId must be a teacher at the same school",
            ));
        }
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, school_id, teacher_id) VALUES(?, ?, ?, ?)",
        (&id, &name, &school.id, &teacher_id),
    )
    .map_err(|e| HandlerErr::update("classes", e))?;
    info!(
        "event=class_create module=directory status=ok class_id={} school_id={}",
        id, school.id
    );
    Ok(json!({ "classId": id }))
}

fn create_student(
    conn: &Connection,
    admin: Option<&Profile>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let class_id = required_str(params, "classId")?;
    let location: Option<(String, String)> = conn
        .query_row(
            "SELECT c.school_id, sc.district_id
             FROM classes c
             JOIN schools sc ON sc.id = c.school_id
             WHERE c.id = ?",
            [&class_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((school_id, district_id)) = location else {
        return Err(HandlerErr::not_found("class not found"));
    };
    ensure_district_access(admin, &district_id)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, name, class_id, school_id) VALUES(?, ?, ?, ?)",
        (&id, &name, &class_id, &school_id),
    )
    .map_err(|e| HandlerErr::update("students", e))?;
    info!(
        "event=student_create module=directory status=ok student_id={} class_id={}",
        id, class_id
    );
    Ok(json!({ "studentId": id }))
}

fn list_schools(conn: &Connection, profile: &Profile) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let schools = roster::list_schools(conn, &scope).map_err(HandlerErr::query)?;
    Ok(json!({ "schools": schools }))
}

fn list_classes(conn: &Connection, profile: &Profile) -> Result<serde_json::Value, HandlerErr> {
    let scope = profile_scope(profile)?;
    let classes = roster::list_classes(conn, &scope).map_err(HandlerErr::query)?;
    Ok(json!({ "classes": classes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "directory.districts.create" => Some(with_admin(state, req, create_district)),
        "directory.schools.create" => Some(with_admin(state, req, create_school)),
        "directory.users.create" => Some(with_admin(state, req, create_user)),
        "directory.classes.create" => Some(with_admin(state, req, create_class)),
        "directory.students.create" => Some(with_admin(state, req, create_student)),
        "directory.schools.list" => Some(with_session(state, req, |conn, profile, _| {
            list_schools(conn, profile)
        })),
        "classes.list" => Some(with_session(state, req, |conn, profile, _| {
            list_classes(conn, profile)
        })),
        _ => None,
    }
}
