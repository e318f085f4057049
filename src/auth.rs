use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// District official.
    Head,
    Teacher,
    /// Any other school-level official.
    Staff,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "head" => Some(Role::Head),
            "teacher" => Some(Role::Teacher),
            "staff" => Some(Role::Staff),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Head => "head",
            Role::Teacher => "teacher",
            Role::Staff => "staff",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Head => "District Official",
            Role::Teacher => "Teacher",
            Role::Staff => "Staff",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub school_id: Option<String>,
    pub district_id: Option<String>,
}

const PROFILE_SELECT_SQL: &str =
    "SELECT id, email, name, role, school_id, district_id FROM profiles";

fn profile_from_row(r: &Row<'_>) -> rusqlite::Result<Profile> {
    let role_raw: String = r.get(3)?;
    let role = Role::parse(&role_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown role {}", role_raw).into(),
        )
    })?;
    Ok(Profile {
        id: r.get(0)?,
        email: r.get(1)?,
        name: r.get(2)?,
        role,
        school_id: r.get(4)?,
        district_id: r.get(5)?,
    })
}

pub fn load_profile(conn: &Connection, id: &str) -> rusqlite::Result<Option<Profile>> {
    conn.query_row(
        &format!("{} WHERE id = ?", PROFILE_SELECT_SQL),
        [id],
        profile_from_row,
    )
    .optional()
}

pub fn head_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE role = ?",
        [Role::Head.as_str()],
        |r| r.get(0),
    )
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    Ok(())
}

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hashes_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Looks up the profile for `email` and checks the password. `None` covers
/// both an unknown email and a wrong password.
pub fn authenticate(
    conn: &Connection,
    email: &str,
    password: &str,
) -> rusqlite::Result<Option<Profile>> {
    let row = conn
        .query_row(
            "SELECT id, password_salt, password_hash FROM profiles WHERE email = ?",
            [normalize_email(email)],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((id, salt, expected)) = row else {
        return Ok(None);
    };
    if !hashes_match(&hash_password(&salt, password), &expected) {
        return Ok(None);
    }
    load_profile(conn, &id)
}
