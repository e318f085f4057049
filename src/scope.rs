use crate::auth::{Profile, Role};
use rusqlite::types::Value;

/// The slice of the directory a signed-in profile can see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    District(String),
    School(String),
    Classes { teacher_id: String, school_id: String },
}

impl Scope {
    pub fn for_profile(profile: &Profile) -> Result<Scope, String> {
        match profile.role {
            Role::Head => profile
                .district_id
                .clone()
                .map(Scope::District)
                .ok_or_else(|| "district official has no district".to_string()),
            Role::Teacher => profile
                .school_id
                .clone()
                .map(|school_id| Scope::Classes {
                    teacher_id: profile.id.clone(),
                    school_id,
                })
                .ok_or_else(|| "teacher has no school".to_string()),
            Role::Staff => profile
                .school_id
                .clone()
                .map(Scope::School)
                .ok_or_else(|| "profile has no school".to_string()),
        }
    }

    /// Teachers see their whole school for at-risk listings.
    pub fn school_wide(self) -> Scope {
        match self {
            Scope::Classes { school_id, .. } => Scope::School(school_id),
            other => other,
        }
    }

    /// Predicate over `students s`.
    pub fn student_predicate(&self) -> (&'static str, Vec<Value>) {
        match self {
            Scope::District(d) => (
                "s.school_id IN (SELECT id FROM schools WHERE district_id = ?)",
                vec![Value::Text(d.clone())],
            ),
            Scope::School(sc) => ("s.school_id = ?", vec![Value::Text(sc.clone())]),
            Scope::Classes {
                teacher_id,
                school_id,
            } => (
                "s.class_id IN (SELECT id FROM classes WHERE teacher_id = ? AND school_id = ?)",
                vec![Value::Text(teacher_id.clone()), Value::Text(school_id.clone())],
            ),
        }
    }

    /// Predicate over `classes c`.
    pub fn class_predicate(&self) -> (&'static str, Vec<Value>) {
        match self {
            Scope::District(d) => (
                "c.school_id IN (SELECT id FROM schools WHERE district_id = ?)",
                vec![Value::Text(d.clone())],
            ),
            Scope::School(sc) => ("c.school_id = ?", vec![Value::Text(sc.clone())]),
            Scope::Classes {
                teacher_id,
                school_id,
            } => (
                "c.teacher_id = ? AND c.school_id = ?",
                vec![Value::Text(teacher_id.clone()), Value::Text(school_id.clone())],
            ),
        }
    }

    /// Predicate over `schools sc`.
    pub fn school_predicate(&self) -> (&'static str, Vec<Value>) {
        match self {
            Scope::District(d) => ("sc.district_id = ?", vec![Value::Text(d.clone())]),
            Scope::School(sc) | Scope::Classes { school_id: sc, .. } => {
                ("sc.id = ?", vec![Value::Text(sc.clone())])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: Role, school: Option<&str>, district: Option<&str>) -> Profile {
        Profile {
            id: "p1".into(),
            email: "p1@example.org".into(),
            name: "P One".into(),
            role,
            school_id: school.map(str::to_string),
            district_id: district.map(str::to_string),
        }
    }

    #[test]
    fn scope_follows_role() {
        assert_eq!(
            Scope::for_profile(&profile(Role::Head, None, Some("d1"))),
            Ok(Scope::District("d1".into()))
        );
        assert_eq!(
            Scope::for_profile(&profile(Role::Teacher, Some("s1"), None)),
            Ok(Scope::Classes {
                teacher_id: "p1".into(),
                school_id: "s1".into()
            })
        );
        assert_eq!(
            Scope::for_profile(&profile(Role::Staff, Some("s1"), None)),
            Ok(Scope::School("s1".into()))
        );
    }

    #[test]
    fn unassigned_profiles_have_no_scope() {
        assert!(Scope::for_profile(&profile(Role::Head, Some("s1"), None)).is_err());
        assert!(Scope::for_profile(&profile(Role::Teacher, None, Some("d1"))).is_err());
    }

    #[test]
    fn teacher_scope_widens_to_school() {
        let s = Scope::Classes {
            teacher_id: "t".into(),
            school_id: "s1".into(),
        };
        assert_eq!(s.school_wide(), Scope::School("s1".into()));
    }
}
