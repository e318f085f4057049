use crate::db;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupSection {
    RiskPolicy,
    Dashboard,
}

impl SetupSection {
    pub const ALL: [SetupSection; 2] = [SetupSection::RiskPolicy, SetupSection::Dashboard];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "riskPolicy" => Some(Self::RiskPolicy),
            "dashboard" => Some(Self::Dashboard),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RiskPolicy => "riskPolicy",
            Self::Dashboard => "dashboard",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::RiskPolicy => "setup.riskPolicy",
            Self::Dashboard => "setup.dashboard",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::RiskPolicy => json!({
            "consecutiveAbsences": 3,
            "highRiskBelow": 70,
            "mediumRiskBelow": 85
        }),
        SetupSection::Dashboard => json!({
            "recentAlertsLimit": 5,
            "alertsTableLimit": 10,
            "historyLimit": 30
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::RiskPolicy => match k.as_str() {
                "consecutiveAbsences" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 2, 30)?));
                }
                "highRiskBelow" | "mediumRiskBelow" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 100)?));
                }
                _ => return Err(format!("unknown riskPolicy field: {}", k)),
            },
            SetupSection::Dashboard => match k.as_str() {
                "recentAlertsLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 50)?));
                }
                "alertsTableLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 200)?));
                }
                "historyLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 365)?));
                }
                _ => return Err(format!("unknown dashboard field: {}", k)),
            },
        }
    }
    if section == SetupSection::RiskPolicy {
        let high = obj.get("highRiskBelow").and_then(Value::as_i64).unwrap_or(70);
        let medium = obj.get("mediumRiskBelow").and_then(Value::as_i64).unwrap_or(85);
        if high > medium {
            return Err("highRiskBelow must not exceed mediumRiskBelow".into());
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed stored values fall back to defaults.
            let mut merged = current.clone();
            if merge_section_patch(section, &mut merged, saved_obj).is_ok() {
                current = merged;
            }
        }
    }
    Ok(current)
}

#[derive(Debug)]
pub enum UpdateError {
    Invalid(String),
    Storage(anyhow::Error),
}

/// Validates `patch` against the stored section and persists the result.
pub fn update_section(
    conn: &Connection,
    section: SetupSection,
    patch: &Map<String, Value>,
) -> Result<Value, UpdateError> {
    let mut current = load_section(conn, section).map_err(UpdateError::Storage)?;
    merge_section_patch(section, &mut current, patch).map_err(UpdateError::Invalid)?;
    db::settings_set_json(conn, section.key(), &current).map_err(UpdateError::Storage)?;
    Ok(current)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskPolicy {
    pub consecutive_absences: usize,
    pub high_risk_below: i64,
    pub medium_risk_below: i64,
}

impl RiskPolicy {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let v = load_section(conn, SetupSection::RiskPolicy)?;
        Ok(RiskPolicy {
            consecutive_absences: v
                .get("consecutiveAbsences")
                .and_then(Value::as_u64)
                .unwrap_or(3) as usize,
            high_risk_below: v.get("highRiskBelow").and_then(Value::as_i64).unwrap_or(70),
            medium_risk_below: v
                .get("mediumRiskBelow")
                .and_then(Value::as_i64)
                .unwrap_or(85),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardLimits {
    pub recent_alerts: usize,
    pub alerts_table: usize,
    pub history: usize,
}

impl DashboardLimits {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let v = load_section(conn, SetupSection::Dashboard)?;
        let get = |k: &str, fallback: u64| v.get(k).and_then(Value::as_u64).unwrap_or(fallback);
        Ok(DashboardLimits {
            recent_alerts: get("recentAlertsLimit", 5) as usize,
            alerts_table: get("alertsTableLimit", 10) as usize,
            history: get("historyLimit", 30) as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object patch")
    }

    #[test]
    fn risk_policy_patch_validates_ranges() {
        let mut cur = default_section(SetupSection::RiskPolicy);
        merge_section_patch(
            SetupSection::RiskPolicy,
            &mut cur,
            &patch(json!({ "consecutiveAbsences": 4 })),
        )
        .expect("valid patch");
        assert_eq!(cur["consecutiveAbsences"], 4);

        let e = merge_section_patch(
            SetupSection::RiskPolicy,
            &mut cur,
            &patch(json!({ "consecutiveAbsences": 1 })),
        )
        .unwrap_err();
        assert!(e.contains("2..=30"));
    }

    #[test]
    fn risk_bands_must_be_ordered() {
        let mut cur = default_section(SetupSection::RiskPolicy);
        let e = merge_section_patch(
            SetupSection::RiskPolicy,
            &mut cur,
            &patch(json!({ "highRiskBelow": 90 })),
        )
        .unwrap_err();
        assert!(e.contains("mediumRiskBelow"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut cur = default_section(SetupSection::Dashboard);
        assert!(merge_section_patch(
            SetupSection::Dashboard,
            &mut cur,
            &patch(json!({ "colour": "blue" })),
        )
        .is_err());
    }
}
