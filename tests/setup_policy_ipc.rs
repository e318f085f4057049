mod support;

use serde_json::json;
use support::{record_week, seed, temp_dir, Sidecar, HEAD_EMAIL, TEACHER_EMAIL};

#[test]
fn setup_defaults_and_head_only_updates() {
    let workspace = temp_dir("komeza-setup");
    let mut sc = Sidecar::spawn();
    seed(&mut sc, &workspace);

    sc.login(TEACHER_EMAIL);
    let setup = sc.request_ok("setup.get", json!({}));
    assert_eq!(
        setup["riskPolicy"],
        json!({ "consecutiveAbsences": 3, "highRiskBelow": 70, "mediumRiskBelow": 85 })
    );
    assert_eq!(
        setup["dashboard"],
        json!({ "recentAlertsLimit": 5, "alertsTableLimit": 10, "historyLimit": 30 })
    );
    assert_eq!(
        sc.request_err(
            "setup.update",
            json!({ "section": "dashboard", "patch": { "historyLimit": 7 } })
        ),
        "forbidden"
    );
    sc.logout();

    sc.login(HEAD_EMAIL);
    let bad = [
        json!({ "section": "printer", "patch": {} }),
        json!({ "section": "dashboard", "patch": [] }),
        json!({ "section": "dashboard", "patch": { "colour": "blue" } }),
        json!({ "section": "dashboard", "patch": { "historyLimit": 0 } }),
        json!({ "section": "riskPolicy", "patch": { "consecutiveAbsences": "3" } }),
        json!({ "section": "riskPolicy", "patch": { "highRiskBelow": 90 } }),
    ];
    for params in bad {
        assert_eq!(sc.request_err("setup.update", params.clone()), "bad_params", "{}", params);
    }

    let updated = sc.request_ok(
        "setup.update",
        json!({ "section": "dashboard", "patch": { "historyLimit": 7 } }),
    );
    assert_eq!(updated["value"]["historyLimit"], 7);
    assert_eq!(updated["value"]["recentAlertsLimit"], 5);

    let setup = sc.request_ok("setup.get", json!({}));
    assert_eq!(setup["dashboard"]["historyLimit"], 7);
    assert_eq!(setup["riskPolicy"]["consecutiveAbsences"], 3);

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn history_window_and_risk_bands_follow_settings() {
    let workspace = temp_dir("komeza-setup-bands");
    let mut sc = Sidecar::spawn();
    let fx = seed(&mut sc, &workspace);
    record_week(&mut sc, &fx);

    sc.login(HEAD_EMAIL);
    let before = sc.request_ok("students.detail", json!({ "studentId": fx.aline }));
    assert_eq!(before["attendanceRate"], 67);
    assert_eq!(before["riskLevel"], "high");

    sc.request_ok(
        "setup.update",
        json!({ "section": "riskPolicy", "patch": { "highRiskBelow": 60 } }),
    );
    let banded = sc.request_ok("students.detail", json!({ "studentId": fx.aline }));
    assert_eq!(banded["riskLevel"], "medium");

    sc.request_ok(
        "setup.update",
        json!({ "section": "dashboard", "patch": { "historyLimit": 2 } }),
    );
    let windowed = sc.request_ok("students.detail", json!({ "studentId": fx.aline }));
    assert_eq!(
        windowed["attendanceHistory"],
        json!([
            { "date": "2024-03-06", "present": false },
            { "date": "2024-03-05", "present": true }
        ])
    );
    assert_eq!(windowed["attendanceRate"], 50);
    assert_eq!(windowed["riskLevel"], "high");

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}
