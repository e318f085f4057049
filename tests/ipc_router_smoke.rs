mod support;

use serde_json::json;
use support::{seed, temp_dir, Sidecar};

#[test]
fn health_and_protocol_errors() {
    let mut sc = Sidecar::spawn();

    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert!(health["workspacePath"].is_null());
    assert_eq!(health["authenticated"], false);

    let bad = sc.send_raw("{not json");
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");
    assert!(bad.get("id").is_none());

    assert_eq!(sc.request_err("grades.open", json!({})), "not_implemented");
    assert_eq!(sc.request_err("workspace.select", json!({})), "bad_params");
    assert_eq!(sc.request_err("classes.list", json!({})), "no_workspace");
    assert_eq!(
        sc.request_err("auth.login", json!({ "email": "a@b.rw", "password": "secret1" })),
        "no_workspace"
    );
}

#[test]
fn invalid_utf8_line_gets_bad_json_and_the_loop_keeps_running() {
    let mut sc = Sidecar::spawn();

    let bad = sc.send_bytes(b"{\"id\":\"1\",\"method\":\"health\",\"params\":{\"x\":\"\xff\xfe\"}}");
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");

    let raw = sc.send_bytes(b"\xff\xfe");
    assert_eq!(raw["error"]["code"], "bad_json");

    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("komeza-router-smoke");
    let mut sc = Sidecar::spawn();
    let fx = seed(&mut sc, &workspace);

    let health = sc.request_ok("health", json!({}));
    assert_eq!(
        health["workspacePath"].as_str(),
        Some(workspace.to_string_lossy().as_ref())
    );

    // Every family answers with something other than not_implemented when
    // called without a session.
    let methods = [
        ("profile.get", json!({})),
        ("directory.schools.list", json!({})),
        ("classes.list", json!({})),
        ("attendance.record", json!({ "classId": fx.class_id, "date": "2024-03-04", "present": {} })),
        ("attendance.get", json!({ "classId": fx.class_id, "date": "2024-03-04" })),
        ("alerts.list", json!({})),
        ("interventions.create", json!({ "alertId": "x", "description": "call home" })),
        ("interventions.list", json!({})),
        ("dashboard.summary", json!({})),
        ("reports.teacherStats", json!({})),
        ("reports.districtStats", json!({})),
        ("reports.classSummary", json!({ "classId": fx.class_id })),
        ("reports.exportClassSummary", json!({ "classId": fx.class_id })),
        ("reports.exportClassAttendance", json!({ "classId": fx.class_id })),
        ("reports.atRisk", json!({})),
        ("students.list", json!({})),
        ("students.detail", json!({ "studentId": fx.aline })),
        ("setup.get", json!({})),
        ("setup.update", json!({ "section": "dashboard", "patch": {} })),
    ];
    for (method, params) in methods {
        assert_eq!(sc.request_err(method, params), "not_authenticated", "{}", method);
    }

    let session = sc.request_ok("auth.session", json!({}));
    assert!(session["profile"].is_null());

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}
