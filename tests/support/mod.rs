#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const PASSWORD: &str = "secret123";
pub const HEAD_EMAIL: &str = "head@gasabo.rw";
pub const TEACHER_EMAIL: &str = "teacher@kacyiru.rw";
pub const TEACHER2_EMAIL: &str = "teacher2@kacyiru.rw";
pub const STAFF_EMAIL: &str = "staff@kacyiru.rw";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_komezad");
        let mut child = Command::new(exe)
            .env_remove("KOMEZA_WORKSPACE")
            .env_remove("KOMEZA_LOG_DIR")
            .env_remove("KOMEZA_LOG_LEVEL")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn komezad");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin: Some(stdin),
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        self.send_bytes(line.as_bytes())
    }

    /// Writes `bytes` plus a newline as one request line and reads one reply.
    pub fn send_bytes(&mut self, bytes: &[u8]) -> serde_json::Value {
        let stdin = self.stdin.as_mut().expect("stdin open");
        stdin.write_all(bytes).expect("write request");
        stdin.write_all(b"\n").expect("write newline");
        stdin.flush().expect("flush request");

        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(
            !out.trim().is_empty(),
            "empty response for {}",
            String::from_utf8_lossy(bytes)
        );
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "expected ok for {}, got {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Sends a request that must fail and returns its error code.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "expected error for {}, got {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn login(&mut self, email: &str) -> serde_json::Value {
        self.request_ok("auth.login", json!({ "email": email, "password": PASSWORD }))
    }

    pub fn logout(&mut self) {
        self.request_ok("auth.logout", json!({}));
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.wait();
    }
}

fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

/// One district with two schools. Kacyiru has a teacher with two classes
/// (one empty), a second teacher with one class, and a staff member.
pub struct Fixture {
    pub district_id: String,
    pub school_id: String,
    pub other_school_id: String,
    pub head_id: String,
    pub teacher_id: String,
    pub teacher2_id: String,
    pub staff_id: String,
    pub class_id: String,
    pub class2_id: String,
    pub empty_class_id: String,
    pub aline: String,
    pub bosco: String,
    pub claire: String,
    pub diane: String,
}

pub fn seed(sc: &mut Sidecar, workspace: &Path) -> Fixture {
    sc.request_ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let district_id = str_field(
        &sc.request_ok("directory.districts.create", json!({ "name": "Gasabo" })),
        "districtId",
    );
    let school_id = str_field(
        &sc.request_ok(
            "directory.schools.create",
            json!({ "name": "Kacyiru Primary", "districtId": district_id }),
        ),
        "schoolId",
    );
    let other_school_id = str_field(
        &sc.request_ok(
            "directory.schools.create",
            json!({ "name": "Remera Primary", "districtId": district_id }),
        ),
        "schoolId",
    );

    let mut user = |email: &str, name: &str, role: &str| -> String {
        let mut params = json!({
            "email": email,
            "name": name,
            "role": role,
            "password": PASSWORD,
        });
        if role == "head" {
            params["districtId"] = json!(district_id);
        } else {
            params["schoolId"] = json!(school_id);
        }
        str_field(&sc.request_ok("directory.users.create", params), "userId")
    };
    let teacher_id = user(TEACHER_EMAIL, "Jean Teacher", "teacher");
    let teacher2_id = user(TEACHER2_EMAIL, "Marie Teacher", "teacher");
    let staff_id = user(STAFF_EMAIL, "Eric Staff", "staff");
    let head_id = user(HEAD_EMAIL, "Grace Head", "head");

    sc.login(HEAD_EMAIL);
    let mut class = |name: &str, teacher: &str| -> String {
        str_field(
            &sc.request_ok(
                "directory.classes.create",
                json!({ "name": name, "schoolId": school_id, "teacherId": teacher }),
            ),
            "classId",
        )
    };
    let class_id = class("P5 Blue", &teacher_id);
    let class2_id = class("P6 Green", &teacher2_id);
    let empty_class_id = class("P4 Empty", &teacher_id);

    let mut student = |name: &str, class_id: &str| -> String {
        str_field(
            &sc.request_ok(
                "directory.students.create",
                json!({ "name": name, "classId": class_id }),
            ),
            "studentId",
        )
    };
    let aline = student("Aline Uwase", &class_id);
    let bosco = student("Bosco Habimana", &class_id);
    let claire = student("Claire Mukamana", &class_id);
    let diane = student("Diane Ingabire", &class2_id);
    sc.logout();

    Fixture {
        district_id,
        school_id,
        other_school_id,
        head_id,
        teacher_id,
        teacher2_id,
        staff_id,
        class_id,
        class2_id,
        empty_class_id,
        aline,
        bosco,
        claire,
        diane,
    }
}

/// Three school days for P5 Blue as the first teacher. Bosco misses all
/// three and gets flagged; Claire is absent on the 4th and 6th only.
///
/// Final tallies: Aline 2/3, Bosco 0/3, Claire 1/3.
pub fn record_week(sc: &mut Sidecar, fx: &Fixture) -> Vec<serde_json::Value> {
    sc.login(TEACHER_EMAIL);
    let days = [
        ("2024-03-04", json!({ fx.aline.clone(): true, fx.bosco.clone(): false, fx.claire.clone(): false })),
        ("2024-03-05", json!({ fx.aline.clone(): true, fx.bosco.clone(): false, fx.claire.clone(): true })),
        ("2024-03-06", json!({ fx.aline.clone(): false, fx.bosco.clone(): false })),
    ];
    let mut results = Vec::new();
    for (date, present) in days {
        results.push(sc.request_ok(
            "attendance.record",
            json!({ "classId": fx.class_id, "date": date, "present": present }),
        ));
    }
    sc.logout();
    results
}
