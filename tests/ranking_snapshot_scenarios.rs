use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_portald");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn portald");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn all(v: u32) -> serde_json::Value {
    json!({
        "examA": v,
        "examB": v,
        "internalExams": v,
        "externalExams": v,
        "digitalPlatforms": v,
    })
}

fn order(result: &serde_json::Value) -> Vec<(String, u64, u64)> {
    result["students"]
        .as_array()
        .expect("students array")
        .iter()
        .map(|s| {
            (
                s["name"].as_str().expect("name").to_string(),
                s["averageScore"].as_u64().expect("averageScore"),
                s["rank"].as_u64().expect("rank"),
            )
        })
        .collect()
}

#[test]
fn equal_scores_are_ordered_by_name() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "ranking.compute",
        json!({
            "students": [
                { "id": "b", "name": "Bruno", "metrics": all(80) },
                { "id": "a", "name": "Ana", "metrics": all(80) },
                { "id": "c", "name": "Carla", "metrics": all(60) }
            ]
        }),
    );
    assert_eq!(
        order(&result),
        vec![
            ("Ana".to_string(), 80, 1),
            ("Bruno".to_string(), 80, 2),
            ("Carla".to_string(), 60, 3)
        ]
    );
    assert_eq!(result["denominator"], json!("fixed"));
    assert_eq!(result["podium"]["first"]["name"], json!("Ana"));
    assert_eq!(result["podium"]["third"]["name"], json!("Carla"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn empty_and_single_snapshots() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "ranking.compute",
        json!({ "students": [] }),
    );
    assert_eq!(empty["students"], json!([]));
    assert!(empty["podium"].is_null());

    let single = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "ranking.compute",
        json!({ "students": [{ "id": "x", "name": "Xande", "metrics": all(100) }] }),
    );
    assert_eq!(order(&single), vec![("Xande".to_string(), 100, 1)]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_metrics_degrade_to_zero() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "ranking.compute",
        json!({
            "students": [
                { "id": "e", "name": "Érica" },
                { "id": "d", "name": "Davi", "metrics": { "examA": "abc", "examB": null, "internalExams": 50 } },
                { "id": "f", "name": "Fábio", "metrics": all(40) }
            ]
        }),
    );
    assert_eq!(
        order(&result),
        vec![
            ("Fábio".to_string(), 40, 1),
            ("Davi".to_string(), 10, 2),
            ("Érica".to_string(), 0, 3)
        ]
    );

    let present = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "ranking.compute",
        json!({
            "denominator": "present",
            "students": [
                { "id": "d", "name": "Davi", "metrics": { "examA": "abc", "internalExams": 50 } },
                { "id": "e", "name": "Érica" }
            ]
        }),
    );
    assert_eq!(present["denominator"], json!("present"));
    assert_eq!(
        order(&present),
        vec![("Davi".to_string(), 50, 1), ("Érica".to_string(), 0, 2)]
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn accented_names_collate_with_their_base_letter() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "ranking.compute",
        json!({
            "students": [
                { "id": "1", "name": "Zuleica", "metrics": all(70) },
                { "id": "2", "name": "Ângela", "metrics": all(70) },
                { "id": "3", "name": "Bento", "metrics": all(70) }
            ]
        }),
    );
    let names: Vec<String> = order(&result).into_iter().map(|(n, _, _)| n).collect();
    assert_eq!(names, vec!["Ângela", "Bento", "Zuleica"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn decomposed_accents_sort_like_precomposed_ones() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "ranking.compute",
        json!({
            "students": [
                { "id": "1", "name": "Fabio", "metrics": all(70) },
                { "id": "2", "name": "A\u{301}lvaro", "metrics": all(70) },
                { "id": "3", "name": "E\u{303}va", "metrics": all(70) },
                { "id": "4", "name": "Abel", "metrics": all(70) },
                { "id": "5", "name": "Álvaro", "metrics": all(70) }
            ]
        }),
    );
    let ids: Vec<String> = result["students"]
        .as_array()
        .expect("students array")
        .iter()
        .map(|s| s["id"].as_str().expect("id").to_string())
        .collect();
    // Both spellings of Álvaro collate equal, so the id decides between them.
    assert_eq!(ids, vec!["4", "2", "5", "3", "1"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn current_user_absent_from_snapshot_is_not_found() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "ranking.currentUser",
        json!({
            "userId": "admin-uid",
            "students": [{ "id": "s1", "name": "Ana", "metrics": all(90) }]
        }),
    );
    assert_eq!(result["found"], json!(false));
    assert!(result["student"].is_null());

    let found = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "ranking.currentUser",
        json!({
            "userId": "s2",
            "students": [
                { "id": "s1", "name": "Ana", "metrics": all(90) },
                { "id": "s2", "name": "Bia", "metrics": all(30) }
            ]
        }),
    );
    assert_eq!(found["found"], json!(true));
    assert_eq!(found["student"]["rank"], json!(2));
    assert_eq!(found["student"]["averageScore"], json!(30));
    // No workspace selected, so nothing to persist.
    assert_eq!(found["persisted"], json!(false));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn student_report_from_snapshot() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.student",
        json!({
            "studentId": "s1",
            "students": [
                { "id": "s1", "name": "Ana", "metrics": all(92) },
                { "id": "s2", "name": "Bia", "metrics": all(30) }
            ]
        }),
    );
    assert_eq!(result["report"]["tier"], json!("excellent"));
    assert_eq!(result["report"]["student"]["rank"], json!(1));
    assert_eq!(result["report"]["totalStudents"], json!(2));

    drop(stdin);
    let _ = child.wait();
}
