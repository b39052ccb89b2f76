use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradecastd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradecastd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

fn result_percent(value: &serde_json::Value) -> f64 {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(true));
    value
        .get("result")
        .and_then(|r| r.get("currentPercent"))
        .and_then(|v| v.as_f64())
        .expect("currentPercent")
}

#[test]
fn out_of_range_assignment_grades_are_rejected() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "predict.calculate",
        json!({ "assignmentScores": [11.0, 9.0, 8.0] }),
    );
    assert_eq!(error_code(&resp), "invalid_range");
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str()),
        Some("All grades must be between 0 and 10")
    );

    // The rejection localizes like any other response.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "predict.calculate",
        json!({ "assignmentScores": [-1.0], "locale": "kk" }),
    );
    assert_eq!(error_code(&resp), "invalid_range");
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str()),
        Some("Барлық бағалар 0 және 10 арасында болуы керек")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn declared_maxima_gate_and_rescale_test_scores() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // One unit above the declared maximum is rejected.
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "predict.calculate",
        json!({ "testScores": [41.0], "testMaxima": [40.0] }),
    );
    assert_eq!(error_code(&resp), "score_exceeds_max");

    // Exactly the maximum is a perfect 10 on the canonical scale.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "predict.calculate",
        json!({ "testScores": [40.0], "testMaxima": [40.0] }),
    );
    assert!((result_percent(&resp) - 25.0).abs() < 1e-6);

    // Without maxima the canonical scale is assumed and overshoot
    // silently clamps to 10 — the same standing as above.
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "predict.calculate",
        json!({ "testScores": [12.0] }),
    );
    assert!((result_percent(&resp) - 25.0).abs() < 1e-6);

    // A maxima list of the wrong length is ignored, not an error.
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "predict.calculate",
        json!({ "testScores": [9.0, 9.0], "testMaxima": [40.0] }),
    );
    assert!((result_percent(&resp) - 22.5).abs() < 1e-6);

    // Negative raw values are invalid on any scale.
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "predict.calculate",
        json!({ "testScores": [-2.0] }),
    );
    assert_eq!(error_code(&resp), "invalid_range");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn final_maximum_rescales_the_final_exam() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "predict.calculate",
        json!({ "finalScore": 50.0, "finalMaximum": 100.0 }),
    );
    // Half marks on the final alone: 5 * 0.5 = 2.5 of 10.
    assert!((result_percent(&resp) - 25.0).abs() < 1e-6);

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "predict.calculate",
        json!({ "finalScore": 120.0, "finalMaximum": 100.0 }),
    );
    assert_eq!(error_code(&resp), "score_exceeds_max");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn structurally_broken_params_are_malformed_input() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "predict.calculate",
        json!({ "assignmentScores": "abc" }),
    );
    assert_eq!(error_code(&resp), "malformed_input");

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "predict.calculate",
        json!({ "assignmentScores": [7.0, "x"] }),
    );
    assert_eq!(error_code(&resp), "malformed_input");

    // Params that are not an object at all get the fixed rejection.
    let resp = request(&mut stdin, &mut reader, "3", "predict.calculate", json!(5));
    assert_eq!(error_code(&resp), "malformed_input");
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str()),
        Some("Invalid request")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn custom_weights_reshape_the_standing() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // Equal halves on assignments and tests, nothing on the final.
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "predict.calculate",
        json!({
            "assignmentScores": [8.0],
            "testScores": [6.0],
            "weightAssignmentsPercent": 50.0,
            "weightTestsPercent": 50.0,
            "weightFinalPercent": 0.0
        }),
    );
    assert!((result_percent(&resp) - 70.0).abs() < 1e-6);

    // The missing final carries no weight: no finite score helps, and
    // the prediction says so instead of dividing by zero.
    let tier5 = resp
        .get("result")
        .and_then(|r| r.get("predictions"))
        .and_then(|v| v.as_array())
        .map(|a| a[0].clone())
        .expect("prediction");
    assert_eq!(tier5.get("targetTier").and_then(|v| v.as_i64()), Some(5));
    assert!(tier5.get("neededScore").is_none());
    assert_eq!(tier5.get("missingWeight").and_then(|v| v.as_f64()), Some(0.0));
    assert_eq!(tier5.get("reachable").and_then(|v| v.as_bool()), Some(false));

    // All-zero weights fall back to the default 25/25/50 split.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "predict.calculate",
        json!({
            "assignmentScores": [8.0, 8.0],
            "testScores": [8.0, 8.0],
            "weightAssignmentsPercent": 0.0,
            "weightTestsPercent": 0.0,
            "weightFinalPercent": 0.0
        }),
    );
    let needed = resp
        .get("result")
        .and_then(|r| r.get("predictions"))
        .and_then(|v| v.as_array())
        .and_then(|a| a[0].get("neededScore"))
        .and_then(|v| v.as_f64())
        .expect("neededScore");
    assert!((needed - 5.0).abs() < 1e-6);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn custom_tier_tables_are_validated_and_applied() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "predict.calculate",
        json!({
            "assignmentScores": [10.0],
            "testScores": [10.0],
            "finalScore": 10.0,
            "tiers": [
                { "tier": 1, "minPercent": 0.0 },
                { "tier": 2, "minPercent": 0.5 }
            ]
        }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));
    let result = resp.get("result").expect("result");
    assert_eq!(result.get("currentTier").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(result.get("terminal").and_then(|v| v.as_bool()), Some(true));

    // A table without a floor step cannot classify everything.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "predict.calculate",
        json!({
            "tiers": [
                { "tier": 1, "minPercent": 0.2 },
                { "tier": 2, "minPercent": 0.5 }
            ]
        }),
    );
    assert_eq!(error_code(&resp), "malformed_input");

    drop(stdin);
    let _ = child.wait();
}
