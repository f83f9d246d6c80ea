use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_jetfit"))
}

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("jetfit_cli_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn assert_artifact_contract(v: &serde_json::Value) {
    let status = v.get("status").and_then(|x| x.as_i64()).expect("status should be an integer");
    assert!((0..=3).contains(&status), "unexpected status code {status}");

    let cov_status = v
        .get("covariance_status")
        .and_then(|x| x.as_i64())
        .expect("covariance_status should be an integer");
    assert!((0..=3).contains(&cov_status));

    let min_value =
        v.get("min_value").and_then(|x| x.as_f64()).expect("min_value should be a number");
    assert!(min_value.is_finite(), "min_value must be finite");

    let parameters = v
        .get("parameters")
        .and_then(|x| x.as_array())
        .expect("parameters should be an array");
    assert!(!parameters.is_empty(), "parameters should be non-empty");
    for p in parameters {
        assert!(p.get("name").and_then(|x| x.as_str()).is_some());
        assert!(p.get("value").and_then(|x| x.as_f64()).is_some());
        assert!(p.get("error").and_then(|x| x.as_f64()).is_some());
    }

    let cov = v
        .get("covariance_matrix")
        .and_then(|x| x.as_array())
        .expect("covariance_matrix should be an array");
    assert_eq!(cov.len(), parameters.len(), "covariance dimension must match parameters");
    for row in cov {
        let row = row.as_array().expect("covariance row should be an array");
        assert_eq!(row.len(), parameters.len());
    }

    let ndf = v.get("ndf").and_then(|x| x.as_u64()).expect("ndf should be an integer");
    assert!(ndf > 0);

    let p_value = v.get("p_value").and_then(|x| x.as_f64()).expect("p_value should be a number");
    assert!((0.0..=1.0).contains(&p_value));
}

#[test]
fn fit_writes_artifact() {
    let input = fixture_path("photonjet.json");
    assert!(input.exists(), "missing fixture: {}", input.display());
    let output = tmp_path("fit.json");

    let out = run(&[
        "--input",
        input.to_string_lossy().as_ref(),
        "--output",
        output.to_string_lossy().as_ref(),
        "--verbosity",
        "0",
    ]);
    assert!(
        out.status.success(),
        "fit should succeed, stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let text = std::fs::read_to_string(&output).expect("output file should exist");
    let v: serde_json::Value = serde_json::from_str(&text).expect("output should be valid JSON");
    assert_artifact_contract(&v);

    assert_eq!(v.get("variant").and_then(|x| x.as_str()), Some("PtBal"));
    assert_eq!(v.get("corr_form").and_then(|x| x.as_str()), Some("2p"));
    assert_eq!(v.get("period").and_then(|x| x.as_str()), Some(""));
    assert!(v.get("constraint").map(|x| x.is_null()).unwrap_or(false));

    // Fixture ratios were generated from the 2p form: the fit should
    // describe them essentially perfectly.
    let p_value = v.get("p_value").and_then(|x| x.as_f64()).unwrap();
    assert!(p_value > 0.99, "p_value {p_value}");

    std::fs::remove_file(&output).ok();
}

#[test]
fn constraint_adds_one_degree_of_freedom() {
    let input = fixture_path("photonjet.json");
    let plain_out = tmp_path("plain.json");
    let constrained_out = tmp_path("constrained.json");

    let out = run(&[
        "--input",
        input.to_string_lossy().as_ref(),
        "--output",
        plain_out.to_string_lossy().as_ref(),
        "--verbosity",
        "0",
    ]);
    assert!(out.status.success());

    let out = run(&[
        "--input",
        input.to_string_lossy().as_ref(),
        "--output",
        constrained_out.to_string_lossy().as_ref(),
        "--constraint",
        "208,1.02,0.01",
        "--verbosity",
        "0",
    ]);
    assert!(out.status.success());

    let plain: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&plain_out).unwrap()).unwrap();
    let constrained: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&constrained_out).unwrap()).unwrap();

    let plain_ndf = plain.get("ndf").and_then(|x| x.as_u64()).unwrap();
    let constrained_ndf = constrained.get("ndf").and_then(|x| x.as_u64()).unwrap();
    assert_eq!(constrained_ndf, plain_ndf + 1);
    assert_eq!(
        constrained.get("constraint").and_then(|x| x.as_str()),
        Some("208,1.02,0.01")
    );

    std::fs::remove_file(&plain_out).ok();
    std::fs::remove_file(&constrained_out).ok();
}

#[test]
fn mpf_method_selects_other_bins() {
    let input = fixture_path("photonjet.json");
    let output = tmp_path("mpf.json");

    let out = run(&[
        "--input",
        input.to_string_lossy().as_ref(),
        "--output",
        output.to_string_lossy().as_ref(),
        "--method",
        "MPF",
        "--verbosity",
        "0",
    ]);
    assert!(out.status.success());

    let v: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(v.get("variant").and_then(|x| x.as_str()), Some("MPF"));
    assert_artifact_contract(&v);

    std::fs::remove_file(&output).ok();
}

#[test]
fn unknown_method_fails() {
    let input = fixture_path("photonjet.json");
    let out = run(&["--input", input.to_string_lossy().as_ref(), "--method", "ptbal"]);
    assert!(!out.status.success(), "unsupported method must fail");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unsupported measurement method"), "stderr: {stderr}");
}

#[test]
fn malformed_constraint_fails() {
    let input = fixture_path("photonjet.json");
    let out = run(&[
        "--input",
        input.to_string_lossy().as_ref(),
        "--constraint",
        "1.0",
    ]);
    assert!(!out.status.success(), "malformed constraint must fail");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("malformed constraint"), "stderr: {stderr}");
}
