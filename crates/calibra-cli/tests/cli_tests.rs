//! End-to-end tests for the `calibra` binary.

use std::io::Write;

use approx::assert_relative_eq;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn calibra() -> Command {
    let mut cmd = Command::cargo_bin("calibra").unwrap();
    cmd.env_remove("CALIBRA_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn line_csv() -> NamedTempFile {
    let mut content = String::from("x,y\n");
    for i in 0..6 {
        let x = f64::from(i);
        content.push_str(&format!("{},{}\n", x, 1.5 - 0.5 * x));
    }
    write_file(&content)
}

fn swaps_csv() -> NamedTempFile {
    write_file("tenor,rate\n1,3.0\n2,3.5\n5,4.0\n10,4.2\n")
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_fit_linear_table() {
    let data = line_csv();
    calibra()
        .args(["fit", "--data"])
        .arg(data.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("intercept"))
        .stdout(predicate::str::contains("slope"))
        .stdout(predicate::str::contains("Degrees of freedom"));
}

#[test]
fn test_fit_linear_json() {
    let data = line_csv();
    let report = json_output(
        calibra()
            .args(["--format", "json", "fit", "--model", "linear", "--data"])
            .arg(data.path()),
    );

    assert_eq!(report["model"], "linear");
    assert_eq!(report["degrees_of_freedom"], 4);
    let intercept = report["parameters"][0]["value"].as_f64().unwrap();
    let slope = report["parameters"][1]["value"].as_f64().unwrap();
    assert_relative_eq!(intercept, 1.5, epsilon = 1e-9);
    assert_relative_eq!(slope, -0.5, epsilon = 1e-9);
}

#[test]
fn test_fit_residuals_csv() {
    let data = line_csv();
    calibra()
        .args(["-f", "csv", "fit", "--residuals", "--data"])
        .arg(data.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "x,observed,fitted,normalized_residual",
        ));
}

#[test]
fn test_fit_rejects_unknown_model() {
    let data = line_csv();
    calibra()
        .args(["fit", "--model", "cubic", "--data"])
        .arg(data.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid model"));
}

#[test]
fn test_fit_reports_missing_file() {
    calibra()
        .args(["fit", "--data", "does-not-exist.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_smooth_json() {
    let data = line_csv();
    let report = json_output(
        calibra()
            .args(["-f", "json", "smooth", "--intervals", "6", "--eval", "0,2.5,5", "--data"])
            .arg(data.path()),
    );

    assert_eq!(report["basis_functions"], 9);
    let fitted: Vec<f64> = report["points"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["fitted"].as_f64().unwrap())
        .collect();
    for (value, expected) in fitted.iter().zip([1.5, 0.25, -1.0]) {
        assert_relative_eq!(*value, expected, epsilon = 1e-6);
    }
}

#[test]
fn test_smooth_rejects_points_outside_data() {
    let data = line_csv();
    calibra()
        .args(["smooth", "--eval", "7", "--data"])
        .arg(data.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside the data range"));
}

#[test]
fn test_bootstrap_every_update() {
    let data = swaps_csv();
    for update in ["full", "broyden", "sherman-morrison"] {
        let report = json_output(
            calibra()
                .args(["-f", "json", "bootstrap", "--percent", "--update", update, "--data"])
                .arg(data.path()),
        );
        assert!(report["residual_norm"].as_f64().unwrap() < 1e-8);
        let pillars = report["pillars"].as_array().unwrap();
        assert_eq!(pillars.len(), 4);
        assert_relative_eq!(
            pillars[0]["zero_rate"].as_f64().unwrap(),
            0.0295588022,
            epsilon = 1e-7
        );
    }
}

#[test]
fn test_bootstrap_csv() {
    let data = swaps_csv();
    calibra()
        .args(["-f", "csv", "bootstrap", "--percent", "--decomposition", "qr", "--data"])
        .arg(data.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "tenor,par_rate,zero_rate,discount_factor",
        ));
}

#[test]
fn test_bootstrap_rejects_fractional_tenor() {
    let data = write_file("tenor,rate\n0.5,0.03\n");
    calibra()
        .args(["bootstrap", "--data"])
        .arg(data.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("whole number of years"));
}

#[test]
fn test_config_defaults_as_toml() {
    calibra()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[solver]"))
        .stdout(predicate::str::contains("[least_squares]"));
}

#[test]
fn test_config_csv_is_dotted_records() {
    calibra()
        .args(["-f", "csv", "config"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("key,value\n"))
        .stdout(predicate::str::contains("least_squares.decomposition,svd"))
        .stdout(predicate::str::contains("solver.line_search.max_steps,30"));
}

#[test]
fn test_config_file_overrides() {
    let config = write_file("[solver]\ntolerance = 1e-10\nupdate = \"full\"\n");
    let report = json_output(
        calibra()
            .args(["-f", "json", "config", "--config"])
            .arg(config.path()),
    );
    assert_eq!(report["solver"]["tolerance"].as_f64(), Some(1e-10));
    assert_eq!(report["solver"]["update"], "full");
    assert_eq!(report["least_squares"]["decomposition"], "svd");
}

#[test]
fn test_config_from_environment() {
    let config = write_file("[least_squares]\nmax_iterations = 12\n");
    let report = json_output(
        calibra()
            .args(["-f", "json", "config"])
            .env("CALIBRA_CONFIG", config.path()),
    );
    assert_eq!(report["least_squares"]["max_iterations"], 12);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = write_file("[least_squares]\ndamping_factor = 0.5\n");
    calibra()
        .args(["config", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
