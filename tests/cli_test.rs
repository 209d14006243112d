//! CLI Integration Tests
//!
//! Runs the `s3-adaptor` binary for commands that need no network.

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn offline_config() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
client:
  region: us-east-1
  endpoint: http://localhost:9000
  force_path_style: true
  auth:
    type: static
    access_key_id: AKIDEXAMPLE
    secret_access_key: secret
"#
        )
        .unwrap();
        file
    }

    fn cli() -> Command {
        Command::cargo_bin("s3-adaptor").unwrap()
    }

    #[test]
    fn test_help_lists_commands() {
        cli()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("presign"))
            .stdout(predicate::str::contains("buckets"));
    }

    #[test]
    fn test_presign_prints_url() {
        let config = offline_config();
        cli()
            .arg("--config")
            .arg(config.path())
            .args(["presign", "reports", "q1.csv", "--expires", "5"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with(
                "http://localhost:9000/reports/q1.csv?",
            ))
            .stdout(predicate::str::contains("X-Amz-Expires=300"));
    }

    #[test]
    fn test_presign_rejects_unknown_method() {
        let config = offline_config();
        cli()
            .arg("--config")
            .arg(config.path())
            .args(["presign", "reports", "q1.csv", "--method", "DELETE"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("ValidationError"));
    }

    #[test]
    fn test_malformed_option_pair() {
        let config = offline_config();
        cli()
            .arg("--config")
            .arg(config.path())
            .args(["ls", "reports", "-o", "maxKeys"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("expected name=value"));
    }

    #[test]
    fn test_missing_config_file() {
        cli()
            .args(["--config", "/nonexistent/s3-adaptor.yaml", "buckets"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("loading configuration"));
    }
}
