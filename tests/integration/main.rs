//! Integration tests for invowk-provision

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn invowk_provision(config_dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("invowk-provision");
        cmd.env("INVOWK_CONFIG", config_dir.join("config.toml"))
            .env_remove("INVOWK_PROVISION_TAG_SUFFIX");
        cmd
    }

    /// A temp dir holding a fake binary and one module
    fn inputs() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("invowk"), b"fake invowk binary").unwrap();
        let module = tmp.path().join("mods").join("example.invowkmod");
        fs::create_dir_all(&module).unwrap();
        fs::write(module.join("invowkmod.cue"), "module: \"example\"").unwrap();
        tmp
    }

    fn tag_args(tmp: &TempDir) -> Vec<String> {
        vec![
            "tag".to_string(),
            "debian:stable-slim".to_string(),
            "--binary".to_string(),
            tmp.path().join("invowk").display().to_string(),
            "--module-path".to_string(),
            tmp.path().join("mods").display().to_string(),
        ]
    }

    #[test]
    fn help_displays() {
        let tmp = TempDir::new().unwrap();
        invowk_provision(tmp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("cached container layers"));
    }

    #[test]
    fn version_displays() {
        let tmp = TempDir::new().unwrap();
        invowk_provision(tmp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("invowk-provision"));
    }

    #[test]
    fn tag_is_stable_and_content_addressed() {
        let tmp = inputs();
        let tag_pattern = predicate::str::is_match(r"^invowk-provisioned:[0-9a-f]{12}\n$").unwrap();

        let first = invowk_provision(tmp.path())
            .args(tag_args(&tmp))
            .assert()
            .success()
            .stdout(tag_pattern)
            .get_output()
            .stdout
            .clone();

        let second = invowk_provision(tmp.path())
            .args(tag_args(&tmp))
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        assert_eq!(first, second);

        fs::write(
            tmp.path()
                .join("mods")
                .join("example.invowkmod")
                .join("invowkmod.cue"),
            "module: \"changed\"",
        )
        .unwrap();
        let changed = invowk_provision(tmp.path())
            .args(tag_args(&tmp))
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        assert_ne!(first, changed);
    }

    #[test]
    fn tag_suffix_from_flag_and_env() {
        let tmp = inputs();

        invowk_provision(tmp.path())
            .args(tag_args(&tmp))
            .args(["--tag-suffix", "worker1"])
            .assert()
            .success()
            .stdout(predicate::str::is_match(r"^invowk-provisioned:[0-9a-f]{12}-worker1\n$").unwrap());

        invowk_provision(tmp.path())
            .args(tag_args(&tmp))
            .env("INVOWK_PROVISION_TAG_SUFFIX", "ci-42")
            .assert()
            .success()
            .stdout(predicate::str::ends_with("-ci-42\n"));
    }

    #[test]
    fn tag_fails_for_missing_binary() {
        let tmp = TempDir::new().unwrap();
        invowk_provision(tmp.path())
            .args(["tag", "debian:stable-slim", "--binary"])
            .arg(tmp.path().join("missing"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn invalid_tag_suffix_rejected() {
        let tmp = inputs();
        invowk_provision(tmp.path())
            .args(tag_args(&tmp))
            .args(["--tag-suffix", "not valid"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("tag_suffix"));
    }

    #[test]
    fn config_path_honors_flag() {
        let tmp = TempDir::new().unwrap();
        let custom = tmp.path().join("custom.toml");
        invowk_provision(tmp.path())
            .arg("--config")
            .arg(&custom)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let tmp = TempDir::new().unwrap();
        invowk_provision(tmp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[container.auto_provision]"));
    }

    #[test]
    fn invalid_config_reports_path() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "container = [").unwrap();
        invowk_provision(tmp.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("config.toml"));
    }

    #[test]
    fn run_requires_command() {
        let tmp = TempDir::new().unwrap();
        invowk_provision(tmp.path())
            .args(["run", "--image", "debian:stable-slim"])
            .assert()
            .failure();
    }
}
