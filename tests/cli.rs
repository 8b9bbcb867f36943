use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_cli_builds_package() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Setup: a small data tree and a post-install script
    let input = tempdir()?;
    fs::create_dir_all(input.path().join("usr/bin"))?;
    fs::write(input.path().join("usr/bin/tool"), b"binary")?;
    let scripts = tempdir()?;
    let postinst = scripts.path().join("postinst.sh");
    fs::write(&postinst, b"#!/bin/sh\nexit 0\n")?;
    let output = tempdir()?;

    // 2. Build
    let mut cmd = Command::cargo_bin("ipkbuild")?;
    cmd.args(["-n", "tool", "-v", "2.1", "-a", "mips"])
        .arg("--depends").arg("libc")
        .arg("--desc").arg("A tool")
        .arg("--postinst").arg(&postinst)
        .arg("-i").arg(input.path())
        .arg("-o").arg(output.path())
        .arg("--timestamp").arg("1700000000")
        .arg("--log-level").arg("debug");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("tool-2.1-").and(predicate::str::contains("-mips.ipk")))
        .stderr(predicate::str::contains("package built"));

    // 3. Exactly one package in the output directory
    let produced: Vec<_> = fs::read_dir(output.path())?.collect::<Result<_, _>>()?;
    assert_eq!(produced.len(), 1);
    let name = produced[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("tool-2.1-") && name.ends_with("-mips.ipk"), "{name}");
    let stamp = &name["tool-2.1-".len()..name.len() - "-mips.ipk".len()];
    assert_eq!(stamp.len(), 10);
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    Ok(())
}

#[test]
fn test_cli_missing_version_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let input = tempdir()?;
    let output = tempdir()?;
    let out_dir = output.path().join("not-yet");

    let mut cmd = Command::cargo_bin("ipkbuild")?;
    cmd.args(["-n", "tool", "-a", "all"])
        .arg("-i").arg(input.path())
        .arg("-o").arg(&out_dir);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration").and(predicate::str::contains("--version")));

    assert!(!out_dir.exists());
    Ok(())
}

#[test]
fn test_cli_missing_input_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
    let base = tempdir()?;
    let output = base.path().join("out");
    fs::create_dir(&output)?;

    let mut cmd = Command::cargo_bin("ipkbuild")?;
    cmd.args(["-n", "tool", "-v", "1", "-a", "all"])
        .arg("-i").arg(base.path().join("nope"))
        .arg("-o").arg(&output);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("input directory not found"));

    assert_eq!(fs::read_dir(&output)?.count(), 0);
    Ok(())
}

#[test]
fn test_cli_source_date_epoch_pins_build() -> Result<(), Box<dyn std::error::Error>> {
    let input = tempdir()?;
    fs::write(input.path().join("file.txt"), b"same")?;

    let mut packages = Vec::new();
    for _ in 0..2 {
        let output = tempdir()?;
        let mut cmd = Command::cargo_bin("ipkbuild")?;
        cmd.env("SOURCE_DATE_EPOCH", "1600000000")
            .args(["-n", "pin", "-v", "1", "-a", "all"])
            .arg("-i").arg(input.path())
            .arg("-o").arg(output.path());
        cmd.assert().success();

        let entry = fs::read_dir(output.path())?.next().expect("one package")?;
        packages.push((entry.file_name(), fs::read(entry.path())?));
    }

    assert_eq!(packages[0], packages[1]);
    Ok(())
}

#[test]
fn test_cli_bad_source_date_epoch() -> Result<(), Box<dyn std::error::Error>> {
    let input = tempdir()?;
    let output = tempdir()?;

    let mut cmd = Command::cargo_bin("ipkbuild")?;
    cmd.env("SOURCE_DATE_EPOCH", "yesterday")
        .args(["-n", "pin", "-v", "1", "-a", "all"])
        .arg("-i").arg(input.path())
        .arg("-o").arg(output.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("SOURCE_DATE_EPOCH"));
    Ok(())
}
