use assert_cmd::Command;
use predicates::prelude::*;

fn native() -> Command {
    Command::cargo_bin("kiwix-native").unwrap()
}

#[test]
fn help_exits_zero() {
    native()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--toolchain"));
}

#[test]
fn unknown_flag_exits_one() {
    native().arg("--compile-everything").assert().code(1);
}

#[test]
fn plan_lists_selected_steps_in_order() {
    native()
        .args(["--plan", "--strip", "--lzma"])
        .assert()
        .success()
        .stdout(
            predicate::str::is_match("(?s)lzma .*Compile liblzma.*strip .*Strip libkiwix.so")
                .unwrap(),
        )
        .stdout(predicate::str::contains("toolchain").not());
}

#[test]
fn unknown_architecture_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    native()
        .args(["--locales", "--on", "arm64", "--project-dir"])
        .arg(dir.path())
        .env_remove("RUST_LOG")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("arm64"));
}
