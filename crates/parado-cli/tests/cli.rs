use assert_cmd::Command;
use insta::assert_snapshot;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn parado(cwd: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("parado"));
    cmd.current_dir(cwd)
        .env_remove("GEMINI_API_KEY")
        .env_remove("API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("PARADO_PROVIDER")
        .env_remove("PARADO_ENGINE")
        .env_remove("PARADO_LOG");
    cmd
}

#[test]
fn eval_prints_result() {
    let dir = tempdir().expect("tempdir should work");
    parado(dir.path())
        .args(["eval", "1+2+3"])
        .assert()
        .success()
        .stdout(contains("6"));
}

#[test]
fn eval_prints_console_output() {
    let dir = tempdir().expect("tempdir should work");
    parado(dir.path())
        .args(["eval", "console.log('hello from eval'); console.error('to stderr')"])
        .assert()
        .success()
        .stdout(contains("hello from eval"))
        .stderr(contains("to stderr"));
}

#[test]
fn run_directory_prefers_main_js() {
    let dir = tempdir().expect("tempdir should work");
    fs::write(dir.path().join("a.js"), "console.log('from a')").expect("write should work");
    fs::write(dir.path().join("main.js"), "console.log('from main')").expect("write should work");

    parado(dir.path())
        .args(["run", "."])
        .assert()
        .success()
        .stdout(contains("from main").and(contains("from a").not()));
}

#[test]
fn run_entry_flag_selects_file() {
    let dir = tempdir().expect("tempdir should work");
    fs::write(dir.path().join("a.js"), "40 + 2").expect("write should work");
    fs::write(dir.path().join("main.js"), "console.log('from main')").expect("write should work");

    parado(dir.path())
        .args(["run", ".", "--entry", "a.js"])
        .assert()
        .success()
        .stdout(contains("42"));
}

#[test]
fn run_failure_exits_nonzero_with_message() {
    let dir = tempdir().expect("tempdir should work");
    let path = dir.path().join("bad.js");
    fs::write(&path, "console.log('before'); throw new Error('boom')").expect("write should work");

    parado(dir.path())
        .args(["run", path.to_str().expect("path utf8")])
        .assert()
        .failure()
        .stdout(contains("before"))
        .stderr(contains("boom"));
}

#[test]
fn installed_package_from_package_dir_is_required() {
    let dir = tempdir().expect("tempdir should work");
    let packages = dir.path().join("pkgs");
    fs::create_dir(&packages).expect("mkdir should work");
    fs::write(packages.join("triple.js"), "module.exports = (n) => n * 3;")
        .expect("write should work");
    fs::write(
        dir.path().join("parado.json"),
        r#"{ "package_dir": "pkgs", "packages": ["triple"] }"#,
    )
    .expect("write should work");
    fs::write(dir.path().join("main.js"), "require('triple')(14)").expect("write should work");

    parado(dir.path())
        .args(["run", "main.js"])
        .assert()
        .success()
        .stdout(contains("42"));
}

#[test]
fn ask_without_keys_reports_disabled_features() {
    let dir = tempdir().expect("tempdir should work");
    let path = dir.path().join("main.js");
    fs::write(&path, "let a = 1;").expect("write should work");

    parado(dir.path())
        .args(["ask", "explain", "main.js", "--prompt", "what is this?"])
        .assert()
        .success()
        .stdout(contains("AI features are disabled"));
}

#[test]
fn ask_rejects_unknown_mode() {
    let dir = tempdir().expect("tempdir should work");
    fs::write(dir.path().join("main.js"), "1").expect("write should work");

    parado(dir.path())
        .args(["ask", "poetry", "main.js"])
        .assert()
        .failure()
        .stderr(contains("unknown assist mode 'poetry'"));
}

#[test]
fn generate_without_keys_leaves_file_untouched() {
    let dir = tempdir().expect("tempdir should work");
    let path = dir.path().join("main.js");
    fs::write(&path, "let a = 1;").expect("write should work");

    parado(dir.path())
        .args(["generate", "main.js", "--prompt", "add a function"])
        .assert()
        .success()
        .stdout(contains("AI features are disabled"));
    assert_eq!(fs::read_to_string(&path).expect("read"), "let a = 1;");
}

#[test]
fn agent_without_keys_reports_disabled_features() {
    let dir = tempdir().expect("tempdir should work");
    fs::write(dir.path().join("main.js"), "1").expect("write should work");

    parado(dir.path())
        .args(["agent", ".", "create a hello world file"])
        .assert()
        .success()
        .stdout(contains("AI features are disabled"))
        .stderr(contains("no file changes"));
}

#[test]
fn config_parse_error_is_reported() {
    let dir = tempdir().expect("tempdir should work");
    fs::write(dir.path().join("parado.json"), "{ \"provider\":\n").expect("write should work");
    fs::write(dir.path().join("main.js"), "1").expect("write should work");

    parado(dir.path())
        .args(["run", "main.js"])
        .assert()
        .failure()
        .stderr(contains("failed parsing config file"));
}

#[test]
fn unknown_engine_is_rejected() {
    let dir = tempdir().expect("tempdir should work");
    parado(dir.path())
        .env("PARADO_ENGINE", "v8")
        .args(["eval", "1+1"])
        .assert()
        .failure()
        .stderr(contains("unknown engine 'v8'"));
}

#[test]
fn shell_runs_active_file_and_lists_files() {
    let dir = tempdir().expect("tempdir should work");
    fs::write(dir.path().join("main.js"), "console.log('shell run')").expect("write should work");

    parado(dir.path())
        .args(["shell", "."])
        .write_stdin(".files\n.run\n.exit\n")
        .assert()
        .success()
        .stdout(
            contains("* main.js")
                .and(contains("Execution started: main.js"))
                .and(contains("shell run"))
                .and(contains("Process finished successfully.")),
        );
}

#[test]
fn shell_refuses_to_delete_last_file() {
    let dir = tempdir().expect("tempdir should work");
    fs::write(dir.path().join("main.js"), "1").expect("write should work");

    parado(dir.path())
        .args(["shell", "."])
        .write_stdin(".rm main.js\n.exit\n")
        .assert()
        .success()
        .stderr(contains("cannot delete the last remaining file"));
    assert!(dir.path().join("main.js").exists());
}

#[test]
fn shell_saves_new_files() {
    let dir = tempdir().expect("tempdir should work");
    fs::write(dir.path().join("main.js"), "1").expect("write should work");

    parado(dir.path())
        .args(["shell", "."])
        .write_stdin(".new util.js\n.save\n.exit\n")
        .assert()
        .success()
        .stdout(contains("created util.js"));
    assert!(dir.path().join("util.js").exists());
}

#[test]
fn shell_help_lists_commands() {
    let dir = tempdir().expect("tempdir should work");
    fs::write(dir.path().join("main.js"), "1").expect("write should work");

    let output = parado(dir.path())
        .args(["shell", "."])
        .write_stdin(".help\n.exit\n")
        .output()
        .expect("command should run");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let start = stdout.find("Shell commands:").expect("help header");
    let end_marker = "Any other line is sent to the agent.";
    let end = stdout.find(end_marker).expect("help footer") + end_marker.len();
    assert_snapshot!(&stdout[start..end], @r"
    Shell commands:
      .help                 show this help
      .files                list files (* marks the active one)
      .open <file>          make a file active
      .new [file]           create a file
      .rm <file>            delete a file
      .show                 print the active file
      .run                  run the active file
      .log                  print the console log
      .clear                clear the console log
      .ask <mode> [prompt]  debug | optimize | explain | generate
      .gen <prompt>         generate code into the active file
      .inject               append code from the last answer
      .install <package>    install a package for require()
      .packages             list installed packages
      .save                 write files back to disk
      .exit                 quit
    Any other line is sent to the agent.
    ");
}
