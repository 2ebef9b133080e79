use std::{
    io::Write,
    process::{Command, Output, Stdio},
};

fn pyc(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_pyc"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // El proceso puede terminar sin leer su entrada
    if let Some(mut pipe) = child.stdin.take() {
        let _ = pipe.write_all(stdin.as_bytes());
    }

    child.wait_with_output().unwrap()
}

#[test]
fn c_goes_to_stdout() {
    let output = pyc(&["-"], "return 4\n");
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(output.status.success());
    assert!(stdout.contains("int main(void)\n{\n\treturn (int) 4;\n}\n"));
    assert!(output.stderr.is_empty());
}

#[test]
fn platform_selection() {
    let output = pyc(&["--platform", "console-md"], "wait_vblank()\n");
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(output.status.success());
    assert!(stdout.contains("\tSYS_doVBlankProcess();\n"));
}

#[test]
fn diagnostics_go_to_stderr() {
    let output = pyc(&[], "x = 1\nfrobnicate(x)\n");
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(stderr.contains("Unknown function `frobnicate`"));
    assert!(stderr.contains("<stdin>:[2:1-2:10]"));
}

#[test]
fn unknown_platform() {
    let output = pyc(&["-p", "gameboy"], "return 0\n");
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Unknown platform `gameboy`"));
}

#[test]
fn lists_platforms() {
    let output = pyc(&["--list-platforms"], "");
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(output.status.success());
    assert!(stdout.contains("desktop-process"));
    assert!(stdout.contains("console-md"));
}

#[test]
fn dumps_tokens() {
    let output = pyc(&["--dump-tokens"], "x = 1\n");
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert!(output.status.success());
    assert!(stderr.contains("<stdin>:1:1: identifier `x`"));
}
