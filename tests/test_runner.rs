use std::{path::Path, process::Output};

use assert_cmd::Command;
use pretty_assertions::assert_eq;

include!(concat!(env!("OUT_DIR"), "/test_files.rs"));

const EXPECT: &str = "// expect: ";
const EXPECT_ERROR: &str = "// expect runtime error: ";

fn do_test(filename: &Path) {
    let content = std::fs::read_to_string(filename)
        .unwrap_or_else(|_| panic!("failed to read {}", filename.display()));

    let expected = find_expects(&content, EXPECT).join("\n");
    let expected_error = find_expects(&content, EXPECT_ERROR).pop();

    let output = run_file(filename);

    let stdout = String::from_utf8(output.stdout).unwrap();
    let stdout = stdout.trim_end();

    let stderr = String::from_utf8(output.stderr).unwrap();
    let stderr = stderr.trim_end();

    assert_eq!(expected, stdout, "stderr={}", stderr);

    match expected_error {
        Some(error) => {
            assert_eq!(output.status.code(), Some(70), "stderr={}", stderr);
            assert_eq!(stderr.lines().last(), Some(error.as_str()));
        }
        None => assert!(output.status.success(), "stderr={}", stderr),
    }
}

fn run_file(filename: &Path) -> Output {
    let mut cmd = Command::cargo_bin("corvid").unwrap();
    cmd.arg(filename).env_remove("CORVID_LOG").output().unwrap()
}

fn find_expects(content: &str, marker: &str) -> Vec<String> {
    let mut result = vec![];
    for line in content.lines() {
        let Some((idx, _)) = line.match_indices(marker).last() else {
            continue;
        };
        let target = &line[idx + marker.len()..];
        result.push(target.into());
    }

    result
}
