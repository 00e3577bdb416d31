use std::fs;
use std::process::{Command, Output};

fn parledger(args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_parledger"))
        .args(args)
        .output()
        .expect("Failed to execute parledger");

    if !output.status.success() {
        eprintln!("stdout: {}", String::from_utf8_lossy(&output.stdout));
        eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
        panic!("parledger {:?} failed", args);
    }
    output
}

#[test]
fn test_bank_pass_with_ledger() {
    let output = parledger(&[
        "bank", "--accounts", "25", "-j", "4", "--seed", "42", "--ledger", "-q",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("Opened 25 accounts"));
    assert!(stdout.contains("Using 4 worker threads"));
    assert!(stdout.contains("Applied interest to 25 records in"));
    assert_eq!(stdout.matches("Bank Ledger:").count(), 2);
    assert!(stdout.contains("\tAccount 25: "));
}

#[test]
fn test_bank_serial_matches_parallel_totals() {
    let total_after = |extra: &[&str]| {
        let mut args = vec!["bank", "--accounts", "500", "--seed", "7", "-q"];
        args.extend_from_slice(extra);
        let output = parledger(&args);
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .find(|l| l.starts_with("Total after interest:"))
            .map(str::to_string)
            .expect("missing total line")
    };

    assert_eq!(total_after(&["--serial"]), total_after(&["-j", "3"]));
}

#[test]
fn test_dirsum_without_path_prints_usage() {
    let output = parledger(&["dirsum"]);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "There are no command line arguments."
    );
}

#[test]
fn test_dirsum_missing_directory() {
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("missing");
    let output = parledger(&["dirsum", missing.to_str().unwrap()]);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "The directory does not exist."
    );
}

#[test]
fn test_dirsum_totals() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("one.bin"), vec![1u8; 1500]).unwrap();
    fs::create_dir(root.path().join("sub")).unwrap();
    fs::write(root.path().join("sub").join("two.bin"), vec![2u8; 700]).unwrap();

    let output = parledger(&["dirsum", root.path().to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 files, 2,200 bytes"), "{}", stdout);

    let output = parledger(&["dirsum", "--shallow", root.path().to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 files, 1,500 bytes"), "{}", stdout);
}

#[test]
fn test_tasks_demo_runs() {
    let output = parledger(&["tasks"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Hello, from a Task"));
    assert!(stdout.contains("We are #2 in line and our message is Three"));
    assert!(stdout.contains("PlayerCharacter"));
}
