use assert_cmd::Command;
use predicates::prelude::*;

fn concilia_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("concilia"))
}

fn run_ok(home: &tempfile::TempDir, args: &[&str]) {
    let mut cmd = concilia_cmd();
    cmd.env("CONCILIA_HOME", home.path());
    cmd.args(args);
    cmd.assert().success();
}

fn run_ok_out(home: &tempfile::TempDir, args: &[&str]) -> String {
    let mut cmd = concilia_cmd();
    cmd.env("CONCILIA_HOME", home.path());
    cmd.args(args);
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).expect("utf8 stdout")
}

fn uuids_in(out: &str) -> Vec<String> {
    out.split(|c: char| !(c.is_ascii_hexdigit() || c == '-'))
        .filter(|t| t.len() == 36 && t.chars().filter(|c| *c == '-').count() == 4)
        .map(String::from)
        .collect()
}

fn add_merchant(home: &tempfile::TempDir) -> String {
    let out = run_ok_out(
        home,
        &[
            "merchant",
            "add",
            "Kiosco Central",
            "--commission",
            "10",
            "--hold-hours",
            "24",
        ],
    );
    uuids_in(&out).pop().expect("merchant id")
}

#[test]
fn receipt_auto_matches_on_name_despite_word_order() {
    let home = tempfile::tempdir().expect("tempdir");
    let merchant = add_merchant(&home);

    run_ok(
        &home,
        &[
            "credit",
            "add",
            "bank-001",
            "1000",
            "--name",
            "Juan Perez",
            "--tax-id",
            "20123456789",
            "--at",
            "2024-06-04T12:00:00Z",
        ],
    );

    let out = run_ok_out(
        &home,
        &[
            "receipt",
            "add",
            "1000",
            "--name",
            "Pérez Juan",
            "--at",
            "2024-06-04T12:02:00Z",
            "--merchant",
            &merchant,
        ],
    );
    assert!(out.contains("matched credit"));
    assert!(out.contains("score 85"));
    assert!(out.contains("Commission 100 (10%)"));

    let out = run_ok_out(&home, &["credit", "list", "--unmatched"]);
    assert!(out.contains("(no credits)"));

    let out = run_ok_out(&home, &["receipt", "list"]);
    assert!(out.contains("matched"));
}

#[test]
fn amount_and_time_alone_never_auto_match() {
    let home = tempfile::tempdir().expect("tempdir");
    let merchant = add_merchant(&home);

    // Credit with no payer data: only amount and time can score.
    run_ok(
        &home,
        &[
            "credit",
            "add",
            "bank-002",
            "500",
            "--at",
            "2024-06-04T12:00:00Z",
        ],
    );

    let out = run_ok_out(
        &home,
        &[
            "receipt",
            "add",
            "500",
            "--name",
            "Juan Perez",
            "--at",
            "2024-06-04T12:05:00Z",
            "--merchant",
            &merchant,
        ],
    );
    assert!(out.contains("left pending"));

    let out = run_ok_out(&home, &["credit", "list", "--unmatched"]);
    assert!(out.contains("bank-002"));
}

#[test]
fn matched_credit_is_excluded_from_later_attempts() {
    let home = tempfile::tempdir().expect("tempdir");
    let merchant = add_merchant(&home);

    run_ok(
        &home,
        &[
            "credit",
            "add",
            "bank-003",
            "750",
            "--name",
            "Maria Gomez",
            "--at",
            "2024-06-04T12:00:00Z",
        ],
    );

    let out = run_ok_out(
        &home,
        &[
            "receipt",
            "add",
            "750",
            "--name",
            "Maria Gomez",
            "--at",
            "2024-06-04T12:01:00Z",
            "--merchant",
            &merchant,
        ],
    );
    assert!(out.contains("matched credit"));

    // A later receipt for the same transfer finds no candidate left.
    let out = run_ok_out(
        &home,
        &[
            "receipt",
            "add",
            "750",
            "--name",
            "Maria Gomez",
            "--at",
            "2024-06-04T13:00:00Z",
            "--merchant",
            &merchant,
        ],
    );
    assert!(out.contains("left pending"));
}

#[test]
fn duplicate_receipt_in_window_is_a_conflict() {
    let home = tempfile::tempdir().expect("tempdir");
    let merchant = add_merchant(&home);

    run_ok(
        &home,
        &[
            "receipt",
            "add",
            "300",
            "--name",
            "Juan Perez",
            "--at",
            "2024-06-04T12:00:00Z",
            "--merchant",
            &merchant,
        ],
    );

    let mut cmd = concilia_cmd();
    cmd.env("CONCILIA_HOME", home.path());
    cmd.args([
        "receipt",
        "add",
        "300",
        "--name",
        "Perez Juan",
        "--at",
        "2024-06-04T12:03:00Z",
        "--merchant",
        &merchant,
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("duplicate"));
}

#[test]
fn repeat_external_id_is_rejected() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(
        &home,
        &[
            "credit",
            "add",
            "bank-004",
            "100",
            "--at",
            "2024-06-04T12:00:00Z",
        ],
    );

    let mut cmd = concilia_cmd();
    cmd.env("CONCILIA_HOME", home.path());
    cmd.args([
        "credit",
        "add",
        "bank-004",
        "100",
        "--at",
        "2024-06-04T12:00:00Z",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("duplicate"));
}

#[test]
fn receipt_needs_name_or_tax_id() {
    let home = tempfile::tempdir().expect("tempdir");
    let merchant = add_merchant(&home);

    let mut cmd = concilia_cmd();
    cmd.env("CONCILIA_HOME", home.path());
    cmd.args([
        "receipt",
        "add",
        "100",
        "--at",
        "2024-06-04T12:00:00Z",
        "--merchant",
        &merchant,
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("name or a tax id"));
}

#[test]
fn malformed_timestamp_is_rejected() {
    let home = tempfile::tempdir().expect("tempdir");

    let mut cmd = concilia_cmd();
    cmd.env("CONCILIA_HOME", home.path());
    cmd.args(["credit", "add", "bank-005", "100", "--at", "yesterday"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid RFC3339"));
}

#[test]
fn manual_match_and_unmatch_round_trip() {
    let home = tempfile::tempdir().expect("tempdir");
    let merchant = add_merchant(&home);

    let out = run_ok_out(
        &home,
        &[
            "credit",
            "add",
            "bank-006",
            "900",
            "--at",
            "2024-06-04T12:00:00Z",
        ],
    );
    let credit = uuids_in(&out).pop().expect("credit id");

    let out = run_ok_out(
        &home,
        &[
            "receipt",
            "add",
            "900",
            "--name",
            "Juan Perez",
            "--at",
            "2024-06-05T12:00:00Z",
            "--merchant",
            &merchant,
        ],
    );
    assert!(out.contains("left pending"));
    let receipt = uuids_in(&out).pop().expect("receipt id");

    let out = run_ok_out(&home, &["match", "set", &receipt, &credit]);
    assert!(out.contains("Linked receipt"));

    // The credit is taken; matching anything else against it conflicts.
    let out2 = run_ok_out(
        &home,
        &[
            "receipt",
            "add",
            "900",
            "--name",
            "Otro Cliente",
            "--at",
            "2024-06-06T12:00:00Z",
            "--merchant",
            &merchant,
        ],
    );
    let other = uuids_in(&out2).pop().expect("receipt id");
    let mut cmd = concilia_cmd();
    cmd.env("CONCILIA_HOME", home.path());
    cmd.args(["match", "set", &other, &credit]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("already matched"));

    run_ok(&home, &["match", "unset", &credit]);
    let out = run_ok_out(&home, &["credit", "list", "--unmatched"]);
    assert!(out.contains("bank-006"));
}
