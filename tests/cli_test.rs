use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_sbp_payment_with_welcome_offer() {
    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.arg("1000.00").arg("--offer").arg("WELCOME10");

    // 10% capped at 50.00: final amount 950.00, awaiting the webhook.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("payment url: "))
        .stdout(predicate::str::contains("\"final_amount\": \"950.00\""))
        .stdout(predicate::str::contains("\"status\": \"processing\""));
}

#[test]
fn test_simulated_webhook_completes_the_payment() {
    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.arg("1000.00")
        .arg("--offer")
        .arg("WELCOME10")
        .arg("--simulate-webhook");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("payment verified successfully"))
        .stdout(predicate::str::contains("\"status\": \"completed\""));
}

#[test]
fn test_amount_below_offer_minimums_gets_no_discount() {
    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.arg("5.00");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"total_discount\": \"0\""))
        .stdout(predicate::str::contains("\"final_amount\": \"5.00\""));
}

#[test]
fn test_zero_amount_is_rejected() {
    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.arg("0");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("outside the accepted range"));
}

#[test]
fn test_wallet_payment_completes_in_process() {
    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.arg("100.00").arg("--method").arg("wallet");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"completed\""));
}
