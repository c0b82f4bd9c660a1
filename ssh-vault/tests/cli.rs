use anyhow::Result;
use assert_cmd::Command;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const PASSPHRASE: &str = "cli integration passphrase";

fn vault_cmd(home: &Path, passphrase: &str) -> Result<Command> {
    let mut cmd = Command::cargo_bin("ssh-vault")?;
    cmd.env("SSH_VAULT_HOME", home)
        .env("SSH_VAULT_DIR", home.join("vault"))
        .env("SSH_VAULT_KDF_ITERATIONS", "1000")
        .env("SSH_VAULT_PASSPHRASE", passphrase)
        .env_remove("RUST_LOG");
    Ok(cmd)
}

fn seed_ssh_dir(home: &Path) -> Result<()> {
    let ssh = home.join(".ssh");
    fs::create_dir_all(&ssh)?;
    fs::write(ssh.join("id_ed25519"), b"KEY-A")?;
    fs::write(ssh.join("id_ed25519.pub"), b"PUB-A")?;
    Ok(())
}

#[test]
fn weak_passphrase_fails_without_writing() -> Result<()> {
    let home = tempdir()?;
    seed_ssh_dir(home.path())?;

    let output = vault_cmd(home.path(), "short")?.arg("backup").output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"), "stderr: {stderr}");
    assert!(stderr.contains("at least 16 characters"), "stderr: {stderr}");
    assert!(!home.path().join("vault").exists());
    Ok(())
}

#[test]
fn backup_then_restore_roundtrip() -> Result<()> {
    let home = tempdir()?;
    seed_ssh_dir(home.path())?;

    let backup = vault_cmd(home.path(), PASSPHRASE)?.arg("backup").output()?;
    assert!(backup.status.success(), "{}", String::from_utf8_lossy(&backup.stderr));
    let stdout = String::from_utf8_lossy(&backup.stdout);
    assert!(stdout.contains("created:"), "stdout: {stdout}");

    let again = vault_cmd(home.path(), PASSPHRASE)?.arg("backup").output()?;
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).starts_with("unchanged:"));

    fs::write(home.path().join(".ssh").join("id_ed25519"), b"CLOBBERED")?;

    let restore = vault_cmd(home.path(), PASSPHRASE)?.arg("restore").output()?;
    assert!(restore.status.success(), "{}", String::from_utf8_lossy(&restore.stderr));
    let stdout = String::from_utf8_lossy(&restore.stdout);
    assert!(stdout.contains("restored:"), "stdout: {stdout}");
    assert!(stdout.contains("next: ssh -T git@github.com"), "stdout: {stdout}");

    assert_eq!(fs::read(home.path().join(".ssh").join("id_ed25519"))?, b"KEY-A");
    Ok(())
}

#[test]
fn restore_without_backup_fails() -> Result<()> {
    let home = tempdir()?;

    let output = vault_cmd(home.path(), PASSPHRASE)?.arg("restore").output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("backup not found"));
    Ok(())
}

#[test]
fn status_reports_up_to_date() -> Result<()> {
    let home = tempdir()?;
    seed_ssh_dir(home.path())?;

    let before = vault_cmd(home.path(), PASSPHRASE)?.arg("status").output()?;
    assert!(before.status.success());
    assert!(String::from_utf8_lossy(&before.stdout).contains("up-to-date: no"));

    vault_cmd(home.path(), PASSPHRASE)?.arg("backup").assert().success();

    let after = vault_cmd(home.path(), PASSPHRASE)?.arg("status").output()?;
    let stdout = String::from_utf8_lossy(&after.stdout);
    assert!(stdout.contains("up-to-date: yes"), "stdout: {stdout}");
    assert!(stdout.contains("blob-sha256: ok"), "stdout: {stdout}");
    Ok(())
}
