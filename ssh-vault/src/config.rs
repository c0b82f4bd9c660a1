//! Configuration management for the SSH vault.
//!
//! Built-in defaults, then an optional TOML file, then environment variables
//! (a `.env` file is honored). The resolved [`Config`] is passed explicitly to
//! every orchestrator; nothing below reads the environment on its own.

use crate::fs::walker::WalkOptions;
use crate::utils::errors::{IoResultExt, Result, VaultError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Environment variable holding the backup passphrase.
pub const PASSPHRASE_ENV: &str = "SSH_VAULT_PASSPHRASE";

/// Minimum accepted passphrase length, in characters.
pub const MIN_PASSPHRASE_LEN: usize = 16;

pub const DEFAULT_KDF_ITERATIONS: u32 = 250_000;

pub const DEFAULT_MAX_DEPTH: usize = 32;

const BACKUP_FILE_NAME: &str = "ssh-keys.tar.enc";
const METADATA_FILE_NAME: &str = "ssh-keys.meta.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub crypto: CryptoConfig,
    /// Hosts rendered into the managed block of `~/.ssh/config`
    pub hosts: Vec<HostEntry>,
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Home directory containing the live credential directory
    pub home: PathBuf,

    /// Live credential directory (default: `<home>/.ssh`)
    pub ssh_dir: PathBuf,

    /// Directory holding the encrypted blob and its sidecar
    pub vault_dir: PathBuf,

    /// Encrypted backup blob
    pub backup_file: PathBuf,

    /// JSON metadata sidecar
    pub metadata_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// PBKDF2-HMAC-SHA-256 iteration count
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Deepest directory level walked during fingerprinting, packing and normalization
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Name used in `Host <alias>` and in `ssh -T git@<alias>`
    pub alias: String,

    /// Real hostname the alias resolves to
    pub hostname: String,

    #[serde(default = "default_user")]
    pub user: String,

    pub identity_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_kdf_iterations() -> u32 {
    DEFAULT_KDF_ITERATIONS
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_user() -> String {
    "git".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_identity() -> String {
    "~/.ssh/id_ed25519".to_string()
}

fn default_vault_dir() -> PathBuf {
    PathBuf::from("vault").join("ssh")
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: default_kdf_iterations(),
            max_depth: default_max_depth(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl HostEntry {
    pub fn new(alias: &str, hostname: &str, identity_file: &str) -> Self {
        Self {
            alias: alias.to_string(),
            hostname: hostname.to_string(),
            user: default_user(),
            identity_file: identity_file.to_string(),
        }
    }
}

/// The two forges managed out of the box.
pub fn default_hosts() -> Vec<HostEntry> {
    vec![
        HostEntry::new("github.com", "github.com", &default_identity()),
        HostEntry::new("codeberg.org", "codeberg.org", &default_identity()),
    ]
}

/// On-disk shape of the TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    paths: PathsFile,
    crypto: Option<CryptoConfig>,
    hosts: Option<Vec<HostEntry>>,
    log: Option<LogConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathsFile {
    home: Option<PathBuf>,
    ssh_dir: Option<PathBuf>,
    vault_dir: Option<PathBuf>,
    backup_file: Option<PathBuf>,
    metadata_file: Option<PathBuf>,
}

impl ConfigFile {
    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).at(path)?;
        toml::from_str(&content)
            .map_err(|e| VaultError::Config(format!("{}: {}", path.display(), e)))
    }
}

impl Config {
    /// Defaults rooted at an explicit home and vault directory.
    pub fn with_home(home: impl Into<PathBuf>, vault_dir: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let vault_dir = vault_dir.into();
        Config {
            paths: PathsConfig {
                ssh_dir: home.join(".ssh"),
                backup_file: vault_dir.join(BACKUP_FILE_NAME),
                metadata_file: vault_dir.join(METADATA_FILE_NAME),
                home,
                vault_dir,
            },
            crypto: CryptoConfig::default(),
            hosts: default_hosts(),
            log: LogConfig::default(),
        }
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            max_depth: self.crypto.max_depth,
        }
    }

    /// Load configuration from an optional TOML file plus the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let parsed = match file {
            Some(path) => ConfigFile::read(path)?,
            None => ConfigFile::default(),
        };

        Self::resolve(parsed, |key| std::env::var(key).ok())
    }

    /// Load configuration from a TOML string, with environment lookups supplied by `env`.
    pub fn from_toml_str<F>(content: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed: ConfigFile =
            toml::from_str(content).map_err(|e| VaultError::Config(e.to_string()))?;
        Self::resolve(parsed, env)
    }

    fn resolve<F>(file: ConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_path = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        let home = env_path("SSH_VAULT_HOME")
            .or(file.paths.home)
            .or_else(|| env_path("HOME"))
            .ok_or_else(|| {
                VaultError::PrerequisiteMissing(
                    "home directory is unknown; set HOME or SSH_VAULT_HOME".to_string(),
                )
            })?;

        let vault_dir = absolutize(
            env_path("SSH_VAULT_DIR")
                .or(file.paths.vault_dir)
                .unwrap_or_else(default_vault_dir),
        )?;

        let mut config = Config::with_home(home, vault_dir);

        if let Some(ssh_dir) = env_path("SSH_VAULT_SSH_DIR").or(file.paths.ssh_dir) {
            config.paths.ssh_dir = ssh_dir;
        }
        if let Some(backup_file) = env_path("SSH_VAULT_BACKUP_FILE").or(file.paths.backup_file) {
            config.paths.backup_file = absolutize(backup_file)?;
        }
        if let Some(metadata_file) =
            env_path("SSH_VAULT_METADATA_FILE").or(file.paths.metadata_file)
        {
            config.paths.metadata_file = absolutize(metadata_file)?;
        }

        if let Some(crypto) = file.crypto {
            config.crypto = crypto;
        }
        if let Some(raw) = env("SSH_VAULT_KDF_ITERATIONS") {
            config.crypto.kdf_iterations = raw.trim().parse().map_err(|_| {
                VaultError::Config(format!("SSH_VAULT_KDF_ITERATIONS is not a number: {raw}"))
            })?;
        }
        if config.crypto.kdf_iterations == 0 {
            return Err(VaultError::Config(
                "kdf_iterations must be greater than zero".to_string(),
            ));
        }

        match file.hosts {
            Some(hosts) => config.hosts = hosts,
            None => apply_host_overrides(&mut config.hosts, &env),
        }

        if let Some(log) = file.log {
            config.log = log;
        }
        if let Some(level) = env("SSH_VAULT_LOG_LEVEL") {
            config.log.level = level;
        }

        Ok(config)
    }
}

/// Environment overrides for the built-in hosts, keyed by an uppercase prefix.
fn apply_host_overrides<F>(hosts: &mut [HostEntry], env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    for host in hosts.iter_mut() {
        let prefix = match host.hostname.as_str() {
            "github.com" => "SSH_VAULT_GITHUB",
            "codeberg.org" => "SSH_VAULT_CODEBERG",
            _ => continue,
        };
        if let Some(alias) = env(&format!("{prefix}_HOST_ALIAS")) {
            host.alias = alias;
        }
        if let Some(hostname) = env(&format!("{prefix}_HOSTNAME")) {
            host.hostname = hostname;
        }
        if let Some(identity) = env(&format!("{prefix}_IDENTITY")) {
            host.identity_file = identity;
        }
    }
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    std::path::absolute(&path).at(&path)
}

/// Backup passphrase. Wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Read the passphrase from `SSH_VAULT_PASSPHRASE`; empty when unset.
    pub fn from_env() -> Self {
        Self::new(std::env::var(PASSPHRASE_ENV).unwrap_or_default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.chars().count() < MIN_PASSPHRASE_LEN {
            return Err(VaultError::WeakPassphrase {
                min: MIN_PASSPHRASE_LEN,
            });
        }
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_home() {
        let config = Config::from_toml_str("", env_from(&[("HOME", "/home/dev")])).unwrap();

        assert_eq!(config.paths.home, PathBuf::from("/home/dev"));
        assert_eq!(config.paths.ssh_dir, PathBuf::from("/home/dev/.ssh"));
        assert!(config.paths.vault_dir.is_absolute());
        assert!(config.paths.backup_file.ends_with("vault/ssh/ssh-keys.tar.enc"));
        assert!(config.paths.metadata_file.ends_with("vault/ssh/ssh-keys.meta.json"));
        assert_eq!(config.crypto.kdf_iterations, 250_000);
        assert_eq!(config.hosts, default_hosts());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_missing_home_is_prerequisite_error() {
        let err = Config::from_toml_str("", env_from(&[])).unwrap_err();
        assert!(matches!(err, VaultError::PrerequisiteMissing(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        let toml = r#"
            [paths]
            home = "/home/file"
            backup_file = "/srv/file.enc"

            [crypto]
            kdf_iterations = 1000
        "#;
        let env = env_from(&[
            ("SSH_VAULT_BACKUP_FILE", "/srv/env.enc"),
            ("SSH_VAULT_KDF_ITERATIONS", "2000"),
            ("HOME", "/home/env"),
        ]);
        let config = Config::from_toml_str(toml, env).unwrap();

        // HOME is only a fallback; the file value wins over it.
        assert_eq!(config.paths.home, PathBuf::from("/home/file"));
        assert_eq!(config.paths.backup_file, PathBuf::from("/srv/env.enc"));
        assert_eq!(config.crypto.kdf_iterations, 2000);
        assert_eq!(config.crypto.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_host_overrides_from_env() {
        let env = env_from(&[
            ("HOME", "/home/dev"),
            ("SSH_VAULT_GITHUB_HOST_ALIAS", "github.com-work"),
            ("SSH_VAULT_CODEBERG_IDENTITY", "~/.ssh/id_codeberg"),
        ]);
        let config = Config::from_toml_str("", env).unwrap();

        assert_eq!(config.hosts[0].alias, "github.com-work");
        assert_eq!(config.hosts[0].hostname, "github.com");
        assert_eq!(config.hosts[1].identity_file, "~/.ssh/id_codeberg");
    }

    #[test]
    fn test_hosts_from_file() {
        let toml = r#"
            [[hosts]]
            alias = "gitlab-work"
            hostname = "gitlab.com"
            identity_file = "~/.ssh/id_work"
        "#;
        let config = Config::from_toml_str(toml, env_from(&[("HOME", "/h")])).unwrap();

        assert_eq!(config.hosts.len(), 1);
        assert_eq!(config.hosts[0].user, "git");
        assert_eq!(config.hosts[0].hostname, "gitlab.com");
    }

    #[test]
    fn test_invalid_iterations_rejected() {
        let env = env_from(&[("HOME", "/h"), ("SSH_VAULT_KDF_ITERATIONS", "lots")]);
        assert!(matches!(
            Config::from_toml_str("", env),
            Err(VaultError::Config(_))
        ));

        let env = env_from(&[("HOME", "/h"), ("SSH_VAULT_KDF_ITERATIONS", "0")]);
        assert!(matches!(
            Config::from_toml_str("", env),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = Config::from_toml_str("[paths]\nhomedir = \"/x\"\n", env_from(&[("HOME", "/h")]));
        assert!(matches!(result, Err(VaultError::Config(_))));
    }

    #[test]
    fn test_passphrase_validation() {
        assert!(Passphrase::new("short").validate().is_err());
        assert!(Passphrase::new("exactly-16-chars").validate().is_ok());
        assert!(matches!(
            Passphrase::new("").validate(),
            Err(VaultError::WeakPassphrase { min: 16 })
        ));
    }

    #[test]
    fn test_passphrase_debug_is_redacted() {
        let pass = Passphrase::new("correct horse battery staple");
        let printed = format!("{:?}", pass);
        assert!(!printed.contains("horse"));
    }
}
