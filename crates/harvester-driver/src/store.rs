use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::{MachineConfig, validate_machine_name};
use crate::{Error, Result};

const CONFIG_FILE: &str = "config.json";
const SSH_KEY_FILE: &str = "id_ed25519";

/// On-disk state for machines, one directory per machine:
///
/// ```text
/// <root>/machines/<name>/config.json
/// <root>/machines/<name>/id_ed25519
/// ```
///
/// Machine directories are created `0700` and configs written `0600` since
/// they hold cluster credentials.
#[derive(Debug, Clone)]
pub struct MachineStore {
    root: PathBuf,
}

impl MachineStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn machines_dir(&self) -> PathBuf {
        self.root.join("machines")
    }

    /// Fails for names that are not a single plain path component.
    pub fn machine_dir(&self, name: &str) -> Result<PathBuf> {
        validate_machine_name(name)?;
        Ok(self.machines_dir().join(name))
    }

    pub fn ssh_key_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.machine_dir(name)?.join(SSH_KEY_FILE))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.machine_dir(name)
            .map(|dir| dir.join(CONFIG_FILE).is_file())
            .unwrap_or(false)
    }

    pub async fn create_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.machine_dir(name)?;
        create_private_dir(&dir).await?;
        Ok(dir)
    }

    pub async fn save(&self, config: &MachineConfig) -> Result<()> {
        let dir = self.create_dir(&config.machine_name).await?;
        let body = serde_json::to_vec_pretty(config)?;
        write_private_file(&dir.join(CONFIG_FILE), &body).await?;
        debug!(machine = %config.machine_name, "saved machine config");
        Ok(())
    }

    pub async fn load(&self, name: &str) -> Result<MachineConfig> {
        let path = self.machine_dir(name)?.join(CONFIG_FILE);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::MachineNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&body)?)
    }

    /// Delete the machine's directory. Missing directories are fine.
    pub async fn remove(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_dir_all(self.machine_dir(name)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all machines with a saved config, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.machines_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str()
                && self.exists(name)
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

async fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await
}

async fn write_private_file(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(body).await?;
    file.flush().await?;

    // an existing file keeps its old mode on open
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}
