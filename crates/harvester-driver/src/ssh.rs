use std::path::Path;

use tokio::process::Command;
use tracing::info;

use crate::{Error, Result};

/// Generate an ed25519 key pair at `path` (and `path.pub`) with `ssh-keygen`
/// and return the public key line.
pub async fn generate_key(path: &Path, comment: &str) -> Result<String> {
    let output = Command::new("ssh-keygen")
        .args(["-q", "-t", "ed25519", "-N", "", "-C", comment, "-f"])
        .arg(path)
        .output()
        .await
        .map_err(|e| Error::SshKey(format!("running ssh-keygen: {e}")))?;

    if !output.status.success() {
        return Err(Error::SshKey(format!(
            "ssh-keygen failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    info!(path = %path.display(), "generated ssh key");
    read_public_key(&public_key_path(path)).await
}

/// Copy an existing private key into the machine directory, readable by
/// the owner only.
pub async fn copy_private_key(src: &Path, dest: &Path) -> Result<()> {
    tokio::fs::copy(src, dest)
        .await
        .map_err(|e| Error::SshKey(format!("copying {}: {e}", src.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(())
}

pub async fn read_public_key(path: &Path) -> Result<String> {
    let key = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::SshKey(format!("reading {}: {e}", path.display())))?;
    Ok(key.trim().to_string())
}

pub fn public_key_path(private_key: &Path) -> std::path::PathBuf {
    let mut name = private_key.as_os_str().to_owned();
    name.push(".pub");
    name.into()
}
