//! File-based storage, the default durable backend

use directories::ProjectDirs;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::storage::{KeyStorage, StorageError, DB_NAME};

/// Attempts at create-if-absent before giving up on a racing delete
const MAX_LINK_ATTEMPTS: usize = 3;

/// File-based storage under the per-user data directory
///
/// Layout: `<base_dir>/<namespace>/<key>`, directories 0700, files 0600.
/// Every write goes to a temporary file first and is then renamed (replace)
/// or hard-linked (create-if-absent) into place, so a record is either fully
/// written or not there at all.
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "dpop", "dpop-client").ok_or_else(|| {
            StorageError::Backend("Could not determine data directory".to_string())
        })?;

        Ok(Self::with_base_dir(dirs.data_local_dir().join(DB_NAME)))
    }

    /// Create with a custom base directory
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.base_dir.join(sanitize(namespace))
    }

    fn key_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.namespace_dir(namespace).join(sanitize(key))
    }
}

/// Strip path separators and dots so names cannot escape the base directory
fn sanitize(name: &str) -> String {
    name.replace(['/', '\\', '.'], "_")
}

fn create_private_dir(dir: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}

fn read_file(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(Some(contents))
}

/// Write `value` to a fresh temporary file next to `path`
fn write_temp(path: &Path, value: &[u8]) -> Result<PathBuf, StorageError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StorageError::Backend(format!("Invalid path {}", path.display())))?;
    let temp_path = path.with_file_name(format!(".{}.tmp.{}", file_name, Uuid::new_v4()));

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let result = options.open(&temp_path).and_then(|mut file| {
        file.write_all(value)?;
        file.sync_all()
    });

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(temp_path)
}

/// Flush the directory entry so a completed rename/link survives a crash
fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

fn replace_file(path: &Path, value: &[u8]) -> Result<(), StorageError> {
    let temp_path = write_temp(path, value)?;

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// Link a temp file into place; the link fails if `path` already exists
fn create_file_if_absent(path: &Path, value: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
    for _ in 0..MAX_LINK_ATTEMPTS {
        let temp_path = write_temp(path, value)?;
        let linked = fs::hard_link(&temp_path, path);
        let _ = fs::remove_file(&temp_path);

        match linked {
            Ok(()) => {
                if let Some(parent) = path.parent() {
                    sync_dir(parent)?;
                }
                return Ok(None);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Deleted between the failed link and this read: try again
                if let Some(existing) = read_file(path)? {
                    return Ok(Some(existing));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(StorageError::Backend(format!(
        "Record {} kept changing during create",
        path.display()
    )))
}

async fn run_blocking<T, F>(task: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StorageError::Backend(format!("Storage task failed: {}", e)))?
}

#[async_trait]
impl KeyStorage for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.key_path(namespace, key);
        run_blocking(move || read_file(&path)).await
    }

    async fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let dir = self.namespace_dir(namespace);
        let path = self.key_path(namespace, key);
        let value = value.to_vec();

        debug!(path = %path.display(), "Writing record");
        run_blocking(move || {
            create_private_dir(&dir)?;
            replace_file(&path, &value)
        })
        .await
    }

    async fn put_if_absent(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let dir = self.namespace_dir(namespace);
        let path = self.key_path(namespace, key);
        let value = value.to_vec();

        debug!(path = %path.display(), "Creating record if absent");
        run_blocking(move || {
            create_private_dir(&dir)?;
            create_file_if_absent(&path, &value)
        })
        .await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let path = self.key_path(namespace, key);

        run_blocking(move || {
            let size = match fs::metadata(&path) {
                Ok(metadata) => metadata.len() as usize,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(e.into()),
            };

            // Overwrite with zeros before deleting (basic secure delete)
            if let Ok(mut file) = OpenOptions::new().write(true).open(&path) {
                let _ = file.write_all(&vec![0u8; size]);
                let _ = file.sync_all();
            }

            fs::remove_file(&path)?;
            Ok(true)
        })
        .await
    }
}
