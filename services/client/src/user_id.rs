//! Persisted client identity, generated once and reused across runs.

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::info;
use uuid::Uuid;

const USER_ID_PREFIX: &str = "user_";

#[derive(Debug, thiserror::Error)]
pub enum UserIdError {
    #[error("Failed to read user id from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to write user id to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

pub struct UserIdStore {
    path: PathBuf,
}

impl UserIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored identifier, creating and persisting a fresh one when
    /// none exists (or the stored value is blank).
    pub fn load_or_create(&self) -> Result<String, UserIdError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let stored = contents.trim();
                if !stored.is_empty() {
                    return Ok(stored.to_string());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(UserIdError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        }

        let user_id = generate();
        self.persist(&user_id)?;
        info!(user_id = %user_id, path = %self.path.display(), "Generated new user id.");
        Ok(user_id)
    }

    fn persist(&self, user_id: &str) -> Result<(), UserIdError> {
        let write_err = |source| UserIdError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&self.path, user_id).map_err(write_err)
    }
}

fn generate() -> String {
    format!("{}{}", USER_ID_PREFIX, Uuid::new_v4().simple())
}
