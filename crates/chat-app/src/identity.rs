use std::path::{Path, PathBuf};

use courier_protocol::{User, WireUser};
use snafu::ResultExt;

use crate::error::{
    AuthRequiredSnafu, ChatResult, InvalidIdentitySnafu, ParseIdentitySnafu, ReadIdentitySnafu,
    RemoveIdentitySnafu, SerializeIdentitySnafu, StoreIdentitySnafu,
};
use crate::persist;

pub const IDENTITY_FILE_NAME: &str = "identity.json";

/// Persisted identity of the signed-in user.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(IDENTITY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_user(&self) -> ChatResult<User> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return AuthRequiredSnafu {
                    stage: "identity-read",
                    path: self.path.clone(),
                }
                .fail();
            }
            Err(source) => {
                return Err(source).context(ReadIdentitySnafu {
                    stage: "identity-read",
                    path: self.path.clone(),
                });
            }
        };

        Self::decode(&raw, &self.path)
    }

    /// Validates and stores the identity found in `source`, returning it.
    pub fn import_from(&self, source: &Path) -> ChatResult<User> {
        let raw = std::fs::read_to_string(source).context(ReadIdentitySnafu {
            stage: "identity-import-read",
            path: source.to_path_buf(),
        })?;
        let user = Self::decode(&raw, source)?;
        self.save(&user)?;
        Ok(user)
    }

    pub fn save(&self, user: &User) -> ChatResult<()> {
        let content = serde_json::to_string_pretty(&WireUser::from(user)).context(
            SerializeIdentitySnafu {
                stage: "identity-serialize",
                user_id: user.id.to_string(),
            },
        )?;
        persist::replace_file(&self.path, &content).context(StoreIdentitySnafu {
            stage: "identity-save",
        })?;

        tracing::info!(user_id = %user.id, "saved identity to {:?}", self.path);
        Ok(())
    }

    /// Forgets the signed-in user. Missing files are fine.
    pub fn clear(&self) -> ChatResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(source).context(RemoveIdentitySnafu {
                stage: "identity-clear",
                path: self.path.clone(),
            }),
        }
    }

    fn decode(raw: &str, path: &Path) -> ChatResult<User> {
        let wire: WireUser = serde_json::from_str(raw).context(ParseIdentitySnafu {
            stage: "identity-parse",
            path: path.to_path_buf(),
        })?;
        User::try_from(wire).context(InvalidIdentitySnafu {
            stage: "identity-validate",
            path: path.to_path_buf(),
        })
    }
}
