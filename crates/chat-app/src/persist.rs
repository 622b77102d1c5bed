use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PersistError {
    #[snafu(display("failed to create {path:?} on `{stage}`: {source}"))]
    CreateParent {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to write {path:?} on `{stage}`: {source}"))]
    WriteTemporary {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to move {from:?} over {to:?} on `{stage}`: {source}"))]
    Replace {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// Writes `content` beside `path`, then renames it into place. Readers see the
/// previous file or the new one, never a partial write.
pub fn replace_file(path: &Path, content: &str) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context(CreateParentSnafu {
            stage: "persist-create-parent",
            path: parent,
        })?;
    }

    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, content).context(WriteTemporarySnafu {
        stage: "persist-write-temporary",
        path: &temp_path,
    })?;
    std::fs::rename(&temp_path, path).context(ReplaceSnafu {
        stage: "persist-replace",
        from: &temp_path,
        to: path,
    })?;

    Ok(())
}
