//! PDF evidence students attach to their enrolments.

use crate::{
    auth::Actor,
    cfg::UploadSettings,
    error::{CampusError, IOAction, IOSnafu},
    state::db::CampusDb,
};
use chrono::Utc;
use snafu::ResultExt;
use std::{io::ErrorKind, path::PathBuf};
use tokio::fs::{create_dir_all, read, remove_file, write};

pub const PDF_MIME: &str = "application/pdf";

async fn remove_if_present(path: PathBuf) -> Result<(), CampusError> {
    match remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(?path, "Evidence file was already gone");
            Ok(())
        }
        Err(source) => Err(CampusError::IO {
            source,
            action: IOAction::DeletingFile(path),
        }),
    }
}

/// Stores a new file for an enrolment, replacing any previous one. The new file is removed again
/// if the enrolment can't be updated to point at it.
#[instrument(level = "debug", skip(db, settings, bytes), fields(len = bytes.len()))]
pub async fn store_evidence(
    db: &CampusDb,
    settings: &UploadSettings,
    event_id: i32,
    user_id: i32,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<PathBuf, CampusError> {
    if content_type != Some(PDF_MIME) {
        return Err(CampusError::InvalidUpload {
            reason: "only application/pdf files are accepted",
        });
    }
    if bytes.is_empty() {
        return Err(CampusError::InvalidUpload {
            reason: "the file is empty",
        });
    }
    if bytes.len() > settings.max_bytes {
        return Err(CampusError::InvalidUpload {
            reason: "the file is too large",
        });
    }

    let previous = db
        .enrolment(event_id, user_id)
        .await?
        .ok_or(CampusError::EnrolmentNotFound { event_id, user_id })?
        .file_pdf;

    create_dir_all(&settings.directory).await.context(IOSnafu {
        action: IOAction::CreatingDirectory(settings.directory.clone()),
    })?;
    let path = settings.directory.join(format!(
        "{event_id}_{user_id}_{}.pdf",
        Utc::now().timestamp_micros()
    ));
    write(&path, bytes).await.context(IOSnafu {
        action: IOAction::WritingFile(path.clone()),
    })?;

    let stored = db
        .set_evidence_file(event_id, user_id, Some(path.to_string_lossy().into_owned()))
        .await;
    match stored {
        Ok(true) => {}
        Ok(false) => {
            remove_if_present(path).await?;
            return Err(CampusError::EnrolmentNotFound { event_id, user_id });
        }
        Err(e) => {
            if let Err(cleanup) = remove_if_present(path).await {
                error!(?cleanup, "Unable to remove orphaned evidence file");
            }
            return Err(e);
        }
    }

    if let Some(previous) = previous {
        remove_if_present(PathBuf::from(previous)).await?;
    }

    info!(?path, "Stored evidence");
    Ok(path)
}

/// The student themselves, their certifier, or an admin may read the file.
#[instrument(level = "debug", skip(db))]
pub async fn fetch_evidence(
    db: &CampusDb,
    actor: Actor,
    event_id: i32,
    user_id: i32,
) -> Result<Vec<u8>, CampusError> {
    let enrolment = db
        .enrolment(event_id, user_id)
        .await?
        .ok_or(CampusError::EnrolmentNotFound { event_id, user_id })?;

    if actor.id != user_id && actor.id != enrolment.certifier && !actor.is_admin() {
        return Err(CampusError::NotCreator {
            event_id,
            user_id: actor.id,
        });
    }

    let path = PathBuf::from(
        enrolment
            .file_pdf
            .ok_or(CampusError::EvidenceNotFound { event_id, user_id })?,
    );
    read(&path).await.context(IOSnafu {
        action: IOAction::ReadingFile(path.clone()),
    })
}
