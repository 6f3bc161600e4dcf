//! Filesystem storage for uploaded avatar images.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use imagesize::ImageError;
use mime_guess::mime;
use thiserror::Error;
use uuid::Uuid;

use crate::config::UploadSettings;

const AVATAR_SUBDIR: &str = "avatars";

/// Errors raised while validating or persisting an uploaded avatar.
#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error("uploaded file is not a supported image")]
    NotAnImage,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed storage for user avatars.
///
/// Files land under `<uploads>/avatars` and are served back through the
/// static uploads route, so `store` returns the public path to persist on
/// the profile.
#[derive(Debug, Clone)]
pub struct AvatarStore {
    directory: PathBuf,
    public_base: String,
}

impl AvatarStore {
    /// Initialise storage under the configured uploads directory, creating
    /// it if necessary.
    pub fn new(settings: &UploadSettings) -> Result<Self, std::io::Error> {
        let directory = settings.directory.join(AVATAR_SUBDIR);
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            public_base: format!("{}/{AVATAR_SUBDIR}", settings.public_base),
        })
    }

    /// Validate and store an avatar payload, returning its public path.
    ///
    /// The stored name is a fresh UUID with the original extension, so
    /// repeated uploads never collide and older avatars stay resolvable.
    pub fn store(&self, original_name: &str, data: &Bytes) -> Result<String, AvatarError> {
        if data.is_empty() {
            return Err(AvatarError::EmptyPayload);
        }

        let extension = image_extension(original_name).ok_or(AvatarError::NotAnImage)?;
        match imagesize::blob_size(data) {
            Ok(_) => {}
            Err(ImageError::NotSupported | ImageError::CorruptedImage) => {
                return Err(AvatarError::NotAnImage);
            }
            Err(ImageError::IoError(err)) => return Err(AvatarError::Io(err)),
        }

        let filename = format!("{}.{extension}", Uuid::new_v4());
        let target = self.directory.join(&filename);

        // Stage in the same directory so the final rename is atomic.
        let mut staged = tempfile::Builder::new().tempfile_in(&self.directory)?;
        staged.write_all(data)?;
        staged.flush()?;
        staged
            .persist(&target)
            .map_err(|err| AvatarError::Io(err.error))?;

        Ok(format!("{}/{filename}", self.public_base))
    }
}

fn image_extension(original_name: &str) -> Option<String> {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())?;

    let guess = mime_guess::from_ext(&extension).first()?;
    (guess.type_() == mime::IMAGE).then_some(extension)
}
