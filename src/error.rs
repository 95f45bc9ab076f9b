use crate::db::StoreError;
use crate::uploads::UploadError;

pub const CREATE_ERROR: &str = "There was a problem creating this blog. Please try again.";
pub const UPDATE_ERROR: &str = "There was a problem updating this blog. Please try again.";
pub const DELETE_ERROR: &str = "There was a problem deleting this blog. Please try again.";

/// Errors surfaced by the blog repository to the request handler.
#[derive(Debug, thiserror::Error)]
pub enum BlogError {
    #[error("{0}")]
    CreationFailed(String),
    #[error("{0}")]
    UpdateFailed(String),
    #[error("{0}")]
    DeletionFailed(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("featured image: {0}")]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type BlogResult<T> = Result<T, BlogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages_are_user_facing() {
        let err = BlogError::CreationFailed(CREATE_ERROR.to_string());
        assert_eq!(err.to_string(), CREATE_ERROR);
    }

    #[test]
    fn test_upload_errors_convert() {
        let err: BlogError = UploadError::EmptyFile.into();
        assert_eq!(err.to_string(), "featured image: empty file");
    }
}
