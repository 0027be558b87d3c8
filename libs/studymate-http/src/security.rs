//! HTTP security limits.

/// Maximum number of body bytes kept as a preview in [`HttpError::HttpStatus`].
///
/// [`HttpError::HttpStatus`]: crate::HttpError::HttpStatus
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 4 * 1024;
