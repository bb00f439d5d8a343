use thiserror::Error;

/// Largest content accepted over the realtime channel. Image and file
/// messages carry their payload inline, so this matches the transport's
/// frame limit rather than a text length.
pub const MAX_CONTENT_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("value must not be negative")]
    Negative,
    #[error("invalid format")]
    InvalidFormat,
}

pub fn validate_message_content(content: &str) -> Result<(), ValidationError> {
    let len = content.len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > MAX_CONTENT_BYTES {
        return Err(ValidationError::TooLong {
            max: MAX_CONTENT_BYTES,
            got: len,
        });
    }
    Ok(())
}

pub fn validate_file_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(ValidationError::TooLong {
            max: MAX_FILE_NAME_LEN,
            got: name.len(),
        });
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(ValidationError::InvalidFormat);
    }
    Ok(())
}

pub fn validate_file_size(size: i64) -> Result<(), ValidationError> {
    if size < 0 {
        return Err(ValidationError::Negative);
    }
    Ok(())
}

/// User ids are opaque strings issued by the identity service.
pub fn validate_user_id(id: &str) -> Result<(), ValidationError> {
    let len = id.len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 64 {
        return Err(ValidationError::TooLong { max: 64, got: len });
    }
    if id.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_bounds() {
        assert!(validate_message_content("hi").is_ok());
        assert_eq!(
            validate_message_content(""),
            Err(ValidationError::TooShort { min: 1, got: 0 })
        );
        let big = "x".repeat(MAX_CONTENT_BYTES + 1);
        assert!(matches!(
            validate_message_content(&big),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn file_names_reject_paths() {
        assert!(validate_file_name("report.pdf").is_ok());
        assert_eq!(
            validate_file_name("../etc/passwd"),
            Err(ValidationError::InvalidFormat)
        );
        assert!(validate_file_name("   ").is_err());
    }

    #[test]
    fn user_ids_are_non_blank_tokens() {
        assert!(validate_user_id("65f1c0ffee").is_ok());
        assert!(validate_user_id("").is_err());
        assert_eq!(validate_user_id("a b"), Err(ValidationError::InvalidFormat));
        assert_eq!(validate_file_size(-1), Err(ValidationError::Negative));
    }
}
