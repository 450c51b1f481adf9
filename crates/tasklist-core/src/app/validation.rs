//! Checks applied to new tasks before they reach a backend.

use tasklist_types::{MAX_TITLE_CHARS, NewTask, Timestamp};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Title is required")]
    EmptyTitle,
    #[error("Title is too long ({len} characters, at most {max})")]
    TitleTooLong { len: usize, max: usize },
    #[error("Invalid deadline '{0}'; use an ISO-8601 date or date-time")]
    InvalidDeadline(String),
}

/// Trims the title and parses the deadline. A blank deadline means none.
///
/// # Errors
/// Returns the first problem found.
pub fn validate_new_task(title: &str, deadline: Option<&str>) -> Result<NewTask, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let len = title.chars().count();
    if len > MAX_TITLE_CHARS {
        return Err(ValidationError::TitleTooLong {
            len,
            max: MAX_TITLE_CHARS,
        });
    }

    let deadline = match deadline.map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => Some(
            Timestamp::parse(raw).map_err(|err| ValidationError::InvalidDeadline(err.input))?,
        ),
        None => None,
    };

    Ok(NewTask {
        title: title.to_string(),
        deadline,
    })
}
