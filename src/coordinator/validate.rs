use crate::error::NameError;

pub const MAX_TITLE_CHARS: usize = 100;

const FORBIDDEN: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Check a user-entered title before anything is sent to the store.
///
/// Length is counted in code points. Bookmark titles may be empty; folder
/// names may not.
pub fn validate_title(title: &str, is_folder: bool) -> Result<(), NameError> {
    if is_folder && title.trim().is_empty() {
        return Err(NameError::Blank);
    }
    if let Some(c) = title.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(NameError::ForbiddenChar(c));
    }
    if title.chars().any(char::is_control) {
        return Err(NameError::ControlChar);
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(NameError::TooLong {
            max: MAX_TITLE_CHARS,
        });
    }
    Ok(())
}
