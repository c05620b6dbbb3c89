/// Why an uploaded filename was rejected.
#[derive(Debug)]
pub enum FilenameError {
    /// Empty or whitespace-only.
    Empty,
    /// Contains path separators (`/` or `\`) or a `..` component.
    PathComponent,
    /// Contains null bytes or other control characters.
    ControlCharacter,
}

impl FilenameError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "Filename cannot be empty",
            Self::PathComponent => "Invalid filename: path components are not allowed",
            Self::ControlCharacter => "Invalid filename: control characters are not allowed",
        }
    }
}

/// Validate a filename attached to an upload. The name is stored verbatim in
/// `input_images` and echoed in responses, so it must carry no path or
/// header-injection surface.
pub fn validate_upload_filename(filename: &str) -> Result<&str, FilenameError> {
    let trimmed = filename.trim();

    if trimmed.is_empty() {
        return Err(FilenameError::Empty);
    }
    if trimmed.contains('\0') || trimmed.chars().any(|c| c.is_ascii_control()) {
        return Err(FilenameError::ControlCharacter);
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed == ".." {
        return Err(FilenameError::PathComponent);
    }

    Ok(trimmed)
}

/// Extension used for the stored original: short, alphanumeric, lowercased.
/// Anything else is dropped and the file is stored bare.
pub fn storage_extension(filename: &str) -> Option<String> {
    let ext = filename.rsplit_once('.')?.1;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
