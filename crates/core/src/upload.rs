//! Upload validation: extension allow-list and container magic bytes.
//!
//! Only the leading [`SNIFF_LEN`] bytes are inspected, so uploads are
//! validated before anything is written to disk.

use crate::error::CoreError;

/// Accepted upload extensions (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov"];

/// Bytes needed to recognise any supported container.
pub const SNIFF_LEN: usize = 12;

/// Container family identified from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// ISO base media (`ftyp` box at offset 4): mp4, mov.
    IsoBmff,
    /// `RIFF....AVI `.
    Avi,
}

/// Lower-cased extension of `filename`, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Identify the container from its magic signature.
pub fn sniff_container(bytes: &[u8]) -> Option<Container> {
    if bytes.len() < SNIFF_LEN {
        return None;
    }
    if &bytes[4..8] == b"ftyp" {
        return Some(Container::IsoBmff);
    }
    if &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"AVI " {
        return Some(Container::Avi);
    }
    None
}

/// Validate an upload and return its normalised extension.
pub fn validate_upload(filename: &str, bytes: &[u8]) -> Result<String, CoreError> {
    if filename.trim().is_empty() {
        return Err(CoreError::Validation("No file selected".into()));
    }

    let ext = extension_of(filename)
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "Invalid file type. Allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })?;

    if bytes.is_empty() {
        return Err(CoreError::Validation("Uploaded file is empty".into()));
    }

    let expected = match ext.as_str() {
        "avi" => Container::Avi,
        _ => Container::IsoBmff,
    };
    match sniff_container(bytes) {
        Some(found) if found == expected => Ok(ext),
        _ => Err(CoreError::Validation(format!(
            "File content is not a valid .{ext} video"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn mp4_header() -> Vec<u8> {
        let mut bytes = vec![0, 0, 0, 0x20];
        bytes.extend_from_slice(b"ftypisom");
        bytes.extend_from_slice(&[0; 20]);
        bytes
    }

    fn avi_header() -> Vec<u8> {
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&[0x10, 0, 0, 0]);
        bytes.extend_from_slice(b"AVI LIST");
        bytes
    }

    #[test]
    fn accepts_mp4_and_mov_with_ftyp() {
        assert_eq!(validate_upload("lap.mp4", &mp4_header()).unwrap(), "mp4");
        assert_eq!(validate_upload("LAP.MOV", &mp4_header()).unwrap(), "mov");
    }

    #[test]
    fn accepts_avi_riff() {
        assert_eq!(validate_upload("lap.avi", &avi_header()).unwrap(), "avi");
    }

    #[test]
    fn rejects_text_renamed_to_mp4() {
        let result = validate_upload("notes.mp4", b"just some notes, not a video at all");
        assert_matches!(result, Err(CoreError::Validation(msg)) if msg.contains("not a valid"));
    }

    #[test]
    fn rejects_mismatched_container() {
        assert_matches!(validate_upload("lap.avi", &mp4_header()), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_bad_extension_and_empty_input() {
        assert_matches!(validate_upload("", &mp4_header()), Err(CoreError::Validation(_)));
        assert_matches!(validate_upload("lap.mkv", &mp4_header()), Err(CoreError::Validation(_)));
        assert_matches!(validate_upload("mp4", &mp4_header()), Err(CoreError::Validation(_)));
        assert_matches!(validate_upload(".mp4", &mp4_header()), Err(CoreError::Validation(_)));
        assert_matches!(validate_upload("lap.mp4", &[]), Err(CoreError::Validation(msg)) if msg.contains("empty"));
    }

    #[test]
    fn short_input_is_not_a_container() {
        assert_eq!(sniff_container(b"RIFF"), None);
    }
}
