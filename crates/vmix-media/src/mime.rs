//! Declared media types and the file extensions they map to.

use crate::error::{MediaError, MediaResult};

pub const VIDEO_MP4: &str = "video/mp4";
pub const AUDIO_MPEG: &str = "audio/mpeg";

const EXTENSIONS: &[(&str, &str)] = &[
    (VIDEO_MP4, ".mp4"),
    (AUDIO_MPEG, ".mp3"),
    ("audio/wav", ".wav"),
    ("audio/ogg", ".ogg"),
    ("audio/aac", ".aac"),
    ("video/webm", ".webm"),
    ("video/quicktime", ".mov"),
];

/// Extension (with leading dot) for a declared media type.
pub fn extension_for(media_type: &str) -> MediaResult<&'static str> {
    let wanted = media_type.trim().to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == wanted)
        .map(|(_, ext)| *ext)
        .ok_or_else(|| MediaError::UnsupportedMediaType(media_type.to_string()))
}

/// Whether a response `Content-Type` header satisfies the expected type.
///
/// Parameters such as `; charset=...` are tolerated.
pub fn content_type_matches(declared: &str, expected: &str) -> bool {
    declared
        .to_ascii_lowercase()
        .contains(&expected.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        assert_eq!(extension_for("video/mp4").unwrap(), ".mp4");
        assert_eq!(extension_for("Audio/MPEG").unwrap(), ".mp3");
        assert!(matches!(
            extension_for("application/pdf"),
            Err(MediaError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_content_type_matching() {
        assert!(content_type_matches("video/mp4", VIDEO_MP4));
        assert!(content_type_matches("Audio/Mpeg; charset=binary", AUDIO_MPEG));
        assert!(!content_type_matches("text/html", VIDEO_MP4));
        assert!(!content_type_matches("", VIDEO_MP4));
    }
}
