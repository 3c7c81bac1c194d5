// Content fingerprints and function identities

/// Length of a function id in hex characters.
pub const FUNCTION_ID_LEN: usize = 16;

/// Full blake3 hex digest of a file's text.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Deterministic id for the function spanning `line_start..=line_end` in `file_path`.
///
/// Stable across scans as long as the path and line range do not change.
pub fn function_id(file_path: &str, line_start: usize, line_end: usize) -> String {
    let key = format!("{}:{}-{}", file_path, line_start, line_end);
    let hex = blake3::hash(key.as_bytes()).to_hex();
    hex.as_str()[..FUNCTION_ID_LEN].to_string()
}
