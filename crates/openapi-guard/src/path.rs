//! Field path rendering for JSON Pointer tokens.

/// Render pointer tokens as a consumer-facing field path.
///
/// Tokens that parse as base-10 integers become `[N]`; names are joined with
/// `.` (no leading dot on the first token). `["items", "2", "name"]` renders
/// as `items[2].name`.
pub fn to_field_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut path = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let segment = segment.as_ref();
        if segment.parse::<i64>().is_ok() {
            path.push('[');
            path.push_str(segment);
            path.push(']');
        } else {
            if i > 0 {
                path.push('.');
            }
            path.push_str(segment);
        }
    }
    path
}
