//! Problem key derivation
//!
//! A problem key identifies one annotated table row. It is built from the
//! page URL, the table and row position and a truncated problem name, so it
//! is only stable as long as the page layout is.

/// Maximum number of characters of the problem name kept in a key
pub const MAX_NAME_CHARS: usize = 50;

/// Derive the key for a table row
///
/// Format: `{pageKey}_{tableIndex}_{rowIndex}_{name}` where `pageKey` is the
/// last path segment of the URL (`unknown` if empty) and `name` is the first
/// 50 characters of the problem name.
pub fn problem_key(page_url: &str, table_index: usize, row_index: usize, problem_name: &str) -> String {
    let name: String = problem_name.chars().take(MAX_NAME_CHARS).collect();
    format!(
        "{}_{}_{}_{}",
        page_key(page_url),
        table_index,
        row_index,
        name
    )
}

/// Last `/`-separated segment of a URL
fn page_key(url: &str) -> &str {
    match url.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment,
        _ => "unknown",
    }
}
