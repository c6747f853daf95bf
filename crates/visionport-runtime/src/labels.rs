use std::io;
use std::path::Path;

/// Reads one label per line; line order is class order.
///
/// Blank lines are kept as empty labels so class ids stay aligned.
pub async fn read_labels(path: &Path) -> io::Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(raw.lines().map(str::to_string).collect())
}
