#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Malformed(String),
    #[error("failed to fetch snapshot: {0:#}")]
    TransientFetch(anyhow::Error),
}
