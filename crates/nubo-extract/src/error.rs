#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Extraction task failed")]
    Join(#[from] tokio::task::JoinError),
    #[error("Archive contains an entry with an empty name")]
    EmptyEntryName,
    #[error("Archive contains an entry with an invalid name: `{0}`")]
    InvalidEntryName(String),
    #[error("Archive contains an entry that escapes the target directory: `{0}`")]
    UnsafePath(String),
    #[error("Archive does not contain a `.nuspec` manifest at its root")]
    MissingNuspec,
}
