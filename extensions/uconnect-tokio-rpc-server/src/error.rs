use uconnect::error::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("a hub is already mounted at {0}")]
    DuplicatePath(String),

    #[error("hub path {0} must start with '/'")]
    InvalidPath(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
