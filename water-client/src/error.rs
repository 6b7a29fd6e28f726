#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
