use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("message of {0} bytes exceeds the wire limit")]
    Oversized(usize),

    #[error("remote replied with an error: {0}")]
    Remote(String),

    #[error("unexpected reply to {request}")]
    UnexpectedReply { request: &'static str },

    #[error("could not bind port {port} after {attempts} attempts")]
    BindExhausted { port: u16, attempts: u32 },

    #[error(transparent)]
    Sim(#[from] tm_sim::SimError),
}

pub type RemoteResult<T> = Result<T, RemoteError>;
