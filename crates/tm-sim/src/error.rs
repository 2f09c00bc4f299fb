use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("road graph error: {0}")]
    Graph(#[from] tm_graph::GraphError),

    #[error("failed to spawn the tick worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;
