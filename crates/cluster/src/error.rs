use thiserror::Error;

use specter_browser::DriverError;

#[derive(Clone, Debug, Error)]
pub enum ClusterError {
    #[error("cluster already shut down")]
    AlreadyShutDown,
    #[error("worker pool exhausted")]
    PoolExhausted,
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(#[source] DriverError),
}

impl From<ClusterError> for specter_core_types::ScanError {
    fn from(value: ClusterError) -> Self {
        specter_core_types::ScanError::new(value.to_string())
    }
}
