use of_controls::ControlError;
use of_sim::SimError;
use thiserror::Error;

pub type BenchResult<T> = Result<T, BenchError>;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Invalid scenario '{id}': {what}")]
    InvalidScenario { id: String, what: String },

    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),

    #[error("Scheduling error: {0}")]
    Control(#[from] ControlError),

    #[error("Scenario file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
