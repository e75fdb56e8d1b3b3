use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChurnError {
    #[error("Database error: {0}")]
    DataLoad(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model training failed: {reason}")]
    ModelTraining { reason: String },

    #[error("Model not trained yet")]
    UntrainedModel,

    #[error("Unseen category '{value}' in column '{column}'")]
    UnseenCategory { column: &'static str, value: String },

    #[error("Segment sync failed after removing {removed} assignments: {reason}")]
    SegmentSync { removed: usize, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChurnError {
    pub fn training(reason: impl Into<String>) -> Self {
        Self::ModelTraining { reason: reason.into() }
    }
}

pub type ChurnResult<T> = Result<T, ChurnError>;
