use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid business: {0}")]
    InvalidBusiness(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// User-correctable ingestion failures. Messages are shown to the uploader
/// verbatim, so they name the offending column or value.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("CSV is missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },
    #[error("the uploaded file contains no data rows")]
    EmptyInput,
    #[error(
        "dates must all use one format (YYYY-MM-DD, MM/DD/YYYY or DD/MM/YYYY); could not parse `{sample}`"
    )]
    DateFormat { sample: String },
    #[error("row {row}: invalid {column} value `{value}`")]
    InvalidValue { row: usize, column: String, value: String },
    #[error("unsupported file format `{extension}`; please upload a CSV file")]
    UnsupportedFormat { extension: String },
    #[error("the uploaded file is not readable CSV: {0}")]
    Unreadable(String),
}

/// Failure reported by a persistence port implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("upstream api failure: {0}")]
    UpstreamApi(String),
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("sync conflict: {0}")]
    SyncConflict(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.0)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Ingest(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            // Upstream details stay in the logs; callers only learn that the
            // run failed and may be retried.
            ApplicationError::UpstreamApi(_) | ApplicationError::CatalogUnavailable(_) => {
                Self::ServiceUnavailable {
                    message: "an upstream service request failed; retry later".to_owned(),
                    correlation_id: "unassigned".to_owned(),
                }
            }
            ApplicationError::Persistence(message) | ApplicationError::SyncConflict(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
