pub mod business;
pub mod config;
pub mod migrate;
pub mod promotion;
pub mod report;
pub mod suggest;
pub mod sync;
pub mod upload;

use std::future::Future;

use saleslens_core::config::AppConfig;
use saleslens_core::domain::business::{Business, BusinessId};
use saleslens_core::errors::{ApplicationError, InterfaceError, StoreError};
use saleslens_db::{open, BusinessRepository, DbPool, RepositoryError};
use serde::Serialize;
use serde_json::Value;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_INVALID_INPUT: u8 = 6;
pub const EXIT_UNAVAILABLE: u8 = 7;
pub const EXIT_INTERNAL: u8 = 8;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok(command, message.into(), None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: impl Serialize,
    ) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self::ok(command, message.into(), Some(data)),
            Err(error) => {
                Self::failure(command, "serialization", error.to_string(), EXIT_INTERNAL)
            }
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn ok(command: &str, message: String, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// A command failure before it is rendered as a [`CommandResult`].
#[derive(Debug)]
pub struct CommandFailure {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl CommandFailure {
    pub fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new("invalid_input", message, EXIT_INVALID_INPUT)
    }

    pub fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure(command, self.error_class, self.message, self.exit_code)
    }
}

impl From<ApplicationError> for CommandFailure {
    fn from(error: ApplicationError) -> Self {
        match error.into_interface("cli") {
            InterfaceError::BadRequest { message, .. } => Self::invalid_input(message),
            InterfaceError::ServiceUnavailable { message, .. } => {
                Self::new("service_unavailable", message, EXIT_UNAVAILABLE)
            }
            InterfaceError::Internal { message, .. } => {
                Self::new("internal", message, EXIT_INTERNAL)
            }
        }
    }
}

impl From<RepositoryError> for CommandFailure {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(message) => {
                Self::new("not_found", format!("{message} does not exist"), EXIT_INVALID_INPUT)
            }
            RepositoryError::Rejected(message) => Self::invalid_input(message),
            other => Self::new("persistence", other.to_string(), EXIT_UNAVAILABLE),
        }
    }
}

impl From<StoreError> for CommandFailure {
    fn from(error: StoreError) -> Self {
        Self::new("persistence", error.0, EXIT_UNAVAILABLE)
    }
}

/// Runs `work` on a single-threaded runtime against a migrated pool and
/// renders its outcome.
pub fn with_database<F, Fut>(command: &str, config: &AppConfig, work: F) -> CommandResult
where
    F: FnOnce(DbPool) -> Fut,
    Fut: Future<Output = Result<CommandResult, CommandFailure>>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    runtime.block_on(async {
        let pool = match open(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(
                    command,
                    "db_connectivity",
                    error.to_string(),
                    EXIT_DATABASE,
                );
            }
        };
        let result = work(pool.clone()).await;
        pool.close().await;
        result.unwrap_or_else(|failure| failure.into_result(command))
    })
}

pub async fn find_business<R: BusinessRepository + ?Sized>(
    repository: &R,
    id: &str,
) -> Result<Business, CommandFailure> {
    let id = BusinessId(id.trim().to_string());
    repository
        .find_by_id(&id)
        .await?
        .ok_or_else(|| {
            CommandFailure::new(
                "not_found",
                format!("business {id} does not exist"),
                EXIT_INVALID_INPUT,
            )
        })
}
