pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, open, DbPool};
pub use repositories::{
    BusinessRepository, RepositoryError, SqlBusinessRepository, SqlLedgerRepository,
    SqlPromotionRepository,
};
