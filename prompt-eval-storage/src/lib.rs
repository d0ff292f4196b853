pub mod memory;
pub mod postgres;

pub use memory::*;
pub use postgres::{
    create_pool, create_pool_with_config, health_check, migrate, PgCustomMetricStore,
    PgEvaluationRepository, PostgresConfig,
};
