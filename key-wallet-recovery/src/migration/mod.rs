//! Consolidation of discovered funds
//!
//! A [`MigrationPlan`] prices sweeping every discovered address into one
//! output; the [`Migrator`] re-checks it against live chain state and
//! executes it.

pub mod executor;
pub mod fee;
pub mod plan;

pub use executor::Migrator;
pub use fee::{
    DEFAULT_MIGRATION_FEE_RATE, FeeRate, estimate_consolidation_fee, estimate_consolidation_size,
};
pub use plan::{
    HIGH_FEE_WARNING_PERCENT, MigrationPlan, MigrationResult, MigrationSource,
    create_migration_plan,
};
