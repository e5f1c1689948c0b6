//! Core abstractions for the migration engine.
//!
//! - [`value`]: schema-less records, rows and surrogate keys
//! - [`schema`]: per-table load descriptions
//! - [`plan`]: dependency-ordered load plan
//! - [`traits`]: source and target collaborator traits
//! - [`identifier`]: PostgreSQL identifier quoting

pub mod identifier;
pub mod plan;
pub mod schema;
pub mod traits;
pub mod value;

pub use plan::LoadPlan;
pub use schema::{ForeignKeySpec, IdentitySpec, TableSpec};
pub use traits::{SourceReader, TargetWriter};
pub use value::{ExternalRecord, SqlValue, SurrogateKey, TargetRow};
