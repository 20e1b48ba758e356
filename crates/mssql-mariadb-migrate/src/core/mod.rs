//! Core abstractions shared by the engine and the drivers.
//!
//! - [`schema`]: table, column and foreign key metadata
//! - [`value`]: the portable scalar representation rows are normalized into
//! - [`traits`]: source reader, target writer and target session seams
//! - [`identifier`]: identifier validation and quoting for generated SQL

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{Column, ForeignKey, Table};
pub use traits::{SourceReader, TargetSession, TargetWriter};
pub use value::{Extremes, Page, Row, SqlValue};
