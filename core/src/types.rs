//! Shared primitive types used across the churn pipeline.

/// Primary key of a row in the upstream `customer` table.
pub type CustomerId = i64;

/// Primary key of a row in the `segment` table.
pub type SegmentId = i64;

/// Identifier attached to one analysis run (UUID v4 text).
pub type RunId = String;
