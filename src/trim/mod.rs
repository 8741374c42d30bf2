//! Master-clip trimming: serve a duration by slicing a pre-rendered master asset.

/// Lazy master-asset cache and the trim pipeline.
pub mod master;
