//! VP8 tables, transforms and intra prediction

pub(crate) mod prediction;
pub(crate) mod transform;
pub(crate) mod types;
