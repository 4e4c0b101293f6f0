// Frame domain: canonical layout, format normalisation, and resampling.

pub mod canonical;
pub mod convert;
pub mod error;
pub mod resample;
