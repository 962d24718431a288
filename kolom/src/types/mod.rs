//! Type integration with external types
//!
//! Implementation [`Decode`][d] and [`Encode`][e] for external types.
//!
//! Available for:
//!
//! - [`time`][::time]'s [`Date`][td] and [`OffsetDateTime`][to], requires `time` feature
//!
//! [d]: crate::Decode
//! [e]: crate::Encode
//! [td]: ::time::Date
//! [to]: ::time::OffsetDateTime

#[cfg(feature = "time")]
mod time;
