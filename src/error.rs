//! Errors raised while normalizing feeds and joining their tables.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Duplicate key {key:?} for agency {agency:?} in {table}")]
    DuplicateKey {
        table: &'static str,
        agency: String,
        key: String,
    },

    #[error("No {join} entry for key {key:?} of agency {agency:?}")]
    MissingKey {
        join: &'static str,
        agency: String,
        key: String,
    },

    #[error("Malformed time {value:?} on trip {trip_id:?} of agency {agency:?}")]
    MalformedTime {
        value: String,
        agency: String,
        trip_id: String,
    },

    #[error("Trip {trip_id:?} of agency {agency:?} has {stops} stops, more than a position can hold")]
    TripTooLong {
        agency: String,
        trip_id: String,
        stops: usize,
    },

    #[error("Feed {feed:?} is missing required table {table}")]
    MissingTable { feed: String, table: &'static str },
}
