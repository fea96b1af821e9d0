//! External data polling
//!
//! Periodically fetches a scalar value (block height, price, temperature...)
//! and publishes the latest good value to subscribers. Fetch failures never
//! reach subscribers; they only show up in logs and in [`PollerStats`].

mod data_poller;
mod fetcher;
mod value;

pub use data_poller::{DataPoller, PollerStats, DEFAULT_POLL_INTERVAL};
pub use fetcher::{FetchError, HttpFetcher, ValueFetcher};
pub use value::{parse_scalar, PolledValue, ScalarValue, PLACEHOLDER_TEXT};
