//! Azure Resource Manager transport: HTTP client, error mapping and
//! long-running operation polling.

mod client;
mod error;
mod poller;
mod types;

pub use client::ArmClient;
pub use error::ArmError;
pub use poller::{DEFAULT_POLL_INTERVAL, PollStrategy, Poller};
pub use types::{
    ArmErrorBody, ArmResponse, DEFAULT_ENDPOINT, Envelope, OperationStatus,
};
