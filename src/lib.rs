mod client;
mod engine;
mod error;
mod logger;
pub mod protocol;
mod range;
mod schedule;
mod store;
mod transport;
mod types;

pub use client::{AtmoWebClient, AtmoWebClientBuilder};
pub use engine::{
    AppliedSetpoint, ApplyReport, EngineState, ExecutionReport, RejectedSetpoint, RunOutcome,
    ScheduleEngine, ScheduleEngineBuilder, DEFAULT_CHECK_INTERVAL, DEFAULT_TOLERANCE,
};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::{parse_response, ParsedResponse};
pub use range::range_from_response;
pub use schedule::{parse_timestamp, NaiveTimePolicy, ScheduleDocument, ScheduleEntry};
pub use store::{EntryId, ExecutionStore, JsonFileStore, MemoryStore};
pub use transport::{HttpTransport, DEFAULT_TIMEOUT};
pub use types::*;
