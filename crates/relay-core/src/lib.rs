pub mod config;
pub mod contacts;
pub mod error;
pub mod outbox;
pub mod protocol;
pub mod rate;
pub mod util;

pub use config::RateLimitConfig;
pub use contacts::Contact;
pub use error::RateLimitError;
pub use outbox::{Delivery, InMemoryOutbox, JournalOutbox, LogOutbox, Outbox};
pub use protocol::{OperatorCmd, Reply, MAX_LINE};
pub use rate::{RateLimiter, RateStatus, RateWindow};
