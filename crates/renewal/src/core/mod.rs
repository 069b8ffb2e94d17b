//! Core types for signing key renewal
mod error;
mod policy;
mod record;
mod secret;
mod stage;

pub use error::{RenewalError, RenewalResult};
pub use policy::{MINUTES_PER_DAY, RenewalPolicy};
pub(crate) use record::Timestamp;
pub use record::SigningKeyRecord;
pub use secret::SecretString;
pub use stage::VersionStage;
