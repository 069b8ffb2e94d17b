//! Signing Key Renewal
//!
//! Keeps a time-limited signing key, issued by an external key-issuance
//! service, fresh inside a managed secret store.
//!
//! # Features
//!
//! - **Pure renewal decision** - `evaluate(current, policy, now)` with no hidden clock reads
//! - **Staged rotation** - createSecret / setSecret / testSecret / finishSecret, re-entrant per stage
//! - **Idempotent writes** - the rotation request token keys every pending version
//! - **Scheduler path** - single-step decision → issue → store-as-current
//! - **Best-effort metrics** - outcome counters and an expiry gauge that never fail a rotation
//!
//! # Invocation flow
//!
//! ```text
//! event ──► Invocation::classify ──► ScheduledTick ──► RenewalWorkflow
//!                                 └► Rotation      ──► RotationWorkflow (per stage)
//!                                          │
//!                  SecretStoreAdapter ◄────┴────► CredentialClient
//! ```
#![deny(unsafe_code)]
#![forbid(unsafe_code)]

/// Typed configuration, loaded from defaults, file and environment
pub mod config;
/// Core types, errors, and primitives
pub mod core;
/// Renewal decision engine
pub mod decision;
/// Entry dispatcher: classifies events and routes them
pub mod dispatch;
/// Credential client over the key-issuance service
pub mod issuer;
/// Outcome reporting and metric sinks
pub mod metrics;
/// Scheduler-tick renewal path
pub mod renewal;
/// Four-stage rotation state machine
pub mod rotation;
/// Secret store primitives, backends and the stage-aware adapter
pub mod store;

// ── Root re-exports ─────────────────────────────────────────────────────────

pub use crate::config::{ConfigError, RenewalConfig};
pub use crate::core::{
    RenewalError, RenewalPolicy, RenewalResult, SecretString, SigningKeyRecord, VersionStage,
};
pub use crate::decision::{RenewalDecision, evaluate, should_renew};
pub use crate::dispatch::{Dispatcher, Invocation, InvocationReport};
pub use crate::issuer::{CredentialClient, SigningKeyIssuer};
pub use crate::metrics::{Outcome, OutcomeReporter};
pub use crate::renewal::RenewalWorkflow;
pub use crate::rotation::{RotationRequest, RotationStage, RotationWorkflow, UnchangedKeyMode};
pub use crate::store::{SecretStore, SecretStoreAdapter};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::config::RenewalConfig;
    pub use crate::core::{
        RenewalError, RenewalPolicy, RenewalResult, SecretString, SigningKeyRecord, VersionStage,
    };
    pub use crate::decision::{RenewalDecision, evaluate, should_renew};
    pub use crate::dispatch::{Dispatcher, Invocation, InvocationReport};
    pub use crate::issuer::{CredentialClient, IssuedSigningKey, MockIssuer, SigningKeyIssuer};
    pub use crate::metrics::{
        EmfSink, MemorySink, MetricsSink, Outcome, OutcomeReporter, TracingSink,
    };
    pub use crate::renewal::{RenewalWorkflow, TickOutcome};
    pub use crate::rotation::{
        KeyPublisher, RotationRequest, RotationStage, RotationWorkflow, StageOutcome,
        UnchangedKeyMode,
    };
    pub use crate::store::{InMemorySecretStore, SecretStore, SecretStoreAdapter, SecretVersion};

    #[cfg(feature = "issuer-http")]
    pub use crate::issuer::{HttpIssuerConfig, HttpSigningKeyIssuer};

    #[cfg(feature = "store-aws")]
    pub use crate::store::{AwsSecretsManagerConfig, AwsSecretsManagerStore};

    pub use async_trait::async_trait;
}

// Re-export commonly used external types
pub use chrono::{DateTime, Utc};
