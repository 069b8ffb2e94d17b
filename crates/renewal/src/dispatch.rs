//! Entry dispatcher
//!
//! Turns a raw invocation payload into an [`Invocation`] and routes it:
//!
//! - a payload carrying the rotation trigger's `SecretId`,
//!   `ClientRequestToken` and `Step` is a [`RotationRequest`]
//! - a payload carrying none of them (scheduler events, `{}`, `null`) is a
//!   [`ScheduledTick`] for the configured signing-key secret
//! - a payload carrying only some of them is rejected as malformed
//!
//! Every invocation runs under a time budget and is reported to the
//! [`OutcomeReporter`] exactly once.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::core::{RenewalError, RenewalResult};
use crate::metrics::{Outcome, OutcomeReporter};
use crate::renewal::{RenewalWorkflow, TickOutcome};
use crate::rotation::{RotationRequest, RotationStage, RotationWorkflow, StageOutcome};

const SECRET_ID_FIELD: &str = "SecretId";
const TOKEN_FIELD: &str = "ClientRequestToken";
const STEP_FIELD: &str = "Step";

/// A periodic "renew if near expiry" tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledTick {
    /// Secret to renew
    pub secret_id: String,
}

/// A classified invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// One stage of the rotation lifecycle
    Rotation(RotationRequest),
    /// Scheduler tick
    ScheduledTick(ScheduledTick),
}

impl Invocation {
    /// Classify a raw payload
    ///
    /// # Errors
    ///
    /// * `MalformedEvent` - some but not all rotation fields are present, a
    ///   field is blank or not a string, the step is unknown, or the payload
    ///   is neither an object nor `null`
    ///
    /// # Example
    ///
    /// ```
    /// use signing_key_renewal::Invocation;
    /// use serde_json::json;
    ///
    /// let tick = Invocation::classify(&json!({"source": "aws.events"}), "signing-key").unwrap();
    /// assert_eq!(tick.kind(), "scheduled");
    ///
    /// let partial = json!({"SecretId": "signing-key"});
    /// assert!(Invocation::classify(&partial, "signing-key").is_err());
    /// ```
    pub fn classify(event: &Value, default_secret_id: &str) -> RenewalResult<Self> {
        let fields = match event {
            Value::Null => return Ok(Self::tick(default_secret_id)),
            Value::Object(fields) => fields,
            other => {
                return Err(malformed(format!(
                    "expected a JSON object, got {}",
                    json_type(other)
                )));
            }
        };

        let present = |name: &str| fields.get(name).is_some_and(|v| !v.is_null());
        let found = [SECRET_ID_FIELD, TOKEN_FIELD, STEP_FIELD]
            .into_iter()
            .filter(|name| present(name))
            .count();

        if found == 0 {
            return Ok(Self::tick(default_secret_id));
        }

        let field = |name: &str| -> RenewalResult<String> {
            match fields.get(name) {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
                Some(Value::String(_)) => Err(malformed(format!("{name} is blank"))),
                Some(Value::Null) | None => Err(malformed(format!(
                    "rotation event is missing {name}"
                ))),
                Some(other) => Err(malformed(format!(
                    "{name} must be a string, got {}",
                    json_type(other)
                ))),
            }
        };

        let secret_id = field(SECRET_ID_FIELD)?;
        let request_token = field(TOKEN_FIELD)?;
        let stage: RotationStage = field(STEP_FIELD)?.parse()?;

        Ok(Self::Rotation(RotationRequest {
            secret_id,
            request_token,
            stage,
        }))
    }

    fn tick(secret_id: &str) -> Self {
        Self::ScheduledTick(ScheduledTick {
            secret_id: secret_id.to_string(),
        })
    }

    /// `rotation` or `scheduled`
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rotation(_) => "rotation",
            Self::ScheduledTick(_) => "scheduled",
        }
    }

    /// Secret the invocation targets
    #[must_use]
    pub fn secret_id(&self) -> &str {
        match self {
            Self::Rotation(request) => &request.secret_id,
            Self::ScheduledTick(tick) => &tick.secret_id,
        }
    }
}

fn malformed(reason: String) -> RenewalError {
    RenewalError::MalformedEvent { reason }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Path-specific result carried by an [`InvocationReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InvocationResult {
    /// Rotation stage result
    Stage(StageOutcome),
    /// Scheduler tick result
    Tick(TickOutcome),
}

impl InvocationResult {
    /// Expiry to report on the gauge: the current key after a tick, or a
    /// freshly issued pending key
    fn new_key_expiry(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Tick(tick) => Some(tick.expires_at()),
            Self::Stage(StageOutcome::PendingCreated { expires_at, .. }) => Some(*expires_at),
            Self::Stage(_) => None,
        }
    }
}

/// Summary of one successful invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationReport {
    /// `rotation` or `scheduled`
    pub kind: &'static str,
    /// Secret handled
    pub secret_id: String,
    /// Rotation stage, for rotation invocations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<RotationStage>,
    /// Rotation request token, for rotation invocations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_token: Option<String>,
    /// Counted outcome
    pub outcome: Outcome,
    /// Key issued, promoted or kept, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Expiry of that key, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Wall time spent
    pub duration_ms: u64,
    /// Path-specific detail
    pub result: InvocationResult,
}

/// Routes invocations to the scheduler or rotation workflow
#[derive(Debug, Clone)]
pub struct Dispatcher {
    renewal: RenewalWorkflow,
    rotation: RotationWorkflow,
    reporter: OutcomeReporter,
    signing_key_secret_id: String,
    timeout: Duration,
}

impl Dispatcher {
    /// Default invocation budget
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Build a dispatcher; ticks target `signing_key_secret_id`
    pub fn new(
        renewal: RenewalWorkflow,
        rotation: RotationWorkflow,
        reporter: OutcomeReporter,
        signing_key_secret_id: impl Into<String>,
    ) -> Self {
        Self {
            renewal,
            rotation,
            reporter,
            signing_key_secret_id: signing_key_secret_id.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Override the invocation budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reporter shared with the caller
    pub fn reporter(&self) -> &OutcomeReporter {
        &self.reporter
    }

    /// Classify and process a raw payload
    ///
    /// A payload that cannot be classified is counted as `FAILED`.
    pub async fn handle(&self, event: &Value, now: DateTime<Utc>) -> RenewalResult<InvocationReport> {
        let started = Instant::now();
        match Invocation::classify(event, &self.signing_key_secret_id) {
            Ok(invocation) => self.dispatch(invocation, now).await,
            Err(e) => {
                tracing::error!(error = %e, "Rejected invocation payload");
                self.reporter.record(Outcome::Failed, started.elapsed()).await;
                Err(e)
            }
        }
    }

    /// Process a classified invocation under the time budget
    #[tracing::instrument(skip(self, invocation), fields(kind = invocation.kind(), secret_id = %invocation.secret_id()))]
    pub async fn dispatch(
        &self,
        invocation: Invocation,
        now: DateTime<Utc>,
    ) -> RenewalResult<InvocationReport> {
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.route(&invocation, now)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Invocation exceeded its time budget, abandoning"
                );
                Err(RenewalError::Timeout {
                    duration: self.timeout,
                })
            }
        };
        let elapsed = started.elapsed();

        match result {
            Ok(result) => {
                let report = self.report(&invocation, result, elapsed);
                self.reporter.record(report.outcome, elapsed).await;
                if let Some(expires_at) = report.result.new_key_expiry() {
                    self.reporter.record_expiry(expires_at, now).await;
                }
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    kind = e.kind(),
                    retryable = e.is_retryable(),
                    "Invocation failed"
                );
                self.reporter.record(Outcome::Failed, elapsed).await;
                Err(e)
            }
        }
    }

    async fn route(
        &self,
        invocation: &Invocation,
        now: DateTime<Utc>,
    ) -> RenewalResult<InvocationResult> {
        match invocation {
            Invocation::Rotation(request) => self
                .rotation
                .run(request, now)
                .await
                .map(InvocationResult::Stage),
            Invocation::ScheduledTick(tick) => self
                .renewal
                .run(&tick.secret_id, now)
                .await
                .map(InvocationResult::Tick),
        }
    }

    fn report(
        &self,
        invocation: &Invocation,
        result: InvocationResult,
        elapsed: Duration,
    ) -> InvocationReport {
        let (outcome, key_id, expires_at) = match &result {
            InvocationResult::Stage(stage) => (
                stage.outcome(),
                stage.key_id().map(str::to_string),
                stage.expires_at(),
            ),
            InvocationResult::Tick(tick) => (
                tick.outcome(),
                Some(tick.key_id().to_string()),
                Some(tick.expires_at()),
            ),
        };
        let (stage, request_token) = match invocation {
            Invocation::Rotation(request) => {
                (Some(request.stage), Some(request.request_token.clone()))
            }
            Invocation::ScheduledTick(_) => (None, None),
        };

        InvocationReport {
            kind: invocation.kind(),
            secret_id: invocation.secret_id().to_string(),
            stage,
            request_token,
            outcome,
            key_id,
            expires_at,
            duration_ms: elapsed.as_millis() as u64,
            result,
        }
    }
}
