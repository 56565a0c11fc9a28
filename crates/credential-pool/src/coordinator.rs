//! Acquisition coordinator
//!
//! Drives one logical operation through selection → build → probe →
//! (success | invalidate-and-retry | exhaustion). The control flow is a
//! pure state machine: `Machine::handle` receives events and returns
//! (new machine, action), and the async driver executes the I/O implied by
//! each action. Attempt counting, invalidation ordering, and the
//! pool-exhausted / retries-exhausted distinction all live in the pure
//! machine, where they are testable without a store or a network.
//!
//! Coordinators share nothing with each other; the pool is the only shared
//! state, and the driver only touches it through `get_one` /
//! `invalidate_then_select` / `record_validated`.

use std::sync::Arc;
use std::time::Instant;

use common::{CookiePayload, Platform};
use credential_store::CredentialRecord;
use platform_client::{BuildError, ClientFactory, PlatformClient, probe_with_timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::PoolOptions;
use crate::error::{AcquireError, Result};
use crate::pool::CredentialPool;

/// One caller-initiated need for a validated platform client.
#[derive(Debug)]
pub struct AcquireRequest {
    pub platform: Platform,
    /// Caller-supplied session, honored only on the trust-on-first-use
    /// fast path (no forced pool source, no validation).
    pub override_cookies: Option<CookiePayload>,
    /// Per-request override of `PoolOptions::max_tries`.
    pub max_tries: Option<u32>,
    /// Per-request override of `PoolOptions::validate_on_acquire`.
    pub require_validation: Option<bool>,
}

impl AcquireRequest {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            override_cookies: None,
            max_tries: None,
            require_validation: None,
        }
    }

    pub fn with_override_cookies(mut self, cookies: CookiePayload) -> Self {
        self.override_cookies = Some(cookies);
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    pub fn with_require_validation(mut self, require: bool) -> Self {
        self.require_validation = Some(require);
        self
    }
}

/// Successful acquisition: a usable client and the session it holds.
#[derive(Debug)]
pub struct Acquired {
    pub client: Arc<dyn PlatformClient>,
    pub cookies: CookiePayload,
    /// Pool record backing the client; `None` when built from
    /// caller-supplied override cookies.
    pub credential_id: Option<Uuid>,
}

/// Phases of one logical acquire operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    SourceSelected,
    ClientBuilt,
    Validating,
    /// Terminal success (probe passed).
    Validated,
    InvalidRetry,
    /// Terminal failure.
    Exhausted,
}

/// Events the driver feeds into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    /// The pool returned a record.
    Selected,
    /// The pool returned nothing — exhaustion at this point in the loop.
    PoolEmpty,
    Built,
    BuildFailed,
    ProbeStarted,
    ProbeOk,
    ProbeFailed,
}

/// Actions the driver executes after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// No-op transition.
    None,
    BuildClient,
    RunProbe,
    /// Terminal: hand the client to the caller.
    ReturnClient,
    /// Invalidate the failed record, then reselect in the same critical
    /// section.
    InvalidateThenReselect,
    /// Invalidate the failed record, then fail with retries exhausted.
    InvalidateThenFail,
    FailPoolExhausted,
    FailBuild,
}

/// Pure control state of the acquire loop. No I/O.
#[derive(Debug, Clone, Copy)]
struct Machine {
    phase: Phase,
    attempts: u32,
    max_tries: u32,
    validate: bool,
}

impl Machine {
    fn new(max_tries: u32, validate: bool) -> Self {
        Self {
            phase: Phase::Start,
            attempts: 0,
            max_tries,
            validate,
        }
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    /// Build+probe attempts consumed so far. Counted at probe failure:
    /// `max_tries` bounds attempts, not raw pool lookups.
    fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Handle one event. Pure function of (machine, event).
    fn handle(mut self, event: Event) -> (Self, Action) {
        let action = match (self.phase, event) {
            (Phase::Start | Phase::InvalidRetry, Event::Selected) => {
                self.phase = Phase::SourceSelected;
                Action::BuildClient
            }
            // Exhaustion at selection time is PoolExhausted whether it
            // happens at start or mid-loop.
            (Phase::Start | Phase::InvalidRetry, Event::PoolEmpty) => {
                self.phase = Phase::Exhausted;
                Action::FailPoolExhausted
            }
            (Phase::SourceSelected, Event::Built) => {
                self.phase = Phase::ClientBuilt;
                if self.validate {
                    Action::RunProbe
                } else {
                    // Trust-on-first-use: hand out the client unprobed.
                    Action::ReturnClient
                }
            }
            // A build failure is not evidence against the credential:
            // fatal, no invalidation, no retry.
            (Phase::SourceSelected, Event::BuildFailed) => {
                self.phase = Phase::Exhausted;
                Action::FailBuild
            }
            (Phase::ClientBuilt, Event::ProbeStarted) => {
                self.phase = Phase::Validating;
                Action::None
            }
            (Phase::Validating, Event::ProbeOk) => {
                self.phase = Phase::Validated;
                Action::ReturnClient
            }
            (Phase::Validating, Event::ProbeFailed) => {
                self.attempts += 1;
                if self.attempts >= self.max_tries {
                    self.phase = Phase::Exhausted;
                    Action::InvalidateThenFail
                } else {
                    self.phase = Phase::InvalidRetry;
                    Action::InvalidateThenReselect
                }
            }
            // Unhandled combination: stay put.
            _ => Action::None,
        };
        (self, action)
    }
}

/// Per-operation controller over a shared pool and factory.
pub struct AcquisitionCoordinator {
    pool: Arc<CredentialPool>,
    factory: Arc<dyn ClientFactory>,
    options: PoolOptions,
}

impl AcquisitionCoordinator {
    pub fn new(
        pool: Arc<CredentialPool>,
        factory: Arc<dyn ClientFactory>,
        options: PoolOptions,
    ) -> Self {
        Self {
            pool,
            factory,
            options,
        }
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Acquire a client for one logical operation.
    ///
    /// Exactly one terminal outcome per call: `Ok(Acquired)` or one of
    /// `PoolExhausted` / `RetriesExhausted` / `Build` / `Store`.
    pub async fn acquire(&self, request: AcquireRequest) -> Result<Acquired> {
        let platform = request.platform;
        let max_tries = request.max_tries.unwrap_or(self.options.max_tries).max(1);
        let validate = request
            .require_validation
            .unwrap_or(self.options.validate_on_acquire);
        let probe_timeout = self.options.probe_timeout();

        // Fast path: caller brought their own session and nothing forces
        // the pool. No pool interaction, no probe.
        if let Some(cookies) = request.override_cookies {
            if !self.options.force_pool_source && !validate {
                let client = self.factory.build(platform, &cookies).await?;
                debug!(
                    platform = %platform,
                    cookies = %cookies.preview(),
                    "client built from caller-supplied cookies"
                );
                record_outcome(platform, "ok");
                return Ok(Acquired {
                    client,
                    cookies,
                    credential_id: None,
                });
            }
            debug!(
                platform = %platform,
                "caller-supplied cookies ignored (pool source forced or validation required)"
            );
        }

        let mut machine = Machine::new(max_tries, validate);
        // Defensive secondary guard: ids this operation already tried,
        // excluded from every reselection even if the store view lags.
        let mut excluded: Vec<Uuid> = Vec::new();
        let mut current: Option<CredentialRecord> = None;
        let mut client: Option<Arc<dyn PlatformClient>> = None;
        let mut build_error: Option<BuildError> = None;
        let mut last_failure = String::from("no probe attempted");

        let mut event = match self.pool.get_one(platform, &excluded).await? {
            Some(record) => {
                current = Some(record);
                Event::Selected
            }
            None => Event::PoolEmpty,
        };

        loop {
            let (next, action) = machine.handle(event);
            machine = next;

            event = match action {
                Action::BuildClient => {
                    let Some(record) = current.as_ref() else {
                        unreachable!("build issued before a credential was selected");
                    };
                    match self.factory.build(platform, &record.cookie_payload).await {
                        Ok(built) => {
                            client = Some(built);
                            Event::Built
                        }
                        Err(e) => {
                            build_error = Some(e);
                            Event::BuildFailed
                        }
                    }
                }

                Action::RunProbe => {
                    let (next, _) = machine.handle(Event::ProbeStarted);
                    machine = next;
                    let Some(c) = client.as_ref() else {
                        unreachable!("probe issued before a client was built");
                    };
                    let started = Instant::now();
                    let outcome = probe_with_timeout(c.as_ref(), probe_timeout).await;
                    metrics::histogram!(
                        "credpool_probe_duration_seconds",
                        "platform" => platform.as_str()
                    )
                    .record(started.elapsed().as_secs_f64());

                    match outcome {
                        Ok(true) => Event::ProbeOk,
                        Ok(false) => {
                            last_failure = "probe rejected credential".to_string();
                            Event::ProbeFailed
                        }
                        Err(e) => {
                            last_failure = format!("probe error: {e}");
                            Event::ProbeFailed
                        }
                    }
                }

                Action::ReturnClient => {
                    let Some(c) = client.take() else {
                        unreachable!("return issued before a client was built");
                    };
                    let Some(record) = current.take() else {
                        unreachable!("return issued before a credential was selected");
                    };
                    if machine.phase() == Phase::Validated {
                        self.pool.record_validated(record.id).await?;
                    }
                    debug!(
                        platform = %platform,
                        id = %record.id,
                        attempts = machine.attempts(),
                        validated = machine.phase() == Phase::Validated,
                        "credential acquired"
                    );
                    record_outcome(platform, "ok");
                    return Ok(Acquired {
                        client: c,
                        credential_id: Some(record.id),
                        cookies: record.cookie_payload,
                    });
                }

                Action::InvalidateThenReselect => {
                    let Some(record) = current.take() else {
                        unreachable!("invalidate issued before a credential was selected");
                    };
                    warn!(
                        platform = %platform,
                        id = %record.id,
                        reason = %last_failure,
                        "probe failed, rotating credential"
                    );
                    excluded.push(record.id);
                    match self
                        .pool
                        .invalidate_then_select(platform, record.id, &last_failure, &excluded)
                        .await?
                    {
                        Some(next) => {
                            current = Some(next);
                            Event::Selected
                        }
                        None => Event::PoolEmpty,
                    }
                }

                Action::InvalidateThenFail => {
                    let Some(record) = current.take() else {
                        unreachable!("invalidate issued before a credential was selected");
                    };
                    self.pool
                        .mark_invalid(platform, record.id, &last_failure)
                        .await?;
                    record_outcome(platform, "retries_exhausted");
                    return Err(AcquireError::RetriesExhausted {
                        platform,
                        attempts: machine.attempts(),
                        last_failure,
                    });
                }

                Action::FailPoolExhausted => {
                    let detail = match self.pool.counts(platform).await {
                        Ok((active, invalid)) => format!("{active} active, {invalid} invalid"),
                        Err(e) => format!("counts unavailable: {e}"),
                    };
                    record_outcome(platform, "pool_exhausted");
                    return Err(AcquireError::PoolExhausted { platform, detail });
                }

                Action::FailBuild => {
                    let Some(e) = build_error.take() else {
                        unreachable!("build failure action without a build error");
                    };
                    record_outcome(platform, "build_error");
                    return Err(AcquireError::Build(e));
                }

                Action::None => {
                    unreachable!("driver fed the machine an event it ignored: {event:?}")
                }
            };
        }
    }
}

fn record_outcome(platform: Platform, outcome: &'static str) {
    metrics::counter!(
        "credpool_acquire_total",
        "platform" => platform.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
