//! Consistency validator
//!
//! Runs a set of named probes in rounds until each has accumulated the
//! required number of successful observations, or the attempt budget runs
//! out. Within a round every still-pending probe runs as its own task on the
//! runtime's worker pool; rounds are strictly sequential and separated by a
//! fixed delay.
//!
//! Successes are counted cumulatively across rounds, not consecutively: a
//! probe that flickers (true, false, true) has two successes. The question
//! being answered is "has the write become visible", not "is it stably
//! visible".

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

use crate::error::{ConsistencyError, Result};
use crate::probe::{build_probes, Expectation, Probe, ProbeContext, ProbeKind, ProbeTarget};

/// Thresholds for one validation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Successful observations needed per probe
    pub required_successes: u32,
    /// Upper bound on rounds
    pub max_attempts: u32,
    /// Pause between rounds
    pub delay: Duration,
}

impl ValidationPolicy {
    pub fn new(required_successes: u32, max_attempts: u32, delay: Duration) -> Self {
        Self {
            required_successes,
            max_attempts,
            delay,
        }
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            required_successes: 3,
            max_attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

/// Per-probe diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub name: String,
    /// Successful observations accumulated
    pub successes: u32,
    /// Times the probe was invoked
    pub attempts: u32,
    /// Time from validation start until the threshold was reached
    pub settled_after: Option<Duration>,
}

impl ProbeOutcome {
    pub fn settled(&self) -> bool {
        self.settled_after.is_some()
    }
}

/// Outcome of one validation run
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Every probe reached the threshold within the budget
    pub succeeded: bool,
    /// Rounds executed
    pub attempts_used: u32,
    /// Wall-clock duration of the whole run
    pub elapsed: Duration,
    /// One entry per probe, in the order the probes were given
    pub probes: Vec<ProbeOutcome>,
}

impl ValidationResult {
    pub fn probe(&self, name: &str) -> Option<&ProbeOutcome> {
        self.probes.iter().find(|p| p.name == name)
    }

    /// Seconds from start until each probe settled; `None` if it never did
    pub fn per_probe_elapsed_seconds(&self) -> BTreeMap<String, Option<f64>> {
        self.probes
            .iter()
            .map(|p| (p.name.clone(), p.settled_after.map(|d| d.as_secs_f64())))
            .collect()
    }

    /// Number of invocations per probe
    pub fn per_probe_attempt_counts(&self) -> BTreeMap<String, u32> {
        self.probes
            .iter()
            .map(|p| (p.name.clone(), p.attempts))
            .collect()
    }

    /// Probes that never reached the threshold
    pub fn unsettled(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.probes.iter().filter(|p| !p.settled())
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} after {} round(s) in {:.3}s",
            if self.succeeded { "consistent" } else { "NOT consistent" },
            self.attempts_used,
            self.elapsed.as_secs_f64()
        )?;
        for p in &self.probes {
            match p.settled_after {
                Some(d) => writeln!(
                    f,
                    "  {:<14} settled at {:.3}s ({} successes / {} calls)",
                    p.name,
                    d.as_secs_f64(),
                    p.successes,
                    p.attempts
                )?,
                None => writeln!(
                    f,
                    "  {:<14} never settled ({} successes / {} calls)",
                    p.name, p.successes, p.attempts
                )?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct ProbeState {
    successes: u32,
    attempts: u32,
    settled_after: Option<Duration>,
}

/// Polls a fixed set of probes under a [`ValidationPolicy`]
pub struct ConsistencyValidator {
    probes: Vec<Arc<dyn Probe>>,
    policy: ValidationPolicy,
}

impl ConsistencyValidator {
    /// Check the request up front: at least one probe, unique names, and
    /// non-zero thresholds.
    pub fn new(probes: Vec<Arc<dyn Probe>>, policy: ValidationPolicy) -> Result<Self> {
        if probes.is_empty() {
            return Err(ConsistencyError::InvalidRequest(
                "at least one probe is required".to_string(),
            ));
        }
        if policy.required_successes == 0 {
            return Err(ConsistencyError::InvalidRequest(
                "required_successes must be at least 1".to_string(),
            ));
        }
        if policy.max_attempts == 0 {
            return Err(ConsistencyError::InvalidRequest(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for probe in &probes {
            if !names.insert(probe.name().to_string()) {
                return Err(ConsistencyError::DuplicateProbe(probe.name().to_string()));
            }
        }

        Ok(Self { probes, policy })
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Run rounds until every probe settles or the budget is spent.
    ///
    /// No delay follows the last executed round.
    pub async fn run(&self) -> ValidationResult {
        let required = self.policy.required_successes;
        let mut states = vec![ProbeState::default(); self.probes.len()];
        let mut attempts_used = 0;
        let start = Instant::now();

        for attempt in 1..=self.policy.max_attempts {
            let pending: Vec<usize> = states
                .iter()
                .enumerate()
                .filter(|(_, s)| s.successes < required)
                .map(|(idx, _)| idx)
                .collect();

            if pending.is_empty() {
                break;
            }

            attempts_used = attempt;
            debug!(
                "round {}/{}: {} probe(s) pending",
                attempt,
                self.policy.max_attempts,
                pending.len()
            );

            let mut round = JoinSet::new();
            for &idx in &pending {
                states[idx].attempts += 1;
                let probe = Arc::clone(&self.probes[idx]);
                round.spawn(async move { (idx, probe.check().await) });
            }

            while let Some(joined) = round.join_next().await {
                let (idx, observed) = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        // A panicking probe counts as "not observed"
                        error!("probe task failed in round {}: {}", attempt, e);
                        continue;
                    }
                };

                if !observed {
                    continue;
                }

                let state = &mut states[idx];
                state.successes += 1;
                if state.successes == required && state.settled_after.is_none() {
                    let elapsed = start.elapsed();
                    state.settled_after = Some(elapsed);
                    debug!(
                        "probe {} settled after {:.3}s in round {}",
                        self.probes[idx].name(),
                        elapsed.as_secs_f64(),
                        attempt
                    );
                }
            }

            let all_settled = states.iter().all(|s| s.successes >= required);
            if all_settled || attempt == self.policy.max_attempts {
                break;
            }

            sleep(self.policy.delay).await;
        }

        let probes: Vec<ProbeOutcome> = self
            .probes
            .iter()
            .zip(states)
            .map(|(probe, state)| ProbeOutcome {
                name: probe.name().to_string(),
                successes: state.successes,
                attempts: state.attempts,
                settled_after: state.settled_after,
            })
            .collect();

        let result = ValidationResult {
            succeeded: probes.iter().all(ProbeOutcome::settled),
            attempts_used,
            elapsed: start.elapsed(),
            probes,
        };

        info!(
            "validation {} after {} round(s) in {:.3}s",
            if result.succeeded { "succeeded" } else { "failed" },
            result.attempts_used,
            result.elapsed.as_secs_f64()
        );

        result
    }
}

/// Wait until the target is visible through every probe in `kinds`.
///
/// `target.expected_count` is required when `kinds` contains the count probe.
pub async fn validate_presence(
    ctx: &ProbeContext,
    target: &ProbeTarget,
    kinds: &[ProbeKind],
    policy: &ValidationPolicy,
) -> Result<ValidationResult> {
    validate(ctx, target, Expectation::Present, kinds, policy).await
}

/// Wait until the target is gone through every probe in `kinds`.
///
/// The count probe compares against `target.expected_count` (the number of
/// keys that should remain), or zero when unset.
pub async fn validate_absence(
    ctx: &ProbeContext,
    target: &ProbeTarget,
    kinds: &[ProbeKind],
    policy: &ValidationPolicy,
) -> Result<ValidationResult> {
    validate(ctx, target, Expectation::Absent, kinds, policy).await
}

async fn validate(
    ctx: &ProbeContext,
    target: &ProbeTarget,
    expectation: Expectation,
    kinds: &[ProbeKind],
    policy: &ValidationPolicy,
) -> Result<ValidationResult> {
    info!(
        "validating {} of {} in bucket {} ({} probe(s), {} successes required, up to {} rounds)",
        expectation,
        target.key,
        ctx.store().bucket(),
        kinds.len(),
        policy.required_successes,
        policy.max_attempts
    );

    let probes = build_probes(ctx, target, expectation, kinds)?;
    let validator = ConsistencyValidator::new(probes, policy.clone())?;
    Ok(validator.run().await)
}
