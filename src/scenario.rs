//! End-to-end consistency scenario
//!
//! 1. upload `quantity` objects under the scenario prefix
//! 2. validate presence of the last object (count probe expects `quantity`)
//! 3. delete that object
//! 4. validate its absence (count probe expects `quantity - 1`)
//! 5. remove the remaining objects when `cleanup` is set
//!
//! Both validation results are handed to the recorder, labelled
//! `{name}/presence` and `{name}/absence`.

use tracing::{info, warn};

use crate::config::ScenarioConfig;
use crate::error::{ConsistencyError, Result};
use crate::probe::{ProbeContext, ProbeTarget};
use crate::report::{ResultRecorder, ScenarioMeta};
use crate::validator::{validate_absence, validate_presence, ValidationResult};
use crate::workload::{delete_objects, upload_objects};

/// Both halves of a scenario
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: String,
    pub presence: ValidationResult,
    pub absence: ValidationResult,
}

impl ScenarioOutcome {
    pub fn succeeded(&self) -> bool {
        self.presence.succeeded && self.absence.succeeded
    }
}

/// Run one scenario against the store behind `ctx`.
///
/// Fixture failures (uploads, deletes) and recorder failures are errors;
/// a validation that does not converge is reported in the outcome. An
/// empty workload or zero workers is rejected before anything is uploaded.
pub async fn run_scenario(
    ctx: &ProbeContext,
    scenario: &ScenarioConfig,
    profile: &str,
    recorder: Option<&dyn ResultRecorder>,
) -> Result<ScenarioOutcome> {
    if scenario.quantity == 0 {
        return Err(ConsistencyError::InvalidRequest(format!(
            "scenario {}: quantity must be at least 1",
            scenario.name
        )));
    }
    if scenario.workers == 0 {
        return Err(ConsistencyError::InvalidRequest(format!(
            "scenario {}: workers must be at least 1",
            scenario.name
        )));
    }

    info!(
        "scenario {}: {} object(s) under {} with {} worker(s)",
        scenario.name, scenario.quantity, scenario.prefix, scenario.workers
    );

    let store = ctx.store().as_ref();
    let mut keys = upload_objects(store, &scenario.prefix, scenario.quantity, scenario.workers).await?;

    let target_key = keys.pop().ok_or_else(|| {
        ConsistencyError::InvalidRequest(format!("scenario {}: nothing uploaded", scenario.name))
    })?;
    let target = ProbeTarget::new(target_key.clone()).with_prefix(scenario.prefix.clone());

    let meta = |phase: &str| ScenarioMeta {
        quantity: scenario.quantity,
        workers: scenario.workers,
        profile: profile.to_string(),
        scenario: format!("{}/{}", scenario.name, phase),
    };

    let presence = validate_presence(
        ctx,
        &target.clone().with_expected_count(scenario.quantity),
        &scenario.probes,
        &scenario.policy,
    )
    .await?;
    log_outcome(&scenario.name, "presence", &presence);
    if let Some(recorder) = recorder {
        recorder.record(&presence, &meta("presence"))?;
    }

    store.delete_object(&target_key).await?;

    let absence = validate_absence(
        ctx,
        &target.with_expected_count(keys.len()),
        &scenario.probes,
        &scenario.policy,
    )
    .await?;
    log_outcome(&scenario.name, "absence", &absence);
    if let Some(recorder) = recorder {
        recorder.record(&absence, &meta("absence"))?;
    }

    if scenario.cleanup {
        delete_objects(store, &keys, scenario.workers).await?;
    }

    Ok(ScenarioOutcome {
        name: scenario.name.clone(),
        presence,
        absence,
    })
}

fn log_outcome(name: &str, phase: &str, result: &ValidationResult) {
    if result.succeeded {
        info!("scenario {} {}: {}", name, phase, result);
    } else {
        warn!("scenario {} {}: {}", name, phase, result);
    }
}
