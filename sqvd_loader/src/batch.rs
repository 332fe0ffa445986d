//! The per-sample batch loop.
//!
//! Samples are processed independently and sequentially: a provisioning or
//! upload failure is logged and the loop moves on to the next sample. The
//! dwell delay paces submissions for the downstream rate limit.

use log::{error, info};
use run_intake::classify::is_complete;
use run_intake::SampleIntake;
use sqvd_api::{provision, remove_study, upload, ProvisioningError, ResourceApi};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Tally of one batch pass. `failed` drives the process exit code.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Provision and upload every intake in turn.
///
/// With `expected_roles` set, samples whose deliverable set does not cover
/// every role are skipped. A study that already exists is a skip, not a
/// failure; any other provisioning error fails that sample only.
pub fn load_samples(
    api: &impl ResourceApi,
    intakes: &[SampleIntake],
    expected_roles: Option<usize>,
    dwell: Duration,
    import: bool,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for (index, intake) in intakes.iter().enumerate() {
        if index > 0 && !dwell.is_zero() {
            thread::sleep(dwell);
        }
        if let Some(expected) = expected_roles {
            if !is_complete(&intake.files, expected) {
                info!(
                    "{}: deliverable set incomplete ({} files for {expected} roles); skipping",
                    intake.sample,
                    intake.files.len()
                );
                outcome.skipped += 1;
                continue;
            }
        }
        let Some(study) = &intake.study else {
            info!("{}: no study descriptor; skipping", intake.sample);
            outcome.skipped += 1;
            continue;
        };
        info!("## {} ({} files)", study.study_name, intake.files.len());

        match provision(api, study, false) {
            Ok(_) => {}
            Err(ProvisioningError::StudyAlreadyExists { .. }) => {
                info!("study {} already exists! -> skipping", study.study_name);
                outcome.skipped += 1;
                continue;
            }
            Err(err) => {
                error!("provisioning {} failed: {err}", study.study_name);
                outcome.failed += 1;
                continue;
            }
        }

        let files: Vec<PathBuf> = intake.files.iter().map(|file| file.path.clone()).collect();
        match upload(api, &files, &study.study_name, import) {
            Ok(uploaded) => {
                info!(
                    "uploaded {} of {} files for {}",
                    uploaded.len(),
                    files.len(),
                    study.study_name
                );
                if uploaded.len() == files.len() {
                    outcome.done += 1;
                } else {
                    outcome.failed += 1;
                }
            }
            Err(err) => {
                error!("uploading to {} failed: {err}", study.study_name);
                outcome.failed += 1;
            }
        }
    }
    outcome
}

/// Remove the study each intake maps to. The inverse of a `dir` load.
pub fn remove_samples(api: &impl ResourceApi, intakes: &[SampleIntake]) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for intake in intakes {
        let Some(study) = &intake.study else {
            outcome.skipped += 1;
            continue;
        };
        match remove_study(api, &study.study_name) {
            Ok(Some(_)) => {
                info!("removed {}", study.study_name);
                outcome.done += 1;
            }
            Ok(None) => {
                info!("study {} NOT removed", study.study_name);
                outcome.skipped += 1;
            }
            Err(err) => {
                error!("removing {} failed: {err}", study.study_name);
                outcome.failed += 1;
            }
        }
    }
    outcome
}
