//! Study provisioning: ordered dependent validation against the remote
//! panel, track, sample, dataset and study collections, followed by the
//! creation of the study document itself.
//!
//! The backing store offers no multi-resource transaction. Validation is
//! front-loaded (panel and track are checked before anything is created) to
//! keep predictable failures from mutating the store at all, but if study
//! creation fails after a sample or dataset was created, those documents
//! remain in place. Operators should expect orphan samples/datasets after a
//! late provisioning failure; nothing here rolls them back.

use crate::client::{ApiError, ResourceApi};
use crate::duedate::{weekdays_from_now, TIMESTAMP_FORMAT};
use crate::resource::Resource;
use chrono::Local;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Everything needed to provision one study for one sample.
///
/// `study_name` must be unique within `group`; `(sample_id, group)` is
/// expected to resolve to at most one remote sample.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct StudyDescriptor {
    pub study_name: String,
    pub sample_id: String,
    pub panel_id: String,
    pub panel_version: u32,
    pub workflow: String,
    pub subpanels: BTreeSet<String>,
    pub group: String,
    #[serde(default)]
    pub dataset_name: Option<String>,
}

/// Why provisioning one study failed. Fatal to that study only; callers
/// processing a batch continue with the next sample.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("no panel matches '{panel_id}' version {panel_version}")]
    PanelNotFound { panel_id: String, panel_version: u32 },

    #[error("subpanels [{requested}] are not all declared by panel '{panel_id}' (declared: [{declared}])")]
    SubpanelsNotSubset {
        panel_id: String,
        requested: String,
        declared: String,
    },

    #[error("no workflow track named '{workflow}'")]
    WorkflowNotFound { workflow: String },

    #[error("study '{study_name}' already exists in group '{group}'")]
    StudyAlreadyExists { study_name: String, group: String },

    #[error("{count} studies named '{study_name}' exist in group '{group}'")]
    StudyNameAmbiguous {
        study_name: String,
        group: String,
        count: usize,
    },

    #[error("{count} samples share the id '{sample_id}' in group '{group}'")]
    AmbiguousSample {
        sample_id: String,
        group: String,
        count: usize,
    },

    #[error("{count} datasets share the name '{dataset_name}' in group '{group}'")]
    AmbiguousDataset {
        dataset_name: String,
        group: String,
        count: usize,
    },

    #[error("remote {resource} document is missing the '{field}' field")]
    MissingField {
        resource: Resource,
        field: &'static str,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Provision the study described by `x`, creating any missing sample or
/// dataset dependency on the way.
///
/// When `find_if_exists` is set and exactly one study of that name already
/// exists in the group, that study is returned unchanged and nothing is
/// created (the idempotent path). Otherwise an existing study is an error.
pub fn provision(
    api: &impl ResourceApi,
    x: &StudyDescriptor,
    find_if_exists: bool,
) -> Result<Value, ProvisioningError> {
    let now = Local::now().format(TIMESTAMP_FORMAT).to_string();

    // Panel must exist exactly once and cover the requested subpanels; the
    // report due date derives from its turnaround time.
    let panels = api.find(
        Resource::Panel,
        &[
            ("panel_id", x.panel_id.clone()),
            ("panel_version", x.panel_version.to_string()),
        ],
    )?;
    let [panel] = panels.as_slice() else {
        return Err(ProvisioningError::PanelNotFound {
            panel_id: x.panel_id.clone(),
            panel_version: x.panel_version,
        });
    };
    let declared = declared_subpanels(panel);
    if !x
        .subpanels
        .iter()
        .all(|subpanel| declared.contains(subpanel.as_str()))
    {
        return Err(ProvisioningError::SubpanelsNotSubset {
            panel_id: x.panel_id.clone(),
            requested: x.subpanels.iter().join(", "),
            declared: declared.iter().join(", "),
        });
    }
    let reportdue = weekdays_from_now(panel_tat(panel)?)
        .format(TIMESTAMP_FORMAT)
        .to_string();
    let panel_oid = doc_id(panel, Resource::Panel)?;

    // Track must exist exactly once for the workflow name.
    let tracks = api.find(Resource::Track, &[("name", x.workflow.clone())])?;
    let [track] = tracks.as_slice() else {
        return Err(ProvisioningError::WorkflowNotFound {
            workflow: x.workflow.clone(),
        });
    };
    let track_oid = doc_id(track, Resource::Track)?;

    // An existing study short-circuits (find_if_exists) or aborts.
    let studies = api.find(
        Resource::Study,
        &[
            ("study_name", x.study_name.clone()),
            ("group", x.group.clone()),
        ],
    )?;
    match studies.as_slice() {
        [] => {}
        [existing] if find_if_exists => {
            debug!("study '{}' already provisioned", x.study_name);
            return Ok(existing.clone());
        }
        [_] => {
            return Err(ProvisioningError::StudyAlreadyExists {
                study_name: x.study_name.clone(),
                group: x.group.clone(),
            });
        }
        several => {
            return Err(ProvisioningError::StudyNameAmbiguous {
                study_name: x.study_name.clone(),
                group: x.group.clone(),
                count: several.len(),
            });
        }
    }

    // Sample: reuse a unique existing one, create otherwise. The store
    // permits soft-duplicate names, so several matches is a hard error
    // rather than an arbitrary pick.
    let samples = api.find(
        Resource::Sample,
        &[
            ("sample_id", x.sample_id.clone()),
            ("group", x.group.clone()),
        ],
    )?;
    let sample_oid = match samples.as_slice() {
        [] => {
            let created = api.create(
                Resource::Sample,
                json!({
                    "group": x.group,
                    "sample_id": x.sample_id,
                    "received": now,
                    "bookedBy": api.user_id(),
                }),
            )?;
            doc_id(&created, Resource::Sample)?
        }
        [sample] => doc_id(sample, Resource::Sample)?,
        several => {
            return Err(ProvisioningError::AmbiguousSample {
                sample_id: x.sample_id.clone(),
                group: x.group.clone(),
                count: several.len(),
            });
        }
    };

    // Dataset, only when requested: same find-or-create and the same
    // ambiguity rule as samples.
    let dataset_oid = match x.dataset_name.as_deref() {
        None | Some("") => None,
        Some(dataset_name) => {
            let datasets = api.find(
                Resource::Dataset,
                &[("name", dataset_name.to_string()), ("group", x.group.clone())],
            )?;
            let oid = match datasets.as_slice() {
                [] => {
                    let created = api.create(
                        Resource::Dataset,
                        json!({
                            "name": dataset_name,
                            "group": x.group,
                            "createdBy": api.user_id(),
                        }),
                    )?;
                    doc_id(&created, Resource::Dataset)?
                }
                [dataset] => doc_id(dataset, Resource::Dataset)?,
                several => {
                    return Err(ProvisioningError::AmbiguousDataset {
                        dataset_name: dataset_name.to_string(),
                        group: x.group.clone(),
                        count: several.len(),
                    });
                }
            };
            Some(oid)
        }
    };

    let mut study = json!({
        "study_name": x.study_name,
        "subpanels": x.subpanels,
        "group": x.group,
        "createdBy": api.user_id(),
        "requested": now,
        "reportdue": reportdue,
        "panel_id": panel_oid,
        "track_id": track_oid,
        "sample_ids": [sample_oid],
    });
    if let Some(oid) = dataset_oid {
        study["dataset_id"] = json!(oid);
    }
    Ok(api.create(Resource::Study, study)?)
}

fn declared_subpanels(panel: &Value) -> BTreeSet<&str> {
    panel["subpanels"]
        .as_array()
        .map(|subpanels| {
            subpanels
                .iter()
                .filter_map(|subpanel| subpanel["subpanel_id"].as_str())
                .collect()
        })
        .unwrap_or_default()
}

fn panel_tat(panel: &Value) -> Result<u32, ProvisioningError> {
    let tat = match &panel["tat"] {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    tat.map(|days| days as u32)
        .ok_or(ProvisioningError::MissingField {
            resource: Resource::Panel,
            field: "tat",
        })
}

fn doc_id(doc: &Value, resource: Resource) -> Result<String, ProvisioningError> {
    doc["_id"]
        .as_str()
        .map(String::from)
        .ok_or(ProvisioningError::MissingField {
            resource,
            field: "_id",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use pretty_assertions::assert_eq;

    fn descriptor() -> StudyDescriptor {
        StudyDescriptor {
            study_name: "ACCRO_SWIFT1".to_string(),
            sample_id: "ACCRO".to_string(),
            panel_id: "SWIFT".to_string(),
            panel_version: 1,
            workflow: "dna_somatic".to_string(),
            subpanels: BTreeSet::new(),
            group: "genetics".to_string(),
            dataset_name: None,
        }
    }

    fn api_with_panel_and_track() -> FakeApi {
        let api = FakeApi::default();
        api.seed(
            Resource::Panel,
            json!({
                "panel_id": "SWIFT",
                "panel_version": 1,
                "tat": 10,
                "subpanels": [{"subpanel_id": "FULL"}],
            }),
        );
        api.seed(Resource::Track, json!({"name": "dna_somatic"}));
        api
    }

    #[test]
    fn creates_sample_and_study() {
        let api = api_with_panel_and_track();
        let study = provision(&api, &descriptor(), false).unwrap();

        assert_eq!(study["study_name"], json!("ACCRO_SWIFT1"));
        assert_eq!(study["group"], json!("genetics"));
        assert_eq!(study["createdBy"], json!("user-1"));
        assert_eq!(study["panel_id"], json!("panel-1"));
        assert_eq!(study["track_id"], json!("track-1"));
        assert_eq!(api.count(Resource::Sample), 1);
        assert_eq!(api.count(Resource::Study), 1);
        assert_eq!(api.count(Resource::Dataset), 0);

        let sample = &api.all(Resource::Sample)[0];
        assert_eq!(sample["sample_id"], json!("ACCRO"));
        assert_eq!(sample["bookedBy"], json!("user-1"));
        assert!(sample["received"].is_string());
        assert_eq!(study["sample_ids"], json!([sample["_id"]]));
        assert!(study["requested"].is_string());
        assert!(study["reportdue"].is_string());
    }

    #[test]
    fn reuses_an_existing_sample() {
        let api = api_with_panel_and_track();
        let sample = api.seed(
            Resource::Sample,
            json!({"sample_id": "ACCRO", "group": "genetics"}),
        );
        let study = provision(&api, &descriptor(), false).unwrap();
        assert_eq!(study["sample_ids"], json!([sample["_id"]]));
        assert_eq!(api.count(Resource::Sample), 1);
    }

    #[test]
    fn second_call_with_find_is_idempotent() {
        let api = api_with_panel_and_track();
        let first = provision(&api, &descriptor(), true).unwrap();
        let second = provision(&api, &descriptor(), true).unwrap();
        assert_eq!(first["_id"], second["_id"]);
        assert_eq!(api.count(Resource::Sample), 1);
        assert_eq!(api.count(Resource::Study), 1);
    }

    #[test]
    fn existing_study_without_find_is_an_error() {
        let api = api_with_panel_and_track();
        provision(&api, &descriptor(), false).unwrap();
        let err = provision(&api, &descriptor(), false).unwrap_err();
        assert!(matches!(err, ProvisioningError::StudyAlreadyExists { .. }));
        assert_eq!(api.count(Resource::Study), 1);
    }

    #[test]
    fn duplicate_study_names_are_ambiguous_even_with_find() {
        let api = api_with_panel_and_track();
        api.seed(
            Resource::Study,
            json!({"study_name": "ACCRO_SWIFT1", "group": "genetics"}),
        );
        api.seed(
            Resource::Study,
            json!({"study_name": "ACCRO_SWIFT1", "group": "genetics"}),
        );
        let err = provision(&api, &descriptor(), true).unwrap_err();
        assert!(matches!(
            err,
            ProvisioningError::StudyNameAmbiguous { count: 2, .. }
        ));
    }

    #[test]
    fn missing_panel_fails_before_any_creation() {
        let api = FakeApi::default();
        api.seed(Resource::Track, json!({"name": "dna_somatic"}));
        let err = provision(&api, &descriptor(), false).unwrap_err();
        assert!(matches!(err, ProvisioningError::PanelNotFound { .. }));
        assert_eq!(api.count(Resource::Sample), 0);
        assert_eq!(api.count(Resource::Study), 0);
    }

    #[test]
    fn requested_subpanels_must_be_declared() {
        let api = api_with_panel_and_track();
        let mut x = descriptor();
        x.subpanels = ["FULL".to_string(), "EXTRA".to_string()].into();
        let err = provision(&api, &x, false).unwrap_err();
        match err {
            ProvisioningError::SubpanelsNotSubset { requested, declared, .. } => {
                assert_eq!(requested, "EXTRA, FULL");
                assert_eq!(declared, "FULL");
            }
            other => panic!("expected SubpanelsNotSubset, got {other}"),
        }
        assert_eq!(api.count(Resource::Sample), 0);
    }

    #[test]
    fn declared_subpanels_are_accepted() {
        let api = api_with_panel_and_track();
        let mut x = descriptor();
        x.subpanels = ["FULL".to_string()].into();
        let study = provision(&api, &x, false).unwrap();
        assert_eq!(study["subpanels"], json!(["FULL"]));
    }

    #[test]
    fn missing_workflow_track_is_an_error() {
        let api = api_with_panel_and_track();
        let mut x = descriptor();
        x.workflow = "rna_fusion".to_string();
        let err = provision(&api, &x, false).unwrap_err();
        assert!(matches!(err, ProvisioningError::WorkflowNotFound { .. }));
    }

    #[test]
    fn duplicate_samples_are_never_picked_silently() {
        let api = api_with_panel_and_track();
        api.seed(
            Resource::Sample,
            json!({"sample_id": "ACCRO", "group": "genetics"}),
        );
        api.seed(
            Resource::Sample,
            json!({"sample_id": "ACCRO", "group": "genetics"}),
        );
        let err = provision(&api, &descriptor(), false).unwrap_err();
        assert!(matches!(
            err,
            ProvisioningError::AmbiguousSample { count: 2, .. }
        ));
        assert_eq!(api.count(Resource::Study), 0);
    }

    #[test]
    fn dataset_is_created_when_named() {
        let api = api_with_panel_and_track();
        let mut x = descriptor();
        x.dataset_name = Some("validation".to_string());
        let study = provision(&api, &x, false).unwrap();
        assert_eq!(api.count(Resource::Dataset), 1);
        let dataset = &api.all(Resource::Dataset)[0];
        assert_eq!(dataset["name"], json!("validation"));
        assert_eq!(dataset["createdBy"], json!("user-1"));
        assert_eq!(study["dataset_id"], dataset["_id"]);
    }

    #[test]
    fn dataset_is_reused_when_it_exists() {
        let api = api_with_panel_and_track();
        let dataset = api.seed(
            Resource::Dataset,
            json!({"name": "validation", "group": "genetics"}),
        );
        let mut x = descriptor();
        x.dataset_name = Some("validation".to_string());
        let study = provision(&api, &x, false).unwrap();
        assert_eq!(api.count(Resource::Dataset), 1);
        assert_eq!(study["dataset_id"], dataset["_id"]);
    }

    #[test]
    fn duplicate_datasets_are_ambiguous() {
        let api = api_with_panel_and_track();
        api.seed(
            Resource::Dataset,
            json!({"name": "validation", "group": "genetics"}),
        );
        api.seed(
            Resource::Dataset,
            json!({"name": "validation", "group": "genetics"}),
        );
        let mut x = descriptor();
        x.dataset_name = Some("validation".to_string());
        let err = provision(&api, &x, false).unwrap_err();
        assert!(matches!(
            err,
            ProvisioningError::AmbiguousDataset { count: 2, .. }
        ));
    }

    #[test]
    fn empty_dataset_name_means_no_dataset() {
        let api = api_with_panel_and_track();
        let mut x = descriptor();
        x.dataset_name = Some(String::new());
        let study = provision(&api, &x, false).unwrap();
        assert_eq!(api.count(Resource::Dataset), 0);
        assert!(study.get("dataset_id").is_none());
    }
}
