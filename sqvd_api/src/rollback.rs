//! Study removal, the simple inverse of provisioning.
//!
//! Deliberately narrower than provisioning: only the study document is
//! deleted. Samples and datasets the study referenced are left in place,
//! since other studies may share them.

use crate::client::{ApiError, ResourceApi};
use crate::resource::Resource;
use log::warn;
use serde_json::Value;

/// Delete the study named `study_name` if exactly one exists.
///
/// Returns the removed document, or `None` (with a diagnostic) when the
/// name resolves to zero or several studies.
pub fn remove_study(
    api: &impl ResourceApi,
    study_name: &str,
) -> Result<Option<Value>, ApiError> {
    let studies = api.find(Resource::Study, &[("study_name", study_name.to_string())])?;
    let [study] = studies.as_slice() else {
        warn!(
            "found {} studies named '{study_name}'; nothing removed",
            studies.len()
        );
        return Ok(None);
    };
    let id = study["_id"]
        .as_str()
        .ok_or_else(|| ApiError::Shape("study document has no _id".to_string()))?;
    api.delete(Resource::Study, id)?;
    Ok(Some(study.clone()))
}
