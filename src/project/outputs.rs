//! Output extraction for the project path.
//!
//! Outputs come from two places: the deployment record's manifest layout
//! and live project metadata. Live metadata wins when both name the same
//! key, since the record can lag behind a rename.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, DeployError};
use crate::poller::{guarded, race_cancel};

use super::clients::{DeploymentClient, ProjectInfo};
use super::manifest::{DEPLOYMENT_NAME, parse_layout_outputs};

/// Output key carrying the project id.
pub const PROJECT_ID_KEY: &str = "projectId";
/// Output key carrying the display name.
pub const PROJECT_NAME_KEY: &str = "projectName";
/// Output key carrying the numeric project number.
pub const PROJECT_NUMBER_KEY: &str = "projectNumber";

/// Outputs derived from live project metadata.
#[must_use]
pub fn project_outputs(project: &ProjectInfo) -> BTreeMap<String, String> {
    BTreeMap::from([
        (PROJECT_ID_KEY.to_owned(), project.project_id.clone()),
        (PROJECT_NAME_KEY.to_owned(), project.display_name.clone()),
        (PROJECT_NUMBER_KEY.to_owned(), project.number.clone()),
    ])
}

/// Merges record outputs with live project metadata; metadata wins.
#[must_use]
pub fn merge_outputs(
    mut record: BTreeMap<String, String>,
    project: &ProjectInfo,
) -> BTreeMap<String, String> {
    record.extend(project_outputs(project));
    record
}

/// Reads the outputs recorded in the deployment record's manifest.
///
/// # Errors
///
/// Returns [`DeployError::NotFound`] when no record or manifest exists,
/// and provider or parse failures otherwise.
pub async fn read_record_outputs(
    cancel: &CancellationToken,
    deployments: &dyn DeploymentClient,
    project: &str,
) -> Result<BTreeMap<String, String>, DeployError> {
    let action = format!("get deployment {DEPLOYMENT_NAME}");
    let deployment = match race_cancel(
        cancel,
        &action,
        deployments.get_deployment(project, DEPLOYMENT_NAME),
    )
    .await?
    {
        Ok(deployment) => deployment,
        Err(ClientError::NotFound(_)) => {
            return Err(DeployError::NotFound {
                what: format!("deployment record in project {project}"),
            });
        }
        Err(err) => return Err(DeployError::provider(&action, &err)),
    };

    let manifest_name = deployment
        .manifest
        .as_deref()
        .and_then(|reference| reference.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| DeployError::NotFound {
            what: format!("manifest of deployment {DEPLOYMENT_NAME}"),
        })?;
    let manifest = guarded(
        cancel,
        &format!("get manifest {manifest_name}"),
        deployments.get_manifest(project, DEPLOYMENT_NAME, manifest_name),
    )
    .await?;
    parse_layout_outputs(&manifest.layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn project() -> ProjectInfo {
        ProjectInfo {
            project_id: String::from("demo-proj"),
            display_name: String::from("Demo"),
            number: String::from("42"),
            state: String::from("ACTIVE"),
        }
    }

    #[rstest]
    fn project_metadata_wins_on_collision() {
        let record = BTreeMap::from([
            (String::from("projectId"), String::from("stale-id")),
            (String::from("region"), String::from("us-central1")),
        ]);
        let merged = merge_outputs(record, &project());
        assert_eq!(merged.get("projectId").map(String::as_str), Some("demo-proj"));
        assert_eq!(merged.get("projectName").map(String::as_str), Some("Demo"));
        assert_eq!(merged.get("projectNumber").map(String::as_str), Some("42"));
        assert_eq!(merged.get("region").map(String::as_str), Some("us-central1"));
    }
}
