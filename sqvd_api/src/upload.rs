//! File attachment to an existing study.
//!
//! Every deliverable is posted as an opaque byte payload to the study's
//! per-type endpoint; the server decides what to do with it (and imports
//! recognised formats when asked to). Per-file problems are reported and
//! skipped so the rest of the sample still uploads.

use crate::client::{ApiError, ResourceApi};
use crate::resource::Resource;
use log::{error, info};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumString};

/// The closed allow-list of uploadable deliverable types. The wire name is
/// both the endpoint path segment and the file extension that selects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    Vcf,
    Bed,
    Bedgraph,
    Bam,
    Bw,
    Pdf,
    Json,
}

impl FileType {
    /// Derive the deliverable type from the final extension of `path`,
    /// ignoring one optional `.gz` compression suffix. `None` for anything
    /// outside the allow-list.
    pub fn from_path(path: &Path) -> Option<FileType> {
        let name = path.file_name()?.to_str()?;
        let name = name.strip_suffix(".gz").unwrap_or(name);
        let (_, extension) = name.rsplit_once('.')?;
        extension.parse().ok()
    }
}

/// Attach `files` to the study named `study_name`.
///
/// A study name resolving to zero or several studies is reported and yields
/// an empty result, so a batch caller can carry on with other samples.
/// Files that are missing, unreadable or of an unrecognised type are
/// reported and skipped. Returns the successfully attached files paired
/// with the server acknowledgement for each.
pub fn upload(
    api: &impl ResourceApi,
    files: &[PathBuf],
    study_name: &str,
    import: bool,
) -> Result<Vec<(PathBuf, Value)>, ApiError> {
    let studies = api.find(Resource::Study, &[("study_name", study_name.to_string())])?;
    let [study] = studies.as_slice() else {
        error!(
            "found {} studies named '{study_name}'; not uploading",
            studies.len()
        );
        return Ok(Vec::new());
    };
    let study_id = study["_id"]
        .as_str()
        .ok_or_else(|| ApiError::Shape("study document has no _id".to_string()))?;

    let mut results = Vec::new();
    for file in files {
        let Some(file_type) = FileType::from_path(file) else {
            error!("{} is an unsupported format", file.display());
            continue;
        };
        let bytes = match fs::read(file) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("cannot read {}: {err}", file.display());
                continue;
            }
        };
        let filename = match file.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => {
                error!("{} has no filename", file.display());
                continue;
            }
        };
        match api.attach(study_id, file_type, &filename, bytes, import) {
            Ok(ack) => {
                info!("uploaded {} as {file_type}", file.display());
                results.push((file.clone(), ack));
            }
            Err(err) => error!("upload of {} failed: {err}", file.display()),
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn file_types_from_extensions() {
        let cases = [
            ("sample.vcf", Some(FileType::Vcf)),
            ("sample.merged.vcf.gz", Some(FileType::Vcf)),
            ("sample.dupemk.bam", Some(FileType::Bam)),
            ("targets.bed", Some(FileType::Bed)),
            ("coverage.bedgraph", Some(FileType::Bedgraph)),
            ("coverage.bw", Some(FileType::Bw)),
            ("report.pdf", Some(FileType::Pdf)),
            ("meta.json", Some(FileType::Json)),
            ("notes.txt", None),
            ("archive.tar.gz", None),
            ("noextension", None),
            (".gz", None),
        ];
        for (name, expected) in cases {
            assert_eq!(
                FileType::from_path(Path::new(name)),
                expected,
                "classifying {name}"
            );
        }
    }

    #[test]
    fn wire_names_are_lowercase() {
        assert_eq!(FileType::Vcf.to_string(), "vcf");
        assert_eq!(FileType::Bedgraph.to_string(), "bedgraph");
    }

    #[test]
    fn uploads_accepted_files_and_skips_the_rest() {
        let api = FakeApi::default();
        let study = api.seed(Resource::Study, json!({"study_name": "S1_RCGP4"}));

        let dir = tempfile::tempdir().unwrap();
        let vcf = dir.path().join("sample01.merged.vcf.gz");
        let txt = dir.path().join("notes.txt");
        let missing = dir.path().join("gone.bam");
        for path in [&vcf, &txt] {
            writeln!(fs::File::create(path).unwrap(), "payload").unwrap();
        }

        let uploaded = upload(
            &api,
            &[vcf.clone(), txt, missing],
            "S1_RCGP4",
            true,
        )
        .unwrap();

        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].0, vcf);
        let attachments = api.attachments();
        assert_eq!(attachments.len(), 1);
        let (study_id, file_type, filename, import) = &attachments[0];
        assert_eq!(json!(study_id), study["_id"]);
        assert_eq!(*file_type, FileType::Vcf);
        assert_eq!(filename, "sample01.merged.vcf.gz");
        assert!(*import);
    }

    #[test]
    fn ambiguous_study_name_uploads_nothing() {
        let api = FakeApi::default();
        api.seed(Resource::Study, json!({"study_name": "S1_RCGP4"}));
        api.seed(Resource::Study, json!({"study_name": "S1_RCGP4"}));

        let dir = tempfile::tempdir().unwrap();
        let vcf = dir.path().join("sample01.merged.vcf");
        fs::write(&vcf, "payload").unwrap();

        let uploaded = upload(&api, &[vcf], "S1_RCGP4", false).unwrap();
        assert!(uploaded.is_empty());
        assert!(api.attachments().is_empty());
    }

    #[test]
    fn unknown_study_name_uploads_nothing() {
        let api = FakeApi::default();
        let uploaded = upload(&api, &[], "NOSUCH", false).unwrap();
        assert!(uploaded.is_empty());
    }

    #[test]
    fn provision_then_upload_attaches_every_deliverable() {
        use crate::provision::{provision, StudyDescriptor};

        let api = FakeApi::default();
        api.seed(
            Resource::Panel,
            json!({"panel_id": "SWIFT", "panel_version": 1, "tat": 5, "subpanels": []}),
        );
        api.seed(Resource::Track, json!({"name": "dna_somatic"}));

        let descriptor = StudyDescriptor {
            study_name: "ACCRO_SWIFT1".to_string(),
            sample_id: "ACCRO".to_string(),
            panel_id: "SWIFT".to_string(),
            panel_version: 1,
            workflow: "dna_somatic".to_string(),
            subpanels: Default::default(),
            group: "genetics".to_string(),
            dataset_name: None,
        };
        provision(&api, &descriptor, false).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = ["ACCRO.vcf.gz", "ACCRO.bam", "ACCRO.bed"]
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                fs::write(&path, "payload").unwrap();
                path
            })
            .collect();

        let uploaded = upload(&api, &files, "ACCRO_SWIFT1", true).unwrap();
        assert_eq!(uploaded.len(), 3);
        assert_eq!(api.count(Resource::Sample), 1);
        assert_eq!(api.count(Resource::Study), 1);
        assert_eq!(api.attachments().len(), 3);
    }
}
