//! Directory-scanning strategies.
//!
//! Both scanners implement one capability, "produce upload candidates and a
//! study descriptor per sample key", over two run-folder conventions:
//!
//! * [`PanelPathScanner`]: panel identity is encoded in the path,
//!   `root/<group>/<workflow>/<panel><version>/<sample>/files`.
//! * [`RunConfigScanner`]: per-sample run folders
//!   `root/<sample>/<run-id>/files` with a `.config.json` naming the
//!   analysis panel.
//!
//! Symbolic links (files and config alike) are excluded from intake
//! throughout; entries at an unexpected depth are ignored. The same sample
//! key seen in several folders accumulates files instead of overwriting.

use crate::classify::{ClassifiedFile, RolePatterns};
use anyhow::{ensure, Context, Result};
use log::{debug, warn};
use regex::Regex;
use serde::Deserialize;
use sqvd_api::StudyDescriptor;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Per-run metadata file read by [`RunConfigScanner`].
pub const CONFIG_FILENAME: &str = ".config.json";

/// Run-folder subdirectory the config-driven pipeline writes into.
pub const DEFAULT_RUN_ID: &str = "default";

/// Upload suffixes recognised in panel-path trees, in role order.
pub const UPLOAD_SUFFIXES: [&str; 6] = [".json", ".bam", ".vcf.gz", ".bed", ".bedgraph", ".bw"];

const INTAKE_GROUP: &str = "molpath";
const INTAKE_WORKFLOW: &str = "dna_germline";

/// Everything discovered for one sample key: the classified files from all
/// of its run folders and, when panel identity could be established, the
/// study descriptor to provision it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIntake {
    pub sample: String,
    pub files: Vec<ClassifiedFile>,
    pub study: Option<StudyDescriptor>,
}

/// A scanning strategy over a run-folder tree.
pub trait ScanRun {
    fn scan(&self, root: &Path) -> Result<Vec<SampleIntake>>;
}

/// Parse a `<letters><digits>` panel string into id and version.
fn parse_panel(panel: &str) -> Option<(String, u32)> {
    let re = Regex::new(r"^([A-Za-z]+)(\d+)$").unwrap();
    let caps = re.captures(panel)?;
    let version = caps[2].parse().ok()?;
    Some((caps[1].to_string(), version))
}

/// Depth-first walk calling `visit` for every regular file with the
/// relative directory components of its parent. Symlinked entries are
/// skipped entirely.
fn visit_files<F: FnMut(&[String], &Path, &str)>(
    dir: &Path,
    rel: &mut Vec<String>,
    visit: &mut F,
) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_type.is_dir() {
            rel.push(name);
            visit_files(&entry.path(), rel, visit)?;
            rel.pop();
        } else if file_type.is_file() {
            visit(rel, &entry.path(), &name);
        }
    }
    Ok(())
}

/// Scanner for `root/<group>/<workflow>/<panel><version>/<sample>/files`
/// trees. All four identity components come from the path; files are
/// selected by the [`UPLOAD_SUFFIXES`] allow-list.
#[derive(Debug, Default)]
pub struct PanelPathScanner;

impl PanelPathScanner {
    pub fn new() -> Self {
        PanelPathScanner
    }
}

impl ScanRun for PanelPathScanner {
    fn scan(&self, root: &Path) -> Result<Vec<SampleIntake>> {
        ensure!(root.is_dir(), "{} is not a directory", root.display());

        let mut intakes: BTreeMap<String, SampleIntake> = BTreeMap::new();
        visit_files(root, &mut Vec::new(), &mut |rel, path, name| {
            if rel.len() != 4 {
                return;
            }
            let Some(role) = UPLOAD_SUFFIXES
                .iter()
                .position(|suffix| name.ends_with(suffix))
            else {
                return;
            };
            let (group, workflow, panel, sample) = (&rel[0], &rel[1], &rel[2], &rel[3]);
            let Some((panel_id, panel_version)) = parse_panel(panel) else {
                debug!("{}: '{panel}' is not a <panel><version> directory", path.display());
                return;
            };
            let study_name = format!("{sample}_{panel}");
            let intake = intakes
                .entry(study_name.clone())
                .or_insert_with(|| SampleIntake {
                    sample: sample.clone(),
                    files: Vec::new(),
                    study: Some(StudyDescriptor {
                        study_name,
                        sample_id: sample.clone(),
                        panel_id,
                        panel_version,
                        workflow: workflow.clone(),
                        subpanels: Default::default(),
                        group: group.clone(),
                        dataset_name: None,
                    }),
                });
            intake.files.push(ClassifiedFile {
                role,
                path: path.to_path_buf(),
            });
        })?;

        Ok(intakes
            .into_values()
            .map(|mut intake| {
                intake.files.sort();
                intake
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct RunConfig {
    #[serde(rename = "ngsAnalysis")]
    ngs_analysis: String,
}

/// Scanner for `root/<sample>/<run-id>/files` trees where the analysis
/// panel is declared by the run's `.config.json`.
///
/// A sample whose config is absent, symlinked, unreadable, or names an
/// unparseable panel gets no descriptor; it is reported and will never be
/// provisioned with a guessed panel identity.
#[derive(Debug)]
pub struct RunConfigScanner {
    run_id: String,
    patterns: RolePatterns,
}

impl RunConfigScanner {
    pub fn new(run_id: &str) -> Self {
        RunConfigScanner {
            run_id: run_id.to_string(),
            patterns: RolePatterns::run_folder(),
        }
    }

    /// The role count a complete sample must satisfy.
    pub fn expected_roles(&self) -> usize {
        self.patterns.len()
    }

    fn read_descriptor(&self, sample: &str, config_path: &Path) -> Option<StudyDescriptor> {
        let config: RunConfig = match fs::read_to_string(config_path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(config) => config,
                Err(err) => {
                    warn!("{sample}: malformed {}: {err}", config_path.display());
                    return None;
                }
            },
            Err(err) => {
                warn!("{sample}: cannot read {}: {err}", config_path.display());
                return None;
            }
        };
        let panel = config.ngs_analysis.to_uppercase();
        let Some((panel_id, panel_version)) = parse_panel(&panel) else {
            warn!(
                "{sample}: run config names unrecognised panel '{}'",
                config.ngs_analysis
            );
            return None;
        };
        Some(StudyDescriptor {
            study_name: format!("{sample}_{panel}"),
            sample_id: sample.to_string(),
            panel_id,
            panel_version,
            workflow: INTAKE_WORKFLOW.to_string(),
            subpanels: Default::default(),
            group: INTAKE_GROUP.to_string(),
            dataset_name: None,
        })
    }
}

impl Default for RunConfigScanner {
    fn default() -> Self {
        RunConfigScanner::new(DEFAULT_RUN_ID)
    }
}

impl ScanRun for RunConfigScanner {
    fn scan(&self, root: &Path) -> Result<Vec<SampleIntake>> {
        ensure!(root.is_dir(), "{} is not a directory", root.display());

        let mut files: BTreeMap<String, Vec<ClassifiedFile>> = BTreeMap::new();
        let mut studies: BTreeMap<String, StudyDescriptor> = BTreeMap::new();
        visit_files(root, &mut Vec::new(), &mut |rel, path, name| {
            if rel.len() < 2 || rel[1] != self.run_id {
                return;
            }
            let sample = &rel[0];
            if name == CONFIG_FILENAME {
                if let Some(study) = self.read_descriptor(sample, path) {
                    studies.insert(sample.clone(), study);
                }
            } else if let Some(role) = self.patterns.classify(name) {
                files.entry(sample.clone()).or_default().push(ClassifiedFile {
                    role,
                    path: path.to_path_buf(),
                });
            }
        })?;

        Ok(files
            .into_iter()
            .map(|(sample, mut files)| {
                files.sort();
                let study = studies.remove(&sample);
                SampleIntake {
                    sample,
                    files,
                    study,
                }
            })
            .collect())
    }
}
