//! Run-folder intake: deliverable-role classification, completeness
//! checking, and the directory-scanning strategies that turn a tree of
//! sequencing outputs into per-sample upload candidates.

pub mod classify;
pub mod scan;

pub use classify::{is_complete, ClassifiedFile, RolePatterns, RUN_FOLDER_ROLE_PATTERNS};
pub use scan::{PanelPathScanner, RunConfigScanner, SampleIntake, ScanRun};
