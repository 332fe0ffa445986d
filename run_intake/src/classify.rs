//! Ordered deliverable-role patterns and completeness checking.
//!
//! A role pattern list is an explicit, ordered configuration: the first
//! pattern matching a base filename wins, and declaration order is the
//! tie-break policy. Filenames matching no pattern are simply not part of
//! the classified set.

use regex::Regex;
use std::path::PathBuf;

/// The deliverable roles of a pipeline run folder, in declaration order:
/// VCF, BAM, coverage, CNV report, metrics report. Eight arbitrary leading
/// characters are the run's sample prefix.
pub const RUN_FOLDER_ROLE_PATTERNS: [&str; 5] = [
    r"^.{8}\.merged\.vcf$",
    r"^.{8}\.dupemk\.bam$",
    r"^.{8}\.coverage\.bedgraph$",
    r"^.{8}\.exomedepth\.pdf$",
    r"^.{8}\.metricsreport\.pdf$",
];

/// One file assigned to a deliverable role.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClassifiedFile {
    pub role: usize,
    pub path: PathBuf,
}

/// An ordered list of role patterns over base filenames.
#[derive(Debug, Clone)]
pub struct RolePatterns {
    patterns: Vec<Regex>,
}

impl RolePatterns {
    pub fn new(patterns: &[&str]) -> Self {
        RolePatterns {
            patterns: patterns
                .iter()
                .map(|pattern| Regex::new(pattern).unwrap())
                .collect(),
        }
    }

    /// The pattern set for pipeline run folders.
    pub fn run_folder() -> Self {
        RolePatterns::new(&RUN_FOLDER_ROLE_PATTERNS)
    }

    /// Number of roles, i.e. the expected role count for completeness.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The role index of the first pattern matching `filename`, if any.
    pub fn classify(&self, filename: &str) -> Option<usize> {
        self.patterns
            .iter()
            .position(|pattern| pattern.is_match(filename))
    }
}

/// A sample's deliverable set is complete when every role index in
/// `0..expected_roles` is satisfied by at least one file. Several files in
/// the same role satisfy it once; they never stand in for another role.
pub fn is_complete(files: &[ClassifiedFile], expected_roles: usize) -> bool {
    (0..expected_roles).all(|role| files.iter().any(|file| file.role == role))
}
