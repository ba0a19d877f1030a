//! Error kinds surfaced by the builder.
//!
//! Every failure reaches the CLI as a single-line diagnostic plus a
//! non-zero exit. Nothing is retried: toolchain builds take hours, so the
//! user fixes the cause and re-runs with `--skip-built`.

use crate::stage::StageId;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Required host state (SDK root, executables, package versions) is
    /// absent. Checked before anything runs.
    #[error("missing from environment: {}", missing.join(", "))]
    EnvironmentMissing { missing: Vec<String> },

    /// A selected stage is not registered.
    #[error("unknown stage: {name}")]
    UnknownStage { name: String },

    /// Stage prerequisites do not form a DAG.
    #[error("stage prerequisites form a cycle involving {}", names(involved))]
    CyclicDependency { involved: Vec<StageId> },

    /// A sibling source checkout this stage builds from is absent.
    #[error("{stage}: {} not found ({hint})", dir.display())]
    MissingSource {
        stage: StageId,
        dir: PathBuf,
        hint: &'static str,
    },

    /// A prerequisite is neither scheduled in this run nor already built.
    #[error("{stage} requires {prerequisite}, which is neither selected nor already built")]
    UnsatisfiedPrerequisite {
        stage: StageId,
        prerequisite: StageId,
    },

    /// A planning-time probe of an external tool could not even start.
    #[error("cannot run {}: {source}", program.display())]
    ProbeFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external build invocation returned non-zero. Aborts the pipeline.
    #[error("stage {stage} failed ({status}), log at {}", log.display())]
    StageExecutionFailed {
        stage: StageId,
        status: ExitStatus,
        log: PathBuf,
    },

    /// Packaging was requested but a declared output is absent.
    #[error("artifact of {stage} missing at {}", path.display())]
    MissingArtifact { stage: StageId, path: PathBuf },

    /// The external `tar` invocation itself failed.
    #[error("archive creation failed ({status})")]
    ArchiveFailed { status: ExitStatus },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn names(stages: &[StageId]) -> String {
    stages
        .iter()
        .copied()
        .map(StageId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_are_single_line() {
        let err = Error::EnvironmentMissing {
            missing: vec!["cmake (executable)".into(), "DEVKITPRO".into()],
        };
        let rendered = err.to_string();
        assert!(!rendered.contains('\n'));
        assert!(rendered.contains("cmake"));
        assert!(rendered.contains("DEVKITPRO"));
    }

    #[test]
    fn test_cycle_names_stages() {
        let err = Error::CyclicDependency {
            involved: vec![StageId::Toolchain, StageId::Swiftpm],
        };
        assert_eq!(
            err.to_string(),
            "stage prerequisites form a cycle involving toolchain, swiftpm"
        );
    }
}
