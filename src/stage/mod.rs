//! Stage catalog and selection resolution.
//!
//! Stages are a closed, declaratively registered set. The registry owns
//! their descriptors (prerequisites, sibling source checkout, declared
//! artifacts) and resolves a selection into a topologically sorted
//! execution order. Ties between unordered stages break by registration
//! order, so the plan is deterministic.

pub mod plan;

mod frontend;
mod icu;
mod libdispatch;
mod swiftpm;
mod toolchain;

use crate::config::BuildConfig;
use crate::error::Error;
use clap::ValueEnum;
use plan::StagePlan;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum StageId {
    #[value(name = "icu")]
    Icu,
    #[value(name = "toolchain")]
    Toolchain,
    #[value(name = "libdispatch")]
    Libdispatch,
    #[value(name = "swiftpm")]
    Swiftpm,
    #[value(name = "frontend")]
    Frontend,
}

impl StageId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Icu => "icu",
            Self::Toolchain => "toolchain",
            Self::Libdispatch => "libdispatch",
            Self::Swiftpm => "swiftpm",
            Self::Frontend => "frontend",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sibling source checkout a stage builds from, checked lazily when the
/// stage is actually selected.
#[derive(Clone, Copy, Debug)]
pub struct Source {
    pub dir: &'static str,
    pub hint: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub struct Stage {
    pub id: StageId,
    pub prerequisites: &'static [StageId],
    pub sources: &'static [Source],
    /// Output paths relative to the install destdir. The first one doubles
    /// as the marker for skip-if-built and already-satisfied checks.
    pub artifacts: &'static [&'static str],
}

impl Stage {
    /// Absolute path of the marker artifact under this configuration.
    pub fn marker(&self, config: &BuildConfig) -> Option<PathBuf> {
        self.artifacts
            .first()
            .map(|rel| config.install_destdir.join(rel))
    }
}

const BUILTIN: &[Stage] = &[
    Stage {
        id: StageId::Icu,
        prerequisites: &[],
        sources: &[Source {
            dir: "libicuuc-libnx",
            hint: "build libicuuc with devkitA64 + libnx and place it there",
        }],
        artifacts: &["icu"],
    },
    Stage {
        id: StageId::Toolchain,
        prerequisites: &[],
        // build-script links the standard library against the prebuilt icu
        // checkout, so it is required here too.
        sources: &[
            Source {
                dir: "swift",
                hint: "clone the klepto swift fork next to this checkout",
            },
            Source {
                dir: "libicuuc-libnx",
                hint: "build libicuuc with devkitA64 + libnx and place it there",
            },
        ],
        artifacts: &["toolchain"],
    },
    Stage {
        id: StageId::Libdispatch,
        prerequisites: &[StageId::Toolchain],
        sources: &[Source {
            dir: "klepto-libdispatch",
            hint: "clone klepto-libdispatch next to this checkout",
        }],
        artifacts: &["toolchain/lib/libdispatch.a"],
    },
    Stage {
        id: StageId::Swiftpm,
        prerequisites: &[StageId::Toolchain],
        sources: &[Source {
            dir: "klepto-swiftpm",
            hint: "clone klepto-swiftpm next to this checkout",
        }],
        artifacts: &["swiftpm"],
    },
    Stage {
        id: StageId::Frontend,
        prerequisites: &[StageId::Swiftpm],
        sources: &[Source {
            dir: "klepto-frontend",
            hint: "clone klepto-frontend next to this checkout",
        }],
        artifacts: &["klepto-frontend"],
    },
];

pub struct Registry {
    stages: Vec<Stage>,
}

impl Registry {
    /// Validates prerequisite references and DAG-ness at load.
    pub fn new(stages: Vec<Stage>) -> Result<Self, Error> {
        let registry = Self { stages };
        for stage in &registry.stages {
            for prerequisite in stage.prerequisites {
                if registry.get(*prerequisite).is_none() {
                    return Err(Error::UnknownStage {
                        name: prerequisite.as_str().into(),
                    });
                }
            }
        }
        let all: Vec<StageId> = registry.stages.iter().map(|stage| stage.id).collect();
        registry.resolve(&all)?;
        Ok(registry)
    }

    pub fn builtin() -> Result<Self, Error> {
        Self::new(BUILTIN.to_vec())
    }

    /// All stages in registration order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn get(&self, id: StageId) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.id == id)
    }

    /// Topologically sorts the selected stages so every stage follows its
    /// selected prerequisites. Prerequisites outside the selection are
    /// ignored here; the runner checks them against artifacts on disk.
    pub fn resolve(&self, selected: &[StageId]) -> Result<Vec<StageId>, Error> {
        for id in selected {
            if self.get(*id).is_none() {
                return Err(Error::UnknownStage {
                    name: id.as_str().into(),
                });
            }
        }
        let selected: HashSet<StageId> = selected.iter().copied().collect();

        let mut order = Vec::with_capacity(selected.len());
        let mut placed: HashSet<StageId> = HashSet::new();
        while placed.len() < selected.len() {
            let mut progressed = false;
            // Registration-order scan gives the stable tie-break.
            for stage in &self.stages {
                if !selected.contains(&stage.id) || placed.contains(&stage.id) {
                    continue;
                }
                let ready = stage
                    .prerequisites
                    .iter()
                    .all(|p| !selected.contains(p) || placed.contains(p));
                if ready {
                    order.push(stage.id);
                    placed.insert(stage.id);
                    progressed = true;
                }
            }
            if !progressed {
                let involved = self
                    .stages
                    .iter()
                    .map(|stage| stage.id)
                    .filter(|id| selected.contains(id) && !placed.contains(id))
                    .collect();
                return Err(Error::CyclicDependency { involved });
            }
        }
        Ok(order)
    }
}

/// Expands a stage descriptor into concrete work, checking its sibling
/// source checkout first.
pub fn plan(stage: &Stage, config: &BuildConfig) -> Result<StagePlan, Error> {
    for source in stage.sources {
        let dir = config.root.join(source.dir);
        if !dir.is_dir() {
            return Err(Error::MissingSource {
                stage: stage.id,
                dir,
                hint: source.hint,
            });
        }
    }
    match stage.id {
        StageId::Icu => Ok(icu::plan(config)),
        StageId::Toolchain => Ok(toolchain::plan(config)),
        StageId::Libdispatch => libdispatch::plan(config),
        StageId::Swiftpm => Ok(swiftpm::plan(config)),
        StageId::Frontend => Ok(frontend::plan(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> Registry {
        match Registry::builtin() {
            Ok(registry) => registry,
            Err(err) => unreachable!("builtin registry must load: {err}"),
        }
    }

    #[test]
    fn test_builtin_full_resolution_order() {
        let registry = builtin();
        let all: Vec<StageId> = registry.stages().iter().map(|s| s.id).collect();
        let order = registry.resolve(&all);
        assert!(matches!(
            order.as_deref(),
            Ok([
                StageId::Icu,
                StageId::Toolchain,
                StageId::Libdispatch,
                StageId::Swiftpm,
                StageId::Frontend,
            ])
        ));
    }

    #[test]
    fn test_resolve_orders_prerequisites_first_regardless_of_input_order() {
        let registry = builtin();
        let order = registry.resolve(&[StageId::Frontend, StageId::Swiftpm, StageId::Toolchain]);
        assert!(matches!(
            order.as_deref(),
            Ok([StageId::Toolchain, StageId::Swiftpm, StageId::Frontend])
        ));
    }

    #[test]
    fn test_resolve_ignores_unselected_prerequisites() {
        // swiftpm requires toolchain, but when toolchain is not selected it
        // is the runner's job to verify its artifacts, not the resolver's.
        let registry = builtin();
        let order = registry.resolve(&[StageId::Frontend, StageId::Swiftpm]);
        assert!(matches!(
            order.as_deref(),
            Ok([StageId::Swiftpm, StageId::Frontend])
        ));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let registry = builtin();
        let a = registry.resolve(&[StageId::Libdispatch, StageId::Swiftpm, StageId::Toolchain]);
        let b = registry.resolve(&[StageId::Swiftpm, StageId::Toolchain, StageId::Libdispatch]);
        assert!(matches!(
            a.as_deref(),
            Ok([StageId::Toolchain, StageId::Libdispatch, StageId::Swiftpm])
        ));
        match (a, b) {
            (Ok(first), Ok(second)) => assert_eq!(first, second),
            _ => unreachable!("both resolutions must succeed"),
        }
    }

    #[test]
    fn test_toolchain_plan_requires_icu_checkout() -> Result<(), std::io::Error> {
        let tmp = tempfile::tempdir()?;
        std::fs::create_dir(tmp.path().join("swift"))?;
        let config = crate::config::test_config(tmp.path());
        let registry = builtin();
        let toolchain = match registry.get(StageId::Toolchain) {
            Some(stage) => *stage,
            None => unreachable!("toolchain is builtin"),
        };
        assert!(matches!(
            plan(&toolchain, &config),
            Err(Error::MissingSource { stage: StageId::Toolchain, dir, .. })
                if dir.ends_with("libicuuc-libnx")
        ));
        std::fs::create_dir(tmp.path().join("libicuuc-libnx"))?;
        assert!(plan(&toolchain, &config).is_ok());
        Ok(())
    }

    #[test]
    fn test_registry_load_rejects_unregistered_prerequisite() {
        let stages = vec![Stage {
            id: StageId::Swiftpm,
            prerequisites: &[StageId::Toolchain],
            sources: &[],
            artifacts: &["swiftpm"],
        }];
        assert!(matches!(
            Registry::new(stages),
            Err(Error::UnknownStage { name }) if name == "toolchain"
        ));
    }

    #[test]
    fn test_registry_load_rejects_cycle() {
        let stages = vec![
            Stage {
                id: StageId::Toolchain,
                prerequisites: &[StageId::Swiftpm],
                sources: &[],
                artifacts: &["toolchain"],
            },
            Stage {
                id: StageId::Swiftpm,
                prerequisites: &[StageId::Toolchain],
                sources: &[],
                artifacts: &["swiftpm"],
            },
        ];
        assert!(matches!(
            Registry::new(stages),
            Err(Error::CyclicDependency { involved }) if involved.len() == 2
        ));
    }

    #[test]
    fn test_resolve_rejects_stage_missing_from_registry() {
        let registry = match Registry::new(vec![Stage {
            id: StageId::Icu,
            prerequisites: &[],
            sources: &[],
            artifacts: &["icu"],
        }]) {
            Ok(registry) => registry,
            Err(err) => unreachable!("single-stage registry must load: {err}"),
        };
        assert!(matches!(
            registry.resolve(&[StageId::Frontend]),
            Err(Error::UnknownStage { name }) if name == "frontend"
        ));
    }
}
