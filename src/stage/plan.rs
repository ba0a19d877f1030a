//! Planned work for a single stage.
//!
//! A plan is pure data: the working directory plus an ordered list of
//! actions, fully expanded from the build configuration. The dry-run
//! reporter renders it; the pipeline runner executes it.

use crate::stage::StageId;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Shell-style rendering for logs and dry-run output.
    pub fn render(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            if arg.contains(' ') {
                rendered.push('\'');
                rendered.push_str(arg);
                rendered.push('\'');
            } else {
                rendered.push_str(arg);
            }
        }
        rendered
    }
}

/// The closed set of things a stage can do. Build stages run external
/// commands; the install-only stages (icu, frontend) copy trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Run(Invocation),
    CopyTree {
        src: PathBuf,
        dest: PathBuf,
        /// Wildcard patterns for entries to leave behind.
        ignore: Vec<String>,
    },
    Symlink {
        target: PathBuf,
        link: PathBuf,
    },
}

impl Action {
    pub fn render(&self) -> String {
        match self {
            Self::Run(invocation) => invocation.render(),
            Self::CopyTree { src, dest, .. } => {
                format!("copy {} -> {}", src.display(), dest.display())
            }
            Self::Symlink { target, link } => {
                format!("link {} -> {}", link.display(), target.display())
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct StagePlan {
    pub id: StageId,
    /// Working directory for every `Run` action. Created by the runner,
    /// never by planning.
    pub cwd: PathBuf,
    pub actions: Vec<Action>,
}

impl StagePlan {
    /// One-line summary: stage name, working directory, resolved actions.
    pub fn render(&self) -> String {
        let actions = self
            .actions
            .iter()
            .map(Action::render)
            .collect::<Vec<_>>()
            .join(" && ");
        format!("{}  [{}]  {}", self.id, self.cwd.display(), actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_render_quotes_spaces() {
        let invocation = Invocation::new("cmake")
            .args(["-G", "Ninja"])
            .arg("-DCMAKE_C_FLAGS=-D__SWITCH__ -fPIE");
        assert_eq!(
            invocation.render(),
            "cmake -G Ninja '-DCMAKE_C_FLAGS=-D__SWITCH__ -fPIE'"
        );
    }

    #[test]
    fn test_plan_render_is_one_line() {
        let plan = StagePlan {
            id: StageId::Icu,
            cwd: PathBuf::from("/checkout"),
            actions: vec![
                Action::CopyTree {
                    src: PathBuf::from("/checkout/libicuuc-libnx/lib"),
                    dest: PathBuf::from("/dist/icu/lib"),
                    ignore: vec!["*.so".into()],
                },
                Action::Run(Invocation::new("true")),
            ],
        };
        let rendered = plan.render();
        assert!(!rendered.contains('\n'));
        assert!(rendered.starts_with("icu  [/checkout]  copy "));
        assert!(rendered.ends_with(" && true"));
    }
}
