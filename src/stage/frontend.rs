//! Frontend wrapper scripts, installed verbatim with a `klepto`
//! convenience link next to them.

use crate::config::BuildConfig;
use crate::stage::plan::{Action, StagePlan};
use crate::stage::StageId;
use std::path::PathBuf;

pub fn plan(config: &BuildConfig) -> StagePlan {
    let src = config.root.join("klepto-frontend");
    let dest = config.install_destdir.join("klepto-frontend");
    StagePlan {
        id: StageId::Frontend,
        cwd: config.root.clone(),
        actions: vec![
            Action::CopyTree {
                src,
                dest,
                ignore: Vec::new(),
            },
            Action::Symlink {
                // Relative so the installed tree stays relocatable.
                target: PathBuf::from("klepto-frontend/klepto-frontend"),
                link: config.install_destdir.join("klepto"),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use std::path::Path;

    #[test]
    fn test_plan_installs_and_links() {
        let config = test_config(Path::new("/checkout"));
        let plan = plan(&config);
        assert_eq!(plan.actions.len(), 2);
        assert!(matches!(
            &plan.actions[1],
            Action::Symlink { link, .. } if link.ends_with("klepto")
        ));
    }
}
