//! SwiftPM, bootstrapped against the freshly installed toolchain.

use crate::config::{BuildConfig, Configuration};
use crate::stage::plan::{Action, Invocation, StagePlan};
use crate::stage::StageId;

pub fn plan(config: &BuildConfig) -> StagePlan {
    let prefix = config.install_destdir.join("swiftpm");
    let bootstrap = |command: &str| {
        let mut invocation = Invocation::new("python3")
            .arg("Utilities/bootstrap")
            .arg(command)
            .arg("-v")
            .arg("--prefix")
            .arg(prefix.display().to_string());
        if config.reconfigure {
            invocation = invocation.arg("--reconfigure");
        }
        if config.configuration == Configuration::Release {
            invocation = invocation.arg("--release");
        }
        Action::Run(invocation)
    };
    StagePlan {
        id: StageId::Swiftpm,
        cwd: config.root.join("klepto-swiftpm"),
        actions: vec![bootstrap("build"), bootstrap("install")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use std::path::Path;

    #[test]
    fn test_plan_builds_then_installs() {
        let config = test_config(Path::new("/checkout"));
        let plan = plan(&config);
        assert_eq!(plan.cwd, Path::new("/checkout/klepto-swiftpm"));
        assert_eq!(plan.actions.len(), 2);
        let rendered = plan.render();
        assert!(rendered.contains("bootstrap build"));
        assert!(rendered.contains("bootstrap install"));
        assert!(rendered.contains("--reconfigure"));
        assert!(rendered.contains("--release"));
    }

    #[test]
    fn test_debug_plan_drops_release_flag() {
        let mut config = test_config(Path::new("/checkout"));
        config.configuration = Configuration::Debug;
        config.reconfigure = false;
        let rendered = plan(&config).render();
        assert!(!rendered.contains("--release"));
        assert!(!rendered.contains("--reconfigure"));
    }
}
