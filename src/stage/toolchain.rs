//! Swift compiler + clang, built through the swift build-script presets.

use crate::config::BuildConfig;
use crate::stage::plan::{Action, Invocation, StagePlan};
use crate::stage::StageId;

pub fn plan(config: &BuildConfig) -> StagePlan {
    let destdir = config.install_destdir.join("toolchain");
    let invocation = Invocation::new("python3")
        .arg("./swift/utils/build-script")
        // The LLVM and clang link steps like to eat RAM.
        .arg("-j1")
        .arg(format!("--preset={}", config.configuration.preset()))
        .arg(format!("devkitpro_path={}", config.devkitpro.display()))
        .arg(format!("install_destdir={}", destdir.display()))
        .arg(format!(
            "libnx_icu_path={}",
            config.icu_source().display()
        ))
        .arg(format!(
            "versions_str=klepto-toolchain-{}",
            config.versions.versions_str()
        ));
    StagePlan {
        id: StageId::Toolchain,
        cwd: config.root.clone(),
        actions: vec![Action::Run(invocation)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use std::path::Path;

    #[test]
    fn test_plan_expands_preset_and_paths() {
        let config = test_config(Path::new("/checkout"));
        let plan = plan(&config);
        assert_eq!(plan.cwd, Path::new("/checkout"));
        let rendered = plan.render();
        assert!(rendered.contains("--preset=libnx_release"));
        assert!(rendered.contains("devkitpro_path=/checkout/devkitpro"));
        assert!(rendered.contains("libnx_icu_path=/checkout/libicuuc-libnx"));
        assert!(rendered.contains("versions_str=klepto-toolchain-swift[5.3]"));
    }
}
