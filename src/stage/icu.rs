//! Prebuilt libicuuc for libnx, staged into the install tree.
//!
//! Only the folders relevant for linking are kept; headers and build
//! leftovers stay behind.

use crate::config::BuildConfig;
use crate::stage::plan::{Action, StagePlan};
use crate::stage::StageId;

const USEFUL_DIRS: &[&str] = &["lib", "stubdata"];
const IGNORE: &[&str] = &["*.so.*", "*.so", "*.ao", "*.o", "*.d", "Makefile"];

pub fn plan(config: &BuildConfig) -> StagePlan {
    let src = config.icu_source();
    let dest = config.install_destdir.join("icu");
    let actions = USEFUL_DIRS
        .iter()
        .map(|dir| Action::CopyTree {
            src: src.join(dir),
            dest: dest.join(dir),
            ignore: IGNORE.iter().map(ToString::to_string).collect(),
        })
        .collect();
    StagePlan {
        id: StageId::Icu,
        cwd: config.root.clone(),
        actions,
    }
}
