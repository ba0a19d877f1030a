//! libdispatch, cross-compiled with the installed clang against libnx.
//!
//! The cross cflags are probed from the devkitA64 gcc at planning time so
//! the dry-run output shows the fully expanded cmake invocation.

use crate::config::BuildConfig;
use crate::error::Error;
use crate::stage::plan::{Action, Invocation, StagePlan};
use crate::stage::StageId;
use std::process::{Command, Stdio};

pub fn plan(config: &BuildConfig) -> Result<StagePlan, Error> {
    let source_dir = config.root.join("klepto-libdispatch");
    let build_dir = config.build_dir().join("libdispatch");
    let toolchain_bin = config.install_destdir.join("toolchain/usr/bin");
    let install_prefix = config.install_destdir.join("toolchain");

    let cflags = cross_cflags(config)?.join(" ");
    let cmake = Invocation::new("cmake")
        .args(["-G", "Ninja"])
        .arg(source_dir.display().to_string())
        .arg(format!(
            "-DCMAKE_C_COMPILER={}",
            toolchain_bin.join("clang").display()
        ))
        .arg(format!(
            "-DCMAKE_CXX_COMPILER={}",
            toolchain_bin.join("clang++").display()
        ))
        .arg("-DBUILD_SHARED_LIBS:BOOL=NO")
        .arg(format!("-DCMAKE_INSTALL_PREFIX={}", install_prefix.display()))
        .arg(format!("-DCMAKE_C_FLAGS={cflags}"))
        .arg(format!("-DCMAKE_CXX_FLAGS={cflags}"));

    Ok(StagePlan {
        id: StageId::Libdispatch,
        cwd: build_dir,
        actions: vec![
            Action::Run(cmake),
            Action::Run(Invocation::new("ninja").arg("-v")),
            Action::Run(Invocation::new("ninja").arg("install")),
        ],
    })
}

/// Flags that make clang emulate the devkitA64 gcc target environment.
fn cross_cflags(config: &BuildConfig) -> Result<Vec<String>, Error> {
    let mut include_paths = probe_isystem_paths(config)?;
    include_paths.push(
        config
            .devkitpro
            .join("libnx/include")
            .display()
            .to_string(),
    );

    let mut cflags: Vec<String> = [
        "-Wno-gnu-include-next",
        "-D__SWITCH__",
        "-D__DEVKITA64__",
        "-D__unix__",
        "-D__linux__",
        "-fPIE",
        "-nostdinc",
        "-nostdinc++",
        "-D_POSIX_C_SOURCE=200809",
        "-D_GNU_SOURCE",
        "-mno-tls-direct-seg-refs",
        "-Qunused-arguments",
        "-Xclang",
        "-target-feature",
        "-Xclang",
        "+read-tp-soft",
        "-ftls-model=local-exec",
        // libdispatch itself wants the os_debug log path and must not take
        // the linux codepaths the base flags otherwise advertise.
        "-DDISPATCH_USE_OS_DEBUG_LOG",
        "-U__linux__",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    cflags.push(format!(
        "-I{}/portlibs/switch/include/",
        config.devkitpro.display()
    ));
    cflags.extend(include_paths.iter().map(|path| format!("-isystem{path}")));
    Ok(cflags)
}

/// Runs the devkitA64 gcc preprocessor once to learn its builtin system
/// include paths; libnx headers are appended by the caller.
fn probe_isystem_paths(config: &BuildConfig) -> Result<Vec<String>, Error> {
    let gcc = config.devkita64_gcc();
    let output = Command::new(&gcc)
        .args(["-xc++", "-E", "-Wp,-v", "-"])
        .stdin(Stdio::null())
        .output()
        .map_err(|source| Error::ProbeFailed {
            program: gcc.clone(),
            source,
        })?;
    // gcc prints the search list on stderr; merge both to be safe.
    let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
    listing.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(parse_isystem_paths(&listing))
}

/// Search-path lines in `-Wp,-v` output are indented absolute paths.
fn parse_isystem_paths(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter(|line| line.starts_with(' '))
        .map(str::trim)
        .filter(|line| line.starts_with('/'))
        .map(ToString::to_string)
        .collect()
}
