//! Host environment checks.
//!
//! Everything the build needs from the host is verified up front: required
//! executables, the devkitPro SDK root, the installed devkitA64/libnx
//! package versions, and the Swift source version. All failures are
//! accumulated and reported together so one re-run fixes everything.

use crate::config::Versions;
use crate::error::Error;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Executables every run needs. Stage-specific extras (`ninja` for
/// libdispatch, `tar` for packaging) are appended by the caller so a run
/// that never uses them does not require them.
pub const REQUIRED_TOOLS: &[&str] = &["clang", "clang++", "swift", "python3", "cmake"];

pub struct ResolvedEnv {
    pub devkitpro: PathBuf,
    pub versions: Versions,
}

/// Checks the host, printing one `[OK]`/`[FAIL]` line per item.
pub fn resolve(root: &Path, extra_tools: &[&str]) -> Result<ResolvedEnv, Error> {
    let mut missing = Vec::new();

    for tool in REQUIRED_TOOLS.iter().chain(extra_tools) {
        if which::which(tool).is_ok() {
            eprintln!("[OK] {tool}");
        } else {
            eprintln!("[FAIL] missing `{tool}` in PATH");
            missing.push(format!("{tool} (executable)"));
        }
    }

    let devkitpro = match devkitpro_root() {
        Ok(path) => {
            eprintln!("[OK] DEVKITPRO = {}", path.display());
            Some(path)
        }
        Err(problem) => {
            eprintln!("[FAIL] {problem}");
            missing.push(problem);
            None
        }
    };

    let packages = query_package_versions();
    let devkita64 = installed_version(&packages, "devkitA64", &mut missing);
    let libnx = installed_version(&packages, "libnx", &mut missing);

    let cmakelists = root.join("swift/CMakeLists.txt");
    let (swift, klepto) = match std::fs::read_to_string(&cmakelists) {
        Ok(contents) => {
            let swift = cmake_variable(&contents, "SWIFT_VERSION");
            let klepto = cmake_variable(&contents, "KLEPTO_VERSION");
            for (name, value) in [("SWIFT_VERSION", &swift), ("KLEPTO_VERSION", &klepto)] {
                if value.is_none() {
                    eprintln!("[FAIL] {name} not found in {}", cmakelists.display());
                    missing.push(format!("{name} in swift/CMakeLists.txt"));
                }
            }
            (swift, klepto)
        }
        Err(_) => {
            eprintln!(
                "[FAIL] swift source not found at {} (clone the klepto swift fork next to this checkout)",
                cmakelists.display()
            );
            missing.push("swift/CMakeLists.txt (swift source checkout)".into());
            (None, None)
        }
    };

    if !missing.is_empty() {
        return Err(Error::EnvironmentMissing { missing });
    }

    // All four are Some here; the fallbacks are unreachable.
    let versions = Versions {
        devkita64: devkita64.unwrap_or_default(),
        libnx: libnx.unwrap_or_default(),
        swift: swift.unwrap_or_default(),
        klepto: klepto.unwrap_or_default(),
    };
    let devkitpro = devkitpro.unwrap_or_default();
    eprintln!("[OK] building {}", versions.versions_str());

    Ok(ResolvedEnv { devkitpro, versions })
}

fn devkitpro_root() -> Result<PathBuf, String> {
    let raw = std::env::var_os("DEVKITPRO")
        .ok_or_else(|| "DEVKITPRO environment variable is not set".to_string())?;
    let path = PathBuf::from(raw);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!(
            "DEVKITPRO points at {}, which does not exist",
            path.display()
        ))
    }
}

/// Queries installed package versions from dkp-pacman, falling back to
/// plain pacman for setups where devkitPro shares the system database.
fn query_package_versions() -> HashMap<String, String> {
    for pacman in ["dkp-pacman", "pacman"] {
        if let Ok(output) = Command::new(pacman).arg("-Qe").output() {
            if output.status.success() {
                return parse_package_list(&String::from_utf8_lossy(&output.stdout));
            }
        }
    }
    HashMap::new()
}

fn installed_version(
    packages: &HashMap<String, String>,
    name: &str,
    missing: &mut Vec<String>,
) -> Option<String> {
    match packages.get(name) {
        Some(version) => {
            eprintln!("[OK] {name} {version}");
            Some(version.clone())
        }
        None => {
            eprintln!("[FAIL] {name} does not seem to be installed (searched with dkp-pacman/pacman)");
            missing.push(format!("{name} (devkitPro package)"));
            None
        }
    }
}

/// Parses `pacman -Qe` output: one `name version` pair per line.
fn parse_package_list(listing: &str) -> HashMap<String, String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some((parts.next()?.to_string(), parts.next()?.to_string()))
        })
        .collect()
}

/// Extracts `set(NAME "value")` from CMakeLists contents.
fn cmake_variable(contents: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"set\({} "(.*?)"\)"#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    re.captures(contents).map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_list() {
        let listing = "devkitA64 r20-1\nlibnx 4.2.0-1\ndeko3d 0.3.0-1\n";
        let packages = parse_package_list(listing);
        assert_eq!(packages.get("devkitA64").map(String::as_str), Some("r20-1"));
        assert_eq!(packages.get("libnx").map(String::as_str), Some("4.2.0-1"));
        assert_eq!(packages.len(), 3);
    }

    #[test]
    fn test_parse_package_list_skips_malformed_lines() {
        let packages = parse_package_list("devkitA64 r20-1\n\nnot-a-pair\n");
        assert_eq!(packages.len(), 1);
    }

    #[test]
    fn test_cmake_variable() {
        let contents = r#"
cmake_minimum_required(VERSION 3.16)
set(SWIFT_VERSION "5.3.1")
set(KLEPTO_VERSION "0.2.0")
"#;
        assert_eq!(
            cmake_variable(contents, "SWIFT_VERSION").as_deref(),
            Some("5.3.1")
        );
        assert_eq!(
            cmake_variable(contents, "KLEPTO_VERSION").as_deref(),
            Some("0.2.0")
        );
        assert_eq!(cmake_variable(contents, "MISSING_VERSION"), None);
    }
}
