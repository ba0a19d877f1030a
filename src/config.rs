//! Build configuration.
//!
//! Built once from CLI input plus environment resolution, read-only
//! afterward. Every component takes a `&BuildConfig` instead of reaching
//! into process-global state.

use clap::ValueEnum;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Configuration {
    #[value(name = "release")]
    Release,
    #[value(name = "debug")]
    Debug,
}

impl Configuration {
    /// The swift build-script preset this configuration maps to.
    pub fn preset(self) -> &'static str {
        match self {
            Self::Release => "libnx_release",
            Self::Debug => "libnx_debug",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Versions of everything that ends up inside the toolchain, as reported in
/// the manifest and embedded in the toolchain version string.
#[derive(Clone, Debug)]
pub struct Versions {
    pub devkita64: String,
    pub libnx: String,
    pub swift: String,
    pub klepto: String,
}

impl Versions {
    /// Renders the combined version string the toolchain build bakes into
    /// `swift --version` output.
    pub fn versions_str(&self) -> String {
        format!(
            "swift[{}]+dkA64[{}]+lnx[{}]",
            self.swift, self.devkita64, self.libnx
        )
    }
}

#[derive(Clone, Debug)]
pub struct BuildConfig {
    /// Checkout root; sibling source repositories live directly under it.
    pub root: PathBuf,
    /// devkitPro SDK root, from the DEVKITPRO environment variable.
    pub devkitpro: PathBuf,
    pub configuration: Configuration,
    /// Pass --reconfigure to builds that support it.
    pub reconfigure: bool,
    /// Skip stages whose first declared artifact already exists.
    pub skip_built: bool,
    pub versions: Versions,
    /// Distribution name, used for the default destdir and the archive.
    pub dist_name: String,
    /// Where products are installed; each stage owns a subtree of it.
    pub install_destdir: PathBuf,
}

impl BuildConfig {
    pub fn new(
        root: PathBuf,
        devkitpro: PathBuf,
        versions: Versions,
        configuration: Configuration,
        install_destdir: Option<PathBuf>,
        reconfigure: bool,
        skip_built: bool,
    ) -> Self {
        let dist_name = format!(
            "klepto-{}-{}-{}-{}",
            versions.klepto,
            configuration.label().to_uppercase(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        );
        let install_destdir =
            install_destdir.unwrap_or_else(|| root.join("dist").join(&dist_name));
        Self {
            root,
            devkitpro,
            configuration,
            reconfigure,
            skip_built,
            versions,
            dist_name,
            install_destdir,
        }
    }

    /// Prebuilt libicuuc for libnx, staged next to this checkout.
    pub fn icu_source(&self) -> PathBuf {
        self.root.join("libicuuc-libnx")
    }

    /// Scratch space for out-of-tree builds (cmake + ninja).
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// Per-stage build logs.
    pub fn log_dir(&self) -> PathBuf {
        self.build_dir().join("logs")
    }

    /// The devkitA64 cross gcc, used to probe system include paths.
    pub fn devkita64_gcc(&self) -> PathBuf {
        self.devkitpro.join("devkitA64/bin/aarch64-none-elf-gcc")
    }
}

#[cfg(test)]
pub(crate) fn test_config(root: &std::path::Path) -> BuildConfig {
    BuildConfig::new(
        root.to_path_buf(),
        root.join("devkitpro"),
        Versions {
            devkita64: "r20".into(),
            libnx: "4.2.0".into(),
            swift: "5.3".into(),
            klepto: "0.1.0".into(),
        },
        Configuration::Release,
        None,
        true,
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_versions_str_format() {
        let versions = Versions {
            devkita64: "r20".into(),
            libnx: "4.2.0".into(),
            swift: "5.3".into(),
            klepto: "0.1.0".into(),
        };
        assert_eq!(versions.versions_str(), "swift[5.3]+dkA64[r20]+lnx[4.2.0]");
    }

    #[test]
    fn test_default_destdir_under_dist() {
        let config = test_config(Path::new("/checkout"));
        assert!(config.dist_name.starts_with("klepto-0.1.0-RELEASE-"));
        assert_eq!(
            config.install_destdir,
            Path::new("/checkout").join("dist").join(&config.dist_name)
        );
    }

    #[test]
    fn test_explicit_destdir_wins() {
        let config = BuildConfig::new(
            PathBuf::from("/checkout"),
            PathBuf::from("/opt/devkitpro"),
            Versions {
                devkita64: "r20".into(),
                libnx: "4.2.0".into(),
                swift: "5.3".into(),
                klepto: "0.1.0".into(),
            },
            Configuration::Debug,
            Some(PathBuf::from("/tmp/out")),
            false,
            false,
        );
        assert_eq!(config.install_destdir, Path::new("/tmp/out"));
        assert_eq!(config.configuration.preset(), "libnx_debug");
    }
}
