//! Version manifest and distributable archive.
//!
//! The manifest records which devkitA64/libnx/swift/klepto versions went
//! into the install tree. Packaging collects the declared artifacts of the
//! stages that completed into one `.tar.gz`, named after the distribution.

use crate::config::BuildConfig;
use crate::error::Error;
use crate::stage::{Registry, StageId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const MANIFEST_NAME: &str = "manifest.json";

#[derive(Serialize)]
struct Manifest {
    versions: BTreeMap<&'static str, String>,
    built_at: DateTime<Utc>,
}

/// Writes `manifest.json` into the install destdir.
pub fn write_manifest(config: &BuildConfig) -> Result<PathBuf, Error> {
    let manifest = Manifest {
        versions: BTreeMap::from([
            ("devkitA64", config.versions.devkita64.clone()),
            ("libnx", config.versions.libnx.clone()),
            ("swift", config.versions.swift.clone()),
            ("klepto", config.versions.klepto.clone()),
        ]),
        built_at: Utc::now(),
    };
    let path = config.install_destdir.join(MANIFEST_NAME);
    println!("=== Writing {} ===", path.display());
    fs::create_dir_all(&config.install_destdir)?;
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(path)
}

/// Bundles the artifacts of the completed stages into
/// `<dest_dir>/<dist_name>.tar.gz`.
///
/// Every declared artifact is verified before any archive I/O, so a
/// missing one leaves nothing at the destination. The tar itself writes to
/// a temporary name and is renamed into place afterwards.
pub fn package(
    config: &BuildConfig,
    registry: &Registry,
    completed: &[StageId],
    dest_dir: &Path,
) -> Result<PathBuf, Error> {
    let mut members = Vec::new();
    for id in completed {
        let Some(stage) = registry.get(*id) else {
            return Err(Error::UnknownStage {
                name: id.as_str().into(),
            });
        };
        for rel in stage.artifacts {
            let path = config.install_destdir.join(rel);
            if !path.exists() {
                return Err(Error::MissingArtifact { stage: *id, path });
            }
            members.push((*rel).to_string());
        }
    }
    let mut members = dedupe_nested(members);
    if config.install_destdir.join(MANIFEST_NAME).is_file() {
        members.push(MANIFEST_NAME.to_string());
    }

    // Archive layout convention: one top-level directory named after the
    // install tree.
    let base = config
        .install_destdir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| config.dist_name.clone());
    let parent = config
        .install_destdir
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    fs::create_dir_all(dest_dir)?;
    let archive = dest_dir.join(format!("{}.tar.gz", config.dist_name));
    let partial = dest_dir.join(format!(".{}.tar.gz.partial", config.dist_name));

    println!("=== Writing {} ===", archive.display());
    let status = Command::new("tar")
        .arg("-czf")
        .arg(&partial)
        .arg("-C")
        .arg(&parent)
        .args(members.iter().map(|rel| format!("{base}/{rel}")))
        .status()?;
    if !status.success() {
        let _ = fs::remove_file(&partial);
        return Err(Error::ArchiveFailed { status });
    }
    fs::rename(&partial, &archive)?;
    Ok(archive)
}

/// Drops artifact paths nested under another artifact so the archive does
/// not carry duplicate trees (libdispatch installs inside `toolchain/`).
fn dedupe_nested(members: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    for member in members {
        if kept
            .iter()
            .any(|outer| *outer == member || member.starts_with(&format!("{outer}/")))
        {
            continue;
        }
        kept.retain(|outer| !outer.starts_with(&format!("{member}/")));
        kept.push(member);
    }
    kept
}
