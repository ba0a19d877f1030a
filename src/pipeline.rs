//! Sequential stage execution with fail-fast semantics.
//!
//! Stages run strictly one after another in the resolved order; the first
//! non-zero exit aborts everything that follows. Artifacts of completed
//! stages are left in place, since external builds are expensive and
//! resumable via `--skip-built`. The dry-run reporter walks the identical
//! plan without touching the filesystem.

use crate::config::BuildConfig;
use crate::error::Error;
use crate::stage::plan::{Action, StagePlan};
use crate::stage::{Registry, StageId};
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// Marker artifact already present, nothing was invoked.
    Skipped,
    Failed,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub stage: StageId,
    pub outcome: Outcome,
    pub duration: Duration,
    pub log: Option<PathBuf>,
}

/// Results of every attempted stage, in order. On failure the error is
/// carried alongside so completed stages keep their results.
pub struct RunReport {
    pub results: Vec<ExecutionResult>,
    pub error: Option<Error>,
}

impl RunReport {
    fn aborted(error: Error) -> Self {
        Self {
            results: Vec::new(),
            error: Some(error),
        }
    }

    /// Stages whose artifacts are valid for packaging.
    pub fn completed(&self) -> Vec<StageId> {
        self.results
            .iter()
            .filter(|result| result.outcome != Outcome::Failed)
            .map(|result| result.stage)
            .collect()
    }
}

pub(crate) struct PlannedStage {
    pub plan: StagePlan,
    pub marker: Option<PathBuf>,
}

/// Executes the resolved order: plan every stage, verify prerequisites,
/// run, and finish by writing the version manifest.
pub fn run(config: &BuildConfig, registry: &Registry, order: &[StageId]) -> RunReport {
    let planned = match plan_all(config, registry, order) {
        Ok(planned) => planned,
        Err(err) => return RunReport::aborted(err),
    };
    if let Err(err) = preflight(config, registry, order) {
        return RunReport::aborted(err);
    }
    let mut report = run_plans(config, planned);
    if report.error.is_none() {
        if let Err(err) = crate::package::write_manifest(config) {
            report.error = Some(err);
        }
    }
    report
}

/// Prints the fully expanded plan, one line per stage. Never writes.
pub fn dry_run(config: &BuildConfig, registry: &Registry, order: &[StageId]) -> Result<(), Error> {
    for line in plan_lines(config, registry, order)? {
        println!("{line}");
    }
    Ok(())
}

pub fn plan_lines(
    config: &BuildConfig,
    registry: &Registry,
    order: &[StageId],
) -> Result<Vec<String>, Error> {
    plan_all(config, registry, order).map(|planned| {
        planned
            .into_iter()
            .map(|stage| stage.plan.render())
            .collect()
    })
}

fn plan_all(
    config: &BuildConfig,
    registry: &Registry,
    order: &[StageId],
) -> Result<Vec<PlannedStage>, Error> {
    order
        .iter()
        .map(|id| {
            let stage = registry.get(*id).ok_or_else(|| Error::UnknownStage {
                name: id.as_str().into(),
            })?;
            Ok(PlannedStage {
                plan: crate::stage::plan(stage, config)?,
                marker: stage.marker(config),
            })
        })
        .collect()
}

/// A stage may only run once each prerequisite is either scheduled earlier
/// in this run or already satisfied on disk.
fn preflight(config: &BuildConfig, registry: &Registry, order: &[StageId]) -> Result<(), Error> {
    for id in order {
        let Some(stage) = registry.get(*id) else {
            return Err(Error::UnknownStage {
                name: id.as_str().into(),
            });
        };
        for prerequisite in stage.prerequisites {
            if order.contains(prerequisite) {
                continue;
            }
            let satisfied = registry
                .get(*prerequisite)
                .and_then(|stage| stage.marker(config))
                .is_some_and(|marker| marker.exists());
            if !satisfied {
                return Err(Error::UnsatisfiedPrerequisite {
                    stage: *id,
                    prerequisite: *prerequisite,
                });
            }
        }
    }
    Ok(())
}

pub(crate) fn run_plans(config: &BuildConfig, planned: Vec<PlannedStage>) -> RunReport {
    let mut results = Vec::new();
    for PlannedStage { plan, marker } in planned {
        if config.skip_built {
            if let Some(marker) = &marker {
                if marker.exists() {
                    println!("=== Skipping {} ({} exists) ===", plan.id, marker.display());
                    results.push(ExecutionResult {
                        stage: plan.id,
                        outcome: Outcome::Skipped,
                        duration: Duration::ZERO,
                        log: None,
                    });
                    continue;
                }
            }
        }

        println!("=== Building {} ===", plan.id);
        let start = Instant::now();
        match execute_plan(config, &plan) {
            Ok(log) => results.push(ExecutionResult {
                stage: plan.id,
                outcome: Outcome::Succeeded,
                duration: start.elapsed(),
                log: Some(log),
            }),
            Err(err) => {
                results.push(ExecutionResult {
                    stage: plan.id,
                    outcome: Outcome::Failed,
                    duration: start.elapsed(),
                    log: failure_log(&err),
                });
                if let Some(log) = failure_log(&err) {
                    eprintln!("=== {} failed, log tail ===", plan.id);
                    print_log_tail(&log);
                }
                return RunReport {
                    results,
                    error: Some(err),
                };
            }
        }
    }
    RunReport {
        results,
        error: None,
    }
}

fn failure_log(err: &Error) -> Option<PathBuf> {
    match err {
        Error::StageExecutionFailed { log, .. } => Some(log.clone()),
        _ => None,
    }
}

fn execute_plan(config: &BuildConfig, plan: &StagePlan) -> Result<PathBuf, Error> {
    fs::create_dir_all(&plan.cwd)?;
    fs::create_dir_all(&config.install_destdir)?;
    fs::create_dir_all(config.log_dir())?;
    let log_path = config.log_dir().join(format!("{}.log", plan.id));
    // Truncate whatever a previous run left behind.
    File::create(&log_path)?;

    for action in &plan.actions {
        println!("  {}", action.render());
        execute_action(plan.id, &plan.cwd, action, &log_path)?;
    }
    Ok(log_path)
}

fn execute_action(
    stage: StageId,
    cwd: &Path,
    action: &Action,
    log_path: &Path,
) -> Result<(), Error> {
    match action {
        Action::Run(invocation) => {
            let log = File::options().append(true).open(log_path)?;
            let log_err = log.try_clone()?;
            let mut child = Command::new(&invocation.program)
                .args(&invocation.args)
                .current_dir(cwd)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()?;
            // Output streams to the console while the log keeps a copy;
            // toolchain builds run for hours and a silent console reads as
            // a hang.
            let forwarders = [
                child
                    .stdout
                    .take()
                    .map(|pipe| thread::spawn(move || tee(pipe, log, io::stdout()))),
                child
                    .stderr
                    .take()
                    .map(|pipe| thread::spawn(move || tee(pipe, log_err, io::stderr()))),
            ];
            let status = child.wait()?;
            for forwarder in forwarders.into_iter().flatten() {
                join_forwarder(forwarder)?;
            }
            if !status.success() {
                return Err(Error::StageExecutionFailed {
                    stage,
                    status,
                    log: log_path.to_path_buf(),
                });
            }
            Ok(())
        }
        Action::CopyTree { src, dest, ignore } => copy_tree(src, dest, ignore),
        Action::Symlink { target, link } => replace_symlink(target, link),
    }
}

/// Copies a child output stream to both the log and the console.
fn tee(mut stream: impl Read, mut log: File, mut console: impl Write) -> io::Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let read = stream.read(&mut buf)?;
        if read == 0 {
            return Ok(());
        }
        log.write_all(&buf[..read])?;
        console.write_all(&buf[..read])?;
        console.flush()?;
    }
}

fn join_forwarder(handle: thread::JoinHandle<io::Result<()>>) -> Result<(), Error> {
    match handle.join() {
        Ok(done) => done.map_err(Error::Io),
        Err(_) => Err(Error::Io(io::Error::other(
            "output forwarding thread panicked",
        ))),
    }
}

/// Recursive copy that leaves ignored entries behind. Regular files only;
/// sources here are checkouts and prebuilt library trees.
fn copy_tree(src: &Path, dest: &Path, ignore: &[String]) -> Result<(), Error> {
    let patterns = ignore
        .iter()
        .map(|pattern| wildcard_regex(pattern))
        .collect::<Result<Vec<_>, _>>()?;
    copy_tree_filtered(src, dest, &patterns)
}

fn copy_tree_filtered(src: &Path, dest: &Path, ignore: &[Regex]) -> Result<(), Error> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if ignore.iter().any(|pattern| pattern.is_match(&name_str)) {
            continue;
        }
        let target = dest.join(&name);
        if entry.file_type()?.is_dir() {
            copy_tree_filtered(&entry.path(), &target, ignore)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Compiles a `*`-only wildcard into an anchored regex.
fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(|part| regex::escape(part))
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
}

fn replace_symlink(target: &Path, link: &Path) -> Result<(), Error> {
    if link.symlink_metadata().is_ok() {
        fs::remove_file(link)?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = target;
        Err(Error::Io(std::io::Error::other(
            "symlinks require a unix host",
        )))
    }
}

const TAIL_LINES: usize = 20;
const TAIL_WINDOW: u64 = 64 * 1024;

fn print_log_tail(log: &Path) {
    if let Ok(contents) = read_log_tail(log) {
        let lines: Vec<&str> = contents.lines().collect();
        for line in &lines[lines.len().saturating_sub(TAIL_LINES)..] {
            eprintln!("  {line}");
        }
    }
}

/// Reads at most the trailing window of the log; these files can reach
/// hundreds of megabytes on a full toolchain build.
fn read_log_tail(log: &Path) -> io::Result<String> {
    let mut file = File::open(log)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(TAIL_WINDOW)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
