//! Cache and temp-folder purging.
//!
//! Unlike the file batches, a purge works on a whole directory tree: every
//! file below the target is removed first, then the emptied directories are
//! removed deepest-first. The target directory itself is always kept.
//! Failures are recorded per entry and never stop the purge.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;
use colored::*;
use thiserror::Error;
use crate::colors;
use crate::config::CleanupSettings;
use crate::error::FailureCause;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurgeFailure {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub cause: FailureCause,
}

/// Counts for one purged directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupTally {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub failures: Vec<PurgeFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PurgeOutcome {
    /// Target absent. Informational: cache folders legitimately may not exist.
    Missing { path: PathBuf },
    Purged(CleanupTally),
}

impl PurgeOutcome {
    pub fn tally(&self) -> CleanupTally {
        match self {
            PurgeOutcome::Missing { .. } => CleanupTally::default(),
            PurgeOutcome::Purged(tally) => tally.clone(),
        }
    }

    /// Report fragment for this purge.
    pub fn render(&self, label: &str, target: &Path) -> String {
        match self {
            PurgeOutcome::Missing { path } => format!(
                "INFO: The folder '{}' does not exist at '{}'. Skipping.",
                label,
                path.display()
            ),
            PurgeOutcome::Purged(tally) => {
                let mut lines = vec![
                    format!("Result for '{}':", label),
                    format!("  - Path: {}", target.display()),
                    format!(
                        "  - Removed {} files and {} folders.",
                        tally.files_removed, tally.dirs_removed
                    ),
                ];
                if !tally.failures.is_empty() {
                    lines.push(format!("  - {} entries could not be removed:", tally.failures.len()));
                    for failure in &tally.failures {
                        lines.push(format!("      {}: {}", failure.path.display(), failure.cause));
                    }
                }
                lines.join("\n")
            }
        }
    }
}

/// Remove everything below `target`, keeping `target` itself.
pub fn purge_directory(target: &Path) -> PurgeOutcome {
    if !target.is_dir() {
        return PurgeOutcome::Missing {
            path: target.to_path_buf(),
        };
    }

    let mut tally = CleanupTally::default();
    let mut files = Vec::new();
    let mut dirs = Vec::new();

    // Pass 1: discover. Parents are always discovered before their children.
    let mut stack = vec![target.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                record(&mut tally, &dir, EntryKind::Directory, &err);
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    record(&mut tally, &dir, EntryKind::Directory, &err);
                    continue;
                }
            };
            let path = entry.path();
            // Symlinks are removed as links, never followed.
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => {
                    dirs.push(path.clone());
                    stack.push(path);
                }
                Ok(_) => files.push(path),
                Err(err) => record(&mut tally, &path, EntryKind::File, &err),
            }
        }
    }

    // Pass 2: files.
    for file in &files {
        match remove_file_or_link(file) {
            Ok(()) => tally.files_removed += 1,
            Err(err) => {
                if err.kind() == io::ErrorKind::PermissionDenied {
                    println!("   {} Permission denied for '{}' (in use).", "⚠️".yellow(), file.display());
                }
                record(&mut tally, file, EntryKind::File, &err);
            }
        }
    }

    // Pass 3: directories, children before parents.
    for dir in dirs.iter().rev() {
        match fs::remove_dir(dir) {
            Ok(()) => tally.dirs_removed += 1,
            Err(err) => record(&mut tally, dir, EntryKind::Directory, &err),
        }
    }

    PurgeOutcome::Purged(tally)
}

/// Directory links on Windows can only be removed with `remove_dir`.
fn remove_file_or_link(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if cfg!(windows) && is_dir_link(path) => fs::remove_dir(path).map_err(|_| err),
        other => other,
    }
}

fn is_dir_link(path: &Path) -> bool {
    let is_link = fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    is_link && path.is_dir()
}

fn record(tally: &mut CleanupTally, path: &Path, kind: EntryKind, err: &io::Error) {
    tracing::warn!("Could not remove {}: {}", path.display(), err);
    tally.failures.push(PurgeFailure {
        path: path.to_path_buf(),
        kind,
        cause: FailureCause::from_io(err),
    });
}

// ─────────────────────────────────────────────────────────────
// Service control
// ─────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Privileged start/stop of named system services.
pub trait ServiceControl {
    fn stop(&mut self, service: &str) -> Result<(), ServiceError>;
    fn start(&mut self, service: &str) -> Result<(), ServiceError>;
}

/// Uses `net stop` / `net start`. Needs an elevated console.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetServiceControl;

impl NetServiceControl {
    fn net(&self, verb: &str, service: &str) -> Result<(), ServiceError> {
        let command = format!("net {} {}", verb, service);
        tracing::debug!("Running {}", command);

        let out = Command::new("net")
            .args([verb, service])
            .output()
            .map_err(|source| ServiceError::Spawn {
                command: command.clone(),
                source,
            })?;

        if out.status.success() {
            Ok(())
        } else {
            Err(ServiceError::Failed {
                command,
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            })
        }
    }
}

impl ServiceControl for NetServiceControl {
    fn stop(&mut self, service: &str) -> Result<(), ServiceError> {
        self.net("stop", service)
    }

    fn start(&mut self, service: &str) -> Result<(), ServiceError> {
        self.net("start", service)
    }
}

/// States of a purge wrapped in a service stop/restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgePhase {
    Idle,
    ServicesStopping,
    ServicesStopped,
    Purging,
    Purged,
    ServicesStopFailed,
    ServicesRestarting,
    Done,
}

/// Record of one privileged purge run.
#[derive(Debug, Clone)]
pub struct PrivilegedPurge {
    pub phases: Vec<PurgePhase>,
    pub outcome: Option<PurgeOutcome>,
    pub lines: Vec<String>,
}

impl PrivilegedPurge {
    fn new(label: &str) -> Self {
        Self {
            phases: vec![PurgePhase::Idle],
            outcome: None,
            lines: vec![format!("{}:", label)],
        }
    }

    fn enter(&mut self, phase: PurgePhase) {
        tracing::debug!("Privileged purge: {:?} -> {:?}", self.phase(), phase);
        self.phases.push(phase);
    }

    pub fn phase(&self) -> PurgePhase {
        self.phases.last().copied().unwrap_or(PurgePhase::Idle)
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

/// Stop `services`, purge `target`, then restart the services no matter what
/// happened in between.
pub fn purge_with_services<S: ServiceControl + ?Sized>(
    control: &mut S,
    services: &[String],
    settle: Duration,
    label: &str,
    target: &Path,
) -> PrivilegedPurge {
    let mut run = PrivilegedPurge::new(label);
    let names = services.join(", ");

    run.enter(PurgePhase::ServicesStopping);
    println!("Stopping services ({})...", names);

    let mut stop_error = None;
    for service in services {
        if let Err(err) = control.stop(service) {
            stop_error = Some(err);
            break;
        }
    }

    match stop_error {
        None => {
            run.enter(PurgePhase::ServicesStopped);
            println!("{} Services stopped.", "✅".green());
            run.lines.push(format!("  - Services ({}) stopped.", names));
            if !settle.is_zero() {
                thread::sleep(settle);
            }

            run.enter(PurgePhase::Purging);
            let outcome = purge_directory(target);
            let fragment = outcome.render(label, target);
            println!("{}", fragment);
            run.lines.push(format!("  - {}", fragment));
            run.outcome = Some(outcome);
            run.enter(PurgePhase::Purged);
        }
        Some(err) => {
            run.enter(PurgePhase::ServicesStopFailed);
            let message = "Could not stop the services. This operation must run as Administrator.";
            println!("{} {}", "ERROR:".red().bold(), message);
            println!("   Detail: {}", err);
            run.lines.push(format!("  - FAILURE: {} ({})", message, err));
        }
    }

    run.enter(PurgePhase::ServicesRestarting);
    println!("Restarting services ({})...", names);
    let mut restart_failures = Vec::new();
    for service in services {
        if let Err(err) = control.start(service) {
            tracing::warn!("Restart of {} failed: {}", service, err);
            restart_failures.push(format!("{} ({})", service, err));
        }
    }
    run.lines.push(format!("  - Restart requested for services ({}).", names));
    if !restart_failures.is_empty() {
        run.lines.push(format!("  - WARNING: could not restart {}", restart_failures.join("; ")));
    }
    run.enter(PurgePhase::Done);

    run
}

// ─────────────────────────────────────────────────────────────
// Targets
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupTarget {
    UserTemp,
    WindowsTemp,
    Prefetch,
    UpdateCache,
}

impl CleanupTarget {
    /// Order used by "run everything".
    pub const ALL: [CleanupTarget; 4] = [
        CleanupTarget::UserTemp,
        CleanupTarget::WindowsTemp,
        CleanupTarget::Prefetch,
        CleanupTarget::UpdateCache,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CleanupTarget::UserTemp => "User Temporary Files",
            CleanupTarget::WindowsTemp => "Windows Temporary Files",
            CleanupTarget::Prefetch => "Prefetch Files",
            CleanupTarget::UpdateCache => "Windows Update Cache",
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, CleanupTarget::UpdateCache)
    }
}

/// Base folders the targets are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRoots {
    pub home: Option<PathBuf>,
    pub system_root: PathBuf,
}

impl TargetRoots {
    pub fn detect() -> Self {
        let system_root = std::env::var_os("SystemRoot")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Windows"));
        Self {
            home: dirs::home_dir(),
            system_root,
        }
    }

    pub fn resolve(&self, target: CleanupTarget) -> Option<PathBuf> {
        match target {
            CleanupTarget::UserTemp => self
                .home
                .as_ref()
                .map(|home| home.join("AppData").join("Local").join("Temp")),
            CleanupTarget::WindowsTemp => Some(self.system_root.join("Temp")),
            CleanupTarget::Prefetch => Some(self.system_root.join("Prefetch")),
            CleanupTarget::UpdateCache => Some(
                self.system_root
                    .join("SoftwareDistribution")
                    .join("Download"),
            ),
        }
    }
}

/// Runs cleanup targets and renders their report fragments.
pub struct Cleaner<S> {
    control: S,
    roots: TargetRoots,
    services: Vec<String>,
    settle: Duration,
}

impl<S: ServiceControl> Cleaner<S> {
    pub fn new(control: S, roots: TargetRoots, settings: &CleanupSettings) -> Self {
        Self {
            control,
            roots,
            services: settings.services.clone(),
            settle: Duration::from_secs(settings.service_settle_secs),
        }
    }

    /// Purge one target and return its report fragment.
    pub fn run(&mut self, target: CleanupTarget) -> String {
        let label = target.label();
        println!();
        println!("{} {}", "🧹 Cleaning:".color(colors::HEADER), label);

        let path = match self.roots.resolve(target) {
            Some(path) => path,
            None => {
                let message = format!("INFO: Could not resolve the folder for '{}'. Skipping.", label);
                println!("{}", message);
                return message;
            }
        };

        if target.is_privileged() {
            let run = purge_with_services(&mut self.control, &self.services, self.settle, label, &path);
            return run.render();
        }

        let outcome = purge_directory(&path);
        let fragment = outcome.render(label, &path);
        println!("{}", fragment);
        fragment
    }

    /// Every target in fixed order; one target's trouble never blocks the next.
    pub fn run_all(&mut self) -> String {
        println!();
        println!("{}", "!!! STARTING FULL CLEANUP !!!".bold().color(colors::WARNING));
        let fragments: Vec<String> = CleanupTarget::ALL
            .iter()
            .map(|target| self.run(*target))
            .collect();
        println!("{}", "*** FULL CLEANUP FINISHED ***".bold().color(colors::SUCCESS));
        fragments.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeServices {
        fail_stop: Option<&'static str>,
        calls: Vec<String>,
    }

    impl ServiceControl for FakeServices {
        fn stop(&mut self, service: &str) -> Result<(), ServiceError> {
            self.calls.push(format!("stop {}", service));
            if self.fail_stop == Some(service) {
                return Err(ServiceError::Failed {
                    command: format!("net stop {}", service),
                    status: "exit status: 2".to_string(),
                    stderr: "Access is denied.".to_string(),
                });
            }
            Ok(())
        }

        fn start(&mut self, service: &str) -> Result<(), ServiceError> {
            self.calls.push(format!("start {}", service));
            Ok(())
        }
    }

    fn services() -> Vec<String> {
        vec!["wuauserv".to_string(), "bits".to_string()]
    }

    fn populate(root: &Path) {
        fs::write(root.join("a.tmp"), b"x").unwrap();
        fs::create_dir_all(root.join("d1").join("d2")).unwrap();
        fs::write(root.join("d1").join("b.tmp"), b"x").unwrap();
        fs::write(root.join("d1").join("d2").join("c.tmp"), b"x").unwrap();
        fs::create_dir(root.join("empty")).unwrap();
    }

    #[test]
    fn purge_removes_files_then_dirs_and_keeps_root() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path());

        let outcome = purge_directory(tmp.path());
        let tally = outcome.tally();
        assert_eq!(tally.files_removed, 3);
        assert_eq!(tally.dirs_removed, 3);
        assert!(tally.failures.is_empty());
        assert!(tmp.path().is_dir());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);

        let text = outcome.render("Temp", tmp.path());
        assert!(text.starts_with("Result for 'Temp':"));
        assert!(text.contains("Removed 3 files and 3 folders."));
    }

    #[test]
    fn missing_target_is_informational() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("nope");
        let outcome = purge_directory(&target);
        assert_eq!(outcome, PurgeOutcome::Missing { path: target.clone() });
        assert_eq!(outcome.tally(), CleanupTally::default());
        assert!(outcome.render("Prefetch Files", &target).starts_with("INFO:"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_dirs_are_not_followed() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("keep.txt"), b"x").unwrap();

        let tmp = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();

        let tally = purge_directory(tmp.path()).tally();
        assert_eq!(tally.files_removed, 1);
        assert!(outside.path().join("keep.txt").exists());
    }

    #[test]
    fn stop_failure_skips_purge_but_restarts() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path());

        let mut control = FakeServices {
            fail_stop: Some("bits"),
            ..Default::default()
        };
        let run = purge_with_services(&mut control, &services(), Duration::ZERO, "Update Cache", tmp.path());

        assert!(run.outcome.is_none());
        assert!(tmp.path().join("a.tmp").exists());
        assert_eq!(
            run.phases,
            vec![
                PurgePhase::Idle,
                PurgePhase::ServicesStopping,
                PurgePhase::ServicesStopFailed,
                PurgePhase::ServicesRestarting,
                PurgePhase::Done,
            ]
        );
        assert_eq!(
            control.calls,
            vec!["stop wuauserv", "stop bits", "start wuauserv", "start bits"]
        );

        let text = run.render();
        assert!(text.contains("FAILURE: Could not stop the services"));
        assert!(text.contains("Restart requested for services (wuauserv, bits)."));
    }

    #[test]
    fn successful_stop_purges_then_restarts() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path());

        let mut control = FakeServices::default();
        let run = purge_with_services(&mut control, &services(), Duration::ZERO, "Update Cache", tmp.path());

        assert_eq!(run.phase(), PurgePhase::Done);
        assert!(run.phases.contains(&PurgePhase::Purged));
        assert_eq!(run.outcome.as_ref().unwrap().tally().files_removed, 3);
        let text = run.render();
        assert!(text.contains("Services (wuauserv, bits) stopped."));
        assert!(text.contains("Removed 3 files and 3 folders."));
        assert!(text.ends_with("Restart requested for services (wuauserv, bits)."));
    }

    #[test]
    fn roots_resolve_windows_layout() {
        let roots = TargetRoots {
            home: Some(PathBuf::from("/home/me")),
            system_root: PathBuf::from("/win"),
        };
        assert_eq!(
            roots.resolve(CleanupTarget::UserTemp),
            Some(PathBuf::from("/home/me/AppData/Local/Temp"))
        );
        assert_eq!(
            roots.resolve(CleanupTarget::UpdateCache),
            Some(PathBuf::from("/win/SoftwareDistribution/Download"))
        );
        let homeless = TargetRoots { home: None, ..roots };
        assert_eq!(homeless.resolve(CleanupTarget::UserTemp), None);
    }
}
