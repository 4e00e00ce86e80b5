//! The check command: discover linked dependencies, work out which release
//! each linked checkout is based on, and compare that against the range
//! declared in package.json.

use linkdrift_core::compat::{self, UnresolvableReason, Verdict};
use linkdrift_core::{
    git, linked_dependencies, resolve, Error, HeadWatch, LinkedDependency, Manifest,
    RegistryClient, RegistryConfig,
};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Stable schema version for the `--json` result object.
const SCHEMA_VERSION: u32 = 1;

/// State shared by every check: the project directory and the registry
/// client. Lives behind an `Rc` so watch tasks can hold it.
struct CheckContext {
    project_dir: PathBuf,
    client: RegistryClient,
}

/// Result of checking one linked dependency.
struct Outcome {
    repo_root: PathBuf,
    verdict: Verdict,
}

/// One dependency's verdict, flattened for the JSON result object.
#[derive(Debug, Serialize)]
struct CheckRecord<'a> {
    name: &'a str,
    path: String,
    repo_root: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_commit: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<UnresolvableReason>,
}

impl<'a> CheckRecord<'a> {
    fn new(dep: &'a LinkedDependency, outcome: &'a Outcome) -> Self {
        let mut record = Self {
            name: &dep.name,
            path: dep.path.display().to_string(),
            repo_root: outcome.repo_root.display().to_string(),
            status: outcome.verdict.status(),
            version: None,
            range: None,
            minimum_version: None,
            minimum_commit: None,
            reason: None,
        };
        match &outcome.verdict {
            Verdict::Satisfied { version, range } => {
                record.version = Some(version);
                record.range = Some(range);
            }
            Verdict::Violated {
                version,
                range,
                minimum_version,
                minimum_commit,
            } => {
                record.version = Some(version);
                record.range = Some(range);
                record.minimum_version = minimum_version.as_deref();
                record.minimum_commit = minimum_commit.as_deref();
            }
            Verdict::Unresolvable { reason } => record.reason = Some(*reason),
        }
        record
    }
}

/// Entry point for the check command.
///
/// Runs everything on a current-thread runtime: checks are sequential, and
/// watch-mode tasks interleave cooperatively without shared mutable state.
pub fn run(cwd: &Path, watch: bool, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    let local = tokio::task::LocalSet::new();

    match local.block_on(&runtime, run_checks(cwd, watch, json)) {
        Ok(()) => Ok(()),
        Err(err) => {
            if json {
                let failure = serde_json::json!({ "ok": false, "error": err.to_string() });
                println!("{failure}");
            }
            Err(err).into_diagnostic()
        }
    }
}

/// Discover linked dependencies and check each one, then optionally stay
/// resident watching their repositories.
async fn run_checks(cwd: &Path, watch: bool, json: bool) -> Result<(), Error> {
    let project_dir = cwd.canonicalize()?;
    let config = RegistryConfig::load(&project_dir);
    debug!("default registry: {}", config.default_registry);
    let client = RegistryClient::new(config)?;
    let ctx = Rc::new(CheckContext {
        project_dir,
        client,
    });

    let deps: Vec<LinkedDependency> =
        linked_dependencies(&ctx.project_dir.join("node_modules"))?.collect::<Result<_, _>>()?;
    if deps.is_empty() {
        info!("no linked packages in node_modules");
    }

    let mut outcomes = Vec::with_capacity(deps.len());
    for dep in &deps {
        let outcome = check_one(&ctx, dep).await?;
        if !json {
            report(&ctx, dep, &outcome);
        }
        outcomes.push(outcome);
    }

    if json {
        let checks: Vec<CheckRecord<'_>> = deps
            .iter()
            .zip(&outcomes)
            .map(|(dep, outcome)| CheckRecord::new(dep, outcome))
            .collect();
        let result = serde_json::json!({
            "ok": true,
            "schema_version": SCHEMA_VERSION,
            "checks": checks,
        });
        println!("{result}");
        return Ok(());
    }

    if watch && !deps.is_empty() {
        watch_repositories(&ctx, deps, &outcomes).await?;
    }
    Ok(())
}

/// Run one full check for a linked dependency.
///
/// Recomputes everything from scratch: repository root, registry metadata,
/// HEAD ancestry, and the declared range (package.json is re-read so edits
/// made while watching are honored). A registry 404 is a verdict, not an
/// error; anything else fails the run.
async fn check_one(ctx: &CheckContext, dep: &LinkedDependency) -> Result<Outcome, Error> {
    let repo_root = git::repo_root(&dep.path).await?;
    debug!("checking {} (repository {})", dep.name, repo_root.display());

    let metadata = match ctx.client.fetch_metadata(&dep.name).await {
        Ok(metadata) => metadata,
        Err(Error::PackageNotFound { .. }) => {
            return Ok(Outcome {
                repo_root,
                verdict: Verdict::Unresolvable {
                    reason: UnresolvableReason::PackageNotFound,
                },
            });
        }
        Err(err) => return Err(err),
    };

    // The unreleased-HEAD warning takes precedence over a missing manifest
    // entry, so ancestry is judged before the manifest is consulted.
    let Some(resolved) = resolve::resolve(&repo_root, &metadata).await? else {
        return Ok(Outcome {
            repo_root,
            verdict: Verdict::Unresolvable {
                reason: UnresolvableReason::NoReleasedAncestor,
            },
        });
    };

    let manifest = Manifest::load(&ctx.project_dir.join("package.json"))?;
    let Some(declared) = manifest.declared_range(&dep.name) else {
        return Ok(Outcome {
            repo_root,
            verdict: Verdict::Unresolvable {
                reason: UnresolvableReason::NoDeclaredRange,
            },
        });
    };

    Ok(Outcome {
        verdict: compat::check(Some(resolved.as_str()), declared, &metadata),
        repo_root,
    })
}

/// Print one verdict. Satisfied and violated lines go to stdout;
/// unresolvable is a warning on stderr.
fn report(ctx: &CheckContext, dep: &LinkedDependency, outcome: &Outcome) {
    match &outcome.verdict {
        Verdict::Satisfied { version, range } => {
            println!(
                "linked repository for {} is based on {version}, which is compatible with the declared requirement {range}",
                dep.name
            );
        }
        Verdict::Violated {
            version,
            range,
            minimum_commit,
            ..
        } => {
            println!(
                "linked repository for {} is based on {version}, but the manifest requires {range}",
                dep.name
            );
            if let Some(commit) = minimum_commit {
                println!(
                    "update {} at least to commit {commit}",
                    display_path(&ctx.project_dir, &outcome.repo_root)
                );
            }
        }
        Verdict::Unresolvable { reason } => match reason {
            UnresolvableReason::PackageNotFound => {
                warn!("package {} not found in registry", dep.name);
            }
            UnresolvableReason::NoReleasedAncestor => {
                warn!("no released version found for linked package {}", dep.name);
            }
            UnresolvableReason::NoDeclaredRange => {
                warn!("{} is not declared in package.json", dep.name);
            }
        },
    }
}

/// Render `target` relative to the project directory when it sits inside
/// it, absolute otherwise.
fn display_path(project_dir: &Path, target: &Path) -> String {
    match target.strip_prefix(project_dir) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.display().to_string(),
        _ => target.display().to_string(),
    }
}

/// Keep the process resident, re-checking a dependency every time its
/// repository HEAD moves. Returns on interrupt, or with the first fatal
/// error reported by a re-check.
async fn watch_repositories(
    ctx: &Rc<CheckContext>,
    deps: Vec<LinkedDependency>,
    outcomes: &[Outcome],
) -> Result<(), Error> {
    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();

    for (dep, outcome) in deps.into_iter().zip(outcomes) {
        let head_path = git::head_ref_path(&outcome.repo_root);
        let head_watch = HeadWatch::subscribe(&head_path)?;
        debug!("watching {} for {}", head_path.display(), dep.name);
        tokio::task::spawn_local(dispatch_changes(
            head_watch,
            Rc::clone(ctx),
            dep,
            failure_tx.clone(),
        ));
    }
    drop(failure_tx);

    info!("watching for git HEAD changes");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping watches");
            Ok(())
        }
        Some(err) = failure_rx.recv() => Err(err),
    }
}

/// Forward HEAD-change notifications for one dependency into re-check tasks.
///
/// Every notification spawns an independent re-check; closely spaced changes
/// can overlap, each computing its own verdict from fresh state.
async fn dispatch_changes(
    mut head_watch: HeadWatch,
    ctx: Rc<CheckContext>,
    dep: LinkedDependency,
    failure_tx: mpsc::UnboundedSender<Error>,
) {
    while head_watch.changed().await {
        info!("git HEAD change detected for linked package {}", dep.name);
        let ctx = Rc::clone(&ctx);
        let dep = dep.clone();
        let failure_tx = failure_tx.clone();
        tokio::task::spawn_local(async move {
            match check_one(&ctx, &dep).await {
                Ok(outcome) => report(&ctx, &dep, &outcome),
                Err(err) => {
                    let _ = failure_tx.send(err);
                }
            }
        });
    }
}
