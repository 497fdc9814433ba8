use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use gad_builder::{
    config::{BackendConfig, Config},
    hierarchy::Hierarchy,
    reconcile, script,
    session::Session,
    storage::StorageClient,
    submit::{Backend, DebugBackend, HttpBackend},
};
use tracing::{error, info, warn};

#[derive(Parser)]
struct Opts {
    #[clap(short, long, env = "GAD_BUILDER_CONFIG")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe every leaf of a hierarchy and report file counts.
    Check { hierarchy: PathBuf },
    /// Replay an edit script against a hierarchy and submit the result.
    Apply {
        hierarchy: PathBuf,
        script: PathBuf,
        /// Log the submission instead of sending it.
        #[clap(long)]
        dry_run: bool,
        /// Write the resulting hierarchy as JSON.
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}

async fn load_session(config: &Config, path: &Path) -> anyhow::Result<Session> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read hierarchy from {}", path.display()))?;
    let hierarchy = Hierarchy::from_json(&json)
        .with_context(|| format!("parse hierarchy from {}", path.display()))?;
    for problem in hierarchy.check() {
        warn!(%problem, "inconsistent hierarchy");
    }
    let mut session = Session::new(hierarchy, config.pages.clone(), config.layout());
    let client = StorageClient::from_config(&config.storage);
    let probed = session.probe_all(&client).await;
    info!(leaves = probed, "probed file store");
    Ok(session)
}

async fn submit<B>(session: &mut Session, backend: &B) -> anyhow::Result<()>
where
    B: Backend,
    B::Error: fmt::Display,
{
    let response = session
        .submit(backend)
        .await
        .map_err(|e| anyhow!("{e}"))?;
    info!(reply = %response.message, "saved");
    Ok(())
}

async fn run(opts: Opts) -> anyhow::Result<()> {
    let config = Config::load(&opts.config)
        .await
        .with_context(|| format!("load config from {}", opts.config.display()))?;
    match opts.command {
        Command::Check { hierarchy } => {
            let session = load_session(&config, &hierarchy).await?;
            let mut incomplete = 0;
            for count in reconcile::reconcile(session.state()) {
                if count.is_complete() {
                    info!(
                        path = %count.path,
                        file_id = %count.file_id,
                        files = count.file_uploads,
                        pages = count.selected_pages,
                        "leaf"
                    );
                } else {
                    incomplete += 1;
                    warn!(
                        path = %count.path,
                        file_id = %count.file_id,
                        files = count.file_uploads,
                        pages = count.selected_pages,
                        "leaf is missing files"
                    );
                }
            }
            if incomplete > 0 {
                return Err(anyhow!("{incomplete} leaves are missing files"));
            }
        }
        Command::Apply {
            hierarchy,
            script,
            dry_run,
            output,
        } => {
            let mut session = load_session(&config, &hierarchy).await?;
            let edits = script::load(&script)
                .await
                .with_context(|| format!("load script from {}", script.display()))?;
            let base_dir = script.parent().unwrap_or(Path::new("."));
            script::replay(&mut session, &edits, base_dir).await?;
            match (&config.backend, dry_run) {
                (BackendConfig::Http { endpoint, token }, false) => {
                    submit(&mut session, &HttpBackend::new(endpoint.clone(), token.clone())).await?
                }
                _ => submit(&mut session, &DebugBackend::accepting()).await?,
            }
            if let Some(output) = output {
                let json = serde_json::to_string_pretty(session.hierarchy())?;
                tokio::fs::write(&output, json)
                    .await
                    .with_context(|| format!("write hierarchy to {}", output.display()))?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    if let Err(e) = run(opts).await {
        error!(?e, "critical error");
        std::process::exit(1);
    }
}
