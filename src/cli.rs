use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use chainlens::analytics::StaticRunStats;
use chainlens::auth::Token;
use chainlens::chain::{BuildChainProcessor, ChainOptions, FullChainRunCtx, RankingStrategy};
use chainlens::config::{Config, OutputFormat};
use chainlens::model::BuildRef;
use chainlens::output::{export_json, print_summary, PhaseProgress};
use chainlens::providers::TeamCityProvider;
use chainlens::report::{ChainReport, ReportContext};
use chainlens::server::CiServer;

#[derive(Parser)]
#[command(name = "chainlens")]
#[command(author, version, about = "Build-chain failure triage for TeamCity", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./chainlens.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[arg(short = 't', long, global = true, env = "TEAMCITY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// TeamCity server URL, overrides the config file
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// none, latest or all
    #[arg(long, global = true)]
    rebuild: Option<String>,

    /// none, suite-not-complete or all
    #[arg(long, global = true)]
    logs: Option<String>,

    /// Count running and queued builds per suite
    #[arg(long, global = true, default_value_t = false)]
    scheduled: bool,

    /// Show contact persons and rank suites by them
    #[arg(long, global = true, default_value_t = false)]
    contacts: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the chain of the latest finished build of a suite
    Chain {
        #[arg(short, long)]
        suite: String,

        #[arg(short, long)]
        branch: Option<String>,
    },
    /// Resolve the chain rooted at the given builds
    Builds {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

impl Cli {
    fn chain_options(&self, config: &Config) -> Result<ChainOptions> {
        let mut chain = config.chain.clone();
        if let Some(rebuild) = &self.rebuild {
            chain.rebuild_mode.clone_from(rebuild);
        }
        if let Some(logs) = &self.logs {
            chain.logs_mode.clone_from(logs);
        }
        chain.include_scheduled |= self.scheduled;
        chain.show_contacts |= self.contacts;

        chain.to_options()
    }

    fn processor(&self, config: &Config) -> Result<BuildChainProcessor> {
        let Some(url) = self.url.as_ref().or(config.teamcity.base_url.as_ref()) else {
            bail!("TeamCity URL is not set: pass --url or set [teamcity] base-url");
        };

        let token = self
            .token
            .as_ref()
            .or(config.teamcity.token.as_ref())
            .map(|t| Token::from(t.as_str()));

        let provider = TeamCityProvider::new(
            config.teamcity.server_id.clone(),
            url,
            token,
            config.teamcity.max_concurrent_requests,
        )?;

        let mut processor = BuildChainProcessor::new(Arc::new(provider));

        if let Some(path) = &config.fail_rates {
            let stats = StaticRunStats::load(path)
                .with_context(|| format!("Failed to load failure statistics: {}", path.display()))?;
            processor = processor.with_analytics(Arc::new(stats));
        }

        if let Some(dir) = &config.contacts_dir {
            processor = processor.with_contacts_dir(dir);
        }

        Ok(processor)
    }

    async fn resolve(
        &self,
        processor: &BuildChainProcessor,
        options: &ChainOptions,
    ) -> Result<FullChainRunCtx> {
        match &self.command {
            Commands::Chain { suite, branch } => {
                info!("Resolving latest chain of suite: {suite}");
                processor
                    .load_latest_chain(suite, branch.as_deref(), options)
                    .await?
                    .with_context(|| format!("No finished builds of suite {suite}"))
            }
            Commands::Builds { ids } => {
                info!("Resolving chain of builds: {ids:?}");
                let entry_points: Vec<BuildRef> = ids
                    .iter()
                    .map(|id| {
                        BuildRef::new(*id, "", None, format!("/app/rest/latest/builds/id:{id}"))
                    })
                    .collect();
                Ok(processor.process_build_chains(&entry_points, options).await?)
            }
        }
    }

    fn write_report(&self, report: &ChainReport, config: &Config) -> Result<()> {
        let format = self.format.unwrap_or(config.output.format);
        let pretty = self.pretty || config.output.pretty;

        match (format, &self.output) {
            (OutputFormat::Summary, None) => print_summary(report),
            (OutputFormat::Json, None) => export_json(report, pretty, &mut std::io::stdout())?,
            // A file always receives the JSON report
            (_, Some(path)) => {
                let mut file = std::fs::File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                export_json(report, pretty, &mut file)?;
                info!("Report written to: {}", path.display());
            }
        }

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;
        let options = self.chain_options(&config)?;
        let processor = self.processor(&config)?;

        let progress = PhaseProgress::start_resolving(match &self.command {
            Commands::Chain { .. } => "latest chain",
            Commands::Builds { .. } => "chain of builds",
        });

        let ctx = match self.resolve(&processor, &options).await {
            Ok(ctx) => ctx,
            Err(e) => {
                progress.abandon("Chain resolution failed");
                return Err(e);
            }
        };
        let progress = progress.finish_resolving_start_report(ctx.suites().len());

        let analytics = processor.analytics();
        let strategy = RankingStrategy::select(
            analytics.cloned(),
            options.fail_rate_branch.clone(),
            options.show_contacts,
        );
        let server = processor.server();
        let report = ChainReport::from_context(
            &ctx,
            &ReportContext {
                server_id: server.server_id(),
                host: server.host(),
                analytics: analytics.map(|a| a.as_ref()),
                fail_rate_branch: options.fail_rate_branch.as_deref(),
                ranking: strategy.name(),
            },
        );
        progress.finish_report();

        self.write_report(&report, &config)
    }
}
