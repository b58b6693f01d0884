use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum, builder::styling};
use env_logger::Builder;
use log::{LevelFilter, error, info};
use openjob_builder::config::{ConfigPaths, OpenJobConfig};
use openjob_builder::open_job::submission::{JobParameterSpec, StepParameterSpec};
use openjob_builder::open_job::{
    EnvironmentOptions, JobOptions, JobParameter, OpenJob, OpenJobEntityBuild, OpenJobEnvironment,
    OpenJobStep, StepOptions, StepParameter, SubmissionSpec,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::Green.on_default().bold())
    .usage(styling::AnsiColor::Green.on_default().bold())
    .literal(styling::AnsiColor::Cyan.on_default().bold())
    .placeholder(styling::AnsiColor::Cyan.on_default());

#[derive(Parser)]
#[command(name = "openjob-bundle")]
#[command(about = "Check, fix and build Open Job Description job bundles")]
#[command(styles = STYLES)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace). Defaults to the configured level.
    #[arg(short, long, global = true, env = "OPENJOB_LOG_LEVEL", value_parser = parse_log_level)]
    log_level: Option<LevelFilter>,

    /// Additional configuration file, applied after the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every consistency check of a submission and report all failures
    Check {
        /// Submission file (YAML, JSON or JSON5)
        submission: PathBuf,
    },
    /// Print the reconciled parameters of one template and its overrides
    Fix {
        #[arg(long, value_enum)]
        kind: FixKind,

        /// Template file
        #[arg(long)]
        template: PathBuf,

        /// Overrides file: a parameter list for jobs and steps, a variable
        /// mapping for environments
        #[arg(long)]
        overrides: PathBuf,
    },
    /// Build a job bundle and print its directory
    Build {
        /// Submission file (YAML, JSON or JSON5)
        submission: PathBuf,

        /// Directory the bundle directory is created in
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Show or generate configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print a commented default configuration file
    Default,
    /// Validate the effective configuration
    Validate,
}

#[derive(Clone, Copy, ValueEnum)]
enum FixKind {
    Job,
    Step,
    Environment,
}

fn load_config(extra: Option<&PathBuf>) -> Result<OpenJobConfig> {
    let mut files = ConfigPaths::new().existing_paths();
    if let Some(extra) = extra {
        files.push(extra.clone());
    }
    let mut config = OpenJobConfig::load_from_files(&files).context("Failed to load configuration")?;
    config.apply_env();
    Ok(config)
}

fn parse_log_level(value: &str) -> std::result::Result<LevelFilter, String> {
    LevelFilter::from_str(value.trim()).map_err(|_| {
        format!(
            "invalid log level \"{}\", expected one of off, error, warn, info, debug, trace",
            value
        )
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    let level = match cli.log_level {
        Some(level) => level,
        None => parse_log_level(&config.log_level).map_err(anyhow::Error::msg)?,
    };
    Builder::from_default_env().filter_level(level).init();

    match cli.command {
        Commands::Check { submission } => check(&config, submission),
        Commands::Fix {
            kind,
            template,
            overrides,
        } => fix(kind, template, overrides),
        Commands::Build {
            submission,
            output_dir,
        } => build(config, submission, output_dir),
        Commands::Config { action } => show_config(&config, action),
    }
}

fn load_job(config: &OpenJobConfig, submission: &PathBuf) -> Result<OpenJob> {
    let spec = SubmissionSpec::from_spec_file(submission)
        .with_context(|| format!("Failed to read submission {}", submission.display()))?;
    Ok(spec.into_open_job(config)?)
}

fn check(config: &OpenJobConfig, submission: PathBuf) -> Result<()> {
    let job = load_job(config, &submission)?;

    let failures: Vec<String> = job
        .check_all_consistency()?
        .into_iter()
        .filter(|r| !r.passed)
        .map(|r| r.reason)
        .collect();
    let strategy = job.files_transfer_strategy()?;

    if failures.is_empty() {
        println!(
            "Job \"{}\" is consistent ({} files transfer)",
            job.name(),
            strategy
        );
        return Ok(());
    }
    for failure in &failures {
        error!("{}", failure);
        println!("{}", failure);
    }
    anyhow::bail!("{} consistency check(s) failed", failures.len())
}

fn read_overrides<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read overrides {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse overrides {}", path.display()))
}

fn fix(kind: FixKind, template: PathBuf, overrides: PathBuf) -> Result<()> {
    let output = match kind {
        FixKind::Job => {
            let extra_parameters = read_overrides::<Vec<JobParameterSpec>>(&overrides)?
                .into_iter()
                .map(|p| JobParameter::from_raw(p.name, p.kind, p.value.as_ref()))
                .collect::<openjob_builder::Result<Vec<_>>>()?;
            let mut job = OpenJob::new(
                &template,
                JobOptions {
                    extra_parameters,
                    ..Default::default()
                },
            )?;
            job.fix_parameters_consistency()?;
            serde_yaml::to_string(job.extra_parameters())?
        }
        FixKind::Step => {
            let extra_parameters = read_overrides::<Vec<StepParameterSpec>>(&overrides)?
                .into_iter()
                .map(|p| StepParameter::from_raw(p.name, p.kind, &p.range))
                .collect::<openjob_builder::Result<Vec<_>>>()?;
            let mut step = OpenJobStep::new(
                &template,
                StepOptions {
                    extra_parameters,
                    ..Default::default()
                },
            )?;
            step.fix_parameters_consistency()?;
            serde_yaml::to_string(step.extra_parameters())?
        }
        FixKind::Environment => {
            let variables = read_overrides::<BTreeMap<String, String>>(&overrides)?;
            let mut environment = OpenJobEnvironment::new(
                &template,
                EnvironmentOptions {
                    variables,
                    ..Default::default()
                },
            )?;
            environment.fix_variables_consistency()?;
            serde_yaml::to_string(environment.variables())?
        }
    };
    info!("Reconciled overrides of {}", template.display());
    print!("{}", output);
    Ok(())
}

fn build(mut config: OpenJobConfig, submission: PathBuf, output_dir: Option<PathBuf>) -> Result<()> {
    if let Some(output_dir) = output_dir {
        config.bundle.output_dir = output_dir;
    }
    if let Err(errors) = config.validate() {
        anyhow::bail!("Invalid configuration:\n  {}", errors.join("\n  "));
    }

    let job = load_job(&config, &submission)?;
    let bundle = job.build_bundle()?;
    let dir = bundle.create_in(&config.bundle)?;
    info!("Job bundle for \"{}\" written", job.name());
    println!("{}", dir.display());
    Ok(())
}

fn show_config(config: &OpenJobConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => print!("{}", config.to_toml()?),
        ConfigAction::Default => print!("{}", OpenJobConfig::generate_default_config()),
        ConfigAction::Validate => match config.validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(errors) => {
                for e in &errors {
                    println!("{}", e);
                }
                anyhow::bail!("{} configuration error(s)", errors.len());
            }
        },
    }
    Ok(())
}
