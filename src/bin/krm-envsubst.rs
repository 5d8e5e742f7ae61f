//! KRM Envsubst CLI
//!
//! Kustomize plugin that substitutes environment variables into resources
//! read from stdin, keeping each field's declared type.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use krm_envsubst::{
    transform, BundleSource, Config, Error, RegistrySource, SchemaResolver, SchemaSource,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "krm-envsubst")]
#[command(about = "Substitute environment variables into Kubernetes resources, keeping field types")]
#[command(version)]
struct Cli {
    /// Plugin config file (legacy exec plugins); ignored if it cannot be read
    config: Option<PathBuf>,

    /// Allow variables to evaluate to an empty string
    #[arg(long)]
    allow_empty: bool,

    /// Only substitute this variable (repeatable; overrides --exclude)
    #[arg(long = "include", value_name = "NAME")]
    include: Vec<String>,

    /// Never substitute this variable (repeatable)
    #[arg(long = "exclude", value_name = "NAME")]
    exclude: Vec<String>,

    /// Explicit value, taking precedence over the environment (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, String)>,

    /// Local schema bundle, searched before any registry (repeatable)
    #[arg(long, value_name = "DIR")]
    schema_dir: Vec<PathBuf>,

    /// Schema location template, file path or URL (repeatable)
    #[arg(long, value_name = "TEMPLATE")]
    schema_location: Vec<String>,

    /// Do not consult the default remote registries
    #[arg(long)]
    offline: bool,

    /// Kubernetes version of the native schemas (e.g. 1.29.0)
    #[arg(long, default_value = "master")]
    kubernetes_version: String,

    /// Use the strict schema variants
    #[arg(long)]
    strict_schemas: bool,
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", s));
    }
    Ok((name.to_string(), value.to_string()))
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "krm_envsubst=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("krm-envsubst: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let config = build_config(&cli)?;
    let resolver = SchemaResolver::new(build_sources(&cli)?);

    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|source| Error::Io { source })?;

    let output = transform(&input, config, resolver)?;

    io::stdout()
        .write_all(output.as_bytes())
        .map_err(|source| Error::Io { source })
}

fn build_config(cli: &Cli) -> Result<Config, Error> {
    let base = match &cli.config {
        Some(path) => read_config_file(path)?,
        None => Config::new(),
    };

    let mut flags = Config::new().allow_empty(cli.allow_empty);
    for name in &cli.include {
        flags = flags.include(name);
    }
    for name in &cli.exclude {
        flags = flags.exclude(name);
    }
    for (name, value) in &cli.set {
        flags = flags.value(name, value);
    }
    Ok(base.merge(flags))
}

fn read_config_file(path: &Path) -> Result<Config, Error> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        tracing::debug!(path = %path.display(), "config file not readable, ignoring");
        return Ok(Config::new());
    };
    if contents.trim().is_empty() {
        return Ok(Config::new());
    }
    serde_yaml::from_str(&contents).map_err(|e| Error::InvalidConfig {
        message: format!("{}: {}", path.display(), e),
    })
}

fn build_sources(cli: &Cli) -> Result<Vec<Box<dyn SchemaSource>>, Error> {
    let mut sources: Vec<Box<dyn SchemaSource>> = Vec::new();

    for dir in &cli.schema_dir {
        sources.push(Box::new(BundleSource::new(dir)));
    }
    for template in &cli.schema_location {
        sources.push(Box::new(
            RegistrySource::new(template.as_str())?
                .kubernetes_version(cli.kubernetes_version.as_str())
                .strict(cli.strict_schemas),
        ));
    }

    if !cli.offline {
        #[cfg(feature = "remote")]
        sources.extend(krm_envsubst::default_registries(
            &cli.kubernetes_version,
            cli.strict_schemas,
        )?);

        #[cfg(not(feature = "remote"))]
        tracing::debug!("built without the `remote` feature, skipping default registries");
    }

    for source in &sources {
        tracing::debug!(source = %source.describe(), "schema source");
    }
    Ok(sources)
}
