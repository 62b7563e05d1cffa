//! meterguard CLI: 配置校验、请求指纹与错误分类的命令行工具
//!
//! Usage:
//!   meterguard-cli validate [<config.yaml>]           Validate a guard configuration
//!   meterguard-cli show-config [<config.yaml>]        Print the effective configuration
//!   meterguard-cli fingerprint <api_type> <json>      Compute a request fingerprint
//!   meterguard-cli classify <status|-> [<body>]       Classify an upstream failure

use anyhow::{anyhow, bail, Context};
use meterguard::cache::FingerprintGenerator;
use meterguard::config::CONFIG_ENV_VAR;
use meterguard::resilience::retry;
use meterguard::types::CallFailure;
use meterguard::{ApiType, GuardConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "validate" => cmd_validate(&args[2..]).await,
        "show-config" => cmd_show_config(&args[2..]).await,
        "fingerprint" => cmd_fingerprint(&args[2..]),
        "classify" => cmd_classify(&args[2..]),
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"meterguard-cli: 计费 API 防护层命令行工具

USAGE:
    meterguard-cli <COMMAND> [OPTIONS]

COMMANDS:
    validate [<config.yaml>]         Validate a guard configuration file
    show-config [<config.yaml>]      Print the effective configuration as YAML
    fingerprint <api_type> <json>    Compute the cache fingerprint of a request
    classify <status|-> [<body>]     Classify a failure and show its retry policy
    version                          Show version information
    help                             Show this help message

ENVIRONMENT:
    METERGUARD_CONFIG                Default configuration file path
    RUST_LOG                         Log filter (default: warn)"#
    );
}

fn cmd_version() {
    println!("meterguard-cli {}", env!("CARGO_PKG_VERSION"));
}

async fn load_config(args: &[String]) -> anyhow::Result<(GuardConfig, String)> {
    match args.first() {
        Some(path) => {
            let config = GuardConfig::from_path(path)
                .await
                .with_context(|| format!("loading {path}"))?;
            Ok((config, path.clone()))
        }
        None => {
            let source = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| "<defaults>".into());
            let config = GuardConfig::from_env().await.context("loading configuration")?;
            Ok((config, source))
        }
    }
}

async fn cmd_validate(args: &[String]) -> anyhow::Result<()> {
    let (config, source) = load_config(args).await?;
    println!("✓ {source}");
    println!(
        "  circuit breaker: threshold {}, timeout {}s, {} override(s)",
        config.circuit_breaker.defaults.failure_threshold,
        config.circuit_breaker.defaults.timeout.as_secs(),
        config.circuit_breaker.overrides.len()
    );
    println!(
        "  rate limits:     {} ({} per-api rule(s))",
        if config.rate_limits.enabled { "enabled" } else { "disabled" },
        config.rate_limits.per_api.len()
    );
    println!(
        "  cache:           {} (ttl {}s..{}s, prefix '{}')",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.min_ttl.as_secs(),
        config.cache.max_ttl.as_secs(),
        config.cache.key_prefix
    );
    println!(
        "  warm-up:         {}",
        if config.warmup.enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn cmd_show_config(args: &[String]) -> anyhow::Result<()> {
    let (config, _) = load_config(args).await?;
    print!("{}", config.to_yaml()?);
    Ok(())
}

fn cmd_fingerprint(args: &[String]) -> anyhow::Result<()> {
    let [api, params, ..] = args else {
        bail!("usage: meterguard-cli fingerprint <api_type> <json>");
    };
    let api_type: ApiType = api.parse()?;
    let params: serde_json::Value =
        serde_json::from_str(params).context("params must be a JSON document")?;

    let generator = FingerprintGenerator::new();
    let fp = generator.generate(api_type, &params);
    println!("api_type:    {}", fp.api_type);
    println!("fingerprint: {}", fp.hash);
    println!("storage key: {}", fp.storage_key(&GuardConfig::default().cache.key_prefix));
    println!("normalized:  {}", generator.normalize(&params));
    println!("default ttl: {}s", api_type.default_ttl().as_secs());
    println!("call cost:   ${:.4}", api_type.cost_per_call_usd());
    Ok(())
}

fn cmd_classify(args: &[String]) -> anyhow::Result<()> {
    let Some(status_arg) = args.first() else {
        bail!("usage: meterguard-cli classify <status|-> [<body>]");
    };
    let body = args.get(1).map(String::as_str);
    let (status, failure) = match status_arg.as_str() {
        "-" | "none" => (None, None),
        "timeout" => (None, Some(CallFailure::Timeout("timed out".into()))),
        "network" => (None, Some(CallFailure::Network("connection failed".into()))),
        s => {
            let code: u16 = s
                .parse()
                .map_err(|_| anyhow!("status must be a number, '-', 'timeout' or 'network'"))?;
            (Some(code), None)
        }
    };

    let kind = meterguard::client::classify(status, failure.as_ref(), body);
    println!("kind:         {} [{}]", kind, kind.code());
    println!("category:     {}", kind.category());
    println!("retryable:    {}", retry::should_retry(kind));
    println!("max attempts: {}", retry::max_attempts(kind));
    Ok(())
}
