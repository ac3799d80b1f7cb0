use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use keybroker::{PlanPolicy, WaitQueueConfig};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub queue: QueueSettings,
    pub policy: PlanPolicy,
    pub preload: Vec<KeySpec>,
    pub log_level: String,
}

/// Wait queue tuning. A zero deadline means "unbounded".
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub backoff_ms: u64,
    pub max_wait_ms: u64,
    pub request_timeout_ms: u64,
}

impl QueueSettings {
    pub fn wait_queue_config(&self) -> WaitQueueConfig {
        WaitQueueConfig {
            concurrency: self.concurrency,
            backoff: Duration::from_millis(self.backoff_ms),
            max_wait: match self.max_wait_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// One key to register at startup.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct KeySpec {
    #[serde(alias = "subscriptionId")]
    pub id: String,
    pub plan: String,
}

#[derive(Parser, Debug)]
#[command(
    name = "keybroker-server",
    about = "Shared API key broker",
    long_about = "A shared credential broker that multiplexes a pool of third-party API keys across concurrent callers while honoring per-window and per-day quotas.\n\nEnvironment variables are supported for every option. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP bind host",
        default_value = "0.0.0.0"
    )]
    pub host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 3000,
        env = "PORT"
    )]
    pub port: u16,

    // Wait queue
    #[arg(
        long,
        value_name = "N",
        help = "Queued reservations served in parallel",
        default_value_t = 5,
        env = "KEY_QUEUE_CONCURRENCY"
    )]
    pub queue_concurrency: usize,
    #[arg(
        long,
        value_name = "MS",
        help = "Pause between reservation attempts for a queued caller",
        default_value_t = 1000,
        env = "KEY_QUEUE_BACKOFF_MS"
    )]
    pub queue_backoff_ms: u64,
    #[arg(
        long,
        value_name = "MS",
        help = "Worker-side wait deadline (0 = unbounded)",
        default_value_t = 0,
        env = "KEY_QUEUE_MAX_WAIT_MS"
    )]
    pub queue_max_wait_ms: u64,
    #[arg(
        long,
        value_name = "MS",
        help = "Requester-side wait deadline (0 = unbounded)",
        default_value_t = 0,
        env = "KEY_QUEUE_REQUEST_TIMEOUT_MS"
    )]
    pub queue_request_timeout_ms: u64,

    // Plan spacing overrides
    #[arg(
        long,
        value_name = "MS",
        help = "Spacing between reservations of one pro key",
        default_value_t = 860,
        env = "MAILTESTER_PRO_INTERVAL_MS"
    )]
    pub pro_interval_ms: u64,
    #[arg(
        long,
        value_name = "MS",
        help = "Spacing between reservations of one ultimate key",
        default_value_t = 170,
        env = "MAILTESTER_ULTIMATE_INTERVAL_MS"
    )]
    pub ultimate_interval_ms: u64,

    // Key preload sources, checked in order; the first non-empty wins
    #[arg(
        long,
        value_name = "JSON",
        help = "Inline JSON array of {id, plan} keys to preload",
        env = "MAILTESTER_KEYS_JSON"
    )]
    pub keys_json: Option<String>,
    #[arg(
        long,
        value_name = "PATH",
        help = "Path to a JSON array of {id, plan} keys",
        env = "MAILTESTER_KEYS_JSON_PATH"
    )]
    pub keys_json_path: Option<String>,
    #[arg(
        long,
        value_name = "PAIRS",
        help = "Comma-separated id:plan pairs",
        env = "MAILTESTER_KEYS_WITH_PLAN"
    )]
    pub keys_with_plan: Option<String>,
    #[arg(
        long,
        value_name = "IDS",
        help = "Comma-separated ids, registered with the default plan",
        env = "MAILTESTER_KEYS"
    )]
    pub keys: Option<String>,
    #[arg(
        long,
        value_name = "PLAN",
        help = "Plan for keys given without one",
        default_value = "ultimate",
        env = "MAILTESTER_DEFAULT_PLAN"
    )]
    pub default_plan: String,

    // General options
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "KEYBROKER_LOG_LEVEL"
    )]
    pub log_level: String,
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    pub fn from_env_and_args() -> Result<Self> {
        // Clap resolves the precedence: CLI arguments over environment
        // variables over defaults.
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    fn from_args(args: Args) -> Result<Self> {
        let preload = resolve_preload(&args)?;

        let config = Config {
            host: args.host,
            port: args.port,
            queue: QueueSettings {
                concurrency: args.queue_concurrency,
                backoff_ms: args.queue_backoff_ms,
                max_wait_ms: args.queue_max_wait_ms,
                request_timeout_ms: args.queue_request_timeout_ms,
            },
            policy: PlanPolicy::new(args.pro_interval_ms, args.ultimate_interval_ms),
            preload,
            log_level: args.log_level,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queue.concurrency == 0 {
            return Err(anyhow!("KEY_QUEUE_CONCURRENCY must be at least 1"));
        }
        if self.policy.pro_interval_ms == 0 || self.policy.ultimate_interval_ms == 0 {
            return Err(anyhow!("plan intervals must be positive"));
        }
        Ok(())
    }

    fn print_env_vars() {
        println!("Keybroker Environment Variables");
        println!("===============================");
        println!();
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("Server:");
        println!("  PORT=<port>                            HTTP port [default: 3000]");
        println!();

        println!("Wait queue:");
        println!("  KEY_QUEUE_CONCURRENCY=<n>              Queued reservations served in parallel [default: 5]");
        println!("  KEY_QUEUE_BACKOFF_MS=<ms>              Pause between reservation attempts [default: 1000]");
        println!("  KEY_QUEUE_MAX_WAIT_MS=<ms>             Worker-side wait deadline, 0 = unbounded [default: 0]");
        println!("  KEY_QUEUE_REQUEST_TIMEOUT_MS=<ms>      Requester-side wait deadline, 0 = unbounded [default: 0]");
        println!();

        println!("Plan spacing:");
        println!("  MAILTESTER_PRO_INTERVAL_MS=<ms>        Spacing for pro keys [default: 860]");
        println!("  MAILTESTER_ULTIMATE_INTERVAL_MS=<ms>   Spacing for ultimate keys [default: 170]");
        println!();

        println!("Key preload (checked in order, first non-empty wins):");
        println!("  MAILTESTER_KEYS_JSON=<json>            Inline JSON array of {{id, plan}}");
        println!("  MAILTESTER_KEYS_JSON_PATH=<path>       Path to the same JSON array");
        println!("  MAILTESTER_KEYS_WITH_PLAN=<pairs>      Comma-separated id:plan pairs");
        println!("  MAILTESTER_KEYS=<ids>                  Comma-separated ids");
        println!("  MAILTESTER_DEFAULT_PLAN=<plan>         Plan for bare ids [default: ultimate]");
        println!();

        println!("General:");
        println!("  KEYBROKER_LOG_LEVEL=<level>            error, warn, info, debug, trace [default: info]");
        println!();

        println!("Examples:");
        println!("  # Preload two keys and cap queued waits at 30 s");
        println!("  export MAILTESTER_KEYS_WITH_PLAN=\"sub_abc:pro,sub_def:ultimate\"");
        println!("  export KEY_QUEUE_MAX_WAIT_MS=30000");
        println!("  keybroker-server");
    }
}

/// Resolve the preload key list from the configured sources.
///
/// Sources are checked in a fixed order and the first one that is set to a
/// non-blank value wins, even when it parses to an empty list; a malformed
/// winning source is an error, not a fall-through.
fn resolve_preload(args: &Args) -> Result<Vec<KeySpec>> {
    if let Some(json) = non_blank(&args.keys_json) {
        return parse_keys_json(json).context("MAILTESTER_KEYS_JSON");
    }
    if let Some(path) = non_blank(&args.keys_json_path) {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading key list from {path}"))?;
        return parse_keys_json(&json).context("MAILTESTER_KEYS_JSON_PATH");
    }
    if let Some(pairs) = non_blank(&args.keys_with_plan) {
        return Ok(parse_key_pairs(pairs, &args.default_plan));
    }
    if let Some(ids) = non_blank(&args.keys) {
        return Ok(ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| KeySpec {
                id: id.to_string(),
                plan: args.default_plan.clone(),
            })
            .collect());
    }
    Ok(Vec::new())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_keys_json(json: &str) -> Result<Vec<KeySpec>> {
    serde_json::from_str(json).context("expected a JSON array of {id, plan}")
}

/// Parse `id:plan` pairs; a pair without a plan falls back to the default.
fn parse_key_pairs(pairs: &str, default_plan: &str) -> Vec<KeySpec> {
    pairs
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((id, plan)) => KeySpec {
                id: id.trim().to_string(),
                plan: plan.trim().to_string(),
            },
            None => KeySpec {
                id: pair.to_string(),
                plan: default_plan.to_string(),
            },
        })
        .filter(|spec| !spec.id.is_empty())
        .collect()
}
