use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic sqlite-bridge handle simulator")]
pub(crate) struct Args {
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,
    #[arg(long)]
    pub(crate) iterations: Option<u64>,
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    #[arg(long, default_value_t = 8)]
    pub(crate) tasks: usize,
    #[arg(long, default_value_t = 4)]
    pub(crate) max_statements: usize,
    #[arg(long, default_value_t = 0.05)]
    pub(crate) close_rate: f64,
    #[arg(long, default_value_t = 0.03)]
    pub(crate) cancel_rate: f64,
    #[arg(long, default_value_t = 0.02)]
    pub(crate) stale_rate: f64,
    #[arg(long, default_value_t = 0.05)]
    pub(crate) sleep_rate: f64,
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    #[arg(long)]
    pub(crate) quick: bool,
    #[arg(long)]
    pub(crate) stress: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimConfig {
    pub(crate) duration_ms: Option<u64>,
    pub(crate) iterations: Option<u64>,
    pub(crate) seed: u64,
    pub(crate) tasks: usize,
    pub(crate) max_statements: usize,
    pub(crate) close_rate: f64,
    pub(crate) cancel_rate: f64,
    pub(crate) stale_rate: f64,
    pub(crate) sleep_rate: f64,
    pub(crate) log: Option<PathBuf>,
    pub(crate) preset: Option<String>,
    pub(crate) first_steps: usize,
    pub(crate) tail_steps: usize,
}

impl SimConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let mut config = SimConfig {
            duration_ms: args
                .duration
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            iterations: args.iterations,
            seed: args.seed.unwrap_or_else(random_seed),
            tasks: args.tasks.max(1),
            max_statements: args.max_statements.max(1),
            close_rate: clamp_rate(args.close_rate),
            cancel_rate: clamp_rate(args.cancel_rate),
            stale_rate: clamp_rate(args.stale_rate),
            sleep_rate: clamp_rate(args.sleep_rate),
            log: args.log,
            preset: None,
            first_steps: 30,
            tail_steps: 80,
        };

        if args.quick {
            config.apply_quick();
        }
        if args.stress {
            config.apply_stress();
        }
        if config.iterations.is_none() && config.duration_ms.is_none() {
            config.iterations = Some(10_000);
        }

        config
    }

    fn apply_quick(&mut self) {
        self.preset = Some("quick".to_string());
        self.iterations = Some(10_000);
        self.duration_ms = None;
        self.tasks = 4;
        self.max_statements = 3;
        self.close_rate = 0.05;
        self.cancel_rate = 0.03;
        self.stale_rate = 0.02;
        self.sleep_rate = 0.05;
    }

    fn apply_stress(&mut self) {
        self.preset = Some("stress".to_string());
        self.iterations = Some(250_000);
        self.duration_ms = None;
        self.tasks = 32;
        self.max_statements = 8;
        self.close_rate = 0.08;
        self.cancel_rate = 0.06;
        self.stale_rate = 0.04;
        self.sleep_rate = 0.08;
    }
}

fn clamp_rate(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn random_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_secs() ^ u64::from(now.subsec_nanos())
}
