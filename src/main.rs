use clap::Parser;
use permission_tosser::{
    config::{self, AddressBook, Config},
    log, Schedule, Server,
};
use std::{error::Error, path::PathBuf, process, time::Duration};

/// Node of a cluster taking turns on a shared resource.
#[derive(Parser, Debug)]
#[command(name = "permission-tosser")]
#[command(about = "Run one node of the distributed mutual exclusion cluster")]
struct Args {
    /// This node's id, in 1..=nodes
    #[arg(default_value_t = 1)]
    node_id: u32,

    /// Number of nodes in the cluster
    #[arg(short, long, default_value_t = 4)]
    nodes: u32,

    /// Node n listens on base_port + n - 1
    #[arg(long, default_value_t = config::BASE_PORT)]
    base_port: u16,

    /// Host name of every node, `{id}` is replaced by the node id
    #[arg(long, default_value = config::HOST_TEMPLATE)]
    host_template: String,

    /// Explicit host of one node, as <id>=<host> (repeatable)
    #[arg(short, long = "peer")]
    peers: Vec<String>,

    /// Connection attempts per message
    #[arg(long, default_value_t = config::SEND_ATTEMPTS)]
    attempts: u32,

    /// Pause between connection attempts, in milliseconds
    #[arg(long, default_value_t = 1000)]
    backoff_ms: u64,

    /// Pause before the first request, in seconds
    #[arg(long, default_value_t = 5.)]
    warmup: f64,

    /// How long the resource is kept once written, in seconds
    #[arg(long, default_value_t = 10.)]
    hold: f64,

    /// Shortest pause between requests, in seconds
    #[arg(long, default_value_t = 5.)]
    min_pause: f64,

    /// Longest pause between requests, in seconds
    #[arg(long, default_value_t = 15.)]
    max_pause: f64,

    /// Request as a Poisson process with this many requests per second instead
    #[arg(long, conflicts_with_all = ["min_pause", "max_pause"])]
    rate: Option<f64>,

    /// Give up on a request after this many seconds
    #[arg(long)]
    acquire_timeout: Option<f64>,

    /// File the critical section appends to
    #[arg(short, long, default_value = config::RESOURCE_FILE)]
    resource: PathBuf,

    /// Stop requesting after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Print debug output
    #[arg(short, long)]
    verbose: bool,
}

fn seconds(value: f64, name: &str) -> Result<Duration, Box<dyn Error + Send + Sync>> {
    Duration::try_from_secs_f64(value).map_err(|e| format!("invalid --{name} {value}: {e}").into())
}

impl Args {
    fn into_config(self) -> Result<Config, Box<dyn Error + Send + Sync>> {
        let mut peers = AddressBook::from_template(self.host_template);
        for entry in &self.peers {
            peers.push_entry(entry)?;
        }

        let schedule = match self.rate {
            Some(rate) => Schedule::Poisson { rate },
            None => Schedule::Uniform {
                min: seconds(self.min_pause, "min-pause")?,
                max: seconds(self.max_pause, "max-pause")?,
            },
        };

        let mut config = Config::new(self.node_id, self.nodes);
        config.base_port = self.base_port;
        config.peers = peers;
        config.send_attempts = self.attempts;
        config.send_backoff = Duration::from_millis(self.backoff_ms);
        config.warmup = seconds(self.warmup, "warmup")?;
        config.hold = seconds(self.hold, "hold")?;
        config.schedule = schedule;
        config.acquire_timeout = self
            .acquire_timeout
            .map(|limit| seconds(limit, "acquire-timeout"))
            .transpose()?;
        config.resource_path = self.resource;
        Ok(config)
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    log::set_verbose(args.verbose);
    let cycles = args.cycles;
    let server = Server::new(args.into_config()?)?;
    server.run(cycles).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Args::parse()).await {
        log::error(&format!("{e}"));
        process::exit(1);
    }
}
