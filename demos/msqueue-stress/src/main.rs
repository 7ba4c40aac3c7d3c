use std::num::NonZeroUsize;
use std::time::Duration;

use anyhow::{Result, anyhow};
use argh::FromArgs;
use msqueue::ConcurrentQueue;
use msqueue_stress::{StopToken, StressConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, FromArgs)]
/// Races producers and consumers over a lock-free queue
#[argh(help_triggers("--help"))]
struct Args {
    /// number of items enqueued by each producer
    #[argh(option, default = "10")]
    items: u64,
    /// number of producer threads
    #[argh(option, default = "1")]
    producers: usize,
    /// number of consumer threads
    #[argh(option, default = "5")]
    consumers: usize,
    /// max pause after each enqueue
    #[argh(option, arg_name = "ms", default = "500")]
    produce_delay: u64,
    /// max pause after each successful dequeue
    #[argh(option, arg_name = "ms", default = "800")]
    consume_delay: u64,
    /// pause before polling an empty queue again
    #[argh(option, arg_name = "ms", default = "10")]
    poll_interval: u64,
    /// stop producing after the given time
    #[argh(option, arg_name = "ms")]
    timeout: Option<u64>,
}

impl Args {
    fn to_config(&self) -> Result<StressConfig> {
        Ok(StressConfig {
            items: self.items,
            producers: NonZeroUsize::new(self.producers)
                .ok_or_else(|| anyhow!("producers must not be zero"))?,
            consumers: NonZeroUsize::new(self.consumers)
                .ok_or_else(|| anyhow!("consumers must not be zero"))?,
            max_produce_delay: Duration::from_millis(self.produce_delay),
            max_consume_delay: Duration::from_millis(self.consume_delay),
            poll_interval: Duration::from_millis(self.poll_interval),
        })
    }
}

pub fn main() -> Result<()> {
    let args = argh::from_env::<Args>();
    tracing_subscriber::fmt()
        .with_thread_names(true)
        .without_time()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = args.to_config()?;
    let queue = ConcurrentQueue::new();
    let stop = StopToken::new();

    let timeout = args.timeout.map(Duration::from_millis);
    let report = msqueue_stress::run_with_timeout(&queue, &config, &stop, timeout)?;

    report.verify()?;
    tracing::info!(
        "verified, produced={}, consumed={}",
        report.total_produced(),
        report.total_consumed()
    );
    for (id, items) in report.consumed.iter().enumerate() {
        tracing::info!("consumer-{id} dequeued {} items", items.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["msqueue-stress"], args).unwrap()
    }

    #[test]
    fn default_args() {
        let args = parse(&[]);
        assert_eq!(args.timeout, None);
        let config = args.to_config().unwrap();
        let default = StressConfig::default();
        assert_eq!(config.items, default.items);
        assert_eq!(config.producers, default.producers);
        assert_eq!(config.consumers, default.consumers);
        assert_eq!(config.max_produce_delay, default.max_produce_delay);
        assert_eq!(config.max_consume_delay, default.max_consume_delay);
        assert_eq!(config.poll_interval, default.poll_interval);
    }

    #[test]
    fn custom_args() {
        let args = parse(&[
            "--items", "42", "--producers", "3", "--consumers", "8", "--produce-delay", "0",
            "--timeout", "300",
        ]);
        assert_eq!(args.timeout, Some(300));
        let config = args.to_config().unwrap();
        assert_eq!(config.items, 42);
        assert_eq!(config.producers.get(), 3);
        assert_eq!(config.consumers.get(), 8);
        assert_eq!(config.max_produce_delay, Duration::ZERO);
    }

    #[test]
    fn rejects_zero_workers() {
        let err = parse(&["--producers", "0"]).to_config().unwrap_err();
        assert_eq!(err.to_string(), "producers must not be zero");
        let err = parse(&["--consumers", "0"]).to_config().unwrap_err();
        assert_eq!(err.to_string(), "consumers must not be zero");
    }
}
