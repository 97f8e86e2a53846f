use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use postload::error::LoadError;
use postload::generator;
use postload::model::{format_response_line, Config, Summary, Target};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host of the server
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port of the server
    #[arg(short = 'P', long, default_value_t = 8000)]
    port: u16,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Requests sent by each worker
    #[arg(short = 'n', long, default_value_t = 100)]
    iterations: usize,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Config {
            workers: args.workers,
            iterations: args.iterations,
            target: Target::new(args.host.clone(), args.port),
            ..Config::default()
        }
    }
}

fn print_summary(summary: &Summary) {
    eprintln!("{}", style("summary").bold());
    eprintln!("  responses:      {}", summary.responses);
    for (status, count) in &summary.statuses {
        eprintln!("  status {}:     {}", status, count);
    }
    eprintln!("  failed workers: {}", summary.failed_workers);
    eprintln!("  avg latency:    {:.2}ms", summary.avg_latency_ms);
    eprintln!("  elapsed:        {:.2}s", summary.elapsed_ms as f64 / 1000.0);
}

async fn execute(args: Args) -> Result<(), LoadError> {
    let config = Config::from(&args);

    let pb = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let sty = ProgressStyle::with_template(
            "{spinner} {elapsed_precise} [{bar:40}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        let pb = ProgressBar::new(config.total_requests());
        pb.set_style(sty);
        pb.set_message(config.target.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };

    let (tx, mut rx) = mpsc::channel(100);

    let h = tokio::spawn(async move {
        let mut data = vec![];
        while let Some(worker_state) = rx.recv().await {
            pb.suspend(|| println!("{}", format_response_line(&worker_state)));
            pb.inc(1);
            data.push(worker_state);
        }
        pb.finish_and_clear();

        data
    });

    let start = Instant::now();
    let outcomes = generator::run(config, tx).await;
    // the printer ends once every sender is gone, including on early errors
    let data = h.await?;
    let outcomes = outcomes?;

    let summary = Summary::from_states(&data, &outcomes, start.elapsed());
    print_summary(&summary);

    if let Some(path) = args.summary_json {
        std::fs::write(path, serde_json::to_vec_pretty(&summary)?)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    execute(args).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_path_is_fixed() {
        assert!(Args::try_parse_from(["postload", "--payload", "other.jpeg"]).is_err());

        let args = Args::try_parse_from(["postload", "-w", "2", "-n", "5", "-P", "9000"]).unwrap();
        let config = Config::from(&args);
        assert_eq!(config.payload_path, PathBuf::from("image.jpeg"));
        assert_eq!(config.target.url(), "http://127.0.0.1:9000/");
        assert_eq!(config.total_requests(), 10);
    }
}
