use crate::error::LoadError;
use crate::model::{Config, Payload, WorkerOutcome, WorkerState};
use crate::worker;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Loads the payload, runs every worker to completion and returns one
/// outcome per worker, ordered by rank.
///
/// Failing to read the payload aborts before any request is sent. Worker
/// failures are reported in the outcomes and never fail the run.
pub async fn run(
    config: Config,
    tx: mpsc::Sender<WorkerState>,
) -> Result<Vec<WorkerOutcome>, LoadError> {
    let payload = Payload::load(&config.payload_path)?;
    info!(
        bytes = payload.len(),
        path = %config.payload_path.display(),
        "payload loaded"
    );

    let clients = (0..config.workers)
        .map(|_| reqwest::Client::builder().build().map_err(LoadError::Client))
        .collect::<Result<Vec<_>, _>>()?;

    let mut set = JoinSet::new();
    for (rank, client) in clients.into_iter().enumerate() {
        set.spawn(worker::worker(
            rank,
            client,
            config.target.clone(),
            payload.clone(),
            config.iterations,
            tx.clone(),
        ));
    }

    drop(tx);

    let mut outcomes = Vec::with_capacity(config.workers);
    while let Some(res) = set.join_next().await {
        match res {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!("worker task aborted: {}", e),
        }
    }

    // panicked workers never report back
    for rank in 0..config.workers {
        if !outcomes.iter().any(|o| o.rank == rank) {
            outcomes.push(WorkerOutcome {
                rank,
                completed: 0,
                error: Some("worker task aborted".to_string()),
            });
        }
    }
    outcomes.sort_by_key(|o| o.rank);

    Ok(outcomes)
}
