use crate::error::LoadError;
use crate::model::{Payload, Target, WorkerOutcome, WorkerState};
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Field name the payload is sent under.
pub const FILE_FIELD: &str = "file";

fn form(payload: &Payload) -> Form {
    let body = Body::from(payload.bytes.clone());
    let part = Part::stream_with_length(body, payload.len() as u64);
    Form::new().part(FILE_FIELD, part)
}

/// Sends `iterations` requests one after another. The first network error
/// ends the loop; the status code never does.
pub async fn worker(
    rank: usize,
    client: Client,
    target: Target,
    payload: Payload,
    iterations: usize,
    tx: mpsc::Sender<WorkerState>,
) -> WorkerOutcome {
    debug!(rank, %target, iterations, "worker started");

    let mut completed = 0;
    let result = send_loop(
        rank,
        &client,
        &target,
        &payload,
        iterations,
        &tx,
        &mut completed,
    )
    .await;

    let error = match result {
        Ok(()) => {
            debug!(rank, completed, "worker finished");
            None
        }
        Err(e) => {
            error!(rank, ite = completed, "worker stopped: {}", e);
            Some(e.to_string())
        }
    };

    WorkerOutcome {
        rank,
        completed,
        error,
    }
}

async fn send_loop(
    rank: usize,
    client: &Client,
    target: &Target,
    payload: &Payload,
    iterations: usize,
    tx: &mpsc::Sender<WorkerState>,
    completed: &mut usize,
) -> Result<(), LoadError> {
    let url = target.url();

    for ite in 0..iterations {
        let begin = Utc::now();
        let response = client.post(&url).multipart(form(payload)).send().await?;

        let status = response.status().as_u16();
        let resolved = response.url().to_string();
        let content = response.text().await?;
        *completed += 1;

        let state = WorkerState {
            rank,
            ite,
            status,
            begin,
            end: Utc::now(),
            content,
            url: resolved,
        };
        if tx.send(state).await.is_err() {
            // nobody is printing anymore
            debug!(rank, ite, "output channel closed");
            return Ok(());
        }
    }

    Ok(())
}
