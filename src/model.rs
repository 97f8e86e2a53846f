use crate::error::LoadError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub workers: usize,
    pub iterations: usize,
    pub target: Target,
    pub payload_path: PathBuf,
}

impl Config {
    /// Requests the whole run sends when no worker fails.
    pub fn total_requests(&self) -> u64 {
        (self.workers as u64).saturating_mul(self.iterations as u64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 4,
            iterations: 100,
            target: Target::new("127.0.0.1", 8000),
            payload_path: PathBuf::from("image.jpeg"),
        }
    }
}

/// Server under test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// File content sent on every request. Clones share the same buffer.
#[derive(Clone, Debug)]
pub struct Payload {
    pub bytes: Bytes,
}

impl Payload {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| LoadError::Payload {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            bytes: Bytes::from(bytes),
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct WorkerState {
    pub rank: usize,
    pub ite: usize,
    pub status: u16,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub content: String,
    pub url: String,
}

impl WorkerState {
    pub fn latency_ms(&self) -> i64 {
        (self.end - self.begin).num_milliseconds()
    }
}

pub fn format_response_line(state: &WorkerState) -> String {
    format!("Receive response: '{}' from {}", state.content, state.url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub rank: usize,
    pub completed: usize,
    pub error: Option<String>,
}

impl WorkerOutcome {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub responses: usize,
    pub statuses: BTreeMap<u16, usize>,
    pub failed_workers: usize,
    pub avg_latency_ms: f64,
    pub elapsed_ms: u128,
}

impl Summary {
    pub fn from_states(
        states: &[WorkerState],
        outcomes: &[WorkerOutcome],
        elapsed: Duration,
    ) -> Self {
        let mut statuses = BTreeMap::new();
        for state in states {
            *statuses.entry(state.status).or_insert(0) += 1;
        }

        let avg_latency_ms = if states.is_empty() {
            0.0
        } else {
            states.iter().map(|s| s.latency_ms()).sum::<i64>() as f64 / states.len() as f64
        };

        Self {
            responses: states.len(),
            statuses,
            failed_workers: outcomes.iter().filter(|o| o.is_failed()).count(),
            avg_latency_ms,
            elapsed_ms: elapsed.as_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn state(rank: usize, status: u16, latency: i64) -> WorkerState {
        let begin = Utc::now();
        WorkerState {
            rank,
            ite: 0,
            status,
            begin,
            end: begin + chrono::Duration::milliseconds(latency),
            content: "OK".to_string(),
            url: "http://127.0.0.1:8000/".to_string(),
        }
    }

    #[test]
    fn default_target_url() {
        let config = Config::default();
        assert_eq!(config.target.url(), "http://127.0.0.1:8000/");
        assert_eq!(config.workers, 4);
        assert_eq!(config.iterations, 100);
        assert_eq!(config.payload_path, PathBuf::from("image.jpeg"));
    }

    #[test]
    fn total_requests_saturates() {
        let config = Config {
            workers: usize::MAX,
            iterations: usize::MAX,
            ..Config::default()
        };
        assert_eq!(config.total_requests(), u64::MAX);
        assert_eq!(Config::default().total_requests(), 400);
    }

    #[test]
    fn response_line_format() {
        let line = format_response_line(&state(0, 200, 1));
        assert_eq!(line, "Receive response: 'OK' from http://127.0.0.1:8000/");
    }

    #[test]
    fn payload_missing_file() {
        let err = Payload::load("/definitely/not/here.jpeg").unwrap_err();
        assert!(matches!(err, LoadError::Payload { .. }));
    }

    #[test]
    fn payload_reads_whole_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0xff, 0xd8, 0x00, 0x10]).unwrap();
        let payload = Payload::load(f.path()).unwrap();
        assert_eq!(&payload.bytes[..], &[0xff, 0xd8, 0x00, 0x10]);
        assert_eq!(payload.len(), 4);
    }

    #[test]
    fn summary_counts() {
        let states = vec![state(0, 200, 10), state(1, 500, 30), state(1, 200, 20)];
        let outcomes = vec![
            WorkerOutcome {
                rank: 0,
                completed: 1,
                error: None,
            },
            WorkerOutcome {
                rank: 1,
                completed: 2,
                error: Some("connection reset".into()),
            },
        ];
        let summary = Summary::from_states(&states, &outcomes, Duration::from_millis(1500));
        assert_eq!(summary.responses, 3);
        assert_eq!(summary.statuses[&200], 2);
        assert_eq!(summary.statuses[&500], 1);
        assert_eq!(summary.failed_workers, 1);
        assert!((summary.avg_latency_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(summary.elapsed_ms, 1500);
    }
}
