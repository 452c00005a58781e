//! Sequential delivery of an artifact to every configured destination.

use std::time::Duration;

use tracing::{error, info, instrument};

use crate::BackupError;
use crate::destinations::{Artifact, DestinationClient};

/// Destinations that accepted the artifact, with their upload logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: Vec<(&'static str, String)>,
}

impl FanoutReport {
    pub fn destinations(&self) -> Vec<&'static str> {
        self.delivered.iter().map(|(kind, _)| *kind).collect()
    }
}

/// Delivers to destinations in configuration order, stopping at the
/// first failure.
pub struct DestinationFanout {
    clients: Vec<Box<dyn DestinationClient>>,
}

impl DestinationFanout {
    pub fn new(clients: Vec<Box<dyn DestinationClient>>) -> Self {
        Self { clients }
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[instrument(skip_all, fields(plan = %artifact.plan, artifact = %artifact.file_name()))]
    pub async fn run(
        &self,
        artifact: &Artifact,
        timeout: Duration,
    ) -> Result<FanoutReport, BackupError> {
        let mut report = FanoutReport::default();

        for client in &self.clients {
            let kind = client.kind();
            let outcome = match tokio::time::timeout(timeout, client.upload(artifact, timeout)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(BackupError::Timeout {
                    operation: format!("{kind} upload"),
                    after: timeout,
                }),
            };

            match outcome {
                Ok(log) => {
                    info!(destination = kind, log = %log.trim(), "upload finished");
                    report.delivered.push((kind, log));
                }
                Err(e) => {
                    error!(destination = kind, error = %e, "upload failed, skipping remaining destinations");
                    return Err(BackupError::Destination {
                        destination: kind.to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(report)
    }
}
