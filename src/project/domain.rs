//! Resource domains and their fixed convergence order.

use std::fmt;

use serde::Serialize;

/// One step of project convergence or teardown.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Service accounts and their project role bindings.
    Identity,
    /// VPC, subnet, firewall rule and serverless connector.
    Network,
    /// Firestore database and composite indexes.
    Datastore,
    /// KMS key ring and crypto key.
    Encryption,
    /// Pub/Sub topics.
    Messaging,
    /// Artifact Registry repository.
    Registry,
    /// Cloud Run services.
    Compute,
    /// Push subscription binding task events to the event relay.
    EventWiring,
    /// Cloud Scheduler health-reconciliation job.
    Scheduling,
    /// Log export sink.
    Logging,
    /// Declarative deployment record of the applied configuration.
    DeploymentRecord,
    /// The project itself.
    Project,
}

/// Order in which domains converge; later domains read identifiers produced
/// by earlier ones.
pub const CONVERGE_ORDER: [Domain; 10] = [
    Domain::Identity,
    Domain::Network,
    Domain::Datastore,
    Domain::Encryption,
    Domain::Messaging,
    Domain::Registry,
    Domain::Compute,
    Domain::EventWiring,
    Domain::Scheduling,
    Domain::Logging,
];

/// Order in which domains are torn down.
pub const TEARDOWN_ORDER: [Domain; 10] = [
    Domain::Logging,
    Domain::Scheduling,
    Domain::EventWiring,
    Domain::Compute,
    Domain::Registry,
    Domain::Messaging,
    Domain::Encryption,
    Domain::Datastore,
    Domain::Network,
    Domain::Identity,
];

impl Domain {
    /// Stable lowercase label used in logs and error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Network => "network",
            Self::Datastore => "datastore",
            Self::Encryption => "encryption",
            Self::Messaging => "messaging",
            Self::Registry => "registry",
            Self::Compute => "compute",
            Self::EventWiring => "event-wiring",
            Self::Scheduling => "scheduling",
            Self::Logging => "logging",
            Self::DeploymentRecord => "deployment-record",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_reverses_convergence() {
        let mut reversed = CONVERGE_ORDER;
        reversed.reverse();
        assert_eq!(reversed, TEARDOWN_ORDER);
    }
}
