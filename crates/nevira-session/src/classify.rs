//! Agent classification for roster entries.
//!
//! The platform does not tell us which participant is the AI agent. We guess
//! from the identity string, which can be wrong in both directions: a human
//! who picks an identity containing a marker is shown as an agent, and an
//! agent deployed under an unmarked identity is shown as a human.

use nevira_types::Participant;

/// Decides whether a participant identity belongs to an agent.
pub trait AgentClassifier: Send + Sync {
    fn is_agent(&self, identity: &str) -> bool;
}

impl<F> AgentClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_agent(&self, identity: &str) -> bool {
        self(identity)
    }
}

/// Classifies identities containing any marker substring as agents.
///
/// Matching ignores ASCII case.
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    markers: Vec<String>,
}

impl MarkerClassifier {
    pub const DEFAULT_MARKERS: [&'static str; 2] = ["agent", "nevira"];

    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MARKERS)
    }
}

impl AgentClassifier for MarkerClassifier {
    fn is_agent(&self, identity: &str) -> bool {
        let identity = identity.to_ascii_lowercase();
        self.markers.iter().any(|m| identity.contains(m.as_str()))
    }
}

/// Builds the roster from the platform's remote participant identities.
///
/// The result is sorted and deduplicated so it depends only on the set of
/// identities, never on the order they were reported in.
pub fn project_roster<I, S>(identities: I, classifier: &dyn AgentClassifier) -> Vec<Participant>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut roster: Vec<Participant> = identities
        .into_iter()
        .map(Into::into)
        .map(|identity| Participant {
            is_agent: classifier.is_agent(&identity),
            identity,
        })
        .collect();
    roster.sort();
    roster.dedup_by(|a, b| a.identity == b.identity);
    roster
}
