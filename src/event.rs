use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    degraphmalizer::{DegraphmalizeAction, DegraphmalizeResult},
    error::DegraphmalizerError,
    id::DocumentId,
};

/// Progress of one degraphmalize request, reported by [`crate::Degraphmalizer::submit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DegraphmalizeEvent {
    Started(DegraphmalizeAction, DocumentId),
    Completed(DegraphmalizeResult),
    /// The run stopped early; the result is at `FAILED` and carries the cause.
    Failed(DegraphmalizeResult),
}

impl Display for DegraphmalizeEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            DegraphmalizeEvent::Started(action, id) => write!(f, "Started({action} {id})"),
            DegraphmalizeEvent::Completed(result) => write!(f, "Completed({})", result.id),
            DegraphmalizeEvent::Failed(result) => match &result.error {
                Some(err) => write!(f, "Failed({}: {err})", result.id),
                None => write!(f, "Failed({})", result.id),
            },
        }
    }
}

/// Outcome of a configuration (re)load triggered by the filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigurationEvent {
    /// New snapshot is live; the target indices it configures.
    Reloaded(Vec<String>),
    /// Parse failed; the previous snapshot stays in effect.
    Rejected(DegraphmalizerError),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    #[default]
    Ping,
    Degraphmalize(DegraphmalizeEvent),
    Configuration(ConfigurationEvent),
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Event::Ping => write!(f, "Ping"),
            Event::Degraphmalize(e) => write!(f, "Degraphmalize::{e}"),
            Event::Configuration(ConfigurationEvent::Reloaded(indices)) => {
                write!(f, "Configuration::Reloaded({})", indices.join(","))
            }
            Event::Configuration(ConfigurationEvent::Rejected(err)) => {
                write!(f, "Configuration::Rejected({err})")
            }
        }
    }
}
