use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use crate::{
    config::TypeConfig, error::DegraphmalizerError, id::DocumentId, updater::ChangeAction,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DegraphmalizeAction {
    Update,
    Delete,
}

impl Display for DegraphmalizeAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DegraphmalizeAction::Update => write!(f, "UPDATE"),
            DegraphmalizeAction::Delete => write!(f, "DELETE"),
        }
    }
}

impl From<DegraphmalizeAction> for ChangeAction {
    fn from(action: DegraphmalizeAction) -> ChangeAction {
        match action {
            DegraphmalizeAction::Update => ChangeAction::Update,
            DegraphmalizeAction::Delete => ChangeAction::Delete,
        }
    }
}

/// Where one degraphmalize run is.
///
/// ```text
/// RECEIVED -> FILTERED -> EXTRACTED -> COMMITTED -> WALKED -> WRITTEN -> PROPAGATED -> DONE
///                 \-> DONE (nothing accepted the document)
/// ```
/// Every non-terminal stage may move to `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineStage {
    Received,
    Filtered,
    Extracted,
    Committed,
    Walked,
    Written,
    Propagated,
    Done,
    Failed,
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Received => "RECEIVED",
            PipelineStage::Filtered => "FILTERED",
            PipelineStage::Extracted => "EXTRACTED",
            PipelineStage::Committed => "COMMITTED",
            PipelineStage::Walked => "WALKED",
            PipelineStage::Written => "WRITTEN",
            PipelineStage::Propagated => "PROPAGATED",
            PipelineStage::Done => "DONE",
            PipelineStage::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }

    pub fn can_advance_to(&self, to: PipelineStage) -> bool {
        use PipelineStage::*;
        match (self, to) {
            (from, Failed) => !from.is_terminal(),
            (Received, Filtered)
            | (Filtered, Extracted)
            | (Filtered, Done)
            | (Extracted, Committed)
            | (Committed, Walked)
            | (Walked, Written)
            | (Written, Propagated)
            | (Propagated, Done) => true,
            _ => false,
        }
    }

    pub fn advance(&mut self, to: PipelineStage) -> Result<(), DegraphmalizerError> {
        if !self.can_advance_to(to) {
            return Err(DegraphmalizerError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        *self = to;
        Ok(())
    }
}

/// A unit of propagation work: recompute the `config` target document of `root`, which is
/// `distance` hops from the document whose change triggered it.
#[derive(Debug, Clone)]
pub struct RecomputeRequest {
    pub root: DocumentId,
    pub config: Arc<TypeConfig>,
    pub distance: usize,
}

impl RecomputeRequest {
    pub fn new(root: DocumentId, config: Arc<TypeConfig>, distance: usize) -> Self {
        RecomputeRequest {
            root,
            config,
            distance,
        }
    }

    /// `target_index/target_type` of the derived document.
    pub fn target(&self) -> String {
        format!("{}/{}", self.config.target_index, self.config.target_type)
    }
}

impl Display for RecomputeRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} @{}", self.root, self.target(), self.distance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecomputeOutcome {
    /// Derived document written; `omitted` names properties whose reducer failed.
    Written {
        derived: DocumentId,
        properties: Vec<String>,
        omitted: Vec<String>,
    },
    /// The type's filter rejected the source.
    FilteredOut,
    /// The source is gone; its derived document was deleted.
    SourceMissing { deleted: Option<DocumentId> },
    /// The source was deleted on request; its derived document with it.
    Deleted { deleted: Option<DocumentId> },
    Failed(DegraphmalizerError),
}

impl RecomputeOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RecomputeOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeResult {
    pub root: DocumentId,
    pub target_index: String,
    pub target_type: String,
    pub distance: usize,
    pub outcome: RecomputeOutcome,
}

impl RecomputeResult {
    pub fn new(request: &RecomputeRequest, outcome: RecomputeOutcome) -> Self {
        RecomputeResult {
            root: request.root.clone(),
            target_index: request.config.target_index.clone(),
            target_type: request.config.target_type.clone(),
            distance: request.distance,
            outcome,
        }
    }
}

/// Everything one degraphmalize run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegraphmalizeResult {
    pub id: DocumentId,
    pub action: DegraphmalizeAction,
    pub stage: PipelineStage,
    /// Number of edges committed for the document.
    pub edges: usize,
    /// Recomputes in the order they ran: the document's own targets first, then by distance.
    pub recomputes: Vec<RecomputeResult>,
    /// Why the run stopped, when `stage` is `FAILED`.
    pub error: Option<DegraphmalizerError>,
}

impl DegraphmalizeResult {
    pub fn new(id: DocumentId, action: DegraphmalizeAction) -> Self {
        DegraphmalizeResult {
            id,
            action,
            stage: PipelineStage::Received,
            edges: 0,
            recomputes: Vec::new(),
            error: None,
        }
    }

    /// Moves the run to `FAILED`, keeping what it got done so far.
    pub fn fail(&mut self, error: DegraphmalizerError) {
        if let Err(e) = self.stage.advance(PipelineStage::Failed) {
            tracing::warn!("{}: {e}", self.id);
        }
        self.error = Some(error);
    }

    /// `Err` with the failure cause for failed runs.
    pub fn into_result(self) -> Result<Self, DegraphmalizerError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecomputeResult> {
        self.recomputes.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn at_distance(&self, distance: usize) -> impl Iterator<Item = &RecomputeResult> {
        self.recomputes.iter().filter(move |r| r.distance == distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_every_stage() {
        use PipelineStage::*;
        let mut stage = Received;
        for next in [Filtered, Extracted, Committed, Walked, Written, Propagated, Done] {
            stage.advance(next).unwrap();
        }
        assert_eq!(stage, Done);
        assert!(stage.advance(Failed).is_err());
    }

    #[test]
    fn skipping_stages_is_rejected() {
        let mut stage = PipelineStage::Received;
        let err = stage.advance(PipelineStage::Committed).unwrap_err();
        assert_eq!(
            err,
            DegraphmalizerError::InvalidStateTransition {
                from: "RECEIVED".into(),
                to: "COMMITTED".into()
            }
        );
        assert_eq!(stage, PipelineStage::Received);

        stage.advance(PipelineStage::Filtered).unwrap();
        stage.advance(PipelineStage::Done).unwrap();
    }

    #[test]
    fn failed_results_keep_their_progress() {
        let mut result = DegraphmalizeResult::new(
            DocumentId::new("people", "person", "ada", 1),
            DegraphmalizeAction::Update,
        );
        result.stage.advance(PipelineStage::Filtered).unwrap();
        result.edges = 2;
        result.fail(DegraphmalizerError::Custom("store down".into()));
        assert_eq!(result.stage, PipelineStage::Failed);
        assert_eq!(result.edges, 2);
        assert_eq!(
            result.into_result(),
            Err(DegraphmalizerError::Custom("store down".into()))
        );
    }

    #[test]
    fn any_live_stage_can_fail() {
        let mut stage = PipelineStage::Walked;
        stage.advance(PipelineStage::Failed).unwrap();
        assert!(stage.is_terminal());
    }
}
