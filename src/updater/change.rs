use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::error::DegraphmalizerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Update,
    Delete,
}

impl ChangeAction {
    pub fn method(&self) -> reqwest::Method {
        match self {
            ChangeAction::Update => reqwest::Method::GET,
            ChangeAction::Delete => reqwest::Method::DELETE,
        }
    }
}

impl Display for ChangeAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAction::Update => write!(f, "UPDATE"),
            ChangeAction::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for ChangeAction {
    type Err = DegraphmalizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPDATE" => Ok(ChangeAction::Update),
            "DELETE" => Ok(ChangeAction::Delete),
            other => Err(DegraphmalizerError::InvalidInput(format!(
                "unknown change action '{other}'"
            ))),
        }
    }
}

/// A pending notification that a derived document was written or deleted.
///
/// `target` is `None` for a fresh change, which is delivered to the updater's index and every
/// alias of it. A change that failed on one of those is requeued bound to that single target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
    pub action: ChangeAction,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub id: String,
    pub version: u64,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub target: Option<String>,
}

impl Change {
    pub fn new(
        action: ChangeAction,
        doc_type: impl Into<String>,
        id: impl Into<String>,
        version: u64,
    ) -> Self {
        Change {
            action,
            doc_type: doc_type.into(),
            id: id.into(),
            version,
            retries: 0,
            target: None,
        }
    }

    pub fn update(doc_type: impl Into<String>, id: impl Into<String>, version: u64) -> Self {
        Change::new(ChangeAction::Update, doc_type, id, version)
    }

    pub fn delete(doc_type: impl Into<String>, id: impl Into<String>, version: u64) -> Self {
        Change::new(ChangeAction::Delete, doc_type, id, version)
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// The copy queued after a failed delivery to `target`.
    pub fn retried(&self, target: &str) -> Change {
        Change {
            retries: self.retries + 1,
            target: Some(target.to_string()),
            ..self.clone()
        }
    }
}

/// `ACTION,TYPE,VERSION,ID`: the error log line. Ids may contain commas; types may not.
impl Display for Change {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.action, self.doc_type, self.version, self.id
        )
    }
}

impl FromStr for Change {
    type Err = DegraphmalizerError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.trim_end_matches(['\r', '\n']).splitn(4, ',');
        let (Some(action), Some(doc_type), Some(version), Some(id)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(DegraphmalizerError::InvalidInput(format!(
                "change line '{line}' does not have four fields"
            )));
        };
        let version = version.parse::<u64>().map_err(|e| {
            DegraphmalizerError::InvalidInput(format!("bad version in change line '{line}': {e}"))
        })?;
        Ok(Change::new(action.parse()?, doc_type, id, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_line_format() {
        let change = Change::update("person", "a,b", 7);
        assert_eq!(change.to_string(), "UPDATE,person,7,a,b");
        assert_eq!("UPDATE,person,7,a,b\n".parse::<Change>().unwrap(), change);
        assert_eq!(
            "DELETE,pet,0,x".parse::<Change>().unwrap(),
            Change::delete("pet", "x", 0)
        );
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!("PATCH,person,1,a".parse::<Change>().is_err());
        assert!("UPDATE,person,one,a".parse::<Change>().is_err());
        assert!("UPDATE,person".parse::<Change>().is_err());
    }

    #[test]
    fn retried_binds_the_target() {
        let change = Change::update("person", "a", 1);
        let again = change.retried("people-v2").retried("people-v2");
        assert_eq!(again.retries, 2);
        assert_eq!(again.target.as_deref(), Some("people-v2"));
        // the log line does not carry retry state
        assert_eq!(again.to_string(), change.to_string());
    }
}
