use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::read_to_string,
    path::{Path, PathBuf},
    sync::Arc,
};
use walkdir::WalkDir;

use super::{
    hooks::{EdgeRule, HookRegistry},
    model::{Configuration, IndexConfig, PropertyConfig, TypeConfig, WalkConfig},
};
use crate::{error::DegraphmalizerError, graph::WalkDirection};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyFile {
    pub reduce: String,
    #[serde(default)]
    pub nested: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalkFile {
    pub direction: WalkDirection,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyFile>,
}

/// On-disk form of one `<config_dir>/<target index>/<target type>.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeFile {
    pub source_index: String,
    pub source_type: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub extract: Option<String>,
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(default)]
    pub edges: Vec<EdgeRule>,
    #[serde(default)]
    pub walks: BTreeMap<String, WalkFile>,
}

impl TypeFile {
    pub fn resolve(
        self,
        target_index: &str,
        target_type: &str,
        registry: &HookRegistry,
    ) -> Result<TypeConfig, DegraphmalizerError> {
        let mut config = TypeConfig::new(
            target_index,
            target_type,
            self.source_index,
            self.source_type,
        );
        if let Some(name) = self.filter.as_deref() {
            config = config.with_filter(registry.filter(name)?);
        }
        if let Some(name) = self.extract.as_deref() {
            config = config.with_extractor(registry.extractor(name)?);
        }
        for rule in self.edges {
            config = config.with_extractor(Arc::new(rule));
        }
        if let Some(name) = self.transform.as_deref() {
            config = config.with_transform(registry.transformer(name)?);
        }
        for (walk_name, walk) in self.walks {
            let mut walk_config = WalkConfig::new(walk_name, walk.direction);
            walk_config.max_depth = walk.max_depth;
            for (prop_name, prop) in walk.properties {
                walk_config.properties.insert(
                    prop_name.clone(),
                    PropertyConfig {
                        name: prop_name,
                        nested: prop.nested,
                        reducer: registry.reducer(&prop.reduce)?,
                    },
                );
            }
            config = config.with_walk(walk_config);
        }
        Ok(config)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// The `<index>/<type>.toml` files below `dir`, sorted by index then type name.
pub fn type_files(dir: &Path) -> Result<Vec<PathBuf>, DegraphmalizerError> {
    if !dir.is_dir() {
        return Err(DegraphmalizerError::Configuration(format!(
            "configuration directory {dir:?} does not exist"
        )));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            DegraphmalizerError::Configuration(format!("could not scan {dir:?}: {e}"))
        })?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().map(|ext| ext == "toml").unwrap_or(false)
            && !is_hidden(path)
            && !path.parent().map(is_hidden).unwrap_or(false)
        {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Builds a full snapshot from `dir`. Any unreadable file or unknown hook fails the whole load.
pub fn load_configuration(
    dir: &Path,
    registry: &HookRegistry,
) -> Result<Configuration, DegraphmalizerError> {
    let mut indices: Vec<IndexConfig> = Vec::new();
    for path in type_files(dir)? {
        let (Some(target_type), Some(target_index)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.parent()
                .and_then(|p| p.file_name())
                .and_then(|s| s.to_str()),
        ) else {
            return Err(DegraphmalizerError::Configuration(format!(
                "cannot derive index/type from {path:?}"
            )));
        };
        tracing::debug!("loading type configuration {target_index}/{target_type} from {path:?}");

        let file: TypeFile = toml::from_str(&read_to_string(&path)?).map_err(|e| {
            DegraphmalizerError::Configuration(format!("{path:?}: {e}"))
        })?;
        let config = file.resolve(target_index, target_type, registry)?;

        match indices.iter_mut().find(|i| i.name == target_index) {
            Some(index) => index.types.push(Arc::new(config)),
            None => indices.push(IndexConfig::new(target_index).with_type(config)),
        }
    }
    tracing::info!(
        "loaded configuration for {} target index(es) from {dir:?}",
        indices.len()
    );
    Ok(Configuration::new(indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PERSON: &str = r#"
source_index = "people"
source_type = "person"

[[edges]]
label = "parent"
pointer = "/parent"
index = "people"
type = "person"

[walks.ancestors]
direction = "OUT"
max_depth = 3

[walks.ancestors.properties.ancestor_count]
reduce = "count"

[walks.ancestors.properties.ancestor_names]
reduce = "collect:/name"
nested = true
"#;

    fn write(dir: &Path, rel: &str, text: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn loads_index_directories() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "family/person.toml", PERSON);
        write(
            tmp.path(),
            "family/.hidden.toml",
            "this is not toml",
        );
        write(tmp.path(), "family/notes.txt", "ignored");

        let cfg = load_configuration(tmp.path(), &HookRegistry::with_builtins()).unwrap();
        assert_eq!(cfg.index_names(), vec!["family"]);
        let person = cfg.index("family").unwrap().type_config("person").unwrap();
        assert_eq!(person.source_index, "people");
        assert_eq!(person.extractors.len(), 1);
        let walk = &person.walks["ancestors"];
        assert_eq!(walk.direction, WalkDirection::Out);
        assert_eq!(walk.max_depth, Some(3));
        assert!(walk.properties["ancestor_names"].nested);
        assert!(!walk.properties["ancestor_count"].nested);
    }

    #[test]
    fn unknown_hooks_fail_the_load() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "family/person.toml",
            "source_index = \"people\"\nsource_type = \"person\"\nfilter = \"missing\"\n",
        );
        let err = load_configuration(tmp.path(), &HookRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, DegraphmalizerError::Configuration(_)));
    }

    #[test]
    fn malformed_files_fail_the_load() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "family/person.toml", "source_index = ");
        assert!(load_configuration(tmp.path(), &HookRegistry::new()).is_err());
        assert!(load_configuration(&tmp.path().join("absent"), &HookRegistry::new()).is_err());
    }
}
