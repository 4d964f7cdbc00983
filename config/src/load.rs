use crate::{
    ConfigError,
    ConfigNode,
};
use std::path::Path;

/// Reads the YAML file at `path` into an untransformed tree.
///
/// An empty file or a document whose top level is not a mapping is rejected,
/// every later pass relies on the root being a mapping.
pub fn read_config_file(path: impl AsRef<Path>) -> Result<ConfigNode, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Err(ConfigError::NotAMapping);
    }
    let tree: ConfigNode = serde_yml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    if !tree.is_mapping() {
        return Err(ConfigError::NotAMapping);
    }
    debug!(path = %path.display(), "read configuration file");
    Ok(tree)
}

#[cfg(test)]
mod test {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn reads_a_mapping() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("config.yaml");
        std::fs::write(&file, "period: 10\nldapServers: []\n").unwrap();

        let tree = read_config_file(&file).unwrap();
        assert_eq!(tree["period"].as_u64(), Some(10));
    }

    #[test]
    fn rejects_non_mapping_documents() {
        let dir = TempDir::new().unwrap();
        let empty = dir.child("empty.yaml");
        let list = dir.child("list.yaml");
        std::fs::write(&empty, "").unwrap();
        std::fs::write(&list, "- a\n- b\n").unwrap();

        assert!(matches!(read_config_file(&empty), Err(ConfigError::NotAMapping)));
        assert!(matches!(read_config_file(&list), Err(ConfigError::NotAMapping)));
    }

    #[test]
    fn reports_the_path_of_unreadable_files() {
        let dir = TempDir::new().unwrap();
        let missing = dir.child("missing.yaml");

        let error = read_config_file(&missing).unwrap_err();
        assert!(matches!(error, ConfigError::Read { ref path, .. } if path == &missing));
        assert!(error.to_string().contains("missing.yaml"));
    }
}
