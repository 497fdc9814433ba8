use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{hierarchy::PageId, probe::FileLayout};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read config {}: {error}", path.display())]
    Read {
        error: std::io::Error,
        path: PathBuf,
    },
    #[error("Failed to parse YAML config: {0}")]
    Parse(serde_yaml::Error),
    #[error("No pages configured")]
    NoPages,
    #[error("Page {0} configured twice")]
    DuplicatePage(PageId),
}

/// Where page files of leaves live.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum FileStorage {
    Http { base_url: url::Url },
    Local { dir: PathBuf },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Http {
        endpoint: url::Url,
        #[serde(default)]
        token: Option<String>,
    },
    /// Log submissions instead of sending them.
    Debug,
}

fn default_file_extension() -> String {
    "svg".to_owned()
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub pages: Vec<PageId>,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    pub storage: FileStorage,
    pub backend: BackendConfig,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(yaml).map_err(Error::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, Error> {
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|error| Error::Read {
                error,
                path: path.to_owned(),
            })?;
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.pages.is_empty() {
            return Err(Error::NoPages);
        }
        let mut seen = HashSet::new();
        for page in &self.pages {
            if !seen.insert(page) {
                return Err(Error::DuplicatePage(page.clone()));
            }
        }
        Ok(())
    }

    pub fn layout(&self) -> FileLayout {
        let base_path = match &self.storage {
            FileStorage::Http { base_url } => base_url.as_str().to_owned(),
            FileStorage::Local { dir } => dir.display().to_string(),
        };
        FileLayout::new(base_path, self.file_extension.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_config() {
        let config = Config::from_yaml(
            r#"
pages: [front, side, top]
storage: !Http
  base_url: "https://files.example/gad/"
backend: !Http
  endpoint: "https://api.example/gad/components"
  token: secret
"#,
        )
        .unwrap();
        assert_eq!(config.pages.len(), 3);
        assert_eq!(config.file_extension, "svg");
        assert_eq!(
            config.backend,
            BackendConfig::Http {
                endpoint: "https://api.example/gad/components".parse().unwrap(),
                token: Some("secret".into()),
            }
        );
        assert_eq!(
            config
                .layout()
                .path(&PageId::new("side"), &crate::hierarchy::FileId::new("f1")),
            "https://files.example/gad/side/f1.svg"
        );
    }

    #[test]
    fn test_reject_bad_pages() {
        let yaml = |pages: &str| {
            format!(
                "pages: {pages}\nfile_extension: png\nstorage: !Local\n  dir: ./files\nbackend: Debug\n"
            )
        };
        assert!(Config::from_yaml(&yaml("[front]")).is_ok());
        assert!(matches!(Config::from_yaml(&yaml("[]")), Err(Error::NoPages)));
        assert!(matches!(
            Config::from_yaml(&yaml("[front, front]")),
            Err(Error::DuplicatePage(page)) if page.as_str() == "front"
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("missing.yaml")).await;
        assert!(matches!(result, Err(Error::Read { .. })));
    }
}
