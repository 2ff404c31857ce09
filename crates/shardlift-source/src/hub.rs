use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SourceError};

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
pub const DEFAULT_REVISION: &str = "main";

/// Remote dataset repository that can list and download its files.
pub trait DatasetHub: Send + Sync {
    /// Every file path in the dataset, `/`-separated and relative to its root.
    fn list_files(&self, dataset: &str) -> Result<Vec<String>>;

    /// Download `files` under `local_dir`, keeping their relative layout.
    ///
    /// Files already present are left alone. Returns `local_dir`.
    fn fetch(&self, dataset: &str, files: &[String], local_dir: &Path) -> Result<PathBuf>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub revision: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: None,
            revision: DEFAULT_REVISION.to_string(),
        }
    }
}

impl HubConfig {
    /// Defaults overridden by `HF_ENDPOINT` and `HF_TOKEN`.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(endpoint) = non_empty("HF_ENDPOINT") {
            config.endpoint = endpoint;
        }
        config.token = non_empty("HF_TOKEN");
        config
    }

    fn info_url(&self, dataset: &str) -> String {
        format!("{}/api/datasets/{}", self.endpoint.trim_end_matches('/'), dataset)
    }

    fn resolve_url(&self, dataset: &str, file: &str) -> String {
        let path: Vec<String> = file.split('/').map(encode_segment).collect();
        format!(
            "{}/datasets/{}/resolve/{}/{}",
            self.endpoint.trim_end_matches('/'),
            dataset,
            encode_segment(&self.revision),
            path.join("/")
        )
    }
}

#[derive(Debug, Deserialize)]
struct DatasetInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

/// Hugging Face dataset hub over blocking HTTP.
pub struct HuggingFaceHub {
    config: HubConfig,
    client: reqwest::blocking::Client,
}

impl HuggingFaceHub {
    pub fn new(config: HubConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("shardlift/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(SourceError::HubStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    fn download(&self, dataset: &str, file: &str, target: &Path) -> Result<()> {
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| SourceError::Write { path, source }
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(write_err(parent))?;
        }

        let url = self.config.resolve_url(dataset, file);
        let mut response = self.get(&url)?;

        let partial = partial_path(target);
        let mut out = fs::File::create(&partial).map_err(write_err(&partial))?;
        let copied = response.copy_to(&mut out);
        drop(out);

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e.into());
            }
        };
        fs::rename(&partial, target).map_err(write_err(target))?;

        tracing::info!(file, bytes, "downloaded");
        Ok(())
    }
}

impl DatasetHub for HuggingFaceHub {
    fn list_files(&self, dataset: &str) -> Result<Vec<String>> {
        validate_dataset(dataset)?;
        let info: DatasetInfo = self.get(&self.config.info_url(dataset))?.json()?;
        let files = file_names(info);
        tracing::info!(dataset, count = files.len(), "listed dataset files");
        Ok(files)
    }

    fn fetch(&self, dataset: &str, files: &[String], local_dir: &Path) -> Result<PathBuf> {
        validate_dataset(dataset)?;

        for file in files {
            let target = local_target(local_dir, file)?;
            if target.is_file() {
                tracing::debug!(file = %file, "already present, skipping download");
                continue;
            }
            self.download(dataset, file, &target)?;
        }

        Ok(local_dir.to_path_buf())
    }
}

/// `owner/name`, both parts non-empty and free of path tricks.
fn validate_dataset(dataset: &str) -> Result<()> {
    let valid = match dataset.split_once('/') {
        Some((owner, name)) => [owner, name].iter().all(|part| {
            !part.is_empty()
                && !part.starts_with('.')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        }),
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SourceError::InvalidDataset(dataset.to_string()))
    }
}

fn file_names(info: DatasetInfo) -> Vec<String> {
    let mut files: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
    files.sort();
    files
}

/// Where a hub file lands locally. Listings are remote input, so any
/// name that is not a plain relative path is refused.
fn local_target(local_dir: &Path, file: &str) -> Result<PathBuf> {
    let relative = Path::new(file);
    let plain = !file.is_empty() && relative.components().all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        return Err(SourceError::OutsideRoot {
            path: relative.to_path_buf(),
            root: local_dir.to_path_buf(),
        });
    }
    Ok(local_dir.join(relative))
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_url_uses_api_path() {
        let config = HubConfig::default();
        assert_eq!(
            config.info_url("ai4bharat/Svarah"),
            "https://huggingface.co/api/datasets/ai4bharat/Svarah"
        );
    }

    #[test]
    fn resolve_url_encodes_segments() {
        let config = HubConfig {
            endpoint: "http://mirror.local/".into(),
            ..HubConfig::default()
        };
        assert_eq!(
            config.resolve_url("o/d", "audio/part 0#1.tar"),
            "http://mirror.local/datasets/o/d/resolve/main/audio/part%200%231.tar"
        );
    }

    #[test]
    fn siblings_become_sorted_names() {
        let json = r#"{
            "id": "o/d",
            "siblings": [
                {"rfilename": "b/part-1.tar"},
                {"rfilename": "README.md"},
                {"rfilename": "a/train.parquet"}
            ]
        }"#;
        let info: DatasetInfo = serde_json::from_str(json).unwrap();
        assert_eq!(file_names(info), vec!["README.md", "a/train.parquet", "b/part-1.tar"]);
    }

    #[test]
    fn missing_siblings_is_empty() {
        let info: DatasetInfo = serde_json::from_str(r#"{"id": "o/d"}"#).unwrap();
        assert!(file_names(info).is_empty());
    }

    #[test]
    fn dataset_ids() {
        assert!(validate_dataset("ai4bharat/Svarah").is_ok());
        assert!(validate_dataset("amphion/Emilia-Dataset").is_ok());
        assert!(validate_dataset("Svarah").is_err());
        assert!(validate_dataset("a/b/c").is_err());
        assert!(validate_dataset("../etc").is_err());
        assert!(validate_dataset("/name").is_err());
    }

    #[test]
    fn local_targets_stay_under_dir() {
        let dir = Path::new("/dl/Svarah");
        assert_eq!(local_target(dir, "a/b.tar").unwrap(), dir.join("a/b.tar"));
        assert!(local_target(dir, "../b.tar").is_err());
        assert!(local_target(dir, "/etc/passwd").is_err());
        assert!(local_target(dir, "").is_err());
    }

    #[test]
    fn partial_sits_next_to_target() {
        assert_eq!(partial_path(Path::new("/x/a.tar")), PathBuf::from("/x/a.tar.part"));
    }

    #[test]
    fn fetch_rejects_unsafe_names_before_network() {
        let hub = HuggingFaceHub::new(HubConfig {
            endpoint: "http://127.0.0.1:9".into(),
            ..HubConfig::default()
        })
        .unwrap();
        let dir = tempfile::tempdir().unwrap();

        let result = hub.fetch("o/d", &["../escape.tar".to_string()], dir.path());

        assert!(matches!(result, Err(SourceError::OutsideRoot { .. })));
    }

    #[test]
    fn fetch_skips_present_files() {
        let hub = HuggingFaceHub::new(HubConfig {
            endpoint: "http://127.0.0.1:9".into(),
            ..HubConfig::default()
        })
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/part.tar"), b"x").unwrap();

        let out = hub.fetch("o/d", &["a/part.tar".to_string()], dir.path()).unwrap();

        assert_eq!(out, dir.path());
    }
}
