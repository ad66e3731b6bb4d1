//! Utility functions
//!
use std::{fmt, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use reqwest::{Client, Url};

/// Where a model resource lives: a local path or an `http(s)` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    Local(PathBuf),
    Remote(Url),
}

impl FromStr for ResourceLocation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(Self::Remote(Url::parse(s)?))
        } else {
            Ok(Self::Local(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

impl ResourceLocation {
    /// Location of `name` inside this location, which is treated as a directory.
    pub fn join(&self, name: &str) -> Result<Self> {
        match self {
            Self::Local(path) => Ok(Self::Local(path.join(name))),
            Self::Remote(url) => {
                let mut base = url.clone();
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }
                Ok(Self::Remote(base.join(name)?))
            }
        }
    }

    /// Read the whole resource.
    pub async fn fetch(&self, client: &Client) -> Result<Vec<u8>> {
        match self {
            Self::Local(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display())),
            Self::Remote(url) => download(client, url)
                .await
                .with_context(|| format!("failed to fetch {url}")),
        }
    }
}

/// Download a file from a URL into memory.
async fn download(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let resp = client.get(url.clone()).send().await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_join_local() -> Result<()> {
        let base: ResourceLocation = "./model/".parse()?;
        assert_eq!(
            base.join("model.onnx")?,
            ResourceLocation::Local(PathBuf::from("./model/model.onnx"))
        );

        Ok(())
    }

    #[test]
    fn test_join_remote_without_trailing_slash() -> Result<()> {
        let base: ResourceLocation = "https://example.com/models/abc".parse()?;
        assert_eq!(
            base.join("metadata.json")?.to_string(),
            "https://example.com/models/abc/metadata.json"
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_missing_local_file() -> Result<()> {
        let location: ResourceLocation = "does/not/exist.json".parse()?;
        let err = location
            .fetch(&Client::new())
            .await
            .expect_err("missing file");
        assert!(format!("{err:#}").contains("does/not/exist.json"));

        Ok(())
    }
}
