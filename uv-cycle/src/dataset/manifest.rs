use crate::common::*;

/// The default manifest file name inside a dataset directory.
pub const MANIFEST_FILE_NAME: &str = "metadata.json";

/// One augmented view/texture pair written by the augmentation step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub source_uv: PathBuf,
    pub source_view: PathBuf,
    #[serde(rename = "uv_aug")]
    pub augmented_uv: PathBuf,
    #[serde(rename = "view_aug")]
    pub augmented_view: PathBuf,
    pub seed: u64,
    #[serde(default)]
    pub transforms: Vec<String>,
}

/// The list of records of an augmented dataset.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub records: Vec<ManifestRecord>,
}

impl Manifest {
    /// Resolve the manifest path. A directory is expected to contain a `metadata.json`.
    pub fn resolve_path(path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_dir() {
            path.join(MANIFEST_FILE_NAME)
        } else {
            path.to_owned()
        }
    }

    /// Load the manifest from a file or a dataset directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = Self::resolve_path(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read manifest '{}'", path.display()))?;
        let records: Vec<ManifestRecord> = serde_json::from_str(&text)
            .with_context(|| format!("malformed manifest '{}'", path.display()))?;
        ensure!(
            !records.is_empty(),
            "the manifest '{}' has no records",
            path.display()
        );
        info!("loaded {} records from '{}'", records.len(), path.display());

        Ok(Self { path, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MANIFEST: &str = r#"[
        {
            "source_uv": "uv/a.png",
            "source_view": "view/a.png",
            "uv_aug": "aug/a_0_uv.png",
            "view_aug": "aug/a_0_view.png",
            "seed": 7,
            "transforms": ["hue_shift", "crop"]
        }
    ]"#;

    #[test]
    fn open_directory_reads_metadata_json() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::File::create(dir.path().join(MANIFEST_FILE_NAME))?.write_all(MANIFEST.as_bytes())?;

        let manifest = Manifest::open(dir.path())?;
        assert_eq!(manifest.path, dir.path().join(MANIFEST_FILE_NAME));
        assert_eq!(manifest.records.len(), 1);

        let record = &manifest.records[0];
        assert_eq!(record.augmented_view, Path::new("aug/a_0_view.png"));
        assert_eq!(record.transforms, vec!["hue_shift", "crop"]);
        Ok(())
    }

    #[test]
    fn malformed_manifest_is_an_error() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"[{\"source_uv\": 3}]")?;
        assert!(Manifest::open(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn empty_manifest_is_an_error() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"[]")?;
        assert!(Manifest::open(file.path()).is_err());
        Ok(())
    }
}
