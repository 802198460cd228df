//! Stage 1: capture metadata for every geotagged media file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use media_atlas_extract::enumerate::{enumerate_media, relative_filename};
use media_atlas_extract::{CaptureMetadata, ExtractError, MediaKind, MetadataExtractor};
use media_atlas_models::MediaRecord;

use crate::engine::{Records, Stage};
use crate::stages::{INDEX_LABEL, INDEX_STAGE_ID};
use crate::{PipelineError, SkipReason};

/// Probes each file under a library root. Items are absolute file paths;
/// files without a coordinate pair are skipped.
pub struct IndexStage {
    library_root: PathBuf,
    extractor: Box<dyn MetadataExtractor>,
    /// Filenames already in the records. Filled on first use so a resumed
    /// run does not duplicate records committed after the checkpoint.
    seen: Option<HashSet<String>>,
}

impl IndexStage {
    /// Creates the stage for the library at `library_root`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Extract`] if the path cannot be made
    /// absolute.
    pub fn new(
        library_root: &Path,
        extractor: Box<dyn MetadataExtractor>,
    ) -> Result<Self, PipelineError> {
        let library_root = std::path::absolute(library_root).map_err(ExtractError::Io)?;
        Ok(Self {
            library_root,
            extractor,
            seen: None,
        })
    }

    /// The absolute library root.
    #[must_use]
    pub fn library_root(&self) -> &Path {
        &self.library_root
    }
}

#[async_trait]
impl Stage for IndexStage {
    type Item = PathBuf;
    type Outcome = MediaRecord;

    fn id(&self) -> &'static str {
        INDEX_STAGE_ID
    }

    fn label(&self) -> &'static str {
        INDEX_LABEL
    }

    async fn prepare(&mut self) -> Result<(Vec<PathBuf>, Records), PipelineError> {
        self.seen = None;
        let files = enumerate_media(&self.library_root)?;
        Ok((files, Vec::new()))
    }

    async fn process(&mut self, path: &PathBuf) -> Result<MediaRecord, SkipReason> {
        let kind = MediaKind::from_path(path).ok_or(SkipReason::UnsupportedExtension)?;

        let metadata = self
            .extractor
            .extract(path, kind)
            .await
            .map_err(|e| SkipReason::Failed(e.to_string()))?;

        if metadata == CaptureMetadata::default() {
            return Err(SkipReason::NoMetadata);
        }

        let (latitude, longitude) = metadata.coordinates().ok_or(SkipReason::NoCoordinates)?;

        log::debug!("{} at {latitude},{longitude}", path.display());

        Ok(MediaRecord {
            filename: relative_filename(&self.library_root, path),
            datetime_utc: metadata.datetime_utc,
            latitude,
            longitude,
            camera_make: metadata.camera_make,
            camera_model: metadata.camera_model,
            place: None,
        })
    }

    fn apply(&mut self, records: &mut Records, _path: &PathBuf, record: MediaRecord) {
        let seen = self
            .seen
            .get_or_insert_with(|| records.iter().map(|r| r.filename.clone()).collect());

        if seen.insert(record.filename.clone()) {
            records.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::engine::{BatchEngine, RunOutcome, StageStores};

    /// Answers by file name.
    struct FakeExtractor {
        answers: HashMap<&'static str, Result<CaptureMetadata, &'static str>>,
    }

    #[async_trait]
    impl MetadataExtractor for FakeExtractor {
        async fn extract(
            &self,
            path: &Path,
            _kind: MediaKind,
        ) -> Result<CaptureMetadata, ExtractError> {
            let name = path.file_name().unwrap().to_str().unwrap();
            match self.answers.get(name) {
                Some(Ok(meta)) => Ok(meta.clone()),
                Some(Err(message)) => Err(ExtractError::Parse {
                    message: (*message).to_string(),
                }),
                None => Ok(CaptureMetadata::default()),
            }
        }
    }

    fn at(latitude: f64, longitude: f64) -> CaptureMetadata {
        CaptureMetadata {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..CaptureMetadata::default()
        }
    }

    fn library(name: &str, files: &[&str]) -> PathBuf {
        let root = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&root);
        for file in files {
            let path = root.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"").unwrap();
        }
        root
    }

    #[tokio::test]
    async fn indexes_only_geotagged_files() {
        let root = library(
            "media_atlas_index_stage",
            &[
                "2023/a.jpg",
                "2023/b.mov",
                "2023/c.png",
                "2023/d.heic",
                "2023/e.jpeg",
                "2023/notes.txt",
            ],
        );

        let mut answers = HashMap::new();
        answers.insert(
            "a.jpg",
            Ok(CaptureMetadata {
                datetime_utc: Some(Utc.with_ymd_and_hms(2023, 5, 1, 9, 0, 0).unwrap()),
                camera_make: Some("Apple".to_string()),
                camera_model: Some("iPhone 13".to_string()),
                ..at(48.8566, 2.3522)
            }),
        );
        answers.insert("b.mov", Ok(at(51.5074, -0.1278)));
        answers.insert("c.png", Ok(at(0.0, 0.0)));
        answers.insert("d.heic", Err("corrupt file"));

        let mut stage = IndexStage::new(&root, Box::new(FakeExtractor { answers })).unwrap();
        let mut engine = BatchEngine::new(StageStores::<PathBuf>::in_memory("idx"), 2);

        let RunOutcome::Completed(summary) = engine.run(&mut stage).await.unwrap() else {
            panic!("stage should run");
        };
        assert_eq!(summary.total, 5);
        assert_eq!(summary.skipped, 3);

        let records = engine.stores().records.load().unwrap().unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.filename.as_str()).collect();
        let expected_a = Path::new("2023/a.jpg").to_string_lossy().into_owned();
        let expected_b = Path::new("2023/b.mov").to_string_lossy().into_owned();
        assert_eq!(names, [expected_a.as_str(), expected_b.as_str()]);

        assert_eq!(records[0].camera_make.as_deref(), Some("Apple"));
        assert!(records[0].datetime_utc.is_some());
        assert!(records[1].camera_make.is_none());
        assert!(records.iter().all(MediaRecord::needs_place));

        let items = engine.stores().items.load().unwrap().unwrap();
        assert!(items.iter().all(|p| p.is_absolute()));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn skip_reasons_are_specific() {
        let mut answers = HashMap::new();
        answers.insert("zero.jpg", Ok(at(0.0, 10.0)));
        answers.insert("broken.jpg", Err("exit status 1"));
        let mut stage =
            IndexStage::new(Path::new("/library"), Box::new(FakeExtractor { answers })).unwrap();

        assert_eq!(
            stage.process(&PathBuf::from("/library/doc.pdf")).await,
            Err(SkipReason::UnsupportedExtension)
        );
        assert_eq!(
            stage.process(&PathBuf::from("/library/empty.jpg")).await,
            Err(SkipReason::NoMetadata)
        );
        assert_eq!(
            stage.process(&PathBuf::from("/library/zero.jpg")).await,
            Err(SkipReason::NoCoordinates)
        );
        assert!(matches!(
            stage.process(&PathBuf::from("/library/broken.jpg")).await,
            Err(SkipReason::Failed(_))
        ));
    }

    #[test]
    fn replayed_item_is_not_recorded_twice() {
        let mut stage = IndexStage::new(
            Path::new("/library"),
            Box::new(FakeExtractor {
                answers: HashMap::new(),
            }),
        )
        .unwrap();

        let record = MediaRecord {
            filename: "a.jpg".to_string(),
            datetime_utc: None,
            latitude: 1.0,
            longitude: 2.0,
            camera_make: None,
            camera_model: None,
            place: None,
        };
        let mut records = vec![record.clone()];

        stage.apply(&mut records, &PathBuf::from("/library/a.jpg"), record);
        assert_eq!(records.len(), 1);
    }
}
