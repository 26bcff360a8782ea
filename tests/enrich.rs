//! Integration tests for segmentation + enrichment + persistence.
//!
//! Everything here runs offline: annotators and inference backends are
//! in-process fakes, and every file lives in a scratch directory.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{NaiveDate, NaiveDateTime};
use deckmeta::{
    enrich, read_metadata, Annotation, AnnotationError, Annotator, DeckMetaError,
    InferenceBackend, InferenceRequest, LlmAnnotator, MetadataEnricher,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

const RULE: &str = "------------------------------------------------";

fn page_break(n: usize) -> String {
    format!("\n\n{{{n}}}{RULE}\n\n")
}

fn fixed_ts() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 14)
        .unwrap()
        .and_hms_micro_opt(9, 26, 53, 589_793)
        .unwrap()
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

/// Deterministic annotator that records what it was asked.
#[derive(Default)]
struct RecordingAnnotator {
    summarized: Mutex<Vec<String>>,
    described: Mutex<Vec<PathBuf>>,
    describe_calls: Mutex<usize>,
}

#[async_trait]
impl Annotator for RecordingAnnotator {
    async fn summarize(&self, text: &str) -> Annotation {
        self.summarized.lock().unwrap().push(text.to_string());
        Annotation::Generated(format!("Summary of {} chars.", text.chars().count()))
    }

    async fn describe_images(&self, paths: &[PathBuf]) -> HashMap<PathBuf, Annotation> {
        *self.describe_calls.lock().unwrap() += 1;
        self.described.lock().unwrap().extend(paths.iter().cloned());
        paths
            .iter()
            .filter(|p| p.exists())
            .map(|p| {
                let name = p.file_name().unwrap().to_string_lossy().into_owned();
                (p.clone(), Annotation::Generated(format!("Image {name}.")))
            })
            .collect()
    }
}

// ── Segmentation through the enricher ────────────────────────────────────────

#[tokio::test]
async fn two_page_deck_without_annotator() {
    let dir = tempfile::tempdir().unwrap();
    let md = write(
        dir.path(),
        "deck.md",
        &format!("Title\n\nSome text\n\n![](img1.png){}More text", page_break(1)),
    );

    let path = enrich(&md, None).await.unwrap();

    assert_eq!(path, dir.path().join("deck_metadata.json"));
    let doc = read_metadata(&path).await.unwrap();
    assert_eq!(doc.source_file(), "deck.md");
    assert_eq!(doc.slide_count(), 2);

    let first = &doc.slides()[0];
    assert_eq!(first.index, 0);
    // "Title" carries no heading marker, so it is ordinary slide text.
    assert_eq!(first.text, "Title\nSome text");
    assert_eq!(first.images.len(), 1);
    assert_eq!(first.images[0].relative_path, "img1.png");

    let second = &doc.slides()[1];
    assert_eq!(second.index, 1);
    assert_eq!(second.text, "More text");
    assert!(second.images.is_empty());

    // No client: every annotation is persisted empty.
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for slide in raw["slides"].as_array().unwrap() {
        assert_eq!(slide["desc_summary"], "");
        for image in slide["images"].as_array().unwrap() {
            assert_eq!(image["description"], "");
        }
    }
}

#[tokio::test]
async fn headings_and_markers_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let md = write(
        dir.path(),
        "deck.md",
        "# Quarterly review\n{0}\n- revenue up\n   \n  # indented stays\n## Next",
    );

    let doc = read_metadata(&enrich(&md, None).await.unwrap())
        .await
        .unwrap();
    assert_eq!(doc.slides()[0].text, "- revenue up\n  # indented stays");
}

#[tokio::test]
async fn malformed_image_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let md = write(
        dir.path(),
        "deck.md",
        &format!("Fine{}Text\n![broken image", page_break(1)),
    );
    let annotator = RecordingAnnotator::default();

    let err = enrich(&md, Some(&annotator)).await.unwrap_err();

    match err {
        DeckMetaError::MalformedImage {
            slide,
            line_number,
            ref line,
        } => {
            assert_eq!(slide, 1);
            assert_eq!(line_number, 2);
            assert_eq!(line, "![broken image");
        }
        other => panic!("expected MalformedImage, got {other:?}"),
    }
    assert!(!dir.path().join("deck_metadata.json").exists());
    assert!(annotator.summarized.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_markdown_is_source_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = enrich(dir.path().join("nope.md"), None).await.unwrap_err();
    assert!(matches!(err, DeckMetaError::SourceNotFound { .. }), "got: {err:?}");
}

#[tokio::test]
async fn rerun_overwrites_previous_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let md = write(dir.path(), "deck.md", &format!("a{}b{}c", page_break(1), page_break(2)));
    enrich(&md, None).await.unwrap();

    std::fs::write(&md, "only one slide now").unwrap();
    let doc = read_metadata(&enrich(&md, None).await.unwrap())
        .await
        .unwrap();
    assert_eq!(doc.slide_count(), 1);
}

// ── Enrichment ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn images_requested_in_slide_then_image_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.png", "b.png", "c.png"] {
        write(dir.path(), &format!("images/{name}"), "img");
    }
    let md = write(
        dir.path(),
        "deck.md",
        &format!(
            "One\n![](images/a.png)\n![](images/b.png){}Two\n![](images/c.png)",
            page_break(1)
        ),
    );
    let annotator = RecordingAnnotator::default();

    enrich(&md, Some(&annotator)).await.unwrap();

    let images = dir.path().join("images");
    assert_eq!(
        *annotator.described.lock().unwrap(),
        vec![images.join("a.png"), images.join("b.png"), images.join("c.png")]
    );
    assert_eq!(*annotator.describe_calls.lock().unwrap(), 1);
    assert_eq!(*annotator.summarized.lock().unwrap(), vec!["One", "Two"]);
}

#[tokio::test]
async fn empty_slides_are_not_summarized_and_no_images_means_no_batch() {
    let dir = tempfile::tempdir().unwrap();
    let md = write(dir.path(), "deck.md", &format!("# Only a heading{}Body", page_break(1)));
    let annotator = RecordingAnnotator::default();

    let doc = read_metadata(&enrich(&md, Some(&annotator)).await.unwrap())
        .await
        .unwrap();

    assert_eq!(*annotator.summarized.lock().unwrap(), vec!["Body"]);
    assert_eq!(*annotator.describe_calls.lock().unwrap(), 0);
    assert_eq!(doc.slides()[0].summary, Annotation::Pending);
    assert_eq!(doc.slides()[1].summary.as_str(), "Summary of 4 chars.");
}

#[tokio::test]
async fn missing_image_keeps_empty_description() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "images/here.png", "img");
    let md = write(
        dir.path(),
        "deck.md",
        "Slide\n![](images/here.png)\n![](images/gone.png)",
    );
    let annotator = RecordingAnnotator::default();

    let doc = read_metadata(&enrich(&md, Some(&annotator)).await.unwrap())
        .await
        .unwrap();

    let images = &doc.slides()[0].images;
    assert_eq!(images[0].description.as_str(), "Image here.png.");
    assert_eq!(images[1].description.as_str(), "");
    assert_eq!(doc.slides()[0].summary.as_str(), "Summary of 5 chars.");
}

#[tokio::test]
async fn enrichment_is_idempotent_with_fixed_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "images/a.png", "img");
    let md = write(
        dir.path(),
        "deck.md",
        &format!("Überblick – Ziele\n![](images/a.png){}Nächste Schritte", page_break(1)),
    );
    let enricher = MetadataEnricher::new().with_generated_at(fixed_ts());

    let path = enricher
        .enrich(&md, Some(&RecordingAnnotator::default()))
        .await
        .unwrap();
    let first = std::fs::read(&path).unwrap();
    enricher
        .enrich(&md, Some(&RecordingAnnotator::default()))
        .await
        .unwrap();
    let second = std::fs::read(&path).unwrap();

    assert_eq!(first, second);
    let text = String::from_utf8(first).unwrap();
    assert!(text.contains("\"parsed_at\": \"2025-03-14T09:26:53.589793\""));
    assert!(text.contains("Überblick – Ziele"), "non-ASCII must be written literally");
    assert!(!text.ends_with('\n'));
}

/// Annotator that reads the metadata file while enrichment is in progress.
struct PeekingAnnotator {
    metadata_path: PathBuf,
    seen_during_run: Mutex<Option<String>>,
}

#[async_trait]
impl Annotator for PeekingAnnotator {
    async fn summarize(&self, _text: &str) -> Annotation {
        let on_disk = std::fs::read_to_string(&self.metadata_path).ok();
        *self.seen_during_run.lock().unwrap() = on_disk;
        Annotation::Generated("Later.".into())
    }

    async fn describe_images(&self, _paths: &[PathBuf]) -> HashMap<PathBuf, Annotation> {
        HashMap::new()
    }
}

#[tokio::test]
async fn unenriched_metadata_is_on_disk_before_enrichment() {
    let dir = tempfile::tempdir().unwrap();
    let md = write(dir.path(), "deck.md", "Some slide text");
    let annotator = PeekingAnnotator {
        metadata_path: dir.path().join("deck_metadata.json"),
        seen_during_run: Mutex::new(None),
    };

    enrich(&md, Some(&annotator)).await.unwrap();

    let seen = annotator
        .seen_during_run
        .lock()
        .unwrap()
        .clone()
        .expect("metadata file should exist during enrichment");
    assert!(seen.contains("\"desc_summary\": \"\""));
    let final_doc = read_metadata(&dir.path().join("deck_metadata.json"))
        .await
        .unwrap();
    assert_eq!(final_doc.slides()[0].summary.as_str(), "Later.");
}

// ── Through the LLM annotator ────────────────────────────────────────────────

/// Backend that fails for one specific image payload.
struct FailOnImage {
    poison: String,
}

#[async_trait]
impl InferenceBackend for FailOnImage {
    fn describe(&self) -> String {
        "fail-on-image".into()
    }

    async fn generate(&self, request: InferenceRequest<'_>) -> Result<String, AnnotationError> {
        match request.image {
            Some(image) if image.data == self.poison => {
                Err(AnnotationError::HttpStatus {
                    status: 500,
                    body: "model crashed".into(),
                })
            }
            Some(_) => Ok("```\nA labelled diagram.\n```".into()),
            None => Ok("Sure! Here is a one-sentence summary: The slide sets goals.".into()),
        }
    }
}

#[tokio::test]
async fn one_failed_image_leaves_the_others_described() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "images/one.png", "one");
    write(dir.path(), "images/two.png", "two");
    write(dir.path(), "images/three.png", "three");
    let md = write(
        dir.path(),
        "deck.md",
        &format!(
            "Goals\n![](images/one.png)\n![](images/two.png){}![](images/three.png)",
            page_break(1)
        ),
    );
    let annotator = LlmAnnotator::new(Arc::new(FailOnImage {
        poison: STANDARD.encode("two"),
    }));

    let doc = read_metadata(&enrich(&md, Some(&annotator)).await.unwrap())
        .await
        .unwrap();

    let slides = doc.slides();
    assert_eq!(slides[0].summary.as_str(), "The slide sets goals.");
    assert_eq!(slides[0].images[0].description.as_str(), "A labelled diagram.");
    assert_eq!(slides[0].images[1].description.as_str(), "");
    assert_eq!(slides[1].images[0].description.as_str(), "A labelled diagram.");
    assert_eq!(slides[1].summary, Annotation::Pending);
}
