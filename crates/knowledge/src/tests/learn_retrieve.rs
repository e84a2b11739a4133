//! End-to-end learn and retrieve against a temporary workspace.

use super::fixtures::minimal_pdf;
use crate::{clean, config, learn, stats, KnowledgeBase, LearnOptions};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_corpus(dir: &Path) {
    let docs = dir.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("license.md"),
        "# 駕照\n\n大型重型機車駕照更換規定：駕照有效期間屆滿前應辦理換照。",
    )
    .unwrap();
    fs::write(
        docs.join("freeway.txt"),
        "大型重型機車行駛高速公路時，應遵守最低速限與車道規定。",
    )
    .unwrap();
    fs::write(docs.join("notes.tmp"), "臨時筆記").unwrap();
}

fn options(workspace: &Path) -> LearnOptions {
    LearnOptions {
        base_name: "motorcycle".to_string(),
        paths: vec![workspace.join("docs")],
        exclude: vec![".tmp".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_learn_then_retrieve_ranks_matching_source_first() {
    let temp = TempDir::new().unwrap();
    write_corpus(temp.path());

    let learned = learn(temp.path(), options(temp.path())).await.unwrap();
    assert_eq!(learned.sources_count, 2);
    assert_eq!(learned.failed_count, 0);
    assert!(learned.chunks_count >= 2);

    let kb = KnowledgeBase::open(temp.path(), "motorcycle", 4).unwrap();
    let hits = kb.retrieve("駕照更換規定?").await.unwrap();

    assert!(!hits.is_empty());
    assert!(hits[0].chunk.text.contains("駕照更換規定"));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_relearn_skips_unchanged_and_replaces_changed() {
    let temp = TempDir::new().unwrap();
    write_corpus(temp.path());

    learn(temp.path(), options(temp.path())).await.unwrap();

    fs::write(
        temp.path().join("docs/freeway.txt"),
        "高速公路路肩禁止機車行駛。",
    )
    .unwrap();
    let second = learn(temp.path(), options(temp.path())).await.unwrap();

    assert_eq!(second.unchanged_count, 1);
    assert_eq!(second.sources_count, 1);

    let base = stats(temp.path(), "motorcycle").unwrap();
    assert_eq!(base.sources_count, 2);
    assert_eq!(base.embedding.as_deref(), Some("trigram/trigram-v1/384"));
    assert!(base.last_learn_at.is_some());
}

#[tokio::test]
async fn test_learn_from_pdf_source() {
    let temp = TempDir::new().unwrap();
    let pdf = temp.path().join("helmet-rules.pdf");
    fs::write(&pdf, minimal_pdf("Riders must wear a certified helmet")).unwrap();

    let learned = learn(
        temp.path(),
        LearnOptions {
            base_name: "motorcycle".to_string(),
            paths: vec![pdf],
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(learned.sources_count, 1);
    assert_eq!(learned.failed_count, 0);
    assert!(learned.chunks_count >= 1);

    let kb = KnowledgeBase::open(temp.path(), "motorcycle", 4).unwrap();
    let hits = kb.retrieve("certified helmet").await.unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0].chunk.text.contains("helmet"));
}

#[tokio::test]
async fn test_embedding_change_requires_reset() {
    let temp = TempDir::new().unwrap();
    write_corpus(temp.path());
    learn(temp.path(), options(temp.path())).await.unwrap();

    let mut kb_config = config::load_config(temp.path(), "motorcycle").unwrap();
    kb_config.embedding.dimensions = 128;
    config::save_config(temp.path(), &kb_config).unwrap();

    assert!(KnowledgeBase::open(temp.path(), "motorcycle", 4).is_err());
    assert!(learn(temp.path(), options(temp.path())).await.is_err());

    let mut reset = options(temp.path());
    reset.reset = true;
    let rebuilt = learn(temp.path(), reset).await.unwrap();
    assert_eq!(rebuilt.sources_count, 2);
    assert!(KnowledgeBase::open(temp.path(), "motorcycle", 4).is_ok());
}

#[tokio::test]
async fn test_clean_and_missing_base() {
    let temp = TempDir::new().unwrap();
    write_corpus(temp.path());

    assert!(KnowledgeBase::open(temp.path(), "motorcycle", 4).is_err());
    assert!(stats(temp.path(), "motorcycle").is_err());
    assert!(clean(temp.path(), "motorcycle").is_err());

    learn(temp.path(), options(temp.path())).await.unwrap();
    clean(temp.path(), "motorcycle").unwrap();

    let base = stats(temp.path(), "motorcycle").unwrap();
    assert_eq!(base.chunks_count, 0);

    let kb = KnowledgeBase::open(temp.path(), "motorcycle", 4).unwrap();
    assert!(kb.retrieve("駕照").await.unwrap().is_empty());
}
