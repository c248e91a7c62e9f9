//! End-to-end integration tests for docmerge.
//!
//! These tests drive a real headless LibreOffice. They are gated behind
//! the `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested; they also skip when no office executable answers.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! Point at a specific binary with `DOCMERGE_OFFICE_PATH=/path/to/soffice`.

use docmerge::backend::office::OfficeSuiteBackend;
use docmerge::{
    assemble_source, AssemblyConfig, AssemblyError, AssemblyProgressCallback, ConversionBackend,
    DocumentSource, NoopProgressCallback,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn office_config() -> AssemblyConfig {
    let mut builder = AssemblyConfig::builder()
        .force_office_suite(true)
        .office_timeout_secs(180);
    if let Ok(path) = std::env::var("DOCMERGE_OFFICE_PATH") {
        builder = builder.office_command(path);
    }
    builder.build().expect("valid config")
}

async fn office_available(config: &AssemblyConfig) -> bool {
    tokio::process::Command::new(config.backends.office_command())
        .arg("--version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Skip this test unless E2E_ENABLED is set and LibreOffice runs.
macro_rules! e2e_skip_unless_ready {
    ($config:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if !office_available(&$config).await {
            println!("SKIP: no LibreOffice found (set DOCMERGE_OFFICE_PATH)");
            return;
        }
    }};
}

/// Write a minimal one-paragraph `.docx`.
fn write_docx(path: &Path, text: &str) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", opts).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#,
    )
    .unwrap();

    zip.start_file("_rels/.rels", opts).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#,
    )
    .unwrap();

    zip.start_file("word/document.xml", opts).unwrap();
    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:body>
</w:document>"#
    );
    zip.write_all(body.as_bytes()).unwrap();
    zip.finish().unwrap();
}

fn page_count(path: &Path) -> usize {
    lopdf::Document::load(path).unwrap().get_pages().len()
}

// ── Office-suite engine ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_office_suite_converts_docx() {
    let config = office_config();
    e2e_skip_unless_ready!(config);

    let dir = TempDir::new().unwrap();
    let src = dir.path().join("стр 1.docx");
    write_docx(&src, "Hello from page one");
    let target = dir.path().join("out/0001.pdf");
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();

    let backend = OfficeSuiteBackend::new(&config.backends);
    backend
        .convert(&src, &target)
        .await
        .expect("LibreOffice conversion should succeed");

    assert!(std::fs::read(&target).unwrap().starts_with(b"%PDF"));
    assert_eq!(page_count(&target), 1);
    // Scratch directories are gone.
    let leftovers: Vec<PathBuf> = std::fs::read_dir(target.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p != &target)
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn test_assemble_folder_in_page_order() {
    let config = office_config();
    e2e_skip_unless_ready!(config);

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir_all(&input).unwrap();
    write_docx(&input.join("стр 2.docx"), "Second");
    write_docx(&input.join("Титульный лист.docx"), "Title");
    write_docx(&input.join("стр 3-4.docx"), "Third");

    let out = dir.path().join("merged.pdf");
    let result = assemble_source(DocumentSource::Folder(input), &out, &config)
        .await
        .expect("assembly should succeed");

    assert!(result.success);
    assert!(result.failed.is_empty(), "{:?}", result.failed);
    assert_eq!(result.total_pages, 3);
    assert_eq!(page_count(&out), 3);

    let order: Vec<_> = result
        .conversions
        .iter()
        .map(|c| c.source.filename.as_str())
        .collect();
    assert_eq!(order, vec!["Титульный лист.docx", "стр 2.docx", "стр 3-4.docx"]);
}

#[tokio::test]
async fn test_assemble_zip_with_one_corrupt_document() {
    let config = office_config();
    e2e_skip_unless_ready!(config);

    let dir = TempDir::new().unwrap();
    let staging = dir.path().join("staging");
    std::fs::create_dir_all(&staging).unwrap();
    write_docx(&staging.join("ok.docx"), "Fine");

    let archive = dir.path().join("batch.zip");
    {
        let file = std::fs::File::create(&archive).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("стр 1.docx", opts).unwrap();
        zip.write_all(&std::fs::read(staging.join("ok.docx")).unwrap())
            .unwrap();
        zip.start_file("стр 2.docx", opts).unwrap();
        zip.write_all(b"definitely not a word file").unwrap();
        zip.finish().unwrap();
    }

    let out = dir.path().join("batch.pdf");
    match assemble_source(DocumentSource::from_path(&archive).unwrap(), &out, &config).await {
        Ok(result) => {
            // Some LibreOffice builds render garbage input as a text page.
            assert!(result.total_pages >= 1);
            assert!(out.is_file());
        }
        Err(e) => panic!("one good document must be enough: {e}"),
    }
}

// ── Offline checks (always run) ──────────────────────────────────────────────

#[tokio::test]
async fn test_nonexistent_source() {
    let err = DocumentSource::from_path("/definitely/not/here.zip").unwrap_err();
    assert!(matches!(err, AssemblyError::SourceNotFound { .. }));
}

#[tokio::test]
async fn test_empty_folder_is_discovery_error() {
    let dir = TempDir::new().unwrap();
    let err = assemble_source(
        DocumentSource::Folder(dir.path().to_path_buf()),
        dir.path().join("x.pdf"),
        &AssemblyConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AssemblyError::NoDocuments { .. }));
}

#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();
    let cb: docmerge::ProgressCallback = Arc::new(NoopProgressCallback);
    std::thread::spawn(move || cb.on_documents_found(1))
        .join()
        .unwrap();
}
