//! End-to-end tests over a real temporary vault: scan, renumber,
//! cross-file propagation, and rename round-trips.

use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use citator::config::Settings;
use citator::engine::Engine;
use citator::rename::{ConflictPolicy, RenameOptions};
use citator::store::FsStore;

fn vault() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    // Non-hidden subdirectory so WalkDir's hidden filter keeps the files.
    let vault_dir = temp_dir.path().join("vault");
    fs::create_dir(&vault_dir).expect("Failed to create vault subdirectory");
    (temp_dir, vault_dir)
}

fn engine(root: &Path) -> Engine<FsStore> {
    Engine::new(Settings::default(), FsStore::new(root))
}

#[tokio::test]
async fn renumber_file_rewrites_tags_and_citations_vault_wide() {
    let (_temp_dir, root) = vault();
    let defs = root.join("defs.md");
    let cite = root.join("cite.md");
    fs::write(
        &defs,
        "# A\n$$ x \\tag{old1} $$\n## B\n$$ y \\tag{old2} $$\n",
    )
    .unwrap();
    fs::write(&cite, "see $\\ref{eq:old1, old2}$ for details\n").unwrap();

    let engine = engine(&root);
    engine.scan_vault().await;
    let outcome = engine.renumber_file(&defs).await.unwrap();

    let new_tags: Vec<&str> = outcome.changes.iter().map(|c| c.new.as_str()).collect();
    assert_eq!(new_tags, vec!["1.1", "1.1.1"]);
    assert_eq!(
        fs::read_to_string(&defs).unwrap(),
        "# A\n$$ x \\tag{1.1} $$\n## B\n$$ y \\tag{1.1.1} $$\n"
    );
    assert_eq!(
        fs::read_to_string(&cite).unwrap(),
        "see $\\ref{eq:1.1, 1.1.1}$ for details\n"
    );
}

/// Renaming A→B then B→A restores every touched file byte-for-byte.
#[tokio::test]
async fn rename_round_trip_restores_original_bytes() {
    let (_temp_dir, root) = vault();
    let defs = root.join("defs.md");
    let cite = root.join("cite.md");
    let defs_text = "# H\n$$ x \\tag{1.1} $$\n";
    let cite_text = "as $\\ref{eq:1.1,  2.1}$ shows\n";
    fs::write(&defs, defs_text).unwrap();
    fs::write(&cite, cite_text).unwrap();

    let engine = engine(&root);
    let forward = [("1.1".to_string(), "9.9".to_string())];
    let backward = [("9.9".to_string(), "1.1".to_string())];

    engine.scan_vault().await;
    let result = engine
        .rename_tags(&defs, &forward, RenameOptions::default())
        .await
        .unwrap();
    assert_eq!(result.total_files_changed, 2);
    assert!(fs::read_to_string(&cite).unwrap().contains("eq:9.9"));

    engine.scan_vault().await;
    engine
        .rename_tags(&defs, &backward, RenameOptions::default())
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(&defs).unwrap(), defs_text);
    assert_eq!(fs::read_to_string(&cite).unwrap(), cite_text);
}

#[tokio::test]
async fn rename_aborts_on_conflicting_citation() {
    let (_temp_dir, root) = vault();
    let defs = root.join("defs.md");
    let other = root.join("other.md");
    fs::write(&defs, "$$ x \\tag{1.1} $$\n").unwrap();
    fs::write(&other, "already cited: $\\ref{eq:2.2}$\n").unwrap();

    let engine = engine(&root);
    engine.scan_vault().await;
    let options = RenameOptions {
        conflict_policy: ConflictPolicy::Abort,
        ..Default::default()
    };
    let err = engine
        .rename_tags(&defs, &[("1.1".to_string(), "2.2".to_string())], options)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("2.2"));
    // Nothing was written.
    assert_eq!(fs::read_to_string(&defs).unwrap(), "$$ x \\tag{1.1} $$\n");
}

#[tokio::test]
async fn rename_deletes_conflicting_citations_when_asked() {
    let (_temp_dir, root) = vault();
    let defs = root.join("defs.md");
    let other = root.join("other.md");
    fs::write(&defs, "$$ x \\tag{1.1} $$\n").unwrap();
    fs::write(&other, "old use $\\ref{eq:2.2}$ gone\n").unwrap();

    let engine = engine(&root);
    engine.scan_vault().await;
    let options = RenameOptions {
        conflict_policy: ConflictPolicy::Delete,
        ..Default::default()
    };
    engine
        .rename_tags(&defs, &[("1.1".to_string(), "2.2".to_string())], options)
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(&defs).unwrap(), "$$ x \\tag{2.2} $$\n");
    assert_eq!(fs::read_to_string(&other).unwrap(), "old use $$ gone\n");
}

#[tokio::test]
async fn invalidated_entries_reflect_disk_changes() {
    let (_temp_dir, root) = vault();
    let path = root.join("doc.md");
    fs::write(&path, "$$ a \\tag{1} $$").unwrap();

    let engine = engine(&root);
    assert_eq!(engine.equations(&path).await.len(), 1);

    fs::write(&path, "$$ a \\tag{1} $$\n$$ b \\tag{2} $$").unwrap();
    // Still within the freshness window: the cached parse is served.
    assert_eq!(engine.equations(&path).await.len(), 1);

    engine.invalidate(&path);
    assert_eq!(engine.equations(&path).await.len(), 2);
}

#[tokio::test]
async fn cross_file_range_citation_resolves_into_target() {
    let (_temp_dir, root) = vault();
    let citing = root.join("citing.md");
    fs::write(&citing, "[^2]: [[chapter]]\n").unwrap();
    fs::write(
        root.join("chapter.md"),
        "# C\n$$ a \\tag{1.1} $$\n$$ b \\tag{1.2} $$\n",
    )
    .unwrap();

    let engine = engine(&root);
    let resolved = engine
        .resolve_citations(&["2^1.1~2".to_string()], &citing)
        .await;
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0].tag, "2^1.1");
    assert_eq!(resolved[1].tag, "2^1.2");
    assert!(resolved[0].path.ends_with("chapter.md"));
}

#[tokio::test]
async fn preview_does_not_touch_storage() {
    let (_temp_dir, root) = vault();
    let path = root.join("doc.md");
    let text = "# H\n$$ x $$\n";
    fs::write(&path, text).unwrap();

    let engine = engine(&root);
    let outcome = engine.auto_number_preview(text).unwrap();
    assert_eq!(outcome.text, "# H\n$$ x \\tag{1.1} $$\n");
    assert_eq!(fs::read_to_string(&path).unwrap(), text);
}
