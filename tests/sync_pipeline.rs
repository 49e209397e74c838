//! End-to-end runs of `sync::run` with the built-in backend and the JSON
//! metadata store.
//!
//! Run with: cargo test --test sync_pipeline

use image::{ImageEncoder, RgbImage};
use lowres_sync::cancel::CancelToken;
use lowres_sync::config::SyncConfig;
use lowres_sync::store::{JsonPhotoStore, PhotoStore};
use lowres_sync::sync;
use lowres_sync::types::{ExistingFileAction, FolderStatus};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MAX_LONG_SIDE: u32 = 100;

fn write_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    });
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut bytes)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

struct Trees {
    src: TempDir,
    dst: TempDir,
}

impl Trees {
    fn new() -> Self {
        Self {
            src: TempDir::new().unwrap(),
            dst: TempDir::new().unwrap(),
        }
    }

    fn source(&self, rel: &str) -> std::path::PathBuf {
        self.src.path().join(rel)
    }

    fn target(&self, rel: &str) -> std::path::PathBuf {
        self.dst.path().join(rel)
    }

    fn config(&self) -> SyncConfig {
        let mut config = SyncConfig {
            source: self.src.path().to_path_buf(),
            target: self.dst.path().to_path_buf(),
            ..SyncConfig::default()
        };
        config.resize.max_long_side = MAX_LONG_SIDE;
        config.processing.max_processes = Some(2);
        config
    }
}

#[test]
fn small_images_are_copied_and_large_ones_resized() {
    let t = Trees::new();
    write_jpeg(&t.source("A/small.jpg"), 50, 50);
    write_jpeg(&t.source("A/large.jpg"), 400, 300);

    let report = sync::run(&t.config(), &CancelToken::new(), None).unwrap();

    assert!(!report.cancelled);
    let a = report.folder(&t.source("A")).unwrap();
    assert_eq!(a.progress.status, FolderStatus::Done);
    assert_eq!(a.progress.total_count, 2);
    assert_eq!(a.progress.copied_count, 2);
    assert_eq!(a.progress.failed_count, 0);

    assert_eq!(
        fs::read(t.target("A/small.jpg")).unwrap(),
        fs::read(t.source("A/small.jpg")).unwrap()
    );
    let (w, h) = image::image_dimensions(t.target("A/large.jpg")).unwrap();
    assert_eq!(w.max(h), MAX_LONG_SIDE);
    assert_eq!((w, h), (100, 75));
}

#[test]
fn metadata_store_is_written_to_target_root() {
    let t = Trees::new();
    write_jpeg(&t.source("2024/a.jpg"), 40, 30);
    write_jpeg(&t.source("2024/b.jpg"), 30, 40);

    let report = sync::run(&t.config(), &CancelToken::new(), None).unwrap();
    assert_eq!(report.totals.metadata, 2);
    assert_eq!(report.store_count, 2);

    let store = JsonPhotoStore::open(t.target("photo-metadata.json"));
    assert_eq!(store.count(), 2);
    let key = t.source("2024/a.jpg").to_string_lossy().into_owned();
    let record = store.find(&key).unwrap();
    assert_eq!((record.width, record.height), (40, 30));
    assert_eq!(record.name, "a.jpg");
}

#[test]
fn second_run_is_idempotent() {
    let t = Trees::new();
    write_jpeg(&t.source("A/1.jpg"), 50, 40);
    write_jpeg(&t.source("A/B/2.jpg"), 300, 200);
    let config = t.config();

    let first = sync::run(&config, &CancelToken::new(), None).unwrap();
    assert_eq!(first.totals.copied, 2);
    let resized = fs::read(t.target("A/B/2.jpg")).unwrap();

    let second = sync::run(&config, &CancelToken::new(), None).unwrap();
    assert_eq!(second.engine.dispatched, 0);
    assert_eq!(second.totals.copied, 0);
    assert_eq!(second.totals.metadata, 0);
    assert_eq!(second.totals.skipped, 2);
    assert_eq!(second.totals.deleted_files, 0);
    assert_eq!(fs::read(t.target("A/B/2.jpg")).unwrap(), resized);
    assert!(
        second
            .folders
            .iter()
            .all(|f| f.progress.status == FolderStatus::Done)
    );
}

#[test]
fn orphans_are_pruned_but_store_survives() {
    let t = Trees::new();
    write_jpeg(&t.source("A/1.jpg"), 20, 20);
    fs::create_dir_all(t.source("Empty/Deeper")).unwrap();
    let config = t.config();
    sync::run(&config, &CancelToken::new(), None).unwrap();

    // Stale target entries: a removed photo, a removed folder, and a mirror
    // under a source folder that has no images
    write_jpeg(&t.target("A/gone.jpg"), 10, 10);
    write_jpeg(&t.target("Removed/x.jpg"), 10, 10);
    write_jpeg(&t.target("Empty/stale.jpg"), 10, 10);
    fs::write(t.target("stray.txt"), "x").unwrap();

    let report = sync::run(&config, &CancelToken::new(), None).unwrap();

    assert!(t.target("A/1.jpg").exists());
    assert!(!t.target("A/gone.jpg").exists());
    assert!(!t.target("Removed").exists());
    assert!(!t.target("Empty/stale.jpg").exists());
    assert!(!t.target("stray.txt").exists());
    assert!(t.target("photo-metadata.json").exists());
    assert!(report.totals.deleted_files >= 3);
    assert!(report.totals.deleted_folders >= 1);
}

#[test]
fn overwrite_if_lower_resolution_upgrades_small_targets() {
    let t = Trees::new();
    write_jpeg(&t.source("A/big.jpg"), 400, 200);
    write_jpeg(&t.target("A/big.jpg"), 40, 20);
    let mut config = t.config();
    config.sync.existing_files = ExistingFileAction::OverwriteIfLowerResolution;
    config.metadata.enabled = false;

    let report = sync::run(&config, &CancelToken::new(), None).unwrap();

    assert_eq!(report.totals.copied, 1);
    assert_eq!(
        image::image_dimensions(t.target("A/big.jpg")).unwrap(),
        (100, 50)
    );
}

#[test]
fn cancelled_run_leaves_no_working_folders() {
    let t = Trees::new();
    for i in 0..5 {
        write_jpeg(&t.source(&format!("F{i}/x.jpg")), 30, 30);
    }
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = sync::run(&t.config(), &cancel, None).unwrap();

    assert!(report.cancelled);
    assert!(
        report
            .folders
            .iter()
            .all(|f| f.progress.status != FolderStatus::Working)
    );
    assert_eq!(report.engine.dispatched, 0);
}

#[test]
fn unreadable_image_is_counted_as_failed() {
    let t = Trees::new();
    write_jpeg(&t.source("A/good.jpg"), 20, 20);
    fs::write(t.source("A/broken.jpg"), b"not a jpeg").unwrap();

    let report = sync::run(&t.config(), &CancelToken::new(), None).unwrap();

    let a = report.folder(&t.source("A")).unwrap();
    assert_eq!(a.progress.status, FolderStatus::Done);
    assert_eq!(a.progress.failed_count, 1);
    assert_eq!(a.progress.copied_count, 1);
    assert_eq!(a.progress.skipped_count, 1);
    assert!(!t.target("A/broken.jpg").exists());
}
