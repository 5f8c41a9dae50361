//! Canonicalization pass tests against a real temporary directory tree.

mod common;

use common::{ProjectFixture, seeded_bytes};
use fieldsync_core::hierarchy::Hierarchy;
use fieldsync_core::manifest::Manifest;

#[tokio::test]
async fn test_numbers_all_levels_in_upload_order() {
    let fx = ProjectFixture::new().await;
    let a = seeded_bytes(1, 100);
    let b = seeded_bytes(2, 200);
    let c = seeded_bytes(3, 300);
    fx.put_photo(&Hierarchy::Project, "a.jpg", &a, 1).await;
    fx.put_photo(&ProjectFixture::vehicle("V1"), "b.jpg", &b, 2).await;
    fx.put_photo(&ProjectFixture::track("V1", "T1"), "c.png", &c, 3).await;

    let outcome = fx.canonicalize().await;

    assert_eq!(outcome.summary.image_count, 3);
    assert_eq!(outcome.summary.first_index, Some(11));
    assert_eq!(outcome.summary.last_index, Some(13));
    assert_eq!(outcome.summary.skipped, 0);
    assert_eq!(fx.unified_names().await, vec!["11.jpg", "12.jpg", "13.png"]);
    assert_eq!(fx.read_unified("11.jpg").await, a);
    assert_eq!(fx.read_unified("12.jpg").await, b);
    assert_eq!(fx.read_unified("13.png").await, c);

    assert_eq!(
        fx.manifest_text().await,
        "11\tP_a.jpg\t11.jpg\n12\tV_V1_b.jpg\t12.jpg\n13\tT_V1_T1_c.png\t13.png\n"
    );

    let grouped = &outcome.grouped;
    assert_eq!(grouped.total, 3);
    assert_eq!(grouped.project[0].canonical_name, "11.jpg");
    assert_eq!(grouped.vehicles["V1"].images[0].canonical_name, "12.jpg");
    assert_eq!(grouped.vehicles["V1"].tracks["T1"][0].canonical_name, "13.png");
    let json = fx
        .backend
        .read_to_string(&fx.layout.manifest_path(&fx.config.grouped_manifest_file))
        .await
        .unwrap()
        .unwrap();
    assert!(json.contains("T_V1_T1_c.png"));
}

#[tokio::test]
async fn test_source_directories_are_untouched() {
    let fx = ProjectFixture::new().await;
    let path = fx
        .put_photo(&ProjectFixture::vehicle("V1"), "b.jpg", &seeded_bytes(2, 64), 1)
        .await;

    fx.canonicalize().await;

    assert!(path.exists());
    assert_eq!(fx.unified_names().await, vec!["11.jpg"]);
}

#[tokio::test]
async fn test_rerun_is_stable() {
    let fx = ProjectFixture::new().await;
    fx.put_photo(&Hierarchy::Project, "a.jpg", &seeded_bytes(1, 100), 1)
        .await;
    fx.put_photo(&ProjectFixture::vehicle("V1"), "b.jpg", &seeded_bytes(2, 100), 2)
        .await;

    let first = fx.canonicalize().await;
    let second = fx.canonicalize().await;

    assert_eq!(first.manifest, second.manifest);
    assert_eq!(fx.unified_names().await, vec!["11.jpg", "12.jpg"]);
    assert_eq!(fx.read_unified("12.jpg").await, seeded_bytes(2, 100));
}

#[tokio::test]
async fn test_later_uploads_append() {
    let fx = ProjectFixture::new().await;
    fx.put_photo(&ProjectFixture::vehicle("V1"), "b.jpg", &seeded_bytes(2, 100), 1)
        .await;
    fx.canonicalize().await;

    fx.put_photo(&Hierarchy::Project, "a.jpg", &seeded_bytes(1, 100), 2)
        .await;
    let outcome = fx.canonicalize().await;

    let names: Vec<_> = outcome
        .manifest
        .entries
        .iter()
        .map(|e| (e.index, e.original_name.as_str()))
        .collect();
    assert_eq!(names, vec![(11, "V_V1_b.jpg"), (12, "P_a.jpg")]);
}

#[tokio::test]
async fn test_replaced_source_of_same_size_is_recopied() {
    let fx = ProjectFixture::new().await;
    let old = seeded_bytes(1, 100);
    let new = seeded_bytes(2, 100);
    fx.put_photo(&Hierarchy::Project, "a.bmp", &old, 1).await;
    fx.canonicalize().await;
    assert_eq!(fx.read_unified("11.bmp").await, old);

    // Same name, size and mtime; only the bytes differ.
    fx.put_photo(&Hierarchy::Project, "a.bmp", &new, 1).await;
    let outcome = fx.canonicalize().await;

    assert_eq!(outcome.summary.image_count, 1);
    assert_eq!(fx.unified_names().await, vec!["11.bmp"]);
    assert_eq!(fx.read_unified("11.bmp").await, new);
}

#[tokio::test]
async fn test_stale_unified_files_are_purged() {
    let fx = ProjectFixture::new().await;
    fx.put_photo(&Hierarchy::Project, "a.jpg", &seeded_bytes(1, 100), 1)
        .await;
    let unified = fx.layout.unified_dir();
    for junk in ["P_old.jpg", "99.jpg", "11.png", "notes.txt"] {
        fx.backend
            .write_atomic(&unified.join(junk), b"junk")
            .await
            .unwrap();
    }

    fx.canonicalize().await;

    assert_eq!(fx.unified_names().await, vec!["11.jpg"]);
}

#[tokio::test]
async fn test_removed_source_renumbers_without_gaps() {
    let fx = ProjectFixture::new().await;
    let a = fx
        .put_photo(&Hierarchy::Project, "a.jpg", &seeded_bytes(1, 100), 1)
        .await;
    fx.put_photo(&Hierarchy::Project, "b.jpg", &seeded_bytes(2, 150), 2)
        .await;
    fx.put_photo(&Hierarchy::Project, "c.jpg", &seeded_bytes(3, 200), 3)
        .await;
    fx.canonicalize().await;

    tokio::fs::remove_file(&a).await.unwrap();
    let outcome = fx.canonicalize().await;

    assert_eq!(outcome.manifest.first_index(), Some(11));
    assert_eq!(outcome.manifest.last_index(), Some(12));
    assert!(outcome.manifest.validate().is_ok());
    assert_eq!(fx.unified_names().await, vec!["11.jpg", "12.jpg"]);
    assert_eq!(fx.read_unified("11.jpg").await, seeded_bytes(2, 150));
    assert_eq!(fx.read_unified("12.jpg").await, seeded_bytes(3, 200));
}

#[tokio::test]
async fn test_same_name_at_different_levels_is_kept_twice() {
    let fx = ProjectFixture::new().await;
    fx.put_photo(&Hierarchy::Project, "img.jpg", &seeded_bytes(1, 10), 1)
        .await;
    fx.put_photo(&ProjectFixture::vehicle("V1"), "img.jpg", &seeded_bytes(2, 10), 2)
        .await;
    fx.put_photo(&ProjectFixture::vehicle("V2"), "img.jpg", &seeded_bytes(3, 10), 3)
        .await;

    let outcome = fx.canonicalize().await;

    assert_eq!(outcome.manifest.len(), 3);
    assert_eq!(outcome.grouped.vehicles.len(), 2);
}

#[tokio::test]
async fn test_extension_is_lowercased() {
    let fx = ProjectFixture::new().await;
    fx.put_photo(&Hierarchy::Project, "A.JPG", &seeded_bytes(1, 10), 1)
        .await;

    let outcome = fx.canonicalize().await;

    assert_eq!(outcome.manifest.entries[0].original_name, "P_A.JPG");
    assert_eq!(fx.unified_names().await, vec!["11.jpg"]);
}

#[tokio::test]
async fn test_configurable_start_index() {
    let mut fx = ProjectFixture::new().await;
    fx.config.start_index = 1;
    fx.put_photo(&Hierarchy::Project, "a.jpg", &seeded_bytes(1, 10), 1)
        .await;
    fx.put_photo(&Hierarchy::Project, "b.jpg", &seeded_bytes(2, 10), 2)
        .await;

    fx.canonicalize().await;

    assert_eq!(fx.unified_names().await, vec!["1.jpg", "2.jpg"]);
}

#[tokio::test]
async fn test_empty_project() {
    let fx = ProjectFixture::new().await;

    let outcome = fx.canonicalize().await;

    assert!(outcome.manifest.is_empty());
    assert_eq!(outcome.summary.first_index, None);
    assert!(fx.layout.unified_dir().is_dir());
    assert_eq!(fx.manifest_text().await, "");
}

#[tokio::test]
async fn test_invalid_previous_manifest_is_ignored() {
    let fx = ProjectFixture::new().await;
    fx.put_photo(&Hierarchy::Project, "a.jpg", &seeded_bytes(1, 10), 1)
        .await;
    fx.backend
        .write_atomic(
            &fx.layout.manifest_path(&fx.config.manifest_file),
            b"garbage without tabs\n",
        )
        .await
        .unwrap();

    fx.canonicalize().await;

    let manifest = Manifest::parse_text(&fx.manifest_text().await).unwrap();
    assert_eq!(manifest.len(), 1);
    assert_eq!(fx.read_unified("11.jpg").await, seeded_bytes(1, 10));
}

#[tokio::test]
async fn test_manifest_files_are_not_images() {
    let fx = ProjectFixture::new().await;
    fx.put_photo(&Hierarchy::Project, "a.jpg", &seeded_bytes(1, 10), 1)
        .await;

    fx.canonicalize().await;
    let outcome = fx.canonicalize().await;

    assert_eq!(outcome.manifest.len(), 1);
}
