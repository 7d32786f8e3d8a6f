//! Tests for batched path resolution against a fake drive tree.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{
    account, detail_batches, file_item, folder_details, folder_id, folder_item, json_response,
    FakeDrive, MockTransport, DRIVEWS, ROOT,
};
use icloud_drive::cache::CacheEntity;
use icloud_drive::config::WEB_ORIGIN;
use icloud_drive::middleware::MiddlewareStack;
use icloud_drive::{
    Cache, DriveApi, DriveError, DriveState, Drivewsid, PathResolver, PathValidation,
    ResolveError, RetryPolicy, RootKind, Session,
};

const FILE_ID: &str = "FILE::com.apple.CloudDocs::F";

fn setup(drive: &FakeDrive) -> (Arc<MockTransport>, DriveApi) {
    let transport = MockTransport::new();
    drive.install(&transport);
    let api = DriveApi::with_stack(
        transport.clone(),
        MiddlewareStack::new(),
        RetryPolicy::none(),
        WEB_ORIGIN,
    );
    (transport, api)
}

fn state() -> DriveState {
    DriveState::new(Session::new("me@example.com", "secret"), account(DRIVEWS))
}

async fn resolve(
    api: &DriveApi,
    cache: &mut Cache,
    root: RootKind,
    paths: &[&str],
) -> Vec<PathValidation> {
    let (_, results) = PathResolver::new(api)
        .resolve_paths(state(), cache, root, paths)
        .await
        .unwrap();
    results
}

/// Cache populated by one cold resolution of `/A/B/file.txt`.
async fn warm_cache(drive: &FakeDrive) -> Cache {
    let (_, api) = setup(drive);
    let mut cache = Cache::new();
    resolve(&api, &mut cache, RootKind::Drive, &["/A/B/file.txt"]).await;
    cache
}

mod cold_cache {
    use super::*;

    #[tokio::test]
    async fn resolves_one_level_per_call() {
        let drive = FakeDrive::sample();
        let (transport, api) = setup(&drive);
        let mut cache = Cache::new();

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A/B/file.txt"]).await;

        match &results[0] {
            PathValidation::Valid { hierarchy, file } => {
                assert_eq!(hierarchy.len(), 3);
                assert_eq!(hierarchy.path(), "/A/B");
                assert_eq!(file.as_ref().unwrap().drivewsid.as_str(), FILE_ID);
            }
            other => panic!("expected valid, got {:?}", other),
        }
        assert_eq!(
            detail_batches(&transport),
            vec![vec![ROOT.to_string()], vec![folder_id("A")], vec![folder_id("B")]]
        );

        assert!(cache.get_details(&Drivewsid::root()).is_some());
        assert!(cache.get_details(&Drivewsid::from(folder_id("B").as_str())).is_some());
        assert!(matches!(
            cache.get(&Drivewsid::from(FILE_ID)),
            Some(CacheEntity::FileItem { .. })
        ));
    }

    #[tokio::test]
    async fn shared_parent_is_fetched_once() {
        let drive = FakeDrive::sample();
        let (transport, api) = setup(&drive);
        let mut cache = Cache::new();

        let results = resolve(
            &api,
            &mut cache,
            RootKind::Drive,
            &["/A/B/file.txt", "/A/B", "/A"],
        )
        .await;

        assert!(results.iter().all(PathValidation::is_valid));
        let batches = detail_batches(&transport);
        assert_eq!(batches.len(), 3);
        let a_fetches = batches.iter().flatten().filter(|id| **id == folder_id("A")).count();
        let b_fetches = batches.iter().flatten().filter(|id| **id == folder_id("B")).count();
        assert_eq!((a_fetches, b_fetches), (1, 1));
    }

    #[tokio::test]
    async fn resolved_hierarchy_follows_parent_ids() {
        let drive = FakeDrive::default();
        let mut a = folder_details(&folder_id("A"), "A", vec![folder_item("B", "B")]);
        a["parentId"] = json!(ROOT);
        let mut b = folder_details(&folder_id("B"), "B", vec![]);
        b["parentId"] = json!(folder_id("A"));
        drive.put(folder_details(ROOT, "", vec![folder_item("A", "A")]));
        drive.put(a);
        drive.put(b);
        let (_, api) = setup(&drive);
        let mut cache = Cache::new();

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A/B"]).await;

        let hierarchy = results[0].hierarchy();
        assert_eq!(hierarchy.len(), 3);
        assert!(hierarchy.is_linked());
        let chain: Vec<_> = hierarchy.details().iter().map(|d| d.parent_id.clone()).collect();
        assert_eq!(
            chain,
            vec![
                None,
                Some(Drivewsid::from(ROOT)),
                Some(Drivewsid::from(folder_id("A").as_str()))
            ]
        );
    }

    #[tokio::test]
    async fn mismatched_child_does_not_fail_resolution() {
        let drive = FakeDrive::sample();
        drive.put(folder_details(
            ROOT,
            "",
            vec![
                folder_item("A", "A"),
                json!({
                    "type": "FOLDER", "drivewsid": "FILE::com.apple.CloudDocs::X",
                    "docwsid": "X", "zone": "com.apple.CloudDocs", "name": "odd"
                }),
            ],
        ));
        let (_, api) = setup(&drive);
        let mut cache = Cache::new();

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A/B/file.txt"]).await;

        assert!(results[0].is_valid());
        assert!(cache.get(&Drivewsid::from("FILE::com.apple.CloudDocs::X")).is_none());
        assert!(cache.get_details(&Drivewsid::root()).is_some());
    }

    #[tokio::test]
    async fn root_path_is_the_root() {
        let drive = FakeDrive::sample();
        let (_, api) = setup(&drive);
        let mut cache = Cache::new();

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/", ""]).await;
        for result in results {
            assert_eq!(result.target(), Some(&Drivewsid::root()));
            assert_eq!(result.hierarchy().len(), 1);
        }
    }
}

mod warm_cache {
    use super::*;

    #[tokio::test]
    async fn unchanged_tree_needs_only_validation_batch() {
        let drive = FakeDrive::sample();
        let mut cache = warm_cache(&drive).await;
        let (transport, api) = setup(&drive);

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A/B/file.txt"]).await;

        assert_eq!(results[0].target(), Some(&Drivewsid::from(FILE_ID)));
        let batches = detail_batches(&transport);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec![ROOT.to_string(), folder_id("A"), folder_id("B")]);
    }

    #[tokio::test]
    async fn renamed_ancestor_invalidates_cached_chain() {
        let drive = FakeDrive::sample();
        let mut cache = warm_cache(&drive).await;
        drive.put(folder_details(ROOT, "", vec![folder_item("A", "A2")]));
        let (transport, api) = setup(&drive);

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A/B/file.txt"]).await;

        match &results[0] {
            PathValidation::Invalid {
                hierarchy,
                rest,
                reason,
            } => {
                assert_eq!(hierarchy.len(), 1);
                assert_eq!(hierarchy.root().drivewsid, Drivewsid::root());
                assert_eq!(rest, &vec!["A", "B", "file.txt"]);
                assert_eq!(reason, &ResolveError::HierarchyChanged { name: "A".into() });
            }
            other => panic!("expected invalid, got {:?}", other),
        }
        assert_eq!(detail_batches(&transport).len(), 1);

        // The new name resolves through the refreshed cache.
        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A2/B/file.txt"]).await;
        assert_eq!(results[0].target(), Some(&Drivewsid::from(FILE_ID)));
    }

    #[tokio::test]
    async fn removed_folder_is_dropped_from_cache() {
        let drive = FakeDrive::sample();
        let mut cache = warm_cache(&drive).await;
        drive.put(folder_details(&folder_id("A"), "A", vec![]));
        drive.remove(&folder_id("B"));
        let (_, api) = setup(&drive);

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A/B/file.txt"]).await;

        match &results[0] {
            PathValidation::Invalid { hierarchy, rest, reason } => {
                assert_eq!(hierarchy.path(), "/A");
                assert_eq!(rest, &vec!["B", "file.txt"]);
                assert_eq!(reason, &ResolveError::HierarchyChanged { name: "B".into() });
            }
            other => panic!("expected invalid, got {:?}", other),
        }
        assert!(cache.get(&Drivewsid::from(folder_id("B").as_str())).is_none());
    }

    #[tokio::test]
    async fn replaced_file_is_looked_up_by_name() {
        let drive = FakeDrive::sample();
        let mut cache = warm_cache(&drive).await;
        drive.put(folder_details(&folder_id("B"), "B", vec![file_item("F2", "file", "txt")]));
        let (_, api) = setup(&drive);

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A/B/file.txt"]).await;

        assert_eq!(
            results[0].target(),
            Some(&Drivewsid::from("FILE::com.apple.CloudDocs::F2"))
        );
    }

    #[tokio::test]
    async fn file_replaced_by_folder_is_not_found() {
        let drive = FakeDrive::sample();
        let mut cache = warm_cache(&drive).await;
        drive.put(folder_details(&folder_id("B"), "B", vec![folder_item("X", "file.txt")]));
        drive.put(folder_details(&folder_id("X"), "file.txt", vec![]));
        let (transport, api) = setup(&drive);

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A/B/file.txt"]).await;

        match &results[0] {
            PathValidation::Invalid { rest, reason, .. } => {
                assert_eq!(rest, &vec!["file.txt"]);
                assert_eq!(reason, &ResolveError::NotFound { name: "file.txt".into() });
            }
            other => panic!("expected invalid, got {:?}", other),
        }
        assert_eq!(detail_batches(&transport).len(), 1);
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn missing_segment_anchors_at_deepest_folder() {
        let drive = FakeDrive::sample();
        let (_, api) = setup(&drive);
        let mut cache = Cache::new();

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A/missing/deeper"]).await;

        match &results[0] {
            PathValidation::Invalid { hierarchy, rest, reason } => {
                assert_eq!(hierarchy.path(), "/A");
                assert_eq!(rest, &vec!["missing", "deeper"]);
                assert_eq!(reason, &ResolveError::NotFound { name: "missing".into() });
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn file_mid_path_is_not_a_folder() {
        let drive = FakeDrive::sample();
        let (_, api) = setup(&drive);
        let mut cache = Cache::new();

        let results = resolve(&api, &mut cache, RootKind::Drive, &["/A/B/file.txt/x"]).await;

        match &results[0] {
            PathValidation::Invalid { rest, reason, .. } => {
                assert_eq!(rest, &vec!["file.txt", "x"]);
                assert_eq!(reason, &ResolveError::NotAFolder { name: "file.txt".into() });
            }
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn request_failure_leaves_cache_unchanged() {
        let drive = FakeDrive::sample();
        let (transport, api) = setup(&drive);
        transport.reply(
            "/retrieveItemDetailsInFolders",
            json_response(200, json!([folder_details(ROOT, "", vec![folder_item("A", "A")])])),
        );
        transport.push(
            "/retrieveItemDetailsInFolders",
            Err(DriveError::Transport("reset".into())),
        );
        let mut cache = Cache::new();

        let err = PathResolver::new(&api)
            .resolve_paths(state(), &mut cache, RootKind::Drive, &["/A/B"])
            .await
            .unwrap_err();

        assert!(err.is_transport());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn strict_variants_check_target_kind() {
        let drive = FakeDrive::sample();
        let (_, api) = setup(&drive);
        let resolver = PathResolver::new(&api);
        let mut cache = Cache::new();

        let err = resolver
            .resolve_folder(state(), &mut cache, RootKind::Drive, "/A/B/file.txt")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DriveError::Path(ResolveError::NotAFolder { ref name }) if name == "file.txt"
        ));

        let err = resolver
            .resolve_file(state(), &mut cache, RootKind::Drive, "/A/B")
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::Path(ResolveError::NotAFile { .. })));

        let err = resolver
            .resolve_strict(state(), &mut cache, RootKind::Drive, &["/A", "/nope"])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "'nope' was not found");

        let (_, folder) = resolver
            .resolve_folder(state(), &mut cache, RootKind::Drive, "/A")
            .await
            .unwrap();
        assert_eq!(folder.name, "A");
    }
}

mod roots {
    use super::*;

    #[tokio::test]
    async fn trash_paths_resolve_from_trash_root() {
        let drive = FakeDrive::sample();
        drive.put(folder_details(
            "TRASH_ROOT",
            "",
            vec![file_item("OLD", "old", "txt")],
        ));
        let (transport, api) = setup(&drive);
        let mut cache = Cache::new();

        let results = resolve(&api, &mut cache, RootKind::Trash, &["/old.txt"]).await;

        assert_eq!(
            results[0].target(),
            Some(&Drivewsid::from("FILE::com.apple.CloudDocs::OLD"))
        );
        assert_eq!(detail_batches(&transport), vec![vec!["TRASH_ROOT".to_string()]]);
        assert!(matches!(
            cache.get(&Drivewsid::trash_root()),
            Some(CacheEntity::TrashRoot { .. })
        ));
    }

    #[tokio::test]
    async fn path_by_id_joins_hierarchy_names() {
        let drive = FakeDrive::sample();
        let (transport, api) = setup(&drive);
        transport.reply(
            "/retrieveItemDetailsInFolders",
            json_response(
                200,
                json!([
                    folder_details(&folder_id("B"), "B", vec![]),
                    {"drivewsid": folder_id("B"), "hierarchy": [
                        {"drivewsid": ROOT},
                        {"drivewsid": folder_id("A"), "name": "A"}
                    ]}
                ]),
            ),
        );

        let (_, path) = PathResolver::new(&api)
            .path_by_id(state(), &Drivewsid::from(folder_id("B").as_str()))
            .await
            .unwrap();

        assert_eq!(path.as_deref(), Some("/A/B"));
        let body = &transport.bodies("/retrieveItemDetailsInFolders")[0];
        assert_eq!(body[0]["includeHierarchy"], true);
    }
}
