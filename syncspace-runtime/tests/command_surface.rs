//! End-to-end tests over the byte dispatcher
//!
//! Everything goes through `Dispatch(name, bytes)` exactly as a transport
//! would call it, so these cover decoding, handler gating, engine behavior,
//! and response encoding together.

use std::collections::HashMap;
use std::sync::Arc;

use prost::Message;
use tokio_util::sync::CancellationToken;

use syncspace_proto::v1 as pb;
use syncspace_runtime::handlers::events::subscribe;
use syncspace_runtime::{register_all, Backend, CommandError, Dispatcher};

struct TestCtx {
    _tmp: tempfile::TempDir,
    backend: Arc<Backend>,
    dispatcher: Dispatcher,
}

impl TestCtx {
    fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let backend = Backend::new();
        let mut dispatcher = Dispatcher::new();
        register_all(&mut dispatcher, backend.clone());
        Self { _tmp: tmp, backend, dispatcher }
    }

    fn data_dir(&self) -> String {
        self._tmp.path().display().to_string()
    }

    async fn dispatch<Req: Message, Resp: Message + Default>(
        &self,
        command: &str,
        req: Req,
    ) -> Result<Resp, CommandError> {
        let bytes = self
            .dispatcher
            .dispatch(CancellationToken::new(), command, req.encode_to_vec())
            .await?;
        Ok(Resp::decode(bytes.as_slice()).expect("response decodes"))
    }

    async fn init(&self) {
        let resp: pb::InitResponse = self
            .dispatch(
                "Init",
                pb::InitRequest {
                    data_dir: self.data_dir(),
                    network_id: "n".to_string(),
                    device_id: "d".to_string(),
                    config: HashMap::new(),
                },
            )
            .await
            .expect("init succeeds");
        assert!(resp.success);
    }

    async fn create_space(&self, name: &str) -> String {
        let resp: pb::CreateSpaceResponse = self
            .dispatch(
                "CreateSpace",
                pb::CreateSpaceRequest {
                    space_id: String::new(),
                    name: name.to_string(),
                    metadata: HashMap::new(),
                },
            )
            .await
            .expect("create space succeeds");
        resp.space_id
    }

    async fn create_document(
        &self,
        space_id: &str,
        data: &[u8],
        metadata: HashMap<String, String>,
    ) -> pb::CreateDocumentResponse {
        self.dispatch(
            "CreateDocument",
            pb::CreateDocumentRequest {
                space_id: space_id.to_string(),
                data: data.to_vec(),
                metadata,
            },
        )
        .await
        .expect("create document succeeds")
    }

    async fn get_document(&self, space_id: &str, document_id: &str) -> pb::GetDocumentResponse {
        self.dispatch(
            "GetDocument",
            pb::GetDocumentRequest {
                space_id: space_id.to_string(),
                document_id: document_id.to_string(),
            },
        )
        .await
        .expect("get document succeeds")
    }
}

fn title_metadata(title: &str) -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("title".to_string(), title.to_string());
    m
}

#[tokio::test]
async fn test_fresh_init_creates_identity() {
    let ctx = TestCtx::new();
    ctx.init().await;

    let account_key = ctx._tmp.path().join("account.key");
    let device_key = ctx._tmp.path().join("device.key");
    assert!(account_key.exists());
    assert!(device_key.exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for path in [&account_key, &device_key] {
            let mode = std::fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}

#[tokio::test]
async fn test_commands_require_init() {
    let ctx = TestCtx::new();
    let err = ctx
        .dispatch::<_, pb::ListSpacesResponse>("ListSpaces", pb::ListSpacesRequest {})
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NotInitialized));
}

#[tokio::test]
async fn test_unknown_command_does_not_mutate() {
    let ctx = TestCtx::new();
    ctx.init().await;

    let err = ctx
        .dispatcher
        .dispatch(CancellationToken::new(), "NotACommand", vec![1, 2, 3])
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::UnknownCommand(_)));

    // Still initialized, still zero spaces.
    let resp: pb::ListSpacesResponse = ctx
        .dispatch("ListSpaces", pb::ListSpacesRequest {})
        .await
        .unwrap();
    assert!(resp.spaces.is_empty());
}

#[tokio::test]
async fn test_init_idempotent_same_dir_rejects_other_dir() {
    let ctx = TestCtx::new();
    ctx.init().await;
    ctx.init().await;

    let err = ctx
        .dispatch::<_, pb::InitResponse>(
            "Init",
            pb::InitRequest {
                data_dir: "/tmp/some-other-dir".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::AlreadyInitialized));
}

#[tokio::test]
async fn test_space_lifecycle() {
    let ctx = TestCtx::new();
    ctx.init().await;

    let space_id = ctx.create_space("S").await;
    assert!(!space_id.is_empty());

    let resp: pb::ListSpacesResponse = ctx
        .dispatch("ListSpaces", pb::ListSpacesRequest {})
        .await
        .unwrap();
    let matching: Vec<_> = resp.spaces.iter().filter(|s| s.space_id == space_id).collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].name, "S");
    assert_eq!(matching[0].sync_status, pb::SyncStatus::Idle as i32);

    let del: pb::DeleteSpaceResponse = ctx
        .dispatch(
            "DeleteSpace",
            pb::DeleteSpaceRequest { space_id: space_id.clone() },
        )
        .await
        .unwrap();
    assert!(del.success);

    let resp: pb::ListSpacesResponse = ctx
        .dispatch("ListSpaces", pb::ListSpacesRequest {})
        .await
        .unwrap();
    assert!(resp.spaces.iter().all(|s| s.space_id != space_id));

    // Deleting again is NotFound.
    let err = ctx
        .dispatch::<_, pb::DeleteSpaceResponse>(
            "DeleteSpace",
            pb::DeleteSpaceRequest { space_id },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NotFound(_)));
}

#[tokio::test]
async fn test_create_space_not_idempotent() {
    let ctx = TestCtx::new();
    ctx.init().await;

    let a = ctx.create_space("Same").await;
    let b = ctx.create_space("Same").await;
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_document_roundtrip_and_version() {
    let ctx = TestCtx::new();
    ctx.init().await;
    let space_id = ctx.create_space("S").await;

    let created = ctx
        .create_document(&space_id, b"hello", title_metadata("T"))
        .await;
    assert_eq!(created.version, 1);

    let got = ctx.get_document(&space_id, &created.document_id).await;
    assert!(got.found);
    let doc = got.document.unwrap();
    assert_eq!(doc.data, b"hello");
    assert_eq!(doc.title, "T");
    assert_eq!(doc.metadata["title"], "T");
    assert_eq!(doc.version, 1);
}

#[tokio::test]
async fn test_update_advances_content_preserves_id() {
    let ctx = TestCtx::new();
    ctx.init().await;
    let space_id = ctx.create_space("S").await;

    let created = ctx.create_document(&space_id, b"v1", HashMap::new()).await;

    let updated: pb::UpdateDocumentResponse = ctx
        .dispatch(
            "UpdateDocument",
            pb::UpdateDocumentRequest {
                space_id: space_id.clone(),
                document_id: created.document_id.clone(),
                data: b"v2".to_vec(),
                metadata: HashMap::new(),
            },
        )
        .await
        .unwrap();
    assert!(updated.version > created.version);

    let got = ctx.get_document(&space_id, &created.document_id).await;
    let doc = got.document.unwrap();
    assert_eq!(doc.data, b"v2");
    assert_eq!(doc.document_id, created.document_id);
    assert_eq!(doc.version, updated.version);
}

#[tokio::test]
async fn test_delete_document_existed_semantics() {
    let ctx = TestCtx::new();
    ctx.init().await;
    let space_id = ctx.create_space("S").await;

    let created = ctx.create_document(&space_id, b"x", HashMap::new()).await;

    let del: pb::DeleteDocumentResponse = ctx
        .dispatch(
            "DeleteDocument",
            pb::DeleteDocumentRequest {
                space_id: space_id.clone(),
                document_id: created.document_id.clone(),
            },
        )
        .await
        .unwrap();
    assert!(del.existed);

    let del: pb::DeleteDocumentResponse = ctx
        .dispatch(
            "DeleteDocument",
            pb::DeleteDocumentRequest {
                space_id: space_id.clone(),
                document_id: created.document_id.clone(),
            },
        )
        .await
        .unwrap();
    assert!(!del.existed);

    let got = ctx.get_document(&space_id, &created.document_id).await;
    assert!(!got.found);
}

#[tokio::test]
async fn test_persistence_across_restart() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let data_dir = tmp.path().display().to_string();

    let backend = Backend::new();
    let mut dispatcher = Dispatcher::new();
    register_all(&mut dispatcher, backend.clone());

    // First run: init, create space and document, shutdown.
    dispatcher
        .dispatch(
            CancellationToken::new(),
            "Init",
            pb::InitRequest { data_dir: data_dir.clone(), ..Default::default() }.encode_to_vec(),
        )
        .await
        .unwrap();

    let mut meta = HashMap::new();
    meta.insert("purpose".to_string(), "test".to_string());
    let resp = dispatcher
        .dispatch(
            CancellationToken::new(),
            "CreateSpace",
            pb::CreateSpaceRequest {
                space_id: String::new(),
                name: "S".to_string(),
                metadata: meta,
            }
            .encode_to_vec(),
        )
        .await
        .unwrap();
    let space_id = pb::CreateSpaceResponse::decode(resp.as_slice()).unwrap().space_id;

    let resp = dispatcher
        .dispatch(
            CancellationToken::new(),
            "CreateDocument",
            pb::CreateDocumentRequest {
                space_id: space_id.clone(),
                data: b"hello".to_vec(),
                metadata: title_metadata("T"),
            }
            .encode_to_vec(),
        )
        .await
        .unwrap();
    let document_id = pb::CreateDocumentResponse::decode(resp.as_slice()).unwrap().document_id;

    let account_before = backend.view().unwrap().account_id;
    dispatcher
        .dispatch(
            CancellationToken::new(),
            "Shutdown",
            pb::ShutdownRequest {}.encode_to_vec(),
        )
        .await
        .unwrap();

    // Second run against the same directory.
    dispatcher
        .dispatch(
            CancellationToken::new(),
            "Init",
            pb::InitRequest { data_dir, ..Default::default() }.encode_to_vec(),
        )
        .await
        .unwrap();
    assert_eq!(backend.view().unwrap().account_id, account_before);

    let resp = dispatcher
        .dispatch(
            CancellationToken::new(),
            "GetDocument",
            pb::GetDocumentRequest { space_id, document_id }.encode_to_vec(),
        )
        .await
        .unwrap();
    let got = pb::GetDocumentResponse::decode(resp.as_slice()).unwrap();
    assert!(got.found);
    let doc = got.document.unwrap();
    assert_eq!(doc.data, b"hello");
    assert_eq!(doc.metadata["title"], "T");
}

#[tokio::test]
async fn test_event_filter_scenario() {
    let ctx = TestCtx::new();
    ctx.init().await;

    let (_sub, mut rx) = subscribe(
        &ctx.backend,
        &["document.created".to_string()],
        &[],
        CancellationToken::new(),
    )
    .unwrap();

    let space_id = ctx.create_space("S").await;
    let created = ctx.create_document(&space_id, b"x", HashMap::new()).await;

    let event = rx.recv().await.unwrap();
    assert_eq!(event.event_type.as_str(), "document.created");
    assert_eq!(event.space_id, space_id);
    assert_eq!(event.payload["document_id"], created.document_id);

    // Space deletion does not match the filter.
    let _: pb::DeleteSpaceResponse = ctx
        .dispatch("DeleteSpace", pb::DeleteSpaceRequest { space_id })
        .await
        .unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_subscribe_rejects_unknown_event_type() {
    let ctx = TestCtx::new();
    ctx.init().await;

    let err = subscribe(
        &ctx.backend,
        &["bogus.kind".to_string()],
        &[],
        CancellationToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, CommandError::BadRequest(_)));
}

#[tokio::test]
async fn test_list_documents_with_limit_and_cursor() {
    let ctx = TestCtx::new();
    ctx.init().await;
    let space_id = ctx.create_space("S").await;

    for i in 0..5 {
        ctx.create_document(&space_id, format!("doc {}", i).as_bytes(), HashMap::new())
            .await;
    }

    let resp: pb::ListDocumentsResponse = ctx
        .dispatch(
            "ListDocuments",
            pb::ListDocumentsRequest {
                space_id: space_id.clone(),
                collection: String::new(),
                limit: 2,
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.documents.len(), 2);
    assert!(!resp.next_cursor.is_empty());

    let all: pb::ListDocumentsResponse = ctx
        .dispatch(
            "ListDocuments",
            pb::ListDocumentsRequest {
                space_id,
                collection: String::new(),
                limit: 0,
            },
        )
        .await
        .unwrap();
    assert_eq!(all.documents.len(), 5);
    assert!(all.next_cursor.is_empty());
    assert!(all.documents.iter().all(|d| d.version == 1));
}

#[tokio::test]
async fn test_query_documents_by_tag() {
    let ctx = TestCtx::new();
    ctx.init().await;
    let space_id = ctx.create_space("S").await;

    let mut tagged = HashMap::new();
    tagged.insert("tags".to_string(), "work,urgent".to_string());
    let tagged_doc = ctx.create_document(&space_id, b"a", tagged).await;
    ctx.create_document(&space_id, b"b", HashMap::new()).await;

    let resp: pb::QueryDocumentsResponse = ctx
        .dispatch(
            "QueryDocuments",
            pb::QueryDocumentsRequest {
                space_id: space_id.clone(),
                filters: vec![pb::QueryFilter {
                    field: "tags".to_string(),
                    op: "contains".to_string(),
                    value: "work".to_string(),
                }],
                limit: 0,
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.documents.len(), 1);
    assert_eq!(resp.documents[0].document_id, tagged_doc.document_id);

    // Unrecognized filters are ignored, leaving the full listing.
    let resp: pb::QueryDocumentsResponse = ctx
        .dispatch(
            "QueryDocuments",
            pb::QueryDocumentsRequest {
                space_id,
                filters: vec![pb::QueryFilter {
                    field: "title".to_string(),
                    op: "equals".to_string(),
                    value: "x".to_string(),
                }],
                limit: 0,
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.documents.len(), 2);
}

#[tokio::test]
async fn test_sync_commands_unimplemented() {
    let ctx = TestCtx::new();
    ctx.init().await;

    let err = ctx
        .dispatch::<_, pb::StartSyncResponse>(
            "StartSync",
            pb::StartSyncRequest { space_id: String::new() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Unimplemented(_)));

    let err = ctx
        .dispatch::<_, pb::GetSyncStatusResponse>(
            "GetSyncStatus",
            pb::GetSyncStatusRequest { space_ids: vec![] },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Unimplemented(_)));
}

#[tokio::test]
async fn test_malformed_id_is_bad_request() {
    let ctx = TestCtx::new();
    ctx.init().await;

    let err = ctx
        .dispatch::<_, pb::DeleteSpaceResponse>(
            "DeleteSpace",
            pb::DeleteSpaceRequest { space_id: "not-hex".to_string() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::BadRequest(_)));
}

#[tokio::test]
async fn test_shutdown_requires_init() {
    let ctx = TestCtx::new();
    let err = ctx
        .dispatch::<_, pb::ShutdownResponse>("Shutdown", pb::ShutdownRequest {})
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NotInitialized));
}
