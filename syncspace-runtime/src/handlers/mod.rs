//! Handler layer - request/response adapters over the engines
//!
//! Every handler checks the lifecycle controller first (via
//! `Backend::view`), translates component errors into `CommandError`, and
//! holds no state of its own.

pub mod documents;
pub mod events;
pub mod lifecycle;
pub mod spaces;
pub mod sync;

use std::sync::Arc;

use syncspace_model::Hash;
use syncspace_proto::v1 as pb;

use crate::backend::Backend;
use crate::dispatcher::Dispatcher;
use crate::error::CommandError;

/// Parse a hex identifier out of a request field.
pub(crate) fn parse_id(value: &str, what: &str) -> Result<Hash, CommandError> {
    if value.is_empty() {
        return Err(CommandError::BadRequest(format!("{} is required", what)));
    }
    Hash::from_hex(value)
        .map_err(|_| CommandError::BadRequest(format!("malformed {}: {}", what, value)))
}

/// Register every command handler with the dispatcher.
///
/// Names are PascalCase and mirror the RPC methods one-to-one. Subscribe is
/// the exception: it streams, so the transport calls
/// [`events::subscribe`] directly instead of going through bytes-in/bytes-out.
pub fn register_all(dispatcher: &mut Dispatcher, backend: Arc<Backend>) {
    macro_rules! route {
        ($name:literal, $req:ty, $handler:path) => {{
            let backend = backend.clone();
            dispatcher.register::<$req, _, _, _>($name, move |_token, req| {
                let backend = backend.clone();
                async move { $handler(&backend, req) }
            });
        }};
    }

    // Lifecycle
    route!("Init", pb::InitRequest, lifecycle::init);
    route!("Shutdown", pb::ShutdownRequest, lifecycle::shutdown);

    // Spaces
    route!("CreateSpace", pb::CreateSpaceRequest, spaces::create_space);
    route!("ListSpaces", pb::ListSpacesRequest, spaces::list_spaces);
    route!("DeleteSpace", pb::DeleteSpaceRequest, spaces::delete_space);
    route!("JoinSpace", pb::JoinSpaceRequest, sync::join_space);
    route!("LeaveSpace", pb::LeaveSpaceRequest, sync::leave_space);

    // Documents
    route!("CreateDocument", pb::CreateDocumentRequest, documents::create_document);
    route!("GetDocument", pb::GetDocumentRequest, documents::get_document);
    route!("UpdateDocument", pb::UpdateDocumentRequest, documents::update_document);
    route!("DeleteDocument", pb::DeleteDocumentRequest, documents::delete_document);
    route!("ListDocuments", pb::ListDocumentsRequest, documents::list_documents);
    route!("QueryDocuments", pb::QueryDocumentsRequest, documents::query_documents);

    // Sync
    route!("StartSync", pb::StartSyncRequest, sync::start_sync);
    route!("PauseSync", pb::PauseSyncRequest, sync::pause_sync);
    route!("GetSyncStatus", pb::GetSyncStatusRequest, sync::get_sync_status);
}
