//! Space command handlers

use syncspace_proto::v1 as pb;

use crate::backend::Backend;
use crate::error::CommandError;
use crate::handlers::parse_id;

pub fn create_space(
    backend: &Backend,
    req: pb::CreateSpaceRequest,
) -> Result<pb::CreateSpaceResponse, CommandError> {
    let view = backend.view()?;
    if req.name.is_empty() {
        return Err(CommandError::BadRequest("name is required".to_string()));
    }

    // The request's space_id is only a caller-side reference name.
    let space_id = view.spaces.create(&req.space_id, &req.name, req.metadata)?;
    Ok(pb::CreateSpaceResponse { space_id: space_id.to_hex() })
}

pub fn list_spaces(
    backend: &Backend,
    _req: pb::ListSpacesRequest,
) -> Result<pb::ListSpacesResponse, CommandError> {
    let view = backend.view()?;

    let spaces = view
        .spaces
        .list()
        .into_iter()
        .map(|meta| pb::SpaceInfo {
            space_id: meta.space_id.to_hex(),
            name: meta.name,
            metadata: meta.metadata,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            // Local-only mode; the network layer is not wired up yet.
            sync_status: pb::SyncStatus::Idle as i32,
        })
        .collect();

    Ok(pb::ListSpacesResponse { spaces })
}

pub fn delete_space(
    backend: &Backend,
    req: pb::DeleteSpaceRequest,
) -> Result<pb::DeleteSpaceResponse, CommandError> {
    let view = backend.view()?;
    let space_id = parse_id(&req.space_id, "space id")?;
    view.spaces.delete(&space_id)?;
    Ok(pb::DeleteSpaceResponse { success: true })
}
