//! Sync command handlers
//!
//! The network layer is not wired up yet; every sync command reports
//! `Unimplemented` after the usual lifecycle gate.

use syncspace_proto::v1 as pb;

use crate::backend::Backend;
use crate::error::CommandError;

pub fn join_space(
    backend: &Backend,
    _req: pb::JoinSpaceRequest,
) -> Result<pb::JoinSpaceResponse, CommandError> {
    backend.view()?;
    Err(CommandError::Unimplemented("JoinSpace".to_string()))
}

pub fn leave_space(
    backend: &Backend,
    _req: pb::LeaveSpaceRequest,
) -> Result<pb::LeaveSpaceResponse, CommandError> {
    backend.view()?;
    Err(CommandError::Unimplemented("LeaveSpace".to_string()))
}

pub fn start_sync(
    backend: &Backend,
    _req: pb::StartSyncRequest,
) -> Result<pb::StartSyncResponse, CommandError> {
    backend.view()?;
    Err(CommandError::Unimplemented("StartSync".to_string()))
}

pub fn pause_sync(
    backend: &Backend,
    _req: pb::PauseSyncRequest,
) -> Result<pb::PauseSyncResponse, CommandError> {
    backend.view()?;
    Err(CommandError::Unimplemented("PauseSync".to_string()))
}

pub fn get_sync_status(
    backend: &Backend,
    _req: pb::GetSyncStatusRequest,
) -> Result<pb::GetSyncStatusResponse, CommandError> {
    backend.view()?;
    Err(CommandError::Unimplemented("GetSyncStatus".to_string()))
}
