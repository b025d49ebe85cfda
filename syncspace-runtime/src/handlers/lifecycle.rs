//! Init and Shutdown handlers

use syncspace_proto::v1 as pb;

use crate::backend::Backend;
use crate::error::CommandError;

pub fn init(backend: &Backend, req: pb::InitRequest) -> Result<pb::InitResponse, CommandError> {
    backend.init(req.data_dir, req.network_id, req.device_id, req.config)?;
    Ok(pb::InitResponse { success: true })
}

pub fn shutdown(
    backend: &Backend,
    _req: pb::ShutdownRequest,
) -> Result<pb::ShutdownResponse, CommandError> {
    backend.shutdown()?;
    Ok(pb::ShutdownResponse { success: true })
}
