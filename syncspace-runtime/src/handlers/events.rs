//! Subscription entry points
//!
//! Subscribe streams, so it bypasses the bytes-in/bytes-out dispatcher: the
//! transport calls these functions directly and forwards the received events
//! over its own stream.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use syncspace_events::{Event, EventFilter};

use crate::backend::Backend;
use crate::error::CommandError;

/// Register a subscription. Unknown event type strings are rejected; empty
/// type or space lists match everything on that dimension. The subscription
/// is removed automatically when `cancel` fires.
pub fn subscribe(
    backend: &Backend,
    event_types: &[String],
    space_ids: &[String],
    cancel: CancellationToken,
) -> Result<(String, mpsc::Receiver<Event>), CommandError> {
    let view = backend.view()?;

    let mut filter = EventFilter::any();
    for raw in event_types {
        let event_type = raw
            .parse()
            .map_err(|e| CommandError::BadRequest(format!("{}", e)))?;
        filter.types.insert(event_type);
    }
    filter.space_ids.extend(space_ids.iter().cloned());

    Ok(view.events.subscribe(filter, cancel))
}

/// Remove a subscription by id.
pub fn unsubscribe(backend: &Backend, subscriber_id: &str) -> Result<(), CommandError> {
    let view = backend.view()?;
    view.events.unsubscribe(subscriber_id)?;
    Ok(())
}

/// Encode a bus event as the wire-level event record.
pub fn event_to_proto(event: &Event) -> syncspace_proto::v1::SubscribeResponse {
    syncspace_proto::v1::SubscribeResponse {
        event_id: event.id.clone(),
        event_type: event.event_type.as_str().to_string(),
        space_id: event.space_id.clone(),
        timestamp: event.timestamp,
        payload: event.payload.clone().into_iter().collect(),
    }
}
