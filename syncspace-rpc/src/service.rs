//! TransportService implementation over the dispatcher

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use prost::Message;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use syncspace_runtime::handlers::events::{event_to_proto, subscribe};
use syncspace_runtime::{Backend, CommandError, Dispatcher};

use crate::proto::transport_service_server::TransportService;
use crate::proto::{
    CommandRequest, CommandResponse, InitRequest, InitResponse, ShutdownRequest,
    ShutdownResponse, SubscribeRequest, SubscribeResponse,
};

pub struct TransportServiceImpl {
    backend: Arc<Backend>,
    dispatcher: Arc<Dispatcher>,
    /// Compatibility fallback used when an Init request carries no storage
    /// path (`ANY_SYNC_DB_PATH`).
    fallback_data_dir: Option<PathBuf>,
}

impl TransportServiceImpl {
    pub fn new(backend: Arc<Backend>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { backend, dispatcher, fallback_data_dir: None }
    }

    pub fn with_fallback_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.fallback_data_dir = dir;
        self
    }
}

fn to_status(e: CommandError) -> Status {
    let message = e.to_string();
    match e {
        CommandError::BadRequest(_) | CommandError::UnknownCommand(_) => {
            Status::invalid_argument(message)
        }
        CommandError::NotFound(_) => Status::not_found(message),
        CommandError::NotInitialized
        | CommandError::AlreadyInitialized
        | CommandError::KeysMissing(_) => Status::failed_precondition(message),
        CommandError::CorruptKey(_) => Status::data_loss(message),
        CommandError::Unimplemented(_) => Status::unimplemented(message),
        CommandError::Io(_)
        | CommandError::Crypto(_)
        | CommandError::Encoding(_)
        | CommandError::Internal(_) => Status::internal(message),
    }
}

#[tonic::async_trait]
impl TransportService for TransportServiceImpl {
    async fn init(
        &self,
        request: Request<InitRequest>,
    ) -> Result<Response<InitResponse>, Status> {
        let req = request.into_inner();

        let data_dir = if req.storage_path.is_empty() {
            self.fallback_data_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        } else {
            req.storage_path
        };

        let inner = syncspace_proto::v1::InitRequest {
            data_dir,
            network_id: req.network_id,
            ..Default::default()
        };
        self.dispatcher
            .dispatch(CancellationToken::new(), "Init", inner.encode_to_vec())
            .await
            .map_err(to_status)?;

        Ok(Response::new(InitResponse { message: "initialized successfully".to_string() }))
    }

    async fn shutdown(
        &self,
        _request: Request<ShutdownRequest>,
    ) -> Result<Response<ShutdownResponse>, Status> {
        let inner = syncspace_proto::v1::ShutdownRequest::default();
        self.dispatcher
            .dispatch(CancellationToken::new(), "Shutdown", inner.encode_to_vec())
            .await
            .map_err(to_status)?;

        Ok(Response::new(ShutdownResponse { message: "shutdown successfully".to_string() }))
    }

    async fn command(
        &self,
        request: Request<CommandRequest>,
    ) -> Result<Response<CommandResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(cmd = %req.cmd, "dispatching command");

        let data = self
            .dispatcher
            .dispatch(CancellationToken::new(), &req.cmd, req.data)
            .await
            .map_err(to_status)?;

        Ok(Response::new(CommandResponse { data }))
    }

    type SubscribeStream =
        Pin<Box<dyn Stream<Item = Result<SubscribeResponse, Status>> + Send + 'static>>;

    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let req = request.into_inner();

        let cancel = CancellationToken::new();
        let (subscriber_id, mut rx) =
            subscribe(&self.backend, &req.event_types, &req.space_ids, cancel.clone())
                .map_err(to_status)?;

        tracing::debug!(subscriber_id = %subscriber_id, "event stream opened");

        let (tx, out) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let record = event_to_proto(&event);
                let msg = SubscribeResponse {
                    r#type: record.event_type.clone(),
                    data: record.encode_to_vec(),
                    timestamp_ms: event.timestamp * 1000,
                };
                if tx.send(Ok(msg)).await.is_err() {
                    // Client went away; drop the subscription.
                    break;
                }
            }
            cancel.cancel();
            tracing::debug!(subscriber_id = %subscriber_id, "event stream closed");
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(out))))
    }
}
