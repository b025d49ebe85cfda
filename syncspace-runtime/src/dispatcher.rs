//! Dispatcher - named commands, bytes in, bytes out
//!
//! Each registration pairs a command name with a typed handler. The request
//! type's `Default` impl is the prototype: a fresh value is materialized and
//! filled from the request bytes on every dispatch. The dispatcher itself is
//! stateless and safe for concurrent calls.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use prost::Message;
use tokio_util::sync::CancellationToken;

use crate::error::CommandError;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, CommandError>> + Send>>;
type HandlerFn = Arc<dyn Fn(CancellationToken, Vec<u8>) -> HandlerFuture + Send + Sync>;

/// Routes commands to their handlers.
pub struct Dispatcher {
    handlers: HashMap<String, HandlerFn>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Register a handler under a command name. Names are case-sensitive;
    /// the canonical form is PascalCase (`CreateSpace`).
    pub fn register<Req, Resp, F, Fut>(&mut self, command: &str, handler: F)
    where
        Req: Message + Default + 'static,
        Resp: Message + 'static,
        F: Fn(CancellationToken, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, CommandError>> + Send + 'static,
    {
        let name = command.to_string();
        let entry: HandlerFn = Arc::new(move |token, payload| {
            let req = match Req::decode(payload.as_slice()) {
                Ok(req) => req,
                Err(e) => {
                    let msg = format!("failed to decode request: {}", e);
                    return Box::pin(async move { Err(CommandError::BadRequest(msg)) });
                }
            };
            let fut = handler(token, req);
            Box::pin(async move {
                let resp = fut.await?;
                Ok(resp.encode_to_vec())
            })
        });
        self.handlers.insert(name, entry);
    }

    /// Route a command: look up the handler, decode, invoke, encode.
    pub async fn dispatch(
        &self,
        token: CancellationToken,
        command: &str,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, CommandError> {
        let handler = self
            .handlers
            .get(command)
            .ok_or_else(|| CommandError::UnknownCommand(command.to_string()))?;
        handler(token, payload).await
    }

    /// Names of all registered commands.
    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncspace_proto::v1::{InitRequest, InitResponse};

    fn test_dispatcher() -> Dispatcher {
        let mut d = Dispatcher::new();
        d.register::<InitRequest, InitResponse, _, _>("Echo", |_token, req| async move {
            if req.data_dir.is_empty() {
                return Err(CommandError::BadRequest("data_dir required".to_string()));
            }
            Ok(InitResponse { success: true })
        });
        d
    }

    #[tokio::test]
    async fn test_dispatch_roundtrip() {
        let d = test_dispatcher();
        let req = InitRequest { data_dir: "/tmp/x".to_string(), ..Default::default() };
        let resp_bytes = d
            .dispatch(CancellationToken::new(), "Echo", req.encode_to_vec())
            .await
            .unwrap();
        let resp = InitResponse::decode(resp_bytes.as_slice()).unwrap();
        assert!(resp.success);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let d = test_dispatcher();
        let err = d
            .dispatch(CancellationToken::new(), "NotACommand", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand(_)));
    }

    #[tokio::test]
    async fn test_undecodable_bytes_are_bad_request() {
        let d = test_dispatcher();
        let err = d
            .dispatch(CancellationToken::new(), "Echo", vec![0xff, 0xff, 0xff])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let d = test_dispatcher();
        let req = InitRequest::default();
        let err = d
            .dispatch(CancellationToken::new(), "Echo", req.encode_to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_commands_lists_registrations() {
        let d = test_dispatcher();
        assert_eq!(d.commands(), vec!["Echo".to_string()]);
    }
}
