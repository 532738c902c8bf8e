use super::{CallContext, ClientStreamReader, MethodDescriptor, ServerStreamWriter};
use crate::error::HandlerResult;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;

/// Builder collecting the methods of one service before registration.
///
/// ```
/// use uconnect::rpc::ServiceDefinition;
///
/// let service = ServiceDefinition::new("HelloService").unary(
///     "Echo",
///     |text: String, _context| async move { Ok(text) },
/// );
/// assert_eq!(service.methods().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    name: String,
    methods: Vec<MethodDescriptor>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn unary<Req, Res, F, Fut>(mut self, method: &str, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Res>> + Send + 'static,
    {
        let descriptor = MethodDescriptor::unary(self.name.as_str(), method, handler);
        self.methods.push(descriptor);
        self
    }

    pub fn client_streaming<Req, Res, F, Fut>(mut self, method: &str, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(ClientStreamReader<Req>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Res>> + Send + 'static,
    {
        let descriptor = MethodDescriptor::client_streaming(self.name.as_str(), method, handler);
        self.methods.push(descriptor);
        self
    }

    pub fn server_streaming<Req, Res, F, Fut>(mut self, method: &str, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(Req, ServerStreamWriter<Res>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let descriptor = MethodDescriptor::server_streaming(self.name.as_str(), method, handler);
        self.methods.push(descriptor);
        self
    }

    pub fn duplex_streaming<Req, Res, F, Fut>(mut self, method: &str, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(ClientStreamReader<Req>, ServerStreamWriter<Res>, CallContext) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let descriptor = MethodDescriptor::duplex_streaming(self.name.as_str(), method, handler);
        self.methods.push(descriptor);
        self
    }

    pub(crate) fn into_parts(self) -> (String, Vec<MethodDescriptor>) {
        (self.name, self.methods)
    }
}
