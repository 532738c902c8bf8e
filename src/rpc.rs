mod call_context;
mod call_registry;
mod call_shape;
mod client_stream_reader;
mod method_descriptor;
mod method_registry;
mod rpc_dispatcher;
mod server_stream_writer;
mod service_definition;

pub use call_context::{CallContext, UserData};
pub use call_registry::CallRegistry;
pub use call_shape::CallShape;
pub use client_stream_reader::ClientStreamReader;
pub use method_descriptor::{MethodDescriptor, MethodHandler};
pub use method_registry::MethodRegistry;
pub use rpc_dispatcher::{CallFailure, CallFailureHook, DispatcherOptions, RpcDispatcher};
pub use server_stream_writer::ServerStreamWriter;
pub use service_definition::ServiceDefinition;
