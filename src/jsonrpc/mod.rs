pub mod key;
pub mod request;
pub mod response;

pub use key::KeyBuilder;
pub use request::{JsonRpcBody, JsonRpcRequest};
pub use response::{JsonRpcError, JsonRpcResponse};
