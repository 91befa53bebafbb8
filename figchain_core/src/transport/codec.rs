use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Pluggable body codec for the `/data/*` endpoints.
///
/// Implementations must round-trip the models faithfully, including optional fields and `null`
/// for absent optionals. Schema-driven binary codecs implement this trait externally; the client
/// ships with [`JsonCodec`].
pub trait WireCodec: Send + Sync {
    /// The `Content-Type` sent with encoded bodies.
    fn content_type(&self) -> &'static str;

    #[allow(missing_docs)]
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    #[allow(missing_docs)]
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON body codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl WireCodec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
