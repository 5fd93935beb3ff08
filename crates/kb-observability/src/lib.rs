//! Structured logging and callback-token signing, the ambient observability layer
//! every `kb-*` crate relies on without depending on a web framework.

pub mod logging;
pub mod signer;

pub use logging::init_tracing;
pub use signer::{CallbackTokenSigner, SignerError};
