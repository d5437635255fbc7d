//! Generation Backend Abstraction
//!
//! Trait definitions and adapters for the text-generation services the
//! engine dispatches to. Backends are opaque: the engine knows them only
//! through their registered capability vectors and the uniform invocation
//! contract defined here.

pub mod http;
pub mod traits;

pub use http::HttpBackend;
pub use traits::{Generation, GenerationBackend};
