mod backend;
mod backends;
pub mod labels;
mod result;
pub mod yolo;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection};
