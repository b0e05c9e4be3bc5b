pub mod document;
pub mod request;
pub mod style;

pub use document::*;
pub use request::*;
pub use style::*;
