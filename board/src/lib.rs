pub extern crate chrono;
pub extern crate serde;
pub extern crate serde_json;
pub extern crate uuid;

mod error;
mod message;
mod model;
mod types;

pub use error::*;
pub use message::*;
pub use model::*;
pub use types::*;
