pub extern crate board;

mod canvas;
mod channel;
mod hub;
mod memory_channel;
mod memory_row_store;
mod repository;
mod row_store;

pub use canvas::*;
pub use channel::*;
pub use hub::*;
pub use memory_channel::*;
pub use memory_row_store::*;
pub use repository::*;
pub use row_store::*;
