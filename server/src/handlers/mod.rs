mod get;
mod index;
mod ping;
mod update;

pub use get::{get_value_json, get_value_text};
pub use index::index;
pub use ping::ping;
pub use update::{update_batch, update_json, update_path};
