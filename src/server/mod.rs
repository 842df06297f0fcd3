mod extract;
mod handlers;
mod models;
mod state;

pub use models::{ImageExtractResponse, TextExtractResponse};

pub(crate) use extract::{extract_image, parse_image_category, parse_text_category};
pub(crate) use handlers::run_server;
pub(crate) use state::ServerState;
