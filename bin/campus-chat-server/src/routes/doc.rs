use utoipa::OpenApi;

use crate::routes::{chat, health};

#[derive(OpenApi)]
#[openapi(info(
    title = "campus-chat-server",
    description = "Chat relay for the DTEC campus site",
    contact(name = "campus-chat", url = "https://github.com/Cyberhan123/slab.rs")
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(chat::ChatApi::openapi());
    root.merge(health::HealthApi::openapi());
    root
}
