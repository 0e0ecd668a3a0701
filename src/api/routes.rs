use actix_web::{delete, get, post, web, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::api::data_stream::STREAM_HEADER;
use crate::api::error::ApiError;
use crate::api::middleware::Identity;
use crate::api::models::{ChatRequest, DeleteChatQuery, PaginationQuery};
use crate::api::relay::{relay_turn, RelaySettings};
use crate::chat::history::{most_recent_user_message, to_model_messages};
use crate::chat::{generate_id, ModelStreamSource, StreamRequest, TitleGenerator};
use crate::config::AppConfig;
use crate::db::{Chat, ChatStore, Message, MessageContent, Role};

// --- Chat turns ---

#[post("")]
pub async fn post_chat(
    identity: Option<web::ReqData<Identity>>,
    config: web::Data<AppConfig>,
    store: web::Data<Arc<dyn ChatStore>>,
    source: web::Data<Arc<dyn ModelStreamSource>>,
    titles: web::Data<Arc<dyn TitleGenerator>>,
    req: web::Json<ChatRequest>,
) -> Result<HttpResponse, ApiError> {
    let identity = identity.ok_or(ApiError::Unauthorized)?.into_inner();
    let deadline = Instant::now() + Duration::from_secs(config.chat.max_duration_secs);
    let req = req.into_inner();

    let user_message = most_recent_user_message(&req.messages)
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("No user message found".to_string()))?;

    let model = config
        .chat
        .resolve_model(&req.selected_chat_model)
        .cloned()
        .ok_or_else(|| {
            ApiError::BadRequest(format!("Unknown model: {}", req.selected_chat_model))
        })?;

    match store.get_chat(&req.id).await? {
        Some(chat) if chat.owner_id != identity.user_id => return Err(ApiError::Unauthorized),
        Some(_) => {}
        None => {
            let title = titles.generate(&user_message).await;
            store
                .save_chat(&Chat {
                    id: req.id.clone(),
                    owner_id: identity.user_id.clone(),
                    title,
                    created_at: Utc::now(),
                })
                .await?;
            info!("Created chat {} for {}", req.id, identity.user_id);
        }
    }

    // A regenerated turn re-sends the same client message id.
    let message_id = match user_message.id.clone().filter(|id| !id.is_empty()) {
        Some(id) if !store.has_message(&id).await? => id,
        _ => generate_id(),
    };

    store
        .save_messages(&[Message {
            id: message_id,
            chat_id: req.id.clone(),
            role: Role::User,
            content: MessageContent::Text(user_message.content.clone()),
            reasoning: user_message.reasoning.clone(),
            created_at: Utc::now(),
        }])
        .await?;

    let events = source.stream(StreamRequest {
        model: model.model.clone(),
        reasoning: model.reasoning,
        system: config.chat.system_prompt_for(&model),
        messages: to_model_messages(&req.messages),
        active_tools: config.chat.active_tools_for(&model),
        id_generator: generate_id,
    });

    let settings = RelaySettings {
        deadline,
        chunk_delay: Duration::from_millis(config.chat.smooth_delay_ms),
        error_message: config.chat.stream_error_message.clone(),
    };
    let body = relay_turn(events, store.get_ref().clone(), req.id, settings);

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header(STREAM_HEADER)
        .streaming(body))
}

#[delete("")]
pub async fn delete_chat(
    identity: Option<web::ReqData<Identity>>,
    store: web::Data<Arc<dyn ChatStore>>,
    query: web::Query<DeleteChatQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = query
        .into_inner()
        .id
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::NotFound)?;
    let identity = identity.ok_or(ApiError::Unauthorized)?;

    let chat = store
        .get_chat(&id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("chat {} does not exist", id)))?;
    if chat.owner_id != identity.user_id {
        return Err(ApiError::Unauthorized);
    }

    store.delete_chat(&id).await?;
    info!("Deleted chat {}", id);

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("Chat deleted"))
}

// --- Reads ---

#[get("/{id}/messages")]
pub async fn get_messages(
    identity: Option<web::ReqData<Identity>>,
    store: web::Data<Arc<dyn ChatStore>>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let identity = identity.ok_or(ApiError::Unauthorized)?;
    let id = id.into_inner();

    let chat = store.get_chat(&id).await?.ok_or(ApiError::NotFound)?;
    if chat.owner_id != identity.user_id {
        return Err(ApiError::Unauthorized);
    }

    Ok(HttpResponse::Ok().json(store.get_messages(&id).await?))
}

#[get("/history")]
pub async fn history(
    identity: Option<web::ReqData<Identity>>,
    store: web::Data<Arc<dyn ChatStore>>,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, ApiError> {
    let identity = identity.ok_or(ApiError::Unauthorized)?;
    let chats = store
        .list_chats(&identity.user_id, query.limit, query.offset)
        .await?;
    Ok(HttpResponse::Ok().json(chats))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/chat")
            .service(post_chat)
            .service(delete_chat)
            .service(get_messages),
    )
    .service(history);
}
