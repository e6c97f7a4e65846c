//! HTTP API endpoint handlers.

use std::{str::FromStr, sync::Arc};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    domain::{Authenticator, ConversationId, DisplayName, Sequence, UserId, ValueObjectError},
    infrastructure::dto::http::{
        AddParticipantRequest, ConnectionDto, ConversationDto, CreateConversationRequest,
        ErrorDto, HealthDto, MessagePageDto, MessagesQuery, PresenceDto, RegisterUserRequest,
        RegisterUserResponse, UpdateProfileRequest, UserDto,
    },
    ui::state::AppState,
    usecase::ChatError,
};

/// Error response of the HTTP API.
#[derive(Debug)]
pub enum ApiError {
    Chat(ChatError),
    BadRequest(String),
    UserNotFound(String),
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        Self::Chat(error)
    }
}

impl From<ValueObjectError> for ApiError {
    fn from(error: ValueObjectError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::Chat(error) => match error {
                ChatError::InvalidParticipants(_)
                | ChatError::InvalidContent(_)
                | ChatError::NotGroup => StatusCode::BAD_REQUEST,
                ChatError::Unauthenticated => StatusCode::UNAUTHORIZED,
                ChatError::NotMessageSender => StatusCode::FORBIDDEN,
                ChatError::ConversationNotFound(_)
                | ChatError::MessageNotFound(_)
                | ChatError::NotAParticipant
                | ChatError::SessionNotFound => StatusCode::NOT_FOUND,
                ChatError::AlreadyMember | ChatError::MessageDeleted => StatusCode::CONFLICT,
                ChatError::PersistenceTimeout => StatusCode::SERVICE_UNAVAILABLE,
                ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> ErrorDto {
        match self {
            Self::Chat(error) => ErrorDto {
                code: error.code().to_string(),
                message: error.to_string(),
            },
            Self::BadRequest(message) => ErrorDto {
                code: "bad-request".to_string(),
                message: message.clone(),
            },
            Self::UserNotFound(user_id) => ErrorDto {
                code: "user-not-found".to_string(),
                message: format!("user '{}' not found", user_id),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

fn parse_conversation_id(value: &str) -> Result<ConversationId, ApiError> {
    Ok(ConversationId::from_str(value)?)
}

fn parse_user_id(value: String) -> Result<UserId, ApiError> {
    Ok(UserId::new(value)?)
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_string(),
        connections: state.engine.registry.connection_count().await,
    })
}

/// Register a user and issue their token
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<RegisterUserResponse>), ApiError> {
    let display_name = DisplayName::new(request.display_name)?;
    let (user, token) = state
        .engine
        .users
        .register(display_name, request.avatar)
        .await;
    Ok((
        StatusCode::CREATED,
        Json(RegisterUserResponse {
            user: (&user).into(),
            token,
        }),
    ))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserDto>, ApiError> {
    let user_id = parse_user_id(user_id)?;
    let user = state
        .engine
        .users
        .find_user(&user_id)
        .await
        .map_err(ChatError::from)?
        .ok_or_else(|| ApiError::UserNotFound(user_id.to_string()))?;
    Ok(Json((&user).into()))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserDto>, ApiError> {
    let user_id = parse_user_id(user_id)?;
    let display_name = request.display_name.map(DisplayName::new).transpose()?;
    let user = state
        .engine
        .users
        .update_profile(&user_id, display_name, request.avatar)
        .await
        .ok_or_else(|| ApiError::UserNotFound(user_id.to_string()))?;
    Ok(Json((&user).into()))
}

pub async fn get_presence(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceDto>, ApiError> {
    let user_id = parse_user_id(user_id)?;
    if state
        .engine
        .users
        .find_user(&user_id)
        .await
        .map_err(ChatError::from)?
        .is_none()
    {
        return Err(ApiError::UserNotFound(user_id.to_string()));
    }

    let presence = state.engine.presence.presence_of(&user_id).await;
    let mut connection_ids: Vec<_> = state
        .engine
        .registry
        .active_connections_for(&user_id)
        .await
        .into_iter()
        .collect();
    connection_ids.sort_by_key(|id| id.to_string());
    let mut connections = Vec::with_capacity(connection_ids.len());
    for connection_id in connection_ids {
        let liveness = state.engine.registry.liveness(&connection_id).await;
        connections.push(ConnectionDto {
            connection_id: connection_id.to_string(),
            liveness: liveness.into(),
        });
    }
    Ok(Json(PresenceDto {
        user_id: user_id.into_string(),
        state: presence.into(),
        connections,
    }))
}

pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationDto>), ApiError> {
    let participant_ids = request
        .participant_ids
        .into_iter()
        .map(parse_user_id)
        .collect::<Result<Vec<_>, _>>()?;
    let conversation = state
        .engine
        .directory
        .create(participant_ids, request.is_group, request.name)
        .await?;
    Ok((StatusCode::CREATED, Json((&conversation).into())))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationDto>, ApiError> {
    let conversation_id = parse_conversation_id(&conversation_id)?;
    let conversation = state.engine.directory.get(&conversation_id).await?;
    Ok(Json((&conversation).into()))
}

pub async fn add_participant(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Json(request): Json<AddParticipantRequest>,
) -> Result<Json<ConversationDto>, ApiError> {
    let conversation_id = parse_conversation_id(&conversation_id)?;
    let user_id = parse_user_id(request.user_id)?;
    let conversation = state
        .engine
        .directory
        .add_participant(&conversation_id, user_id)
        .await?;
    Ok(Json((&conversation).into()))
}

pub async fn remove_participant(
    State(state): State<Arc<AppState>>,
    Path((conversation_id, user_id)): Path<(String, String)>,
) -> Result<Json<ConversationDto>, ApiError> {
    let conversation_id = parse_conversation_id(&conversation_id)?;
    let user_id = parse_user_id(user_id)?;
    let conversation = state
        .engine
        .directory
        .remove_participant(&conversation_id, &user_id)
        .await?;
    Ok(Json((&conversation).into()))
}

/// Page through the message log of a conversation
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagePageDto>, ApiError> {
    let conversation_id = parse_conversation_id(&conversation_id)?;
    let after = Sequence::new(query.after.unwrap_or(0));
    let limit = query
        .limit
        .unwrap_or(state.engine.config().resync_page_size);

    let messages = state
        .engine
        .sequencer
        .fetch_since(&conversation_id, after, limit)
        .await?;
    let next_after = messages.last().map_or(after, |message| message.sequence);

    Ok(Json(MessagePageDto {
        conversation_id: conversation_id.to_string(),
        messages: messages.iter().map(Into::into).collect(),
        next_after: next_after.value(),
    }))
}
