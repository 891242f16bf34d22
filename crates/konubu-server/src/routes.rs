use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use konubu_push::PushProvider;
use konubu_triggers::{TriggerOutcome, TriggerRouter};
use konubu_types::TriggerEvent;
use konubu_types::api::{
    Claims, ErrorResponse, NotificationDebug, RecalculateResponse, SubscribedCity,
};

use crate::auth::{require_auth, require_trigger_secret};

pub type AppState<P> = Arc<AppStateInner<P>>;

pub struct AppStateInner<P> {
    pub router: TriggerRouter<P>,
    pub jwt_secret: String,
    pub trigger_secret: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: e.to_string() }),
    )
}

pub fn app<P: PushProvider + 'static>(state: AppState<P>) -> Router {
    let trigger_routes = Router::new()
        .route("/triggers", post(handle_trigger::<P>))
        .layer(middleware::from_fn_with_state(state.clone(), require_trigger_secret::<P>))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/stats/recalculate", post(recalculate_mine::<P>))
        .route("/stats/recalculate-all", post(recalculate_all::<P>))
        .route("/users/me/notification-debug", get(notification_debug::<P>))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth::<P>))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(trigger_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

/// One lifecycle event from the document store. Failures answer 500 so the
/// deliverer retries.
async fn handle_trigger<P: PushProvider + 'static>(
    State(state): State<AppState<P>>,
    Json(event): Json<TriggerEvent>,
) -> Result<Json<TriggerOutcome>, ApiError> {
    let kind = event.kind();
    state.router.handle(event).await.map(Json).map_err(|e| {
        error!("Trigger {} failed: {}", kind, e);
        internal(e)
    })
}

async fn recalculate_mine<P: PushProvider + 'static>(
    State(state): State<AppState<P>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .router
        .stats()
        .recalculate_user(&claims.sub)
        .await
        .map_err(|e| {
            error!("Recalculating stats for {} failed: {}", claims.sub, e);
            internal(e)
        })?;
    Ok(Json(RecalculateResponse { success: true, stats }))
}

// Any authenticated caller may run the sweep; there is no admin role yet.
async fn recalculate_all<P: PushProvider + 'static>(
    State(state): State<AppState<P>>,
    Extension(_claims): Extension<Claims>,
) -> impl IntoResponse {
    Json(state.router.stats().recalculate_all().await)
}

async fn notification_debug<P: PushProvider + 'static>(
    State(state): State<AppState<P>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<NotificationDebug>, ApiError> {
    let uid = claims.sub.clone();
    let user = state
        .router
        .store()
        .call(move |db| db.get_user(&uid))
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse { error: "User not found".into() }),
            )
        })?;

    let token = user.token();
    Ok(Json(NotificationDebug {
        user_id: user.id.clone(),
        notifications_enabled: user.notifications_enabled.as_flag(),
        notify_on_city_confession: user.notify_on_city_confession.as_flag(),
        subscribed_cities: user
            .subscribed_cities
            .iter()
            .map(|value| SubscribedCity {
                json_type: value.json_type().to_string(),
                value: value.clone(),
            })
            .collect(),
        fcm_token_exists: token.is_some(),
        token_prefix: match token {
            Some(t) => format!("{}...", t.chars().take(5).collect::<String>()),
            None => "NONE".into(),
        },
    }))
}
