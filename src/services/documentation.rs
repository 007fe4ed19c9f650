use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the seed sync backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ServerMessage,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "seeds", description = "WebSocket stream of the shared seed counters"),
    )
)]
pub struct ApiDoc;
