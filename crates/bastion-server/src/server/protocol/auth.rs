//! Actor resolution.
//!
//! The caller's user id travels in the `x-user-id` header (HTTP) or metadata
//! entry (gRPC) and is attached to the request as an [`ActorContext`]
//! extension. A missing or malformed value yields an anonymous context.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use bastion_store::ActorContext;
use tonic::Status;

pub const ACTOR_HEADER: &str = "x-user-id";

/// axum middleware inserting the request's [`ActorContext`].
pub async fn resolve_actor(mut request: Request, next: Next) -> Response {
    let actor = ActorContext::from_header(
        request
            .headers()
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    request.extensions_mut().insert(actor);
    next.run(request).await
}

/// tonic interceptor inserting the request's [`ActorContext`].
pub fn authenticate(mut request: tonic::Request<()>) -> Result<tonic::Request<()>, Status> {
    let actor = ActorContext::from_header(
        request
            .metadata()
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    tracing::trace!(actor = ?actor.actor, "grpc actor resolved");
    request.extensions_mut().insert(actor);
    Ok(request)
}
