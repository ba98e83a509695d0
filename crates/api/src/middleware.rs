use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stockroom_core::ActorId;

use crate::app::errors;
use crate::context::ActorContext;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Require an `x-actor-id` header and expose it as [`ActorContext`].
///
/// Authentication happens upstream; this only carries the identity through.
pub async fn actor_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let actor_id = match extract_actor(req.headers()) {
        Ok(id) => id,
        Err((code, message)) => {
            return errors::json_error(StatusCode::UNAUTHORIZED, code, message);
        }
    };

    req.extensions_mut().insert(ActorContext::new(actor_id));
    next.run(req).await
}

fn extract_actor(headers: &HeaderMap) -> Result<ActorId, (&'static str, &'static str)> {
    let header = headers
        .get(ACTOR_HEADER)
        .ok_or(("missing_actor", "x-actor-id header is required"))?;

    let value = header
        .to_str()
        .map_err(|_| ("invalid_actor", "x-actor-id header is not valid text"))?
        .trim();

    value
        .parse()
        .map_err(|_| ("invalid_actor", "x-actor-id header must be a UUID"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn actor_header_must_be_a_uuid() {
        let mut headers = HeaderMap::new();
        assert!(extract_actor(&headers).is_err());

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("someone"));
        assert!(extract_actor(&headers).is_err());

        let actor = ActorId::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_str(&actor.to_string()).unwrap());
        assert_eq!(extract_actor(&headers).unwrap(), actor);
    }
}
