//! Actor extraction.
//!
//! Every mutating route needs to know who is acting and with what capability.
//! The caller supplies `x-actor-id` (UUID) and `x-actor-role`
//! (`operator`/`admin`); the parsed [`ActorContext`] rides the request
//! extensions into the handlers.

use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use rxledger_core::{ActorContext, ActorId, ActorRole};

pub async fn actor_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let actor = extract_actor(req.headers())?;
    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

fn extract_actor(headers: &HeaderMap) -> Result<ActorContext, StatusCode> {
    let actor_id: ActorId = header_str(headers, "x-actor-id")?
        .parse()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let role = match header_str(headers, "x-actor-role")? {
        "operator" => ActorRole::Operator,
        "admin" => ActorRole::Admin,
        _ => return Err(StatusCode::UNAUTHORIZED),
    };

    Ok(ActorContext::new(actor_id, role))
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Result<&'h str, StatusCode> {
    headers
        .get(name)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map(str::trim)
        .map_err(|_| StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_parse_into_actor_context() {
        let mut headers = HeaderMap::new();
        let id = ActorId::new();
        headers.insert("x-actor-id", id.to_string().parse().unwrap());
        headers.insert("x-actor-role", "admin".parse().unwrap());

        let actor = extract_actor(&headers).unwrap();
        assert_eq!(actor.actor_id(), id);
        assert!(actor.is_admin());
    }

    #[test]
    fn missing_or_bad_headers_are_unauthorized() {
        let headers = HeaderMap::new();
        assert_eq!(extract_actor(&headers), Err(StatusCode::UNAUTHORIZED));

        let mut headers = HeaderMap::new();
        headers.insert("x-actor-id", "not-a-uuid".parse().unwrap());
        headers.insert("x-actor-role", "operator".parse().unwrap());
        assert_eq!(extract_actor(&headers), Err(StatusCode::UNAUTHORIZED));

        let mut headers = HeaderMap::new();
        headers.insert("x-actor-id", ActorId::new().to_string().parse().unwrap());
        headers.insert("x-actor-role", "superuser".parse().unwrap());
        assert_eq!(extract_actor(&headers), Err(StatusCode::UNAUTHORIZED));
    }
}
