use crate::models::db_operations::users_db_operations::ROLE_ADMIN;
use actix_session::{Session, SessionExt};
use actix_web::{dev, guard, FromRequest, HttpRequest};
use serde::Serialize;
use std::env;
use std::future::{ready, Ready};

/// The signed-in operator, taken from the session cookie.
#[derive(Serialize)]
pub struct AuthenticatedAdmin {
    pub username: String,
    pub role: String,
}

impl FromRequest for AuthenticatedAdmin {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let session = req.get_session();
        match (session.get::<String>("username"), session.get::<String>("role")) {
            (Ok(Some(username)), Ok(Some(role))) if role == ROLE_ADMIN => {
                ready(Ok(AuthenticatedAdmin { username, role }))
            }
            _ => ready(Err(actix_web::error::ErrorUnauthorized("Not logged in."))),
        }
    }
}

pub fn admin_guard(session: &Session) -> bool {
    session.get::<String>("role").unwrap_or(None).as_deref() == Some(ROLE_ADMIN)
}

/// True when `peer` is listed in the comma-separated allow-list, or the list
/// is `*`.
pub fn ip_allowed(allowed_ips: &str, peer: &str) -> bool {
    allowed_ips.trim() == "*" || allowed_ips.split(',').any(|ip| ip.trim() == peer)
}

pub fn ip_guard(ctx: &guard::GuardContext) -> bool {
    let allowed_ips_str = match env::var("ADMIN_LOGIN_ACCEPT_IP") {
        Ok(val) => val,
        Err(_) => {
            log::warn!("ADMIN_LOGIN_ACCEPT_IP is not set. Denying all admin access.");
            return false;
        }
    };

    if allowed_ips_str.trim() == "*" {
        return true;
    }

    // Behind a reverse proxy the first X-Forwarded-For entry is the client.
    let request_ip = ctx
        .head()
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| ctx.head().peer_addr.map(|addr| addr.ip().to_string()));

    let peer_addr = match request_ip {
        Some(ip) => ip,
        None => {
            log::warn!("Could not determine peer IP address for admin request.");
            return false;
        }
    };

    let is_allowed = ip_allowed(&allowed_ips_str, &peer_addr);
    if !is_allowed {
        log::warn!("Blocked admin request from unauthorized IP: {}", peer_addr);
    }
    is_allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn allow_list_matching() {
        assert!(ip_allowed("*", "203.0.113.9"));
        assert!(ip_allowed("10.0.0.1, 203.0.113.9", "203.0.113.9"));
        assert!(!ip_allowed("10.0.0.1", "203.0.113.9"));
        assert!(!ip_allowed("", "203.0.113.9"));
    }

    #[actix_web::test]
    async fn only_admin_sessions_are_extracted() {
        let req = TestRequest::default().to_http_request();
        assert!(AuthenticatedAdmin::extract(&req).await.is_err());

        let session = req.get_session();
        session.insert("username", "root").unwrap();
        session.insert("role", "viewer").unwrap();
        assert!(!admin_guard(&session));
        assert!(AuthenticatedAdmin::extract(&req).await.is_err());

        session.insert("role", ROLE_ADMIN).unwrap();
        assert!(admin_guard(&session));
        let admin = AuthenticatedAdmin::extract(&req).await.unwrap();
        assert_eq!(admin.username, "root");
    }
}
