use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::service::AuthContext;
use crate::db::models::{AccountSummary, Origin, Role};
use crate::error::{AppError, AuthError};
use crate::AppState;

type Result<T> = std::result::Result<T, AppError>;

fn bearer_token(req: &HttpRequest) -> Result<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or(AppError::AuthError(AuthError::InvalidToken))
}

/// The throttling key uses the socket peer only. Forwarding headers are
/// client-controlled and never consulted.
fn origin(req: &HttpRequest) -> Origin {
    let ip_address = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    Origin::new(ip_address, user_agent)
}

async fn authenticated(req: &HttpRequest, state: &AppState) -> Result<AuthContext> {
    state.auth_service.authenticate(bearer_token(req)?).await
}

async fn admin(req: &HttpRequest, state: &AppState) -> Result<AuthContext> {
    state.auth_service.authorize(bearer_token(req)?, &[Role::Admin]).await
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

pub async fn register(
    req: HttpRequest,
    body: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    info!("Received registration request for email: {}", body.email);
    let response = state
        .auth_service
        .register(&body.email, &body.password, &body.name, origin(&req))
        .await
        .map_err(|e| {
            error!("Registration failed for email: {}: {}", body.email, e);
            e
        })?;

    Ok(HttpResponse::Created().json(response))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    req: HttpRequest,
    body: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let response = state
        .auth_service
        .login(&body.email, &body.password, origin(&req))
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    state.auth_service.logout(bearer_token(&req)?).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    body: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let access_token = state.auth_service.refresh_session(&body.refresh_token).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "access_token": access_token
    })))
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

pub async fn request_password_reset(
    body: web::Json<PasswordResetRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let message = state.auth_service.request_password_reset(&body.email).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": message })))
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
}

pub async fn confirm_password_reset(
    body: web::Json<PasswordResetConfirm>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state
        .auth_service
        .confirm_password_reset(&body.token, &body.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password reset successfully"
    })))
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub token: String,
    pub password: String,
}

pub async fn accept_invitation(
    req: HttpRequest,
    body: web::Json<AcceptInvitationRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let response = state
        .auth_service
        .accept_invitation(&body.token, &body.password, origin(&req))
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

pub async fn profile(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let ctx = authenticated(&req, &state).await?;
    let profile = state.auth_service.get_profile(ctx.account_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "user": profile })))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    req: HttpRequest,
    body: web::Json<ChangePasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let ctx = authenticated(&req, &state).await?;
    state
        .auth_service
        .change_password(ctx.account_id, &body.current_password, &body.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password changed successfully"
    })))
}

pub async fn list_sessions(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let ctx = authenticated(&req, &state).await?;
    let sessions = state.auth_service.get_active_sessions(ctx.account_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    })))
}

pub async fn revoke_session(
    req: HttpRequest,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let ctx = authenticated(&req, &state).await?;
    state
        .auth_service
        .revoke_session(ctx.account_id, path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Session revoked successfully"
    })))
}

pub async fn revoke_other_sessions(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let ctx = authenticated(&req, &state).await?;
    let revoked = state
        .auth_service
        .revoke_other_sessions(ctx.account_id, &ctx.access_token)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "All other sessions revoked successfully",
        "revoked": revoked,
    })))
}

#[derive(Debug, Deserialize)]
pub struct InviteUserRequest {
    pub email: String,
    pub name: String,
    pub role: Role,
}

pub async fn invite_user(
    req: HttpRequest,
    body: web::Json<InviteUserRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let ctx = admin(&req, &state).await?;
    let token = state
        .auth_service
        .invite_user(&ctx, &body.email, &body.name, body.role)
        .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Invitation sent successfully",
        "invitation_token": token,
    })))
}

pub async fn list_invitations(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let ctx = admin(&req, &state).await?;
    let pending = state.auth_service.list_pending_invitations(&ctx).await?;
    let invitations: Vec<serde_json::Value> = pending
        .iter()
        .map(|account| {
            serde_json::json!({
                "user": AccountSummary::from(account),
                "invitation_sent_at": account.invitation_sent_at,
                "invited_by": account.invited_by,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": invitations.len(),
        "invitations": invitations,
    })))
}

pub async fn resend_invitation(
    req: HttpRequest,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let ctx = admin(&req, &state).await?;
    let token = state
        .auth_service
        .resend_invitation(&ctx, path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Invitation resent successfully",
        "invitation_token": token,
    })))
}

pub async fn cancel_invitation(
    req: HttpRequest,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let ctx = admin(&req, &state).await?;
    state
        .auth_service
        .cancel_invitation(&ctx, path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Invitation cancelled successfully"
    })))
}

/// Mounts every route under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/logout", web::post().to(logout))
                    .route("/refresh", web::post().to(refresh))
                    .route("/password-reset/request", web::post().to(request_password_reset))
                    .route("/password-reset/confirm", web::post().to(confirm_password_reset))
                    .route("/accept-invitation", web::post().to(accept_invitation)),
            )
            .route("/profile", web::get().to(profile))
            .route("/password/change", web::post().to(change_password))
            .route("/sessions", web::get().to(list_sessions))
            .route("/sessions", web::delete().to(revoke_other_sessions))
            .route("/sessions/{id}", web::delete().to(revoke_session))
            .service(
                web::scope("/admin")
                    .route("/invite", web::post().to(invite_user))
                    .route("/invitations", web::get().to(list_invitations))
                    .route("/invitations/{id}/resend", web::post().to(resend_invitation))
                    .route("/invitations/{id}", web::delete().to(cancel_invitation)),
            ),
    );
}
