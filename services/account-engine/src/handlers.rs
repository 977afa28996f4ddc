use crate::errors::AccountEngineError;
use crate::metrics;
use crate::models::{describe_violations, CreateAccountRequest, OperationRequest, PageQuery};
use crate::services::AccountService;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "account-engine",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Create account endpoint
pub async fn create_account(
    service: web::Data<Arc<AccountService>>,
    request: web::Json<CreateAccountRequest>,
) -> Result<HttpResponse, AccountEngineError> {
    let account = service.create_account(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(account))
}

/// List all accounts, paginated
pub async fn list_accounts(
    service: web::Data<Arc<AccountService>>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AccountEngineError> {
    let page = service.list_accounts(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn get_account(
    service: web::Data<Arc<AccountService>>,
    account_id: web::Path<i64>,
) -> Result<HttpResponse, AccountEngineError> {
    let account = service.get_account(account_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn account_history(
    service: web::Data<Arc<AccountService>>,
    account_id: web::Path<i64>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AccountEngineError> {
    let page = service
        .account_history(account_id.into_inner(), query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn accounts_by_owner(
    service: web::Data<Arc<AccountService>>,
    owner_id: web::Path<i64>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AccountEngineError> {
    let page = service
        .list_accounts_by_owner(owner_id.into_inner(), query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Reports a bad path id and a bad body in one rejection.
fn operation_input<P>(
    path: Result<web::Path<P>, actix_web::Error>,
    request: Result<web::Json<OperationRequest>, actix_web::Error>,
) -> Result<(P, OperationRequest), AccountEngineError> {
    let mut violations = Vec::new();

    let ids = match path {
        Ok(path) => Some(path.into_inner()),
        Err(e) => {
            violations.push(format!("path: {}", extractor_message(&e)));
            None
        }
    };

    let request = match request {
        Ok(request) => {
            let request = request.into_inner();
            if let Err(errors) = request.validate() {
                violations.push(describe_violations(&errors));
            }
            Some(request)
        }
        Err(e) => {
            violations.push(format!("body: {}", extractor_message(&e)));
            None
        }
    };

    match (ids, request) {
        (Some(ids), Some(request)) if violations.is_empty() => Ok((ids, request)),
        _ => Err(AccountEngineError::Validation(violations.join("; "))),
    }
}

/// Extractor errors already went through the handlers in
/// `configure_extractors`; unwrap their message.
fn extractor_message(err: &actix_web::Error) -> String {
    match err.as_error::<AccountEngineError>() {
        Some(AccountEngineError::Validation(message)) => message.clone(),
        _ => err.to_string(),
    }
}

/// Withdraw endpoint
pub async fn withdraw(
    service: web::Data<Arc<AccountService>>,
    account_id: Result<web::Path<i64>, actix_web::Error>,
    request: Result<web::Json<OperationRequest>, actix_web::Error>,
) -> Result<HttpResponse, AccountEngineError> {
    let (account_id, request) = operation_input(account_id, request)?;
    let account = service.withdraw(account_id, request).await?;
    Ok(HttpResponse::Ok().json(account))
}

/// Deposit endpoint
pub async fn deposit(
    service: web::Data<Arc<AccountService>>,
    account_id: Result<web::Path<i64>, actix_web::Error>,
    request: Result<web::Json<OperationRequest>, actix_web::Error>,
) -> Result<HttpResponse, AccountEngineError> {
    let (account_id, request) = operation_input(account_id, request)?;
    let account = service.deposit(account_id, request).await?;
    Ok(HttpResponse::Ok().json(account))
}

/// Wire transfer endpoint; responds with the updated source account
pub async fn wire_transfer(
    service: web::Data<Arc<AccountService>>,
    path: Result<web::Path<(i64, i64)>, actix_web::Error>,
    request: Result<web::Json<OperationRequest>, actix_web::Error>,
) -> Result<HttpResponse, AccountEngineError> {
    let ((account_id, target_account_id), request) = operation_input(path, request)?;
    let account = service
        .wire_transfer(account_id, target_account_id, request)
        .await?;
    Ok(HttpResponse::Ok().json(account))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Malformed bodies, path ids and query strings are rejected with the
/// regular error body.
fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AccountEngineError::Validation(err.to_string()).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _req| {
        AccountEngineError::Validation(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        AccountEngineError::Validation(err.to_string()).into()
    }));
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    configure_extractors(cfg);

    cfg.service(
        web::scope("/api/v1/accounts")
            .route("", web::post().to(create_account))
            .route("", web::get().to(list_accounts))
            .route("/health", web::get().to(health_check))
            .route("/owners/{owner_id}", web::get().to(accounts_by_owner))
            .route("/{account_id}", web::get().to(get_account))
            .route("/{account_id}/history", web::get().to(account_history))
            .route("/{account_id}/withdraw", web::put().to(withdraw))
            .route("/{account_id}/deposit", web::put().to(deposit))
            .route(
                "/{account_id}/wire-transfer/{target_account_id}",
                web::put().to(wire_transfer),
            ),
    )
    .route("/metrics", web::get().to(metrics_endpoint))
    .route("/health", web::get().to(health_check));
}
