use actix_web::{get, post, route, web, HttpRequest, HttpResponse};
use alma::constants::{ALLOWED_INSTALLMENTS_COUNTS, SIGNATURE_HEADER};
use alma::{
    handle_notification, initiate_payment, refresh_status, CheckoutUrls, EligibilityQuery,
    GatewayConfig, LocalPayment, NotificationRequest, NotifyError, PaymentStatus,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::metrics;
use crate::state::{bearer_matches, AppState};

#[derive(Deserialize)]
pub struct PidQuery {
    pub pid: Option<String>,
}

#[derive(Deserialize)]
pub struct NewPayment {
    pub id: i64,
    pub amount: i64,
    pub currency: String,
}

#[derive(Deserialize)]
pub struct PlanQuery {
    pub purchase_amount: i64,
    pub installments_count: Option<u8>,
    pub billing_country: Option<String>,
    pub shipping_country: Option<String>,
    pub locale: Option<String>,
}

fn authorization(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let mode = state.bridge.api_mode();
    match state.bridge.merchant_info().await {
        Some(merchant) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "alma-gateway",
            "mode": mode,
            "merchant": merchant.id,
        })),
        None => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "degraded",
            "service": "alma-gateway",
            "mode": mode,
            "error": "Alma API unreachable",
        })),
    }
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            if !bearer_matches(authorization(&req), token) {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            if !state.public_metrics {
                return HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "forbidden",
                    "message": "Set METRICS_TOKEN or ALMA_PUBLIC_METRICS=true to access /metrics"
                }));
            }
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

/// IPN callback. Alma may call it with either method.
#[route("/payments/{id}/notify", method = "GET", method = "POST")]
pub async fn notify(
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<PidQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let local_id = path.into_inner();
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let request = NotificationRequest::new(query.into_inner().pid, signature);

    let start = std::time::Instant::now();
    let result = handle_notification(&state.bridge, state.payments.as_ref(), local_id, request).await;
    metrics::RECONCILE_LATENCY
        .with_label_values(&["notify"])
        .observe(start.elapsed().as_secs_f64());

    match result {
        Ok(ack) => {
            metrics::NOTIFICATIONS.with_label_values(&["success"]).inc();
            Ok(HttpResponse::Ok().json(ack))
        }
        Err(e) => {
            metrics::NOTIFICATIONS.with_label_values(&[e.kind()]).inc();
            match &e {
                NotifyError::MissingSignature => {
                    metrics::SIGNATURE_FAILURES.with_label_values(&["missing"]).inc();
                }
                NotifyError::Signature(_) => {
                    metrics::SIGNATURE_FAILURES.with_label_values(&["invalid"]).inc();
                }
                _ => {}
            }
            Err(e.into())
        }
    }
}

/// Customer return and status polling.
#[get("/payments/{id}/status")]
pub async fn status(
    path: web::Path<i64>,
    query: web::Query<PidQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let local_id = path.into_inner();

    let start = std::time::Instant::now();
    let resolved = refresh_status(
        &state.bridge,
        state.payments.as_ref(),
        local_id,
        query.pid.as_deref(),
    )
    .await;
    metrics::RECONCILE_LATENCY
        .with_label_values(&["status"])
        .observe(start.elapsed().as_secs_f64());
    let status = resolved?.ok_or(ApiError::PaymentNotFound(local_id))?;

    let label = match status {
        PaymentStatus::New => "new",
        PaymentStatus::Pending => "pending",
        PaymentStatus::Captured => "captured",
        PaymentStatus::Failed => "failed",
    };
    metrics::STATUS_RESOLUTIONS.with_label_values(&[label]).inc();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "payment": local_id,
        "status": status,
    })))
}

/// Register a local payment. Stands in for the host order system.
#[post("/payments")]
pub async fn create_payment(
    body: web::Json<NewPayment>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    if body.amount <= 0 {
        return Err(ApiError::BadRequest("amount must be positive".to_string()));
    }
    if state.payments.find(body.id).is_some() {
        return Err(ApiError::PaymentExists(body.id));
    }
    let payment = LocalPayment::new(body.id, body.amount, body.currency);
    state.payments.save(payment.clone());
    tracing::info!(payment_id = payment.id, amount = payment.amount, "payment registered");
    Ok(HttpResponse::Created().json(payment))
}

#[post("/payments/{id}/checkout")]
pub async fn checkout(
    path: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let local_id = path.into_inner();
    let mut payment = state
        .payments
        .find(local_id)
        .ok_or(ApiError::PaymentNotFound(local_id))?;

    let urls = CheckoutUrls::for_payment(&state.public_base_url, local_id);
    let payload =
        initiate_payment(&state.bridge, state.data_builder.as_ref(), &mut payment, &urls).await?;
    state.payments.save(payment);

    Ok(HttpResponse::Ok().json(payload))
}

/// Installment-plan figures for a cart. Empty body when there is nothing to show.
#[get("/installment-plan")]
pub async fn installment_plan(
    query: Option<web::Query<PlanQuery>>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let Some(query) = query.map(web::Query::into_inner) else {
        return HttpResponse::Ok().finish();
    };
    let count = query
        .installments_count
        .unwrap_or_else(|| state.bridge.gateway_config().installments_count);
    if !ALLOWED_INSTALLMENTS_COUNTS.contains(&count) {
        return HttpResponse::Ok().finish();
    }

    let cart = EligibilityQuery {
        purchase_amount: query.purchase_amount,
        billing_country: query.billing_country,
        shipping_country: query.shipping_country,
        locale: query.locale,
    };
    match alma::installment_plan(&state.bridge, &cart, count).await {
        Some(view) => HttpResponse::Ok().json(view),
        None => HttpResponse::Ok().finish(),
    }
}

/// Install new gateway credentials, then probe the merchant account.
#[post("/admin/gateway")]
pub async fn admin_gateway(
    req: HttpRequest,
    body: web::Json<GatewayConfig>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let Some(token) = &state.admin_token else {
        return Err(ApiError::Forbidden);
    };
    if !bearer_matches(authorization(&req), token) {
        tracing::warn!("admin request with missing or invalid token");
        return Err(ApiError::Unauthorized);
    }

    let config = body.into_inner();
    config
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let mode = config.api_mode;
    state.bridge.initialize(config);

    let merchant = state.bridge.merchant_info().await;
    if merchant.is_none() {
        tracing::warn!(mode = %mode, "new Alma credentials could not be verified");
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "mode": mode,
        "merchant": merchant.map(|m| m.id),
    })))
}
