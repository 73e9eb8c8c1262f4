use actix_web::{HttpResponse, Result};

/// Health check endpoint for the booking service
pub async fn booking_health() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "service": "booking",
        "status": "healthy",
        "timestamp": chrono::Utc::now()
    })))
}
