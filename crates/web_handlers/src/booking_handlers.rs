use actix_web::{HttpResponse, Result, web};
use uuid::Uuid;

use booking_services::{
    AvailabilityQuery, BookingError, BookingService, StayId, StayRequest, StayResponse,
};

/// Registers the booking routes under the current scope
pub fn booking_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/booking")
            .route("/available", web::get().to(available_dates))
            .route("", web::post().to(create_booking))
            .route("/{booking_id}", web::get().to(get_booking))
            .route("/{booking_id}", web::put().to(update_booking))
            .route("/{booking_id}", web::delete().to(cancel_booking)),
    );
}

/// Lists the dates nobody has booked in the requested window
pub async fn available_dates(
    service: web::Data<BookingService>,
    query: web::Query<AvailabilityQuery>,
) -> Result<HttpResponse, BookingError> {
    let dates = service
        .available_dates(query.start_date, query.end_date)
        .await?;

    Ok(HttpResponse::Ok().json(dates))
}

/// Books a new stay. Returns 201 Created with the stay and its id.
pub async fn create_booking(
    service: web::Data<BookingService>,
    request: web::Json<StayRequest>,
) -> Result<HttpResponse, BookingError> {
    let stay = service.create(&request).await?;

    Ok(HttpResponse::Created().json(StayResponse::from(&stay)))
}

/// Gets a stay by id
pub async fn get_booking(
    service: web::Data<BookingService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, BookingError> {
    let stay = service.find(StayId(path.into_inner())).await?;

    Ok(HttpResponse::Ok().json(StayResponse::from(&stay)))
}

/// Changes some or all fields of a stay
pub async fn update_booking(
    service: web::Data<BookingService>,
    path: web::Path<Uuid>,
    request: web::Json<StayRequest>,
) -> Result<HttpResponse, BookingError> {
    let stay = service
        .update(StayId(path.into_inner()), &request)
        .await?;

    Ok(HttpResponse::Ok().json(StayResponse::from(&stay)))
}

/// Cancels a stay
pub async fn cancel_booking(
    service: web::Data<BookingService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, BookingError> {
    service.cancel(StayId(path.into_inner())).await?;

    Ok(HttpResponse::NoContent().finish())
}
