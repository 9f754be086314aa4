use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use ulid::Ulid;

use crate::engine::{BookingError, Engine, ReservationFilter};
use crate::model::*;

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/offices", get(list_offices).post(register_office))
        .route(
            "/offices/:id",
            get(show_office).put(update_office).delete(delist_office),
        )
        .route("/reservations", get(my_reservations).post(book))
        .route("/reservations/:id", delete(cancel))
        .route("/host/reservations", get(host_reservations))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

// ── Identity ─────────────────────────────────────────────────────

/// The authenticated user id, taken from `Authorization: Bearer <ulid>`.
/// Authentication itself happens upstream; the identity handed in is trusted.
pub struct Identity(pub Ulid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;
        let token = value.strip_prefix("Bearer ").ok_or(ApiError::Unauthenticated)?;
        let user_id = Ulid::from_string(token.trim()).map_err(|_| ApiError::Unauthenticated)?;
        Ok(Identity(user_id))
    }
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("{message}")]
    Invalid {
        field: &'static str,
        message: &'static str,
    },

    #[error("you do not own this office")]
    NotOfficeOwner,

    #[error(transparent)]
    Booking(#[from] BookingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, field) = match &self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "authorization"),
            ApiError::Invalid { field, .. } => (StatusCode::UNPROCESSABLE_ENTITY, *field),
            ApiError::NotOfficeOwner => (StatusCode::FORBIDDEN, "office_id"),
            ApiError::Booking(e) => match e {
                BookingError::OfficeNotFound(_) => (StatusCode::NOT_FOUND, "office_id"),
                BookingError::OfficeNotBookable(_)
                | BookingError::SelfBookingForbidden
                | BookingError::DateConflict(_)
                | BookingError::MinimumStayViolation(_)
                | BookingError::AlreadyExists(_)
                | BookingError::HasActiveReservations(_)
                | BookingError::LimitExceeded(_) => (StatusCode::UNPROCESSABLE_ENTITY, "office_id"),
                BookingError::InvalidDates => (StatusCode::UNPROCESSABLE_ENTITY, "start_date"),
                BookingError::ReservationNotFound(_) => (StatusCode::NOT_FOUND, "reservation"),
                BookingError::NotOwner => (StatusCode::FORBIDDEN, "reservation"),
                BookingError::AlreadyCancelled | BookingError::TooLateToCancel => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "reservation")
                }
                BookingError::Busy => (StatusCode::SERVICE_UNAVAILABLE, "office_id"),
                BookingError::WalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server"),
            },
        };

        // Persistence failures are logged in full but never leak details.
        let message = match &self {
            ApiError::Booking(BookingError::WalError(e)) => {
                tracing::error!("persistence failure: {e}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let mut errors = serde_json::Map::new();
        errors.insert(field.to_string(), serde_json::Value::String(message));
        let body = serde_json::json!({ "errors": errors });
        (status, Json(body)).into_response()
    }
}

// ── Wire shapes ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub office_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct ReservationBody {
    pub id: Ulid,
    pub office_id: Ulid,
    pub user_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// 1 = Active, 2 = Cancelled.
    pub status: u8,
    pub price: i64,
    /// Only present on the guest's own reservations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_password: Option<String>,
}

impl ReservationBody {
    fn from_reservation(r: &Reservation, include_secret: bool) -> Self {
        Self {
            id: r.id,
            office_id: r.office_id,
            user_id: r.user_id,
            start_date: r.range.start,
            end_date: r.range.end,
            status: r.status.as_wire(),
            price: r.price,
            wifi_password: include_secret.then(|| r.wifi_password.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReservationListQuery {
    pub office_id: Option<Ulid>,
    pub user_id: Option<Ulid>,
    pub status: Option<u8>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl ReservationListQuery {
    fn into_filter(self) -> Result<ReservationFilter, ApiError> {
        let status = match self.status {
            None => None,
            Some(v) => Some(ReservationStatus::from_wire(v).ok_or(ApiError::Invalid {
                field: "status",
                message: "status must be 1 (active) or 2 (cancelled)",
            })?),
        };
        let window = match (self.from_date, self.to_date) {
            (None, None) => None,
            (Some(from), Some(to)) if from < to => Some(DateRange::new(from, to)),
            _ => {
                return Err(ApiError::Invalid {
                    field: "from_date",
                    message: "from_date and to_date are required together, from before to",
                });
            }
        };
        Ok(ReservationFilter {
            office_id: self.office_id,
            user_id: None,
            status,
            window,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterOfficeRequest {
    pub name: String,
    pub price_per_day: i64,
    pub monthly_discount: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOfficeRequest {
    pub name: Option<String>,
    pub price_per_day: Option<i64>,
    pub monthly_discount: Option<u8>,
    pub hidden: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct OfficeListQuery {
    pub user_id: Option<Ulid>,
}

#[derive(Debug, Serialize)]
pub struct OfficeBody {
    pub id: Ulid,
    pub user_id: Ulid,
    pub name: String,
    pub price_per_day: i64,
    pub monthly_discount: Option<u8>,
    /// 1 = Pending, 2 = Approved.
    pub approval_status: u8,
    pub hidden: bool,
    pub reservations_count: usize,
}

impl OfficeBody {
    fn from_summary(s: &OfficeSummary) -> Self {
        Self {
            id: s.office.id,
            user_id: s.office.owner_id,
            name: s.office.name.clone(),
            price_per_day: s.office.price_per_day,
            monthly_discount: s.office.monthly_discount,
            approval_status: s.office.approval.as_wire(),
            hidden: s.office.hidden,
            reservations_count: s.active_reservations,
        }
    }
}

// ── Reservation handlers ─────────────────────────────────────────

async fn book(
    State(engine): State<Arc<Engine>>,
    Identity(user_id): Identity,
    Json(req): Json<BookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reservation = engine
        .create_reservation(user_id, req.office_id, req.start_date, req.end_date)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ReservationBody::from_reservation(&reservation, true)),
    ))
}

async fn cancel(
    State(engine): State<Arc<Engine>>,
    Identity(user_id): Identity,
    Path(id): Path<Ulid>,
) -> Result<Json<ReservationBody>, ApiError> {
    let reservation = engine.cancel_reservation(user_id, id).await?;
    Ok(Json(ReservationBody::from_reservation(&reservation, true)))
}

async fn my_reservations(
    State(engine): State<Arc<Engine>>,
    Identity(user_id): Identity,
    Query(query): Query<ReservationListQuery>,
) -> Result<Json<Vec<ReservationBody>>, ApiError> {
    let filter = query.into_filter()?;
    let reservations = engine.user_reservations(user_id, &filter).await;
    Ok(Json(
        reservations
            .iter()
            .map(|r| ReservationBody::from_reservation(r, true))
            .collect(),
    ))
}

async fn host_reservations(
    State(engine): State<Arc<Engine>>,
    Identity(host_id): Identity,
    Query(query): Query<ReservationListQuery>,
) -> Result<Json<Vec<ReservationBody>>, ApiError> {
    let guest = query.user_id;
    let mut filter = query.into_filter()?;
    filter.user_id = guest;
    let reservations = engine.host_reservations(host_id, &filter).await;
    // Hosts see who stays when, not the guests' access credentials.
    Ok(Json(
        reservations
            .iter()
            .map(|r| ReservationBody::from_reservation(r, false))
            .collect(),
    ))
}

// ── Office handlers ──────────────────────────────────────────────

async fn list_offices(
    State(engine): State<Arc<Engine>>,
    caller: Option<Identity>,
    Query(query): Query<OfficeListQuery>,
) -> Json<Vec<OfficeBody>> {
    // Owners asking for their own listings see pending and hidden ones too.
    let owner_view = match query.user_id {
        Some(user_id) if caller.as_ref().is_some_and(|Identity(c)| *c == user_id) => Some(user_id),
        _ => None,
    };
    let mut summaries = engine.list_offices(owner_view).await;
    if owner_view.is_none()
        && let Some(user_id) = query.user_id
    {
        summaries.retain(|s| s.office.owner_id == user_id);
    }
    Json(summaries.iter().map(OfficeBody::from_summary).collect())
}

async fn show_office(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Ulid>,
) -> Result<Json<OfficeBody>, ApiError> {
    let summary = engine
        .office_summary(&id)
        .await
        .ok_or(BookingError::OfficeNotFound(id))?;
    Ok(Json(OfficeBody::from_summary(&summary)))
}

async fn register_office(
    State(engine): State<Arc<Engine>>,
    Identity(user_id): Identity,
    Json(req): Json<RegisterOfficeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let office = Office {
        id: Ulid::new(),
        owner_id: user_id,
        name: req.name,
        price_per_day: req.price_per_day,
        monthly_discount: req.monthly_discount,
        approval: ApprovalStatus::Pending,
        hidden: false,
    };
    engine.register_office(office.clone()).await?;
    Ok((
        StatusCode::CREATED,
        Json(OfficeBody::from_summary(&OfficeSummary {
            office,
            active_reservations: 0,
        })),
    ))
}

async fn update_office(
    State(engine): State<Arc<Engine>>,
    Identity(user_id): Identity,
    Path(id): Path<Ulid>,
    Json(req): Json<UpdateOfficeRequest>,
) -> Result<Json<OfficeBody>, ApiError> {
    let current = engine
        .office_summary(&id)
        .await
        .ok_or(BookingError::OfficeNotFound(id))?;
    if current.office.owner_id != user_id {
        return Err(ApiError::NotOfficeOwner);
    }

    let name = req.name.unwrap_or_else(|| current.office.name.clone());
    let price_per_day = req.price_per_day.unwrap_or(current.office.price_per_day);
    let monthly_discount = req.monthly_discount.or(current.office.monthly_discount);
    let hidden = req.hidden.unwrap_or(current.office.hidden);
    // Repricing sends the listing back to review.
    let approval = if price_per_day != current.office.price_per_day {
        ApprovalStatus::Pending
    } else {
        current.office.approval
    };

    let office = engine
        .update_office(id, name, price_per_day, monthly_discount, approval, hidden)
        .await?;
    Ok(Json(OfficeBody::from_summary(&OfficeSummary {
        office,
        active_reservations: current.active_reservations,
    })))
}

async fn delist_office(
    State(engine): State<Arc<Engine>>,
    Identity(user_id): Identity,
    Path(id): Path<Ulid>,
) -> Result<StatusCode, ApiError> {
    let current = engine
        .office_summary(&id)
        .await
        .ok_or(BookingError::OfficeNotFound(id))?;
    if current.office.owner_id != user_id {
        return Err(ApiError::NotOfficeOwner);
    }
    engine.delist_office(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
