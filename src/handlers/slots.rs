use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::services::calendar::{generate_ics, InviteEvent};
use crate::services::nlu::time::normalize_time;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

fn resolve_date(date: Option<&str>) -> Result<String, AppError> {
    match date.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(Local::now().date_naive().to_string()),
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map(|parsed| parsed.to_string())
            .map_err(|_| AppError::BadRequest(format!("invalid date: {d}"))),
    }
}

pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let date = resolve_date(query.date.as_deref())?;
    let available = state.slots.available_slots(&date);
    Ok(Json(json!({ "date": date, "available_slots": available })))
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let date = resolve_date(query.date.as_deref())?;
    let bookings = state.slots.bookings(&date);
    Ok(Json(json!({ "date": date, "bookings": bookings })))
}

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub date: Option<String>,
    pub time: Option<String>,
}

pub async fn book(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BookRequest>,
) -> Result<Json<Value>, AppError> {
    let time = body
        .time
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(normalize_time)
        .ok_or_else(|| AppError::BadRequest("time is required".to_string()))?;
    let date = resolve_date(body.date.as_deref())?;

    let outcome = state.slots.book_specific(&date, &time);
    let mut response = json!({
        "success": outcome.success,
        "message": outcome.message,
    });

    if let Some(booking) = &outcome.booking {
        response["booking"] = json!(booking);
        let minutes = state.slots.slot_config().slot_duration_minutes;
        match InviteEvent::for_booking(booking, minutes) {
            Ok(event) => response["ics"] = Value::String(generate_ics(&event)),
            Err(e) => tracing::warn!(error = %e, "could not build invite for booking"),
        }
    }

    Ok(Json(response))
}
