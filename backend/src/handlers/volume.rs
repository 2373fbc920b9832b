//! Volume estimator: room-by-room inventory totals mapped to a truck
//! recommendation and crew size. Saves are capped per month on Starter.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::policy;
use crate::error::{ApiResult, AppError, ValidationBuilder};
use crate::AppState;
use haulbase_shared::{CompanyPlan, QuotationStatus, VolumeCalculation};

pub fn volume_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calculate", post(calculate))
        .route("/save", post(save_calculation))
        .route("/", get(list_calculations))
        .route("/:id", get(get_calculation).delete(delete_calculation))
        .route("/:id/attach/:quotation_id", post(attach_to_quotation))
}

/// One truck load is 1700 cubic feet of nominal capacity.
const TRUCK_CAPACITY_CFT: u32 = 1700;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInput {
    pub name: String,
    pub quantity: i32,
    pub volume_cft: Decimal,
    pub weight_lbs: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInput {
    pub room: String,
    pub items: Vec<ItemInput>,
}

#[derive(Debug, Serialize)]
pub struct VolumeSummary {
    pub total_volume_cft: Decimal,
    pub total_weight_lbs: Decimal,
    pub total_items: i32,
    pub suggested_truck: &'static str,
    pub suggested_workers: i32,
    pub truck_capacity_percent: i32,
}

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub rooms: Vec<RoomInput>,
}

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    pub label: Option<String>,
    pub rooms: Vec<RoomInput>,
}

pub fn suggested_truck(volume: Decimal) -> &'static str {
    if volume <= Decimal::from(200) {
        "10 FT Truck"
    } else if volume <= Decimal::from(400) {
        "16 FT Truck"
    } else if volume <= Decimal::from(650) {
        "20 FT Truck"
    } else if volume <= Decimal::from(1000) {
        "26 FT Truck"
    } else {
        "26 FT Truck x 2"
    }
}

pub fn suggested_workers(volume: Decimal) -> i32 {
    if volume <= Decimal::from(300) {
        2
    } else if volume <= Decimal::from(600) {
        3
    } else if volume <= Decimal::from(900) {
        4
    } else {
        5
    }
}

/// Percentage of one truck load used, clamped to 100.
pub fn capacity_percent(volume: Decimal) -> i32 {
    let percent = (volume / Decimal::from(TRUCK_CAPACITY_CFT) * Decimal::from(100))
        .round()
        .to_i32()
        .unwrap_or(100);
    percent.min(100)
}

pub fn summarize(rooms: &[RoomInput]) -> VolumeSummary {
    let mut total_volume = Decimal::ZERO;
    let mut total_weight = Decimal::ZERO;
    let mut total_items = 0i32;

    for room in rooms {
        for item in &room.items {
            let quantity = Decimal::from(item.quantity.max(0));
            total_volume += item.volume_cft * quantity;
            if let Some(weight) = item.weight_lbs {
                total_weight += weight * quantity;
            }
            total_items += item.quantity.max(0);
        }
    }

    VolumeSummary {
        total_volume_cft: total_volume,
        total_weight_lbs: total_weight,
        total_items,
        suggested_truck: suggested_truck(total_volume),
        suggested_workers: suggested_workers(total_volume),
        truck_capacity_percent: capacity_percent(total_volume),
    }
}

fn validate_rooms(rooms: &[RoomInput]) -> ApiResult<()> {
    if let Some(err) = ValidationBuilder::new()
        .require(!rooms.is_empty(), "rooms", "At least one room is required")
        .require(
            rooms.iter().all(|r| {
                r.items
                    .iter()
                    .all(|i| i.quantity > 0 && i.volume_cft >= Decimal::ZERO)
            }),
            "rooms",
            "Item quantities must be positive and volumes non-negative",
        )
        .build()
    {
        return Err(err);
    }
    Ok(())
}

async fn calculate(
    _auth: AuthUser,
    Json(payload): Json<CalculateRequest>,
) -> ApiResult<Json<VolumeSummary>> {
    validate_rooms(&payload.rooms)?;
    Ok(Json(summarize(&payload.rooms)))
}

async fn save_calculation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<SaveRequest>,
) -> ApiResult<(StatusCode, Json<VolumeCalculation>)> {
    validate_rooms(&payload.rooms)?;

    let plan: CompanyPlan = sqlx::query_scalar("SELECT plan FROM companies WHERE id = $1")
        .bind(auth.user.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    // Saves are counted within the current calendar month.
    let saves_this_month: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM volume_calculations \
         WHERE company_id = $1 AND created_at >= date_trunc('month', NOW())",
    )
    .bind(auth.user.company_id)
    .fetch_one(&state.db_pool)
    .await?;

    policy::check_volume_save_cap(plan, saves_this_month)?;

    let summary = summarize(&payload.rooms);
    let rooms_json = serde_json::to_value(&payload.rooms)
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    let calculation = sqlx::query_as::<_, VolumeCalculation>(
        r#"
        INSERT INTO volume_calculations
            (company_id, created_by, label, rooms, total_volume_cft, total_weight_lbs,
             total_items, suggested_truck, suggested_workers, truck_capacity_percent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(auth.user.company_id)
    .bind(auth.user.id)
    .bind(payload.label.as_deref().map(str::trim))
    .bind(rooms_json)
    .bind(summary.total_volume_cft)
    .bind(summary.total_weight_lbs)
    .bind(summary.total_items)
    .bind(summary.suggested_truck)
    .bind(summary.suggested_workers)
    .bind(summary.truck_capacity_percent)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(calculation)))
}

async fn list_calculations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<VolumeCalculation>>> {
    let calculations = sqlx::query_as::<_, VolumeCalculation>(
        "SELECT * FROM volume_calculations WHERE company_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth.user.company_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(calculations))
}

async fn get_calculation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<VolumeCalculation>> {
    let calculation = sqlx::query_as::<_, VolumeCalculation>(
        "SELECT * FROM volume_calculations WHERE id = $1 AND company_id = $2",
    )
    .bind(id)
    .bind(auth.user.company_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Volume calculation".to_string()))?;

    Ok(Json(calculation))
}

async fn delete_calculation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<StatusCode> {
    let result = sqlx::query(
        "DELETE FROM volume_calculations WHERE id = $1 AND company_id = $2",
    )
    .bind(id)
    .bind(auth.user.company_id)
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Volume calculation".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Copy a saved estimate onto an editable quotation, overwriting its
/// inventory snapshot and sizing suggestions.
async fn attach_to_quotation(
    State(state): State<Arc<AppState>>,
    Path((id, quotation_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    policy::require_admin(&auth.user)?;

    let calculation = sqlx::query_as::<_, VolumeCalculation>(
        "SELECT * FROM volume_calculations WHERE id = $1 AND company_id = $2",
    )
    .bind(id)
    .bind(auth.user.company_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Volume calculation".to_string()))?;

    let status: Option<QuotationStatus> = sqlx::query_scalar(
        "SELECT status FROM quotations WHERE id = $1 AND company_id = $2",
    )
    .bind(quotation_id)
    .bind(auth.user.company_id)
    .fetch_optional(&state.db_pool)
    .await?;
    let Some(status) = status else {
        return Err(AppError::NotFound("Quotation".to_string()));
    };
    if !status.is_editable() {
        return Err(AppError::BadRequest(
            "Quotation can no longer be edited".to_string(),
        ));
    }

    let weight = if calculation.total_weight_lbs > Decimal::ZERO {
        Some(calculation.total_weight_lbs)
    } else {
        None
    };

    sqlx::query(
        r#"
        UPDATE quotations SET
            inventory_json = $3, estimated_volume_cft = $4, inventory_items = $5,
            estimated_weight_lbs = COALESCE($6, estimated_weight_lbs),
            truck_size = $7, workers = $8, updated_at = NOW()
        WHERE id = $1 AND company_id = $2
        "#,
    )
    .bind(quotation_id)
    .bind(auth.user.company_id)
    .bind(&calculation.rooms)
    .bind(calculation.total_volume_cft)
    .bind(calculation.total_items)
    .bind(weight)
    .bind(&calculation.suggested_truck)
    .bind(calculation.suggested_workers)
    .execute(&state.db_pool)
    .await?;

    sqlx::query("UPDATE volume_calculations SET quotation_id = $2 WHERE id = $1")
        .bind(id)
        .bind(quotation_id)
        .execute(&state.db_pool)
        .await?;

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_truck_thresholds() {
        assert_eq!(suggested_truck(dec("150")), "10 FT Truck");
        assert_eq!(suggested_truck(dec("200")), "10 FT Truck");
        assert_eq!(suggested_truck(dec("200.5")), "16 FT Truck");
        assert_eq!(suggested_truck(dec("400")), "16 FT Truck");
        assert_eq!(suggested_truck(dec("650")), "20 FT Truck");
        assert_eq!(suggested_truck(dec("1000")), "26 FT Truck");
        assert_eq!(suggested_truck(dec("1001")), "26 FT Truck x 2");
    }

    #[test]
    fn test_worker_thresholds() {
        assert_eq!(suggested_workers(dec("300")), 2);
        assert_eq!(suggested_workers(dec("301")), 3);
        assert_eq!(suggested_workers(dec("600")), 3);
        assert_eq!(suggested_workers(dec("900")), 4);
        assert_eq!(suggested_workers(dec("901")), 5);
    }

    #[test]
    fn test_capacity_percent_clamped() {
        assert_eq!(capacity_percent(dec("0")), 0);
        assert_eq!(capacity_percent(dec("850")), 50);
        assert_eq!(capacity_percent(dec("1700")), 100);
        assert_eq!(capacity_percent(dec("5000")), 100);
    }

    #[test]
    fn test_summarize_mixed_rooms() {
        let rooms = vec![
            RoomInput {
                room: "Living room".to_string(),
                items: vec![ItemInput {
                    name: "Sofa".to_string(),
                    quantity: 2,
                    volume_cft: dec("70"),
                    weight_lbs: Some(dec("180")),
                }],
            },
            RoomInput {
                room: "Office".to_string(),
                items: vec![ItemInput {
                    name: "Desk".to_string(),
                    quantity: 1,
                    volume_cft: dec("45"),
                    weight_lbs: None,
                }],
            },
        ];

        let summary = summarize(&rooms);
        assert_eq!(summary.total_volume_cft, dec("185"));
        assert_eq!(summary.total_weight_lbs, dec("360"));
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.suggested_truck, "10 FT Truck");
        assert_eq!(summary.suggested_workers, 2);
        assert_eq!(summary.truck_capacity_percent, 11);
    }
}
