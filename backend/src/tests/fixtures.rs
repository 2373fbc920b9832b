//! Model builders for unit tests. Each returns a plausible row with fixed
//! identifiers; tests override the fields they care about.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use haulbase_shared::{
    Company, CompanyPlan, Customer, PricingMethod, Quotation, QuotationStatus, User, UserRole,
};

pub fn company() -> Company {
    Company {
        id: Uuid::new_v4(),
        name: "North Shore Moving".to_string(),
        email: Some("office@northshoremoving.example".to_string()),
        phone: Some("+15145550188".to_string()),
        address: Some("400 Rue Principale, Montreal".to_string()),
        plan: CompanyPlan::Pro,
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn user(company_id: Uuid, role: UserRole) -> User {
    User {
        id: Uuid::new_v4(),
        company_id,
        email: "dispatcher@northshoremoving.example".to_string(),
        password_hash: "$2b$12$abcdefghijklmnopqrstuv".to_string(),
        full_name: "Dana Tremblay".to_string(),
        role,
        avatar_url: None,
        push_token: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn customer(company_id: Uuid) -> Customer {
    Customer {
        id: Uuid::new_v4(),
        company_id,
        full_name: "Marc Leblanc".to_string(),
        email: Some("marc.leblanc@example.com".to_string()),
        phone: Some("+15145550123".to_string()),
        pickup_address: Some("12 Av. des Pins, Montreal".to_string()),
        dropoff_address: Some("88 Blvd. Saint-Laurent, Laval".to_string()),
        notes: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn quotation() -> Quotation {
    let company_id = Uuid::new_v4();
    Quotation {
        id: Uuid::new_v4(),
        company_id,
        customer_id: Uuid::new_v4(),
        created_by: Uuid::new_v4(),
        status: QuotationStatus::InProgress,
        quote_number: None,
        service_type: Some("Residential move".to_string()),
        moving_date: None,
        start_time: None,
        estimated_hours: None,
        start_at: None,
        end_at: None,
        workers: 2,
        trucks: 1,
        truck_size: None,
        pricing_method: PricingMethod::Hourly,
        hourly_rate: None,
        fixed_price: None,
        travel_cost: None,
        materials_cost: None,
        other_fees: None,
        discount: None,
        tax_tps: None,
        tax_tvq: None,
        total: Decimal::ZERO,
        estimated_volume_cft: None,
        estimated_weight_lbs: None,
        inventory_json: None,
        inventory_items: None,
        inventory_notes: None,
        pickup_address: Some("12 Av. des Pins, Montreal".to_string()),
        pickup_unit: None,
        pickup_floor: None,
        pickup_elevator: None,
        pickup_loading_dock: None,
        pickup_access_notes: None,
        dropoff_address: Some("88 Blvd. Saint-Laurent, Laval".to_string()),
        dropoff_unit: None,
        dropoff_floor: None,
        dropoff_elevator: None,
        dropoff_loading_dock: None,
        dropoff_access_notes: None,
        terms_text: None,
        internal_notes: None,
        notes: None,
        validity_days: None,
        public_token: None,
        sent_at: None,
        expires_at: None,
        sent_pdf_url: None,
        pdf_generated_at: None,
        last_reminder_at: None,
        signed_by: None,
        signed_at: None,
        signature: None,
        signed_ip: None,
        signed_device: None,
        created_at: Utc.with_ymd_and_hms(2025, 2, 20, 15, 0, 0).unwrap(),
        updated_at: None,
    }
}
