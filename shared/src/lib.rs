use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "company_plan", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum CompanyPlan {
    Starter,
    Pro,
    Elite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum UserRole {
    Owner,
    Manager,
    Employee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "employee_status", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum EmployeeStatus {
    Pending,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "quotation_status", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum QuotationStatus {
    InProgress,
    Draft,
    Sent,
    Signed,
    Rejected,
    Expired,
    Archived,
}

impl QuotationStatus {
    /// Editing and sending are only allowed before the customer sees a final document.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::InProgress | Self::Draft)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "job_status", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum JobStatus {
    Pending,
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Missed,
    AutoEnded,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Missed | Self::AutoEnded
        )
    }

    /// Calendar display color per status.
    pub fn calendar_color(&self) -> &'static str {
        match self {
            Self::Confirmed => "#2A9D8F",
            Self::InProgress => "#457B9D",
            Self::Completed => "#6C757D",
            _ => "#E63946",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "job_role", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum JobRole {
    TeamLead,
    Driver,
    Mover,
}

impl From<&str> for JobRole {
    fn from(s: &str) -> Self {
        match s.trim().to_uppercase().replace([' ', '-'], "_").as_str() {
            "TEAM_LEAD" | "TEAMLEAD" | "LEAD" => JobRole::TeamLead,
            "DRIVER" => JobRole::Driver,
            _ => JobRole::Mover,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "punch_out_type", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum PunchOutType {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "invoice_status", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum InvoiceStatus {
    Draft,
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "pricing_method", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum PricingMethod {
    Hourly,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "conversation_kind", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ConversationKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "notification_kind", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum NotificationKind {
    JobStarted,
    JobCompleted,
    JobCancelled,
    JobMissed,
    JobAutoEnded,
    JobAssigned,
    System,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub plan: CompanyPlan,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub status: EmployeeStatus,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub hourly_rate: Option<Decimal>,
    /// AES-256-GCM ciphertext, base64. Never serialized out.
    #[serde(skip_serializing)]
    pub sin_encrypted: Option<String>,
    #[serde(skip_serializing)]
    pub confirmation_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub company_id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quotation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub created_by: Uuid,
    pub status: QuotationStatus,
    /// Assigned lazily the first time the quotation leaves IN_PROGRESS; never reassigned.
    pub quote_number: Option<i32>,

    pub service_type: Option<String>,
    pub moving_date: Option<NaiveDate>,
    /// "HH:MM", day-local start of the move.
    pub start_time: Option<String>,
    pub estimated_hours: Option<Decimal>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,

    pub workers: i32,
    pub trucks: i32,
    pub truck_size: Option<String>,
    pub pricing_method: PricingMethod,
    pub hourly_rate: Option<Decimal>,
    pub fixed_price: Option<Decimal>,
    pub travel_cost: Option<Decimal>,
    pub materials_cost: Option<Decimal>,
    pub other_fees: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub tax_tps: Option<Decimal>,
    pub tax_tvq: Option<Decimal>,
    pub total: Decimal,

    pub estimated_volume_cft: Option<Decimal>,
    pub estimated_weight_lbs: Option<Decimal>,
    pub inventory_json: Option<serde_json::Value>,
    pub inventory_items: Option<i32>,
    pub inventory_notes: Option<String>,

    pub pickup_address: Option<String>,
    pub pickup_unit: Option<String>,
    pub pickup_floor: Option<i32>,
    pub pickup_elevator: Option<bool>,
    pub pickup_loading_dock: Option<bool>,
    pub pickup_access_notes: Option<String>,
    pub dropoff_address: Option<String>,
    pub dropoff_unit: Option<String>,
    pub dropoff_floor: Option<i32>,
    pub dropoff_elevator: Option<bool>,
    pub dropoff_loading_dock: Option<bool>,
    pub dropoff_access_notes: Option<String>,

    pub terms_text: Option<String>,
    pub internal_notes: Option<String>,
    pub notes: Option<String>,
    pub validity_days: Option<i32>,

    pub public_token: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub sent_pdf_url: Option<String>,
    pub pdf_generated_at: Option<DateTime<Utc>>,
    pub last_reminder_at: Option<DateTime<Utc>>,

    pub signed_by: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub signature: Option<String>,
    pub signed_ip: Option<String>,
    pub signed_device: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub company_id: Uuid,
    pub quotation_id: Uuid,
    pub job_number: i32,
    pub status: JobStatus,
    pub title: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEmployee {
    pub id: Uuid,
    pub job_id: Uuid,
    pub employee_id: Uuid,
    pub role: JobRole,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimePunch {
    pub id: Uuid,
    pub job_id: Uuid,
    pub employee_id: Uuid,
    pub punch_in: DateTime<Utc>,
    pub punch_out: Option<DateTime<Utc>>,
    pub punch_out_type: Option<PunchOutType>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub job_id: Option<Uuid>,
    pub quotation_id: Option<Uuid>,
    pub invoice_number: i32,
    pub status: InvoiceStatus,
    /// Line items frozen at creation: [{description, quantity, unit_price, amount}].
    pub items: serde_json::Value,
    pub subtotal: Decimal,
    pub tax_tps: Decimal,
    pub tax_tvq: Decimal,
    pub total: Decimal,
    pub issued_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub pdf_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub kind: ConversationKind,
    pub title: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationParticipant {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub last_read_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    /// Set when the sender deletes for everyone (10-minute window).
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub company_id: Uuid,
    pub employee_id: Uuid,
    pub job_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeCalculation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub created_by: Uuid,
    pub quotation_id: Option<Uuid>,
    pub label: Option<String>,
    /// Input snapshot: [{room, items: [{name, quantity, volume_cft, weight_lbs?}]}].
    pub rooms: serde_json::Value,
    pub total_volume_cft: Decimal,
    pub total_weight_lbs: Decimal,
    pub total_items: i32,
    pub suggested_truck: String,
    pub suggested_workers: i32,
    pub truck_capacity_percent: i32,
    pub created_at: DateTime<Utc>,
}
