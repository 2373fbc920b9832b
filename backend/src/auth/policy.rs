//! Role and plan gates
//!
//! Roles are checked against the authenticated user; plan gates compare the
//! company's plan to the feature's requirement and fail with a structured
//! upgrade payload the clients use to drive upsell screens.

use crate::error::AppError;
use haulbase_shared::{CompanyPlan, User, UserRole};

/// STARTER companies may keep at most this many customers.
pub const STARTER_CUSTOMER_LIMIT: i64 = 3;
/// STARTER companies may save at most this many volume calculations per calendar month.
pub const STARTER_VOLUME_SAVES_PER_MONTH: i64 = 3;

/// Require OWNER or MANAGER
pub fn require_admin(user: &User) -> Result<(), AppError> {
    match user.role {
        UserRole::Owner | UserRole::Manager => Ok(()),
        UserRole::Employee => Err(AppError::Forbidden(
            "This action requires an owner or manager account".to_string(),
        )),
    }
}

/// Require OWNER
pub fn require_owner(user: &User) -> Result<(), AppError> {
    if user.role == UserRole::Owner {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "This action requires the owner account".to_string(),
        ))
    }
}

/// Require EMPLOYEE (crew-only operations such as punching into a job)
pub fn require_employee(user: &User) -> Result<(), AppError> {
    if user.role == UserRole::Employee {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "This action is only available to crew accounts".to_string(),
        ))
    }
}

/// Require the company plan to be PRO or ELITE
pub fn require_pro_plan(
    plan: CompanyPlan,
    code: &'static str,
    message: &str,
) -> Result<(), AppError> {
    match plan {
        CompanyPlan::Pro | CompanyPlan::Elite => Ok(()),
        CompanyPlan::Starter => Err(AppError::UpgradeRequired {
            code,
            message: message.to_string(),
            required_plans: vec![CompanyPlan::Pro, CompanyPlan::Elite],
        }),
    }
}

/// Gate customer creation on STARTER: at most [`STARTER_CUSTOMER_LIMIT`] rows.
pub fn check_customer_cap(plan: CompanyPlan, current_count: i64) -> Result<(), AppError> {
    if plan == CompanyPlan::Starter && current_count >= STARTER_CUSTOMER_LIMIT {
        return Err(AppError::UpgradeRequired {
            code: "UPGRADE_REQUIRED_CUSTOMERS",
            message: format!(
                "The Starter plan is limited to {} customers. Upgrade to add more.",
                STARTER_CUSTOMER_LIMIT
            ),
            required_plans: vec![CompanyPlan::Pro, CompanyPlan::Elite],
        });
    }
    Ok(())
}

/// Gate saved volume calculations on STARTER: at most
/// [`STARTER_VOLUME_SAVES_PER_MONTH`] per calendar month.
pub fn check_volume_save_cap(plan: CompanyPlan, saves_this_month: i64) -> Result<(), AppError> {
    if plan == CompanyPlan::Starter && saves_this_month >= STARTER_VOLUME_SAVES_PER_MONTH {
        return Err(AppError::UpgradeRequired {
            code: "UPGRADE_REQUIRED_VOLUME",
            message: format!(
                "The Starter plan is limited to {} saved volume calculations per month. Upgrade to save more.",
                STARTER_VOLUME_SAVES_PER_MONTH
            ),
            required_plans: vec![CompanyPlan::Pro, CompanyPlan::Elite],
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user_with_role(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            password_hash: "x".to_string(),
            full_name: "Someone".to_string(),
            role,
            avatar_url: None,
            push_token: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_admin_gate() {
        assert!(require_admin(&user_with_role(UserRole::Owner)).is_ok());
        assert!(require_admin(&user_with_role(UserRole::Manager)).is_ok());
        assert!(require_admin(&user_with_role(UserRole::Employee)).is_err());
    }

    #[test]
    fn test_customer_cap_only_binds_starter() {
        assert!(check_customer_cap(CompanyPlan::Starter, 2).is_ok());
        assert!(check_customer_cap(CompanyPlan::Starter, 3).is_err());
        assert!(check_customer_cap(CompanyPlan::Pro, 500).is_ok());
        assert!(check_customer_cap(CompanyPlan::Elite, 500).is_ok());
    }

    #[test]
    fn test_volume_cap_carries_upgrade_payload() {
        let err = check_volume_save_cap(CompanyPlan::Starter, 3).unwrap_err();
        match err {
            AppError::UpgradeRequired {
                code,
                required_plans,
                ..
            } => {
                assert_eq!(code, "UPGRADE_REQUIRED_VOLUME");
                assert_eq!(
                    required_plans,
                    vec![CompanyPlan::Pro, CompanyPlan::Elite]
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_pro_plan_gate() {
        assert!(require_pro_plan(
            CompanyPlan::Elite,
            "UPGRADE_REQUIRED_REMINDERS",
            "Reminders need Pro"
        )
        .is_ok());
        assert!(require_pro_plan(
            CompanyPlan::Starter,
            "UPGRADE_REQUIRED_REMINDERS",
            "Reminders need Pro"
        )
        .is_err());
    }
}
