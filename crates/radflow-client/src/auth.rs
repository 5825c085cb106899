//! 认证
//!
//! 员工：选择账号并输入4位PIN，由后端 `login` 动作校验。
//! 患者：按电话号码查找，口令为姓名前三个字母（大写）加电话号码。
//! 患者口令可由公开信息推导，只适用于受信任的局域网终端。

use radflow_core::utils::derive_patient_passcode;
use radflow_core::{Patient, RadflowError, Result};

use crate::backend::ApiClient;
use crate::session::Session;

/// 本地检查PIN格式，格式不对不发请求
pub fn validate_pin_input(pin: &str) -> Result<()> {
    if pin.len() == 4 && pin.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(RadflowError::Validation("PIN must be exactly 4 digits".to_string()))
    }
}

pub async fn staff_login(api: &ApiClient, user_id: &str, pin: &str) -> Result<Session> {
    if user_id.trim().is_empty() {
        return Err(RadflowError::Validation("Please select a user".to_string()));
    }
    validate_pin_input(pin)?;

    let user = api.login(user_id.trim(), pin).await?;
    if !user.role.is_staff() {
        return Err(RadflowError::Authentication(format!(
            "{} is not a staff account",
            user.full_name
        )));
    }

    tracing::info!("Staff login: {} ({})", user.full_name, user.role);
    Ok(Session::Staff { user })
}

pub fn patient_login(patients: &[Patient], phone: &str, passcode: &str) -> Result<Session> {
    let phone = phone.trim();
    let patient = patients
        .iter()
        .find(|p| !phone.is_empty() && p.phone.trim() == phone)
        .ok_or_else(|| RadflowError::Authentication("Patient not found".to_string()))?;

    if derive_patient_passcode(&patient.full_name, &patient.phone) != passcode.trim() {
        tracing::warn!("Rejected passcode for patient {}", patient.id);
        return Err(RadflowError::Authentication("Invalid Passcode".to_string()));
    }

    tracing::info!("Patient login: {}", patient.id);
    Ok(Session::for_patient(patient))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ahmed() -> Patient {
        Patient {
            id: "PT-0000A001".to_string(),
            full_name: "Ahmed Khaled".to_string(),
            dob: Some("1985-04-12".to_string()),
            age: None,
            gender: "Male".to_string(),
            phone: "0599123456".to_string(),
            complaint: String::new(),
            diagnosis: String::new(),
            medical_history: String::new(),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_patient_login() {
        let patients = vec![ahmed()];

        let session = patient_login(&patients, "0599123456", "AHM0599123456").unwrap();
        assert_eq!(session.role(), radflow_core::Role::Patient);
        assert_eq!(session.subject_id(), "PT-0000A001");

        for wrong in ["AHM0599123457", "ahm0599123456", "AHMED0599123456", ""] {
            let err = patient_login(&patients, "0599123456", wrong).unwrap_err();
            assert_eq!(err.user_message(), "Invalid Passcode");
        }

        let err = patient_login(&patients, "0500000000", "AHM0500000000").unwrap_err();
        assert_eq!(err.user_message(), "Patient not found");
    }

    #[test]
    fn test_pin_input() {
        assert!(validate_pin_input("0420").is_ok());
        assert!(validate_pin_input("42").is_err());
        assert!(validate_pin_input("12a4").is_err());
    }
}
