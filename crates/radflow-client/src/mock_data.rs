//! 演示数据
//!
//! 未配置后端地址时由模拟后端使用。所有演示账号的PIN相同。

use chrono::{Duration, Utc};
use radflow_core::{Dataset, Modality, Patient, Role, Study, StudyStatus, User, Visit};
use std::collections::HashMap;

pub const DEMO_PIN: &str = "1234";
pub const DEMO_ADMIN_ID: &str = "USR-DEMO0001";
pub const DEMO_RECEPTION_ID: &str = "USR-DEMO0002";
pub const DEMO_TECHNICIAN_ID: &str = "USR-DEMO0003";
pub const DEMO_RADIOLOGIST_ID: &str = "USR-DEMO0004";

fn user(id: &str, name: &str, email: &str, role: Role) -> User {
    User {
        id: id.to_string(),
        email: email.to_string(),
        full_name: name.to_string(),
        role,
        created_at: String::new(),
    }
}

fn patient(id: &str, name: &str, dob: &str, age: u32, gender: &str, phone: &str, complaint: &str) -> Patient {
    Patient {
        id: id.to_string(),
        full_name: name.to_string(),
        dob: Some(dob.to_string()),
        age: Some(age),
        gender: gender.to_string(),
        phone: phone.to_string(),
        complaint: complaint.to_string(),
        diagnosis: String::new(),
        medical_history: String::new(),
        created_at: String::new(),
    }
}

fn study(id: &str, visit_id: &str, modality: Modality, region: &str, status: StudyStatus) -> Study {
    Study {
        id: id.to_string(),
        visit_id: visit_id.to_string(),
        study_name: format!("{} {}", modality, region),
        modality,
        region: region.to_string(),
        assigned_doctor_id: DEMO_RADIOLOGIST_ID.to_string(),
        status,
        report_content: None,
        image_links: Vec::new(),
        completed_at: None,
        created_at: String::new(),
    }
}

/// 今天和昨天各有一次就诊，覆盖所有检查状态
pub fn sample_dataset() -> (Dataset, HashMap<String, String>) {
    let now = Utc::now();
    let today = now.format("%Y-%m-%dT08:30:00Z").to_string();
    let yesterday = (now - Duration::days(1)).format("%Y-%m-%dT10:15:00Z").to_string();

    let users = vec![
        user(DEMO_ADMIN_ID, "System Administrator", "admin@radflow.local", Role::Admin),
        user(DEMO_RECEPTION_ID, "Sara Nasser", "sara@radflow.local", Role::Reception),
        user(DEMO_TECHNICIAN_ID, "Omar Haddad", "omar@radflow.local", Role::Technician),
        user(DEMO_RADIOLOGIST_ID, "Dr. Layla Mansour", "layla@radflow.local", Role::Radiologist),
    ];

    let patients = vec![
        patient("PT-DEMO0001", "Mona Saleh", "1990-02-03", 36, "Female", "0598765432", "Right upper quadrant pain"),
        patient("PT-DEMO0002", "Khalil Odeh", "1972-11-20", 53, "Male", "0597654321", "Chronic cough"),
    ];

    let visits = vec![
        Visit {
            id: "VS-DEMO0001".to_string(),
            patient_id: "PT-DEMO0001".to_string(),
            status: "In Progress".to_string(),
            check_in_time: today,
            referrer_doctor: "Dr. Hani".to_string(),
            assigned_doctor_id: DEMO_RADIOLOGIST_ID.to_string(),
            created_at: String::new(),
        },
        Visit {
            id: "VS-DEMO0002".to_string(),
            patient_id: "PT-DEMO0002".to_string(),
            status: "In Progress".to_string(),
            check_in_time: yesterday,
            referrer_doctor: String::new(),
            assigned_doctor_id: DEMO_RADIOLOGIST_ID.to_string(),
            created_at: String::new(),
        },
    ];

    let mut reported = study("ST-DEMO0004", "VS-DEMO0002", Modality::Xr, "Chest", StudyStatus::Reported);
    reported.report_content = Some("<p>Lungs are clear. No pleural effusion.</p>".to_string());

    let studies = vec![
        study("ST-DEMO0001", "VS-DEMO0001", Modality::Us, "Abdomen", StudyStatus::Waiting),
        study("ST-DEMO0002", "VS-DEMO0001", Modality::Us, "Pelvis", StudyStatus::Scanning),
        study("ST-DEMO0003", "VS-DEMO0001", Modality::Ct, "Brain", StudyStatus::Reporting),
        reported,
    ];

    let pins = users
        .iter()
        .map(|u| (u.id.clone(), DEMO_PIN.to_string()))
        .collect();

    let dataset = Dataset {
        patients,
        visits,
        studies,
        templates: Vec::new(),
        users,
    };
    (dataset, pins)
}
