//! 登录会话

use radflow_core::{Patient, Role, User};
use serde::{Deserialize, Serialize};

/// 当前会话：员工账号或患者门户
///
/// 员工会话只保存用户记录，PIN从不写入本地。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Session {
    Staff { user: User },
    Patient {
        patient_id: String,
        full_name: String,
        phone: String,
    },
}

impl Session {
    pub fn for_patient(patient: &Patient) -> Self {
        Session::Patient {
            patient_id: patient.id.clone(),
            full_name: patient.full_name.clone(),
            phone: patient.phone.clone(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Session::Staff { user } => user.role,
            Session::Patient { .. } => Role::Patient,
        }
    }

    /// 用户ID或患者ID
    pub fn subject_id(&self) -> &str {
        match self {
            Session::Staff { user } => &user.id,
            Session::Patient { patient_id, .. } => patient_id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Session::Staff { user } => &user.full_name,
            Session::Patient { full_name, .. } => full_name,
        }
    }
}
