//! 前台登记
//!
//! 新建患者、选择患者、为就诊排入检查，并一次性保存就诊和检查。

use chrono::NaiveDate;
use radflow_core::protocol::creation_payload;
use radflow_core::utils::{
    age_on, generate_placeholder_id, now_timestamp, parse_date, PATIENT_ID_PREFIX,
    STUDY_ID_PREFIX, VISIT_ID_PREFIX,
};
use radflow_core::{Action, Modality, Patient, RadflowError, Result, Role, Study, StudyStatus, User, Visit};
use radflow_workflow::PermissionAction;

use crate::app::App;
use crate::state::SyncStatus;
use crate::sync::SyncJob;

use super::today;

/// 新患者表单
#[derive(Debug, Clone, Default)]
pub struct PatientForm {
    pub full_name: String,
    /// YYYY-MM-DD
    pub dob: Option<String>,
    pub gender: String,
    pub phone: String,
    pub complaint: String,
    pub diagnosis: String,
    pub medical_history: String,
}

/// 排队中的检查
#[derive(Debug, Clone, PartialEq)]
pub struct StudyOrder {
    pub modality: Modality,
    pub region: String,
    pub study_name: Option<String>,
    /// 为空时使用就诊的指定医生
    pub assigned_doctor_id: Option<String>,
}

impl StudyOrder {
    pub fn new(modality: Modality, region: impl Into<String>) -> Self {
        Self {
            modality,
            region: region.into(),
            study_name: None,
            assigned_doctor_id: None,
        }
    }
}

/// 保存就诊的结果（占位ID）
#[derive(Debug, Clone, PartialEq)]
pub struct VisitReceipt {
    pub visit_id: String,
    pub study_ids: Vec<String>,
}

/// 当日就诊列表的一行
#[derive(Debug, Clone)]
pub struct VisitRow {
    pub visit_id: String,
    pub patient_name: String,
    pub check_in_time: String,
    pub statuses: Vec<StudyStatus>,
    pub sync: Option<SyncStatus>,
}

pub struct ReceptionView<'a> {
    app: &'a App,
    selected_patient: Option<String>,
    queued: Vec<StudyOrder>,
    pub referrer_doctor: String,
    pub assigned_doctor_id: String,
}

impl<'a> ReceptionView<'a> {
    pub fn new(app: &'a App) -> Self {
        Self {
            app,
            selected_patient: None,
            queued: Vec::new(),
            referrer_doctor: String::new(),
            assigned_doctor_id: String::new(),
        }
    }

    /// 按姓名或电话搜索
    pub async fn search_patients(&self, query: &str) -> Vec<Patient> {
        let query = query.trim().to_lowercase();
        self.app
            .read(|state| {
                state
                    .patients
                    .iter()
                    .filter(|p| {
                        query.is_empty()
                            || p.full_name.to_lowercase().contains(&query)
                            || p.phone.contains(&query)
                    })
                    .cloned()
                    .collect()
            })
            .await
    }

    /// 可指派的放射科医生
    pub async fn radiologists(&self) -> Vec<User> {
        self.app
            .read(|state| {
                state
                    .users
                    .iter()
                    .filter(|u| u.role == Role::Radiologist)
                    .cloned()
                    .collect()
            })
            .await
    }

    /// 新建患者并选中，返回占位ID
    pub async fn save_patient(&mut self, form: PatientForm) -> Result<String> {
        self.app.authorize(PermissionAction::CreateVisit).await?;

        let full_name = form.full_name.trim().to_string();
        let phone = form.phone.trim().to_string();
        if full_name.is_empty() || phone.is_empty() {
            return Err(self
                .app
                .reject(RadflowError::Validation("Full name and phone are required".to_string())));
        }

        let dob = form.dob.as_deref().map(str::trim).filter(|d| !d.is_empty());
        let birth_date = match dob {
            Some(text) => Some(parse_date(text).ok_or_else(|| {
                self.app
                    .reject(RadflowError::Validation(format!("Invalid date of birth: {}", text)))
            })?),
            None => None,
        };

        let duplicate = self
            .app
            .read(|state| state.patients.iter().any(|p| p.phone.trim() == phone))
            .await;
        if duplicate {
            return Err(self.app.reject(RadflowError::Validation(format!(
                "A patient with phone {} already exists",
                phone
            ))));
        }

        let patient = Patient {
            id: generate_placeholder_id(PATIENT_ID_PREFIX),
            full_name,
            dob: birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            age: birth_date.map(|d| age_on(d, today())),
            gender: form.gender.trim().to_string(),
            phone,
            complaint: form.complaint.trim().to_string(),
            diagnosis: form.diagnosis.trim().to_string(),
            medical_history: form.medical_history.trim().to_string(),
            created_at: now_timestamp(),
        };
        let id = patient.id.clone();
        let payload = creation_payload(&patient)?;

        self.app.write(|state| state.patients.push(patient)).await;
        self.app
            .enqueue(SyncJob::create(Action::CreatePatient, &id, payload))
            .await?;

        self.selected_patient = Some(id.clone());
        Ok(id)
    }

    pub async fn select_patient(&mut self, patient_id: &str) -> Result<()> {
        let found = self
            .app
            .read(|state| state.patient(state.resolve_id(patient_id)).map(|p| p.id.clone()))
            .await;
        match found {
            Some(id) => {
                self.selected_patient = Some(id);
                Ok(())
            }
            None => Err(self
                .app
                .reject(RadflowError::NotFound(format!("Patient {} not found", patient_id)))),
        }
    }

    pub fn selected_patient(&self) -> Option<&str> {
        self.selected_patient.as_deref()
    }

    pub fn queue_study(&mut self, order: StudyOrder) -> Result<()> {
        if order.region.trim().is_empty() {
            return Err(self
                .app
                .reject(RadflowError::Validation("Study region is required".to_string())));
        }
        self.queued.push(order);
        Ok(())
    }

    pub fn remove_study(&mut self, index: usize) -> Option<StudyOrder> {
        (index < self.queued.len()).then(|| self.queued.remove(index))
    }

    pub fn queued_studies(&self) -> &[StudyOrder] {
        &self.queued
    }

    /// 保存就诊及其排队的检查
    ///
    /// 本地状态立即包含新就诊和全部检查（状态为 Waiting），
    /// 随后按 就诊 → 检查 的顺序排队写回后端。
    pub async fn save_visit(&mut self) -> Result<VisitReceipt> {
        self.app.authorize(PermissionAction::CreateVisit).await?;

        let Some(selected) = self.selected_patient.clone() else {
            return Err(self
                .app
                .reject(RadflowError::Validation("Please select a patient".to_string())));
        };
        if self.queued.is_empty() {
            return Err(self
                .app
                .reject(RadflowError::Validation("Add at least one study".to_string())));
        }
        let patient_id = self
            .app
            .read(|state| state.patient(state.resolve_id(&selected)).map(|p| p.id.clone()))
            .await
            .ok_or_else(|| {
                self.app
                    .reject(RadflowError::NotFound(format!("Patient {} not found", selected)))
            })?;

        let now = now_timestamp();
        let visit = Visit {
            id: generate_placeholder_id(VISIT_ID_PREFIX),
            patient_id,
            status: "In Progress".to_string(),
            check_in_time: now.clone(),
            referrer_doctor: self.referrer_doctor.trim().to_string(),
            assigned_doctor_id: self.assigned_doctor_id.trim().to_string(),
            created_at: now.clone(),
        };

        let studies: Vec<Study> = self
            .queued
            .iter()
            .map(|order| Study {
                id: generate_placeholder_id(STUDY_ID_PREFIX),
                visit_id: visit.id.clone(),
                modality: order.modality.clone(),
                region: order.region.trim().to_string(),
                study_name: order
                    .study_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| format!("{} {}", order.modality, order.region.trim())),
                assigned_doctor_id: order
                    .assigned_doctor_id
                    .clone()
                    .unwrap_or_else(|| visit.assigned_doctor_id.clone()),
                status: StudyStatus::Waiting,
                report_content: None,
                image_links: Vec::new(),
                completed_at: None,
                created_at: now.clone(),
            })
            .collect();

        let mut jobs = vec![SyncJob::create(
            Action::CreateVisit,
            &visit.id,
            creation_payload(&visit)?,
        )];
        for study in &studies {
            jobs.push(SyncJob::create(Action::CreateStudy, &study.id, creation_payload(study)?));
        }

        let receipt = VisitReceipt {
            visit_id: visit.id.clone(),
            study_ids: studies.iter().map(|s| s.id.clone()).collect(),
        };

        self.app
            .write(|state| {
                state.visits.push(visit);
                state.studies.extend(studies);
            })
            .await;
        for job in jobs {
            self.app.enqueue(job).await?;
        }

        tracing::info!(
            "Checked in visit {} with {} studies",
            receipt.visit_id,
            receipt.study_ids.len()
        );
        self.queued.clear();
        Ok(receipt)
    }

    /// 指定日期登记的就诊
    pub async fn visits_on(&self, date: NaiveDate) -> Vec<VisitRow> {
        self.app
            .read(|state| {
                state
                    .visits
                    .iter()
                    .filter(|v| parse_date(&v.check_in_time) == Some(date))
                    .map(|v| VisitRow {
                        visit_id: v.id.clone(),
                        patient_name: state
                            .patient(&v.patient_id)
                            .map(|p| p.full_name.clone())
                            .unwrap_or_default(),
                        check_in_time: v.check_in_time.clone(),
                        statuses: state
                            .studies
                            .iter()
                            .filter(|s| s.visit_id == v.id)
                            .map(|s| s.status)
                            .collect(),
                        sync: state.sync_status(&v.id).cloned(),
                    })
                    .collect()
            })
            .await
    }
}
