//! 放射科医生工作台
//!
//! 工作列表按登记日期和指定医生筛选；报告编辑锁定给检查的指定医生，
//! 其他医生只能查看（管理员可编辑）。这一限制只在客户端执行。

use chrono::NaiveDate;
use radflow_core::protocol::{CompletionRequest, ReportSubmission};
use radflow_core::utils::now_timestamp;
use radflow_core::{Action, RadflowError, Result, Role, StudyStatus};
use radflow_workflow::{
    ClinicalContext, PermissionAction, ReportDraft, StudyEvent, TemplateLibrary, WorkItem,
    WorkListFilter, WorkListManager,
};

use crate::app::App;
use crate::sync::SyncJob;
use crate::ui::PromptFields;

/// 医生工作列表的标签页
pub const RADIOLOGIST_TABS: [StudyStatus; 3] = [
    StudyStatus::Reporting,
    StudyStatus::Reported,
    StudyStatus::Completed,
];

/// 签发后用于打印的报告
#[derive(Debug, Clone, PartialEq)]
pub struct SignedReport {
    pub study_id: String,
    pub patient_name: String,
    pub study_name: String,
    pub content_html: String,
    pub signed_by: String,
    pub signed_at: String,
}

pub struct RadiologistView<'a> {
    app: &'a App,
}

impl<'a> RadiologistView<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }

    /// 工作列表；未指定医生时，医生本人只看分配给自己的检查，管理员看全部
    pub async fn worklist(
        &self,
        date: NaiveDate,
        doctor_id: Option<&str>,
    ) -> Vec<(StudyStatus, Vec<WorkItem>)> {
        let session = self.app.session().await;
        let doctor = doctor_id.map(str::to_string).or_else(|| {
            session
                .filter(|s| s.role() == Role::Radiologist)
                .map(|s| s.subject_id().to_string())
        });

        let mut filter = WorkListFilter::on(date);
        if let Some(doctor) = doctor {
            filter = filter.assigned_to(doctor);
        }

        self.app
            .read(|state| {
                WorkListManager::new(&state.patients, &state.visits, &state.studies)
                    .group_by_status(&filter, &RADIOLOGIST_TABS)
            })
            .await
    }

    /// 内置模板加上后端保存的模板
    pub async fn template_library(&self) -> TemplateLibrary {
        self.app
            .read(|state| TemplateLibrary::with_templates(&state.templates))
            .await
    }

    pub async fn open_report(&self, study_id: &str) -> Result<ReportDraft> {
        let session = self.app.authorize(PermissionAction::WriteReport).await?;
        self.app
            .read(|state| {
                state
                    .study(state.resolve_id(study_id))
                    .map(|study| ReportDraft::open(study, session.subject_id(), session.role()))
            })
            .await
            .ok_or_else(|| {
                self.app
                    .reject(RadflowError::NotFound(format!("Study {} not found", study_id)))
            })
    }

    /// 插入模板，占位字段逐个询问
    pub async fn insert_template(&self, draft: &mut ReportDraft, finding: &str) -> Result<()> {
        let library = self.template_library().await;
        let mut prompt = PromptFields(self.app.prompter());
        draft
            .insert_template(&library, finding, &mut prompt)
            .map_err(|e| self.app.reject(e))
    }

    /// 勾选临床信息，返回是否插入了内容
    pub async fn toggle_context(
        &self,
        draft: &mut ReportDraft,
        context: ClinicalContext,
        checked: bool,
    ) -> Result<bool> {
        let patient = self
            .app
            .read(|state| {
                state
                    .study(state.resolve_id(&draft.study_id))
                    .and_then(|study| state.patient_for_study(study))
                    .cloned()
            })
            .await
            .ok_or_else(|| {
                self.app.reject(RadflowError::NotFound(format!(
                    "Patient for study {} not found",
                    draft.study_id
                )))
            })?;
        draft
            .toggle_context(context, checked, &patient)
            .map_err(|e| self.app.reject(e))
    }

    /// 校验草稿可提交并返回检查当前ID与状态
    async fn check_submission(
        &self,
        draft: &ReportDraft,
        permission: PermissionAction,
        event: StudyEvent,
    ) -> Result<(String, StudyStatus)> {
        self.app.authorize(permission).await?;
        if draft.is_read_only() {
            return Err(self.app.reject(RadflowError::Permission(
                "This report is locked to the assigned radiologist".to_string(),
            )));
        }

        let (id, status) = self
            .app
            .read(|state| {
                let id = state.resolve_id(&draft.study_id);
                state.study(id).map(|s| (id.to_string(), s.status))
            })
            .await
            .ok_or_else(|| {
                self.app
                    .reject(RadflowError::NotFound(format!("Study {} not found", draft.study_id)))
            })?;

        let target = self
            .app
            .workflow()
            .transition(status, event)
            .map_err(|e| self.app.reject(e))?;
        Ok((id, target))
    }

    /// 签发并打印：保存报告内容，状态变为 Reported
    pub async fn sign_report(&self, draft: &ReportDraft) -> Result<SignedReport> {
        let (id, target) = self
            .check_submission(draft, PermissionAction::WriteReport, StudyEvent::SignReport)
            .await?;
        let content = draft.content().to_string();
        let signed_by = self
            .app
            .session()
            .await
            .map(|s| s.display_name().to_string())
            .unwrap_or_default();

        let report = self
            .app
            .write(|state| {
                let current = state.resolve_id(&id).to_string();
                if let Some(study) = state.study_mut(&current) {
                    study.report_content = Some(content.clone());
                    study.status = target;
                }
                let study = state.study(&current);
                SignedReport {
                    study_id: current.clone(),
                    patient_name: study
                        .and_then(|s| state.patient_for_study(s))
                        .map(|p| p.full_name.clone())
                        .unwrap_or_default(),
                    study_name: study.map(|s| s.study_name.clone()).unwrap_or_default(),
                    content_html: content.clone(),
                    signed_by,
                    signed_at: now_timestamp(),
                }
            })
            .await;

        let payload = serde_json::to_value(ReportSubmission {
            study_id: id.clone(),
            content_html: content,
        })?;
        self.app
            .enqueue(SyncJob::update(Action::SaveReport, &id, payload))
            .await?;
        Ok(report)
    }

    /// 标记完成：保存当前内容并记录完成时间
    pub async fn mark_complete(&self, draft: &ReportDraft) -> Result<()> {
        let (id, target) = self
            .check_submission(draft, PermissionAction::MarkComplete, StudyEvent::MarkComplete)
            .await?;
        let content = draft.content().to_string();

        self.app
            .write(|state| {
                let current = state.resolve_id(&id).to_string();
                if let Some(study) = state.study_mut(&current) {
                    study.report_content = Some(content.clone());
                    study.status = target;
                    study.completed_at = Some(now_timestamp());
                }
            })
            .await;

        let payload = serde_json::to_value(CompletionRequest {
            study_id: id.clone(),
            content_html: Some(content),
        })?;
        self.app
            .enqueue(SyncJob::update(Action::MarkComplete, &id, payload))
            .await
    }
}
