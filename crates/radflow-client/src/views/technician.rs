//! 技师工作台

use chrono::NaiveDate;
use radflow_core::protocol::{ImageLinksUpdate, StudyStatusUpdate};
use radflow_core::{Action, RadflowError, Result, StudyStatus};
use radflow_workflow::{PermissionAction, StudyEvent, WorkItem, WorkListFilter, WorkListManager};

use crate::app::App;
use crate::sync::SyncJob;

/// 技师看板的标签页
pub const TECHNICIAN_TABS: [StudyStatus; 2] = [StudyStatus::Waiting, StudyStatus::Scanning];

pub struct TechnicianView<'a> {
    app: &'a App,
}

impl<'a> TechnicianView<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }

    /// 指定日期的看板（按登记日期筛选）
    pub async fn board(&self, date: NaiveDate) -> Vec<(StudyStatus, Vec<WorkItem>)> {
        self.app
            .read(|state| {
                WorkListManager::new(&state.patients, &state.visits, &state.studies)
                    .group_by_status(&WorkListFilter::on(date), &TECHNICIAN_TABS)
            })
            .await
    }

    /// 开始检查（Waiting → Scanning）
    pub async fn start_scan(&self, study_id: &str) -> Result<bool> {
        self.advance(study_id, StudyEvent::StartScan, PermissionAction::StartScan, "Start scan")
            .await
    }

    /// 完成检查并送交医生（Scanning → Reporting）
    pub async fn send_to_radiologist(&self, study_id: &str) -> Result<bool> {
        self.advance(
            study_id,
            StudyEvent::SendToRadiologist,
            PermissionAction::CompleteScan,
            "Send to radiologist",
        )
        .await
    }

    /// 用户确认后乐观推进状态，返回 `false` 表示用户取消
    async fn advance(
        &self,
        study_id: &str,
        event: StudyEvent,
        permission: PermissionAction,
        question: &str,
    ) -> Result<bool> {
        self.app.authorize(permission).await?;

        let (id, status, label) = self
            .app
            .read(|state| {
                let id = state.resolve_id(study_id);
                state.study(id).map(|study| {
                    let patient = state
                        .patient_for_study(study)
                        .map(|p| p.full_name.clone())
                        .unwrap_or_default();
                    (id.to_string(), study.status, format!("{} ({})", study.study_name, patient))
                })
            })
            .await
            .ok_or_else(|| {
                self.app
                    .reject(RadflowError::NotFound(format!("Study {} not found", study_id)))
            })?;

        let target = self
            .app
            .workflow()
            .transition(status, event)
            .map_err(|e| self.app.reject(e))?;

        if !self.app.prompter().confirm(&format!("{} for {}?", question, label)) {
            tracing::debug!("{} for {} cancelled", question, id);
            return Ok(false);
        }

        self.app
            .write(|state| {
                let current = state.resolve_id(&id).to_string();
                if let Some(study) = state.study_mut(&current) {
                    study.status = target;
                }
            })
            .await;

        let payload = serde_json::to_value(StudyStatusUpdate {
            id: id.clone(),
            status: target,
        })?;
        self.app
            .enqueue(SyncJob::update(Action::UpdateStudyStatus, &id, payload))
            .await?;
        Ok(true)
    }

    /// 记录检查的影像链接
    pub async fn update_image_links(&self, study_id: &str, links: Vec<String>) -> Result<()> {
        self.app.authorize(PermissionAction::CompleteScan).await?;

        let links: Vec<String> = links
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if let Some(bad) = links
            .iter()
            .find(|l| !(l.starts_with("http://") || l.starts_with("https://")))
        {
            return Err(self
                .app
                .reject(RadflowError::Validation(format!("Not a web link: {}", bad))));
        }

        let id = self
            .app
            .write(|state| {
                let id = state.resolve_id(study_id).to_string();
                let study = state.study_mut(&id)?;
                study.image_links = links.clone();
                Some(id)
            })
            .await
            .ok_or_else(|| {
                self.app
                    .reject(RadflowError::NotFound(format!("Study {} not found", study_id)))
            })?;

        let payload = serde_json::to_value(ImageLinksUpdate {
            study_id: id.clone(),
            image_links: links,
        })?;
        self.app
            .enqueue(SyncJob::update(Action::UpdateImageLinks, &id, payload))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::ScriptedPrompter;
    use crate::views::reception::{PatientForm, ReceptionView, StudyOrder};
    use crate::views::testing::{admin_app, app_with, ADMIN_PIN};
    use crate::views::today;
    use radflow_core::Modality;
    use std::sync::Arc;

    async fn waiting_study(app: &App) -> String {
        let mut desk = ReceptionView::new(app);
        desk.save_patient(PatientForm {
            full_name: "Mona Saleh".to_string(),
            phone: "0598765432".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        desk.queue_study(StudyOrder::new(Modality::Ct, "Brain")).unwrap();
        desk.save_visit().await.unwrap().study_ids.remove(0)
    }

    #[tokio::test]
    async fn test_scan_flow_updates_board() {
        let (app, _) = admin_app().await;
        let study_id = waiting_study(&app).await;
        let view = TechnicianView::new(&app);

        let board = view.board(today()).await;
        assert_eq!(board[0].0, StudyStatus::Waiting);
        assert_eq!(board[0].1.len(), 1);

        assert!(view.start_scan(&study_id).await.unwrap());
        let board = view.board(today()).await;
        assert!(board[0].1.is_empty());
        assert_eq!(board[1].1.len(), 1);

        // 跳过状态会被拒绝
        assert!(view.start_scan(&study_id).await.is_err());

        assert!(view.send_to_radiologist(&study_id).await.unwrap());
        assert!(view.board(today()).await.iter().all(|(_, items)| items.is_empty()));

        app.flush().await.unwrap();
        app.load_data(true).await.unwrap();
        let status = app
            .read(|s| s.study(s.resolve_id(&study_id)).map(|st| st.status))
            .await;
        assert_eq!(status, Some(StudyStatus::Reporting));
    }

    #[tokio::test]
    async fn test_declined_confirmation_is_noop() {
        let prompter = Arc::new(ScriptedPrompter::declining());
        let (app, admin_id) = app_with(Arc::clone(&prompter)).await;
        app.login_staff(&admin_id, ADMIN_PIN).await.unwrap();
        let study_id = waiting_study(&app).await;

        let started = TechnicianView::new(&app).start_scan(&study_id).await.unwrap();
        assert!(!started);
        let status = app
            .read(|s| s.study(s.resolve_id(&study_id)).map(|st| st.status))
            .await;
        assert_eq!(status, Some(StudyStatus::Waiting));
    }

    #[tokio::test]
    async fn test_image_links() {
        let (app, _) = admin_app().await;
        let study_id = waiting_study(&app).await;
        let view = TechnicianView::new(&app);

        assert!(view
            .update_image_links(&study_id, vec!["ftp://pacs/1".to_string()])
            .await
            .is_err());
        view.update_image_links(&study_id, vec!["https://pacs/viewer/1".to_string(), " ".to_string()])
            .await
            .unwrap();

        app.flush().await.unwrap();
        app.load_data(true).await.unwrap();
        let links = app
            .read(|s| s.study(s.resolve_id(&study_id)).map(|st| st.image_links.clone()))
            .await;
        assert_eq!(links, Some(vec!["https://pacs/viewer/1".to_string()]));
    }
}
