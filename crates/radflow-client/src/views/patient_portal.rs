//! 患者门户：本人的检查与已签发的报告

use chrono::NaiveDate;
use radflow_core::utils::parse_date;
use radflow_core::{Modality, RadflowError, Result, StudyStatus};

use crate::app::App;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq)]
pub struct PortalStudy {
    pub study_id: String,
    pub study_name: String,
    pub modality: Modality,
    pub region: String,
    pub status: StudyStatus,
    pub check_in_date: Option<NaiveDate>,
    /// 报告签发后才可见
    pub report_html: Option<String>,
    pub image_links: Vec<String>,
}

pub struct PatientPortal<'a> {
    app: &'a App,
}

impl<'a> PatientPortal<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }

    /// 当前患者的全部检查，最近的在前
    pub async fn studies(&self) -> Result<Vec<PortalStudy>> {
        let Some(Session::Patient { patient_id, .. }) = self.app.session().await else {
            return Err(self.app.reject(RadflowError::Permission(
                "The patient portal requires a patient login".to_string(),
            )));
        };

        let mut studies: Vec<PortalStudy> = self
            .app
            .read(|state| {
                let patient_id = state.resolve_id(&patient_id);
                state
                    .visits
                    .iter()
                    .filter(|v| v.patient_id == patient_id)
                    .flat_map(|visit| {
                        state
                            .studies
                            .iter()
                            .filter(move |s| s.visit_id == visit.id)
                            .map(move |s| PortalStudy {
                                study_id: s.id.clone(),
                                study_name: s.study_name.clone(),
                                modality: s.modality.clone(),
                                region: s.region.clone(),
                                status: s.status,
                                check_in_date: parse_date(&visit.check_in_time),
                                report_html: matches!(
                                    s.status,
                                    StudyStatus::Reported | StudyStatus::Completed
                                )
                                .then(|| s.report_content.clone())
                                .flatten(),
                                image_links: s.image_links.clone(),
                            })
                    })
                    .collect()
            })
            .await;

        studies.sort_by(|a, b| b.check_in_date.cmp(&a.check_in_date));
        Ok(studies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::radiologist::RadiologistView;
    use crate::views::reception::{PatientForm, ReceptionView, StudyOrder};
    use crate::views::technician::TechnicianView;
    use crate::views::testing::admin_app;

    #[tokio::test]
    async fn test_patient_sees_own_reports_only_when_signed() {
        let (app, _) = admin_app().await;

        let mut desk = ReceptionView::new(&app);
        desk.save_patient(PatientForm {
            full_name: "Ahmed Khaled".to_string(),
            phone: "0599123456".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        desk.queue_study(StudyOrder::new(Modality::Us, "Abdomen")).unwrap();
        desk.queue_study(StudyOrder::new(Modality::Xr, "Chest")).unwrap();
        let receipt = desk.save_visit().await.unwrap();

        desk.save_patient(PatientForm {
            full_name: "Mona Saleh".to_string(),
            phone: "0598765432".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        desk.queue_study(StudyOrder::new(Modality::Ct, "Brain")).unwrap();
        desk.save_visit().await.unwrap();

        let signed = &receipt.study_ids[0];
        let tech = TechnicianView::new(&app);
        tech.start_scan(signed).await.unwrap();
        tech.send_to_radiologist(signed).await.unwrap();
        let view = RadiologistView::new(&app);
        let mut draft = view.open_report(signed).await.unwrap();
        draft.set_content("<p>Normal abdomen.</p>").unwrap();
        view.sign_report(&draft).await.unwrap();

        app.logout().await.unwrap();
        assert!(app.login_patient("0599123456", "AHM0599123457").await.is_err());
        assert!(app.session().await.is_none());
        app.login_patient("0599123456", "AHM0599123456").await.unwrap();

        let studies = PatientPortal::new(&app).studies().await.unwrap();
        assert_eq!(studies.len(), 2);
        let reported: Vec<_> = studies.iter().filter(|s| s.report_html.is_some()).collect();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].report_html.as_deref(), Some("<p>Normal abdomen.</p>"));
        assert!(studies.iter().all(|s| s.modality != Modality::Ct));
    }
}
