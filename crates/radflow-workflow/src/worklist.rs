//! 工作列表管理
//!
//! 为技师、医生和前台提供按日期/状态/医生筛选后的检查列表

use chrono::NaiveDate;
use radflow_core::utils::parse_date;
use radflow_core::{Modality, Patient, Study, StudyStatus, Visit};
use serde::Serialize;
use std::collections::HashMap;

/// 工作项：检查连同其所属就诊和患者
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem {
    pub study: Study,
    pub visit: Visit,
    pub patient: Option<Patient>,
    pub check_in_date: Option<NaiveDate>,
}

/// 工作列表过滤器
#[derive(Debug, Clone, Default)]
pub struct WorkListFilter {
    /// 就诊登记日期
    pub date: Option<NaiveDate>,
    pub statuses: Option<Vec<StudyStatus>>,
    /// 检查的指定医生
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    pub modality: Option<Modality>,
}

impl WorkListFilter {
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[StudyStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    pub fn assigned_to(mut self, doctor_id: impl Into<String>) -> Self {
        self.doctor_id = Some(doctor_id.into());
        self
    }
}

/// 工作列表统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkListStats {
    pub total_items: usize,
    pub by_status: HashMap<StudyStatus, usize>,
    pub by_modality: HashMap<String, usize>,
}

impl WorkListStats {
    pub fn count(&self, status: StudyStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// 工作列表管理器（借用应用状态中的集合）
#[derive(Debug)]
pub struct WorkListManager<'a> {
    patients: HashMap<&'a str, &'a Patient>,
    visits: HashMap<&'a str, &'a Visit>,
    studies: &'a [Study],
}

impl<'a> WorkListManager<'a> {
    /// 创建新的工作列表管理器
    pub fn new(patients: &'a [Patient], visits: &'a [Visit], studies: &'a [Study]) -> Self {
        Self {
            patients: patients.iter().map(|p| (p.id.as_str(), p)).collect(),
            visits: visits.iter().map(|v| (v.id.as_str(), v)).collect(),
            studies,
        }
    }

    /// 查询工作列表
    pub fn query(&self, filter: &WorkListFilter) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = Vec::new();

        for study in self.studies {
            let Some(visit) = self.visits.get(study.visit_id.as_str()) else {
                tracing::debug!("Study {} references missing visit {}", study.id, study.visit_id);
                continue;
            };
            let check_in_date = parse_date(&visit.check_in_time);

            // 应用过滤器
            if let Some(date) = filter.date {
                if check_in_date != Some(date) {
                    continue;
                }
            }
            if let Some(statuses) = &filter.statuses {
                if !statuses.contains(&study.status) {
                    continue;
                }
            }
            if let Some(doctor_id) = &filter.doctor_id {
                if &study.assigned_doctor_id != doctor_id {
                    continue;
                }
            }
            if let Some(patient_id) = &filter.patient_id {
                if &visit.patient_id != patient_id {
                    continue;
                }
            }
            if let Some(modality) = &filter.modality {
                if &study.modality != modality {
                    continue;
                }
            }

            items.push(WorkItem {
                study: study.clone(),
                visit: (*visit).clone(),
                patient: self.patients.get(visit.patient_id.as_str()).map(|p| (*p).clone()),
                check_in_date,
            });
        }

        // 按登记时间排序，同一就诊内按创建时间
        items.sort_by(|a, b| {
            a.visit
                .check_in_time
                .cmp(&b.visit.check_in_time)
                .then_with(|| a.study.created_at.cmp(&b.study.created_at))
        });

        items
    }

    /// 按状态分组（看板的各个标签页）
    pub fn group_by_status(
        &self,
        filter: &WorkListFilter,
        tabs: &[StudyStatus],
    ) -> Vec<(StudyStatus, Vec<WorkItem>)> {
        let items = self.query(&filter.clone().with_statuses(tabs));
        tabs.iter()
            .map(|status| {
                let column = items
                    .iter()
                    .filter(|item| item.study.status == *status)
                    .cloned()
                    .collect();
                (*status, column)
            })
            .collect()
    }

    /// 获取就诊下的所有检查
    pub fn studies_for_visit(&self, visit_id: &str) -> Vec<&'a Study> {
        self.studies.iter().filter(|s| s.visit_id == visit_id).collect()
    }

    /// 获取工作列表统计
    pub fn stats(&self, filter: &WorkListFilter) -> WorkListStats {
        let items = self.query(filter);
        let mut stats = WorkListStats {
            total_items: items.len(),
            ..Default::default()
        };

        for item in &items {
            *stats.by_status.entry(item.study.status).or_insert(0) += 1;
            *stats
                .by_modality
                .entry(item.study.modality.code().to_string())
                .or_insert(0) += 1;
        }

        stats
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn patient(id: &str, name: &str) -> Patient {
        Patient {
            id: id.to_string(),
            full_name: name.to_string(),
            dob: None,
            age: None,
            gender: String::new(),
            phone: String::new(),
            complaint: String::new(),
            diagnosis: String::new(),
            medical_history: String::new(),
            created_at: String::new(),
        }
    }

    pub fn visit(id: &str, patient_id: &str, check_in: &str) -> Visit {
        Visit {
            id: id.to_string(),
            patient_id: patient_id.to_string(),
            status: "In Progress".to_string(),
            check_in_time: check_in.to_string(),
            referrer_doctor: String::new(),
            assigned_doctor_id: String::new(),
            created_at: check_in.to_string(),
        }
    }

    pub fn study(id: &str, visit_id: &str, status: StudyStatus, doctor: &str) -> Study {
        Study {
            id: id.to_string(),
            visit_id: visit_id.to_string(),
            modality: Modality::Us,
            region: "Abdomen".to_string(),
            study_name: "US Abdomen".to_string(),
            assigned_doctor_id: doctor.to_string(),
            status,
            report_content: None,
            image_links: Vec::new(),
            completed_at: None,
            created_at: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn sample() -> (Vec<Patient>, Vec<Visit>, Vec<Study>) {
        let patients = vec![patient("PT-1", "Ahmed Khaled"), patient("PT-2", "Sara Ali")];
        let visits = vec![
            visit("VS-1", "PT-1", "2026-10-19T08:00:00Z"),
            visit("VS-2", "PT-2", "2026-10-18T08:00:00Z"),
        ];
        let studies = vec![
            study("ST-1", "VS-1", StudyStatus::Waiting, "USR-DR1"),
            study("ST-2", "VS-1", StudyStatus::Reporting, "USR-DR2"),
            study("ST-3", "VS-2", StudyStatus::Waiting, "USR-DR1"),
            study("ST-4", "VS-missing", StudyStatus::Waiting, "USR-DR1"),
        ];
        (patients, visits, studies)
    }

    #[test]
    fn test_filter_by_date_and_status() {
        let (patients, visits, studies) = sample();
        let manager = WorkListManager::new(&patients, &visits, &studies);
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

        let items = manager.query(&WorkListFilter::on(date).with_statuses(&[StudyStatus::Waiting]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].study.id, "ST-1");
        assert_eq!(items[0].patient.as_ref().unwrap().full_name, "Ahmed Khaled");
    }

    #[test]
    fn test_filter_by_doctor() {
        let (patients, visits, studies) = sample();
        let manager = WorkListManager::new(&patients, &visits, &studies);
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

        let mine = manager.query(&WorkListFilter::on(date).assigned_to("USR-DR2"));
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].study.id, "ST-2");
    }

    #[test]
    fn test_group_and_stats_skip_orphans() {
        let (patients, visits, studies) = sample();
        let manager = WorkListManager::new(&patients, &visits, &studies);

        let columns = manager.group_by_status(
            &WorkListFilter::default(),
            &[StudyStatus::Waiting, StudyStatus::Scanning],
        );
        assert_eq!(columns[0].1.len(), 2);
        assert!(columns[1].1.is_empty());

        let stats = manager.stats(&WorkListFilter::default());
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.count(StudyStatus::Reporting), 1);
        assert_eq!(manager.studies_for_visit("VS-1").len(), 2);
    }
}
