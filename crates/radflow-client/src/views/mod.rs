//! 页面控制器
//!
//! 每个控制器借用 [`crate::App`]，读取应用状态并产出视图模型；
//! 修改操作先校验权限与输入，再乐观更新本地状态，最后交给同步队列。

pub mod admin;
pub mod patient_portal;
pub mod radiologist;
pub mod reception;
pub mod technician;

pub use admin::{AdminView, TemplateForm, UserForm, UserRow};
pub use patient_portal::{PatientPortal, PortalStudy};
pub use radiologist::{RadiologistView, RADIOLOGIST_TABS};
pub use reception::{PatientForm, ReceptionView, StudyOrder, VisitReceipt, VisitRow};
pub use technician::{TechnicianView, TECHNICIAN_TABS};

use chrono::{NaiveDate, Utc};

/// 工作列表默认日期
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use radflow_store::{AdminSeed, AdvisoryLock, Dispatcher, ObjectStoreBackend, RowStore};

    use crate::backend::ApiClient;
    use crate::storage::LocalStorage;
    use crate::ui::ScriptedPrompter;
    use crate::App;

    pub const ADMIN_PIN: &str = "1234";

    /// 进程内分发器作为后端的应用，返回种子管理员ID
    pub async fn app_with(prompter: Arc<ScriptedPrompter>) -> (App, String) {
        let backend = Arc::new(ObjectStoreBackend::in_memory());
        let seed = AdminSeed::default();
        let (store, report) = RowStore::open(backend, &seed).await.unwrap();
        let dispatcher = Dispatcher::new(Arc::new(store), AdvisoryLock::default());

        let app = App::new(
            ApiClient::new(Arc::new(dispatcher)),
            Arc::new(LocalStorage::in_memory()),
            prompter,
        );
        app.load_data(false).await.unwrap();
        (app, report.seeded_admin.unwrap())
    }

    pub async fn admin_app() -> (App, Arc<ScriptedPrompter>) {
        let prompter = Arc::new(ScriptedPrompter::accepting());
        let (app, admin_id) = app_with(Arc::clone(&prompter)).await;
        app.login_staff(&admin_id, ADMIN_PIN).await.unwrap();
        (app, prompter)
    }
}
