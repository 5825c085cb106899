//! 应用上下文
//!
//! 持有API客户端、共享的应用状态、同步队列、本地存储和路由守卫。
//! 各页面控制器借用同一个 `App`。

use radflow_core::{RadflowError, Result, Role, User};
use radflow_workflow::{AccessPolicy, Page, PermissionAction, StudyStateMachine};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::auth;
use crate::backend::ApiClient;
use crate::router::{Navigation, Router};
use crate::session::Session;
use crate::state::{AppState, SyncStatus};
use crate::storage::{LocalStorage, API_URL_KEY, SESSION_KEY};
use crate::sync::{SyncJob, SyncQueue};
use crate::ui::Prompter;

/// 启动时恢复会话的结果
#[derive(Debug, Clone, PartialEq)]
pub enum RestoredSession {
    /// 没有保存的会话
    None,
    /// 员工会话：账号已预选，需要重新输入PIN
    PinRequired(User),
    /// 患者会话已直接恢复
    Restored(Page),
}

pub struct App {
    api: ApiClient,
    state: Arc<RwLock<AppState>>,
    sync: SyncQueue,
    storage: Arc<LocalStorage>,
    router: Router,
    workflow: StudyStateMachine,
    prompter: Arc<dyn Prompter>,
}

impl App {
    /// 创建应用上下文并启动同步任务（需在tokio运行时内调用）
    pub fn new(api: ApiClient, storage: Arc<LocalStorage>, prompter: Arc<dyn Prompter>) -> Self {
        let state = Arc::new(RwLock::new(AppState::default()));
        let sync = SyncQueue::start(api.backend(), Arc::clone(&state));
        info!("RadFlow client using {}", api.describe());

        Self {
            api,
            state,
            sync,
            storage,
            router: Router::default(),
            workflow: StudyStateMachine::new(),
            prompter,
        }
    }

    /// 本地存储中的后端地址优先于默认地址
    pub fn from_storage(
        storage: Arc<LocalStorage>,
        prompter: Arc<dyn Prompter>,
        default_url: Option<&str>,
    ) -> Result<Self> {
        let url = storage.get(API_URL_KEY).or_else(|| default_url.map(str::to_string));
        let api = ApiClient::from_url(url.as_deref())?;
        Ok(Self::new(api, storage, prompter))
    }

    /// 保存后端地址覆盖，下次启动生效
    pub fn set_api_url(&self, url: &str) -> Result<()> {
        if url.trim().is_empty() {
            self.storage.remove(API_URL_KEY)
        } else {
            self.storage.set(API_URL_KEY, url.trim())
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn state(&self) -> Arc<RwLock<AppState>> {
        Arc::clone(&self.state)
    }

    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }

    pub fn policy(&self) -> &AccessPolicy {
        self.router.policy()
    }

    pub fn workflow(&self) -> &StudyStateMachine {
        &self.workflow
    }

    /// 在读锁下访问状态
    pub async fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&*self.state.read().await)
    }

    /// 在写锁下修改状态
    pub async fn write<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        f(&mut *self.state.write().await)
    }

    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    pub async fn current_page(&self) -> Page {
        self.state.read().await.current_page
    }

    pub async fn sync_status(&self, id: &str) -> Option<SyncStatus> {
        self.state.read().await.sync_status(id).cloned()
    }

    /// 显示错误并原样返回，供控制器在拒绝操作时使用
    pub fn reject(&self, error: RadflowError) -> RadflowError {
        self.prompter.alert(&error.user_message());
        error
    }

    /// 拉取全量数据并整体替换本地集合
    ///
    /// 静默模式（轮询）只记录失败且不重新导航；非静默模式显示加载状态，
    /// 失败时弹出提示，成功后重新执行当前页面的导航。
    pub async fn load_data(&self, silent: bool) -> Result<()> {
        if !silent {
            self.state.write().await.loading = true;
        }

        let result = self.api.get_all_data().await;

        let outcome = {
            let mut state = self.state.write().await;
            state.loading = false;
            match result {
                Ok(data) => {
                    info!(
                        "Loaded {} patients, {} visits, {} studies",
                        data.patients.len(),
                        data.visits.len(),
                        data.studies.len()
                    );
                    state.replace_dataset(data);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(()) => {
                if !silent {
                    let page = self.current_page().await;
                    self.navigate(page).await;
                }
                Ok(())
            }
            Err(e) if silent => {
                warn!("Background refresh failed: {}", e);
                Ok(())
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    /// 导航到页面，必要时重定向
    pub async fn navigate(&self, page: Page) -> Navigation {
        let mut state = self.state.write().await;
        let role = state.session.as_ref().map(Session::role);
        let navigation = self.router.navigate(role, state.current_page, page);
        state.current_page = navigation.page;
        navigation
    }

    /// 校验当前会话是否可执行动作，拒绝时提示用户
    pub async fn authorize(&self, action: PermissionAction) -> Result<Session> {
        let Some(session) = self.session().await else {
            return Err(self.reject(RadflowError::Authentication("Please log in first".to_string())));
        };
        self.policy()
            .authorize(session.role(), action)
            .map_err(|e| self.reject(e))?;
        Ok(session)
    }

    pub async fn enqueue(&self, job: SyncJob) -> Result<()> {
        self.sync.enqueue(job).await
    }

    /// 等待已排队的同步任务完成
    pub async fn flush(&self) -> Result<()> {
        self.sync.flush().await
    }

    async fn start_session(&self, session: Session) -> Result<Navigation> {
        self.storage.set(SESSION_KEY, serde_json::to_string(&session)?)?;
        let landing = self.policy().default_page(session.role());
        self.state.write().await.session = Some(session);
        Ok(self.navigate(landing).await)
    }

    pub async fn login_staff(&self, user_id: &str, pin: &str) -> Result<Navigation> {
        let session = auth::staff_login(&self.api, user_id, pin)
            .await
            .map_err(|e| self.reject(e))?;
        self.start_session(session).await
    }

    pub async fn login_patient(&self, phone: &str, passcode: &str) -> Result<Navigation> {
        let session = {
            let state = self.state.read().await;
            auth::patient_login(&state.patients, phone, passcode)
        }
        .map_err(|e| self.reject(e))?;
        self.start_session(session).await
    }

    /// 退出登录：先完成排队的同步，再清空会话和本地状态并重新加载
    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.flush().await {
            warn!("Pending sync could not be flushed on logout: {}", e);
        }
        self.storage.remove(SESSION_KEY)?;
        *self.state.write().await = AppState::default();
        info!("Logged out");
        self.load_data(false).await
    }

    /// 启动时读取保存的会话
    pub async fn restore_session(&self) -> Result<RestoredSession> {
        let Some(raw) = self.storage.get(SESSION_KEY) else {
            return Ok(RestoredSession::None);
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding unreadable saved session: {}", e);
                self.storage.remove(SESSION_KEY)?;
                return Ok(RestoredSession::None);
            }
        };

        match session {
            Session::Staff { user } => {
                // 账号可能已被删除，以最新用户表为准
                let (current, users_loaded) = self
                    .read(|state| (state.user(&user.id).cloned(), !state.users.is_empty()))
                    .await;
                match current {
                    Some(user) => Ok(RestoredSession::PinRequired(user)),
                    None if !users_loaded => Ok(RestoredSession::PinRequired(user)),
                    None => {
                        self.storage.remove(SESSION_KEY)?;
                        Ok(RestoredSession::None)
                    }
                }
            }
            patient @ Session::Patient { .. } => {
                let nav = self.start_session(patient).await?;
                Ok(RestoredSession::Restored(nav.page))
            }
        }
    }

    /// 当前员工角色（患者或未登录时为 `None`）
    pub async fn staff_role(&self) -> Option<Role> {
        self.session()
            .await
            .map(|s| s.role())
            .filter(Role::is_staff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::ScriptedPrompter;
    use crate::views::testing::{admin_app, app_with, ADMIN_PIN};
    use async_trait::async_trait;
    use radflow_core::{Action, Backend};
    use radflow_store::{AdminSeed, AdvisoryLock, Dispatcher, ObjectStoreBackend, RowStore};
    use serde_json::Value;

    struct OfflineBackend;

    #[async_trait]
    impl Backend for OfflineBackend {
        async fn call(&self, action: Action, _payload: Value) -> Result<Value> {
            Err(RadflowError::Network(format!("{} request failed: connection refused", action)))
        }

        fn describe(&self) -> String {
            "offline".to_string()
        }
    }

    #[tokio::test]
    async fn test_technician_redirected_from_admin() {
        let (app, _) = admin_app().await;
        let placeholder = crate::views::AdminView::new(&app)
            .create_user(crate::views::UserForm {
                full_name: "Omar Haddad".to_string(),
                email: String::new(),
                role: Role::Technician,
                pin: "4321".to_string(),
            })
            .await
            .unwrap();
        app.flush().await.unwrap();
        let tech = app.read(|s| s.resolve_id(&placeholder).to_string()).await;

        app.logout().await.unwrap();
        assert_eq!(app.current_page().await, Page::Login);
        let landing = app.login_staff(&tech, "4321").await.unwrap();
        assert_eq!(landing.page, Page::Technician);

        let nav = app.navigate(Page::Admin).await;
        assert_eq!(nav.page, Page::Technician);
        assert!(!nav.redirected);
        assert_eq!(app.current_page().await, Page::Technician);
    }

    #[tokio::test]
    async fn test_get_all_data_is_idempotent() {
        let (app, _) = admin_app().await;
        let first = app.api().get_all_data().await.unwrap();
        let second = app.api().get_all_data().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(app.read(AppState::dataset).await, second);
    }

    #[tokio::test]
    async fn test_failed_login_creates_no_session() {
        let prompter = Arc::new(ScriptedPrompter::accepting());
        let (app, admin_id) = app_with(Arc::clone(&prompter)).await;

        let err = app.login_staff(&admin_id, "9999").await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid PIN");
        assert!(app.session().await.is_none());
        assert_eq!(prompter.alerts(), vec!["Invalid PIN".to_string()]);

        app.login_staff(&admin_id, ADMIN_PIN).await.unwrap();
        assert_eq!(app.current_page().await, Page::Admin);
    }

    #[tokio::test]
    async fn test_restore_session_requires_pin_for_staff() {
        let backend = Arc::new(ObjectStoreBackend::in_memory());
        let (store, report) = RowStore::open(backend, &AdminSeed::default()).await.unwrap();
        let admin_id = report.seeded_admin.unwrap();
        let api = ApiClient::new(Arc::new(Dispatcher::new(Arc::new(store), AdvisoryLock::default())));
        let storage = Arc::new(LocalStorage::in_memory());

        let first = App::new(api.clone(), Arc::clone(&storage), Arc::new(ScriptedPrompter::accepting()));
        first.load_data(false).await.unwrap();
        first.login_staff(&admin_id, ADMIN_PIN).await.unwrap();
        assert!(!storage.get(SESSION_KEY).unwrap().contains("\"pin\""));

        let second = App::new(api, Arc::clone(&storage), Arc::new(ScriptedPrompter::accepting()));
        second.load_data(false).await.unwrap();
        match second.restore_session().await.unwrap() {
            RestoredSession::PinRequired(user) => assert_eq!(user.id, admin_id),
            other => panic!("unexpected restore result: {:?}", other),
        }
        assert!(second.session().await.is_none());

        second.logout().await.unwrap();
        assert_eq!(second.restore_session().await.unwrap(), RestoredSession::None);
    }

    #[tokio::test]
    async fn test_load_failures() {
        let prompter = Arc::new(ScriptedPrompter::accepting());
        let app = App::new(
            ApiClient::new(Arc::new(OfflineBackend)),
            Arc::new(LocalStorage::in_memory()),
            prompter.clone(),
        );

        app.load_data(true).await.unwrap();
        assert!(prompter.alerts().is_empty());

        assert!(app.load_data(false).await.is_err());
        assert_eq!(prompter.alerts().len(), 1);
        assert!(!app.read(|s| s.loading).await);
    }
}
