//! 路由守卫

use radflow_core::Role;
use radflow_workflow::{AccessPolicy, Page};

/// 导航结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub page: Page,
    /// 请求的页面与实际显示的页面不同
    pub redirected: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    policy: AccessPolicy,
}

impl Router {
    pub fn new(policy: AccessPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// 未登录时进入登录页；无权访问时回到角色的默认页
    pub fn navigate(&self, role: Option<Role>, current: Page, requested: Page) -> Navigation {
        let Some(role) = role else {
            return Navigation {
                page: Page::Login,
                redirected: requested != Page::Login,
            };
        };

        if self.policy.can_access(role, requested) {
            return Navigation {
                page: requested,
                redirected: false,
            };
        }

        let fallback = self.policy.default_page(role);
        tracing::debug!("{} may not open {}, redirecting to {}", role, requested, fallback);
        Navigation {
            page: fallback,
            // 已在默认页时不再重复跳转
            redirected: current != fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_technician_redirected_from_admin() {
        let router = Router::default();
        let nav = router.navigate(Some(Role::Technician), Page::Login, Page::Admin);
        assert_eq!(nav, Navigation { page: Page::Technician, redirected: true });

        let again = router.navigate(Some(Role::Technician), Page::Technician, Page::Admin);
        assert_eq!(again, Navigation { page: Page::Technician, redirected: false });
    }

    #[test]
    fn test_anonymous_goes_to_login() {
        let router = Router::default();
        assert_eq!(router.navigate(None, Page::Login, Page::Radiologist).page, Page::Login);
    }

    #[test]
    fn test_admin_can_open_all_staff_pages() {
        let router = Router::default();
        for page in [Page::Admin, Page::Reception, Page::Technician, Page::Radiologist] {
            let nav = router.navigate(Some(Role::Admin), Page::Admin, page);
            assert_eq!(nav.page, page);
            assert!(!nav.redirected);
        }
        let nav = router.navigate(Some(Role::Admin), Page::Admin, Page::Patient);
        assert_eq!(nav.page, Page::Admin);
    }
}
