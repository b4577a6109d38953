//! Marketing site generation
//!
//! `WebsiteBuilder` lays out the whole site up front and builds it in four
//! timed phases. `WebsiteDevelopmentAgent` works the same page list as a
//! backlog, publishing one page per cycle.

use crate::error::PortalError;
use crate::portal::PublishStatus;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tms_kernel::{LogManager, LogScope, PeriodicTask, TaskHandle};

const SITE_NAME: &str = "Trans Bot AI";

/// `(path, title)` for every page, in priority order
const PAGE_ROWS: &[(&str, &str)] = &[
    ("/", "Trans Bot AI - Intelligent Transportation Management"),
    ("/about", "About Trans Bot AI"),
    ("/features", "Features & Capabilities"),
    ("/pricing", "Pricing Plans"),
    ("/contact", "Contact Us"),
    ("/dashboard", "Dashboard"),
    ("/dashboard/loads", "Load Management"),
    ("/dashboard/routes", "Route Planning"),
    ("/dashboard/drivers", "Driver Management"),
    ("/dashboard/vehicles", "Vehicle Management"),
    ("/dashboard/analytics", "Analytics & Reports"),
    ("/dashboard/billing", "Billing & Invoicing"),
    ("/dashboard/customers", "Customer Management"),
    ("/dashboard/suppliers", "Supplier Management"),
    ("/dashboard/inventory", "Inventory Management"),
    ("/dashboard/scheduling", "Scheduling"),
    ("/dashboard/maintenance", "Maintenance Tracking"),
    ("/dashboard/compliance", "Compliance Management"),
    ("/dashboard/safety", "Safety Management"),
    ("/ai/overview", "AI Technology"),
    ("/ai/features", "AI Features"),
    ("/ai/automation", "Process Automation"),
    ("/ai/predictive-analytics", "Predictive Analytics"),
    ("/ai/machine-learning", "Machine Learning"),
    ("/ai/optimization", "Route Optimization"),
    ("/ai/matching", "Intelligent Matching"),
    ("/ai/tracking", "Real-time Tracking"),
    ("/ai/notifications", "Smart Notifications"),
    ("/ai/insights", "AI Insights"),
    ("/solutions/logistics", "Logistics Solutions"),
    ("/solutions/ecommerce", "E-commerce Logistics"),
    ("/solutions/manufacturing", "Manufacturing"),
    ("/solutions/retail", "Retail Distribution"),
    ("/solutions/healthcare", "Healthcare Logistics"),
    ("/solutions/food-beverage", "Food & Beverage"),
    ("/solutions/construction", "Construction"),
    ("/solutions/automotive", "Automotive"),
    ("/solutions/chemicals", "Chemicals"),
    ("/solutions/pharmaceuticals", "Pharmaceuticals"),
    ("/support/help-center", "Help Center"),
    ("/support/documentation", "Documentation"),
    ("/support/api-docs", "API Documentation"),
    ("/support/tutorials", "Tutorials"),
    ("/support/faq", "FAQ"),
    ("/support/community", "Community"),
    ("/support/training", "Training"),
    ("/support/certification", "Certification"),
    ("/support/webinars", "Webinars"),
    ("/support/resources", "Resources"),
    ("/company/careers", "Careers"),
    ("/company/news", "News & Updates"),
    ("/company/blog", "Blog"),
    ("/company/partners", "Partners"),
    ("/company/investors", "Investors"),
];

const COMPONENTS: [&str; 20] = [
    "Header", "Footer", "Navigation", "Sidebar", "Dashboard", "Charts", "Tables", "Forms",
    "Modals", "Cards", "Buttons", "Inputs", "Selects", "DatePickers", "Maps", "Notifications",
    "Alerts", "Progress", "Loading", "ErrorBoundary",
];

const FEATURES: [&str; 20] = [
    "AI-Powered Route Optimization",
    "Real-time Tracking",
    "Intelligent Load Matching",
    "Predictive Analytics",
    "Automated Billing",
    "Driver Management",
    "Vehicle Management",
    "Customer Portal",
    "Supplier Portal",
    "Inventory Tracking",
    "Maintenance Scheduling",
    "Compliance Monitoring",
    "Safety Management",
    "Mobile App",
    "API Integration",
    "Custom Reporting",
    "Multi-language Support",
    "Cloud-based Platform",
    "24/7 Support",
    "Scalable Architecture",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub description: String,
    pub keywords: Vec<String>,
    /// 1 is the most important page
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsitePage {
    pub id: String,
    pub title: String,
    pub path: String,
    pub component: String,
    pub content: String,
    pub status: PublishStatus,
    pub metadata: PageMetadata,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteArchitecture {
    pub pages: Vec<WebsitePage>,
    pub components: Vec<String>,
    pub routes: Vec<String>,
    pub features: Vec<String>,
}

fn page_id(path: &str) -> String {
    match path.rsplit('/').next() {
        Some("") | None => "home".to_string(),
        Some(last) => last.to_string(),
    }
}

fn component_name(id: &str) -> String {
    let mut name: String = id
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    name.push_str("Page");
    name
}

fn build_page(priority: u32, path: &str, title: &str) -> WebsitePage {
    let id = page_id(path);
    let mut keywords: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if keywords.is_empty() {
        keywords.push("home".to_string());
    }
    WebsitePage {
        component: component_name(&id),
        content: format!("{title} content for {SITE_NAME}"),
        metadata: PageMetadata {
            description: format!("{title} | {SITE_NAME}"),
            keywords,
            priority,
        },
        id,
        title: title.to_string(),
        path: path.to_string(),
        status: PublishStatus::Draft,
        updated_at: Utc::now(),
    }
}

/// Full site layout with every page in `draft`
#[must_use]
pub fn site_architecture() -> WebsiteArchitecture {
    let pages: Vec<WebsitePage> = PAGE_ROWS
        .iter()
        .zip(1u32..)
        .map(|((path, title), priority)| build_page(priority, path, title))
        .collect();
    WebsiteArchitecture {
        routes: pages.iter().map(|p| p.path.clone()).collect(),
        pages,
        components: COMPONENTS.iter().map(|c| (*c).to_string()).collect(),
        features: FEATURES.iter().map(|f| (*f).to_string()).collect(),
    }
}

/// Simulated time spent in each build phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTimings {
    pub infrastructure: Duration,
    pub per_page: Duration,
    pub components: Duration,
    pub integration: Duration,
}

impl Default for BuildTimings {
    fn default() -> Self {
        Self {
            infrastructure: Duration::from_secs(3),
            per_page: Duration::from_millis(100),
            components: Duration::from_secs(2),
            integration: Duration::from_secs(3),
        }
    }
}

pub struct WebsiteBuilder {
    timings: BuildTimings,
    architecture: RwLock<Option<WebsiteArchitecture>>,
    progress: AtomicU8,
    running: AtomicBool,
    log: LogScope,
}

impl std::fmt::Debug for WebsiteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebsiteBuilder")
            .field("progress", &self.progress())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl WebsiteBuilder {
    #[must_use]
    pub fn new(log: &Arc<LogManager>, timings: BuildTimings) -> Self {
        Self {
            timings,
            architecture: RwLock::new(None),
            progress: AtomicU8::new(0),
            running: AtomicBool::new(false),
            log: log.scope("website-builder"),
        }
    }

    /// Generate the architecture
    pub fn initialize(&self) {
        let architecture = site_architecture();
        let pages = architecture.pages.len();
        *self.architecture.write() = Some(architecture);
        self.progress.store(0, Ordering::SeqCst);
        self.log
            .success(format!("Generated architecture with {pages} pages"));
    }

    /// Run the four build phases
    ///
    /// A second call while a build is in progress is a no-op.
    ///
    /// # Errors
    /// `PortalError::ArchitectureMissing` if `initialize` has not run.
    pub async fn start(&self) -> Result<(), PortalError> {
        if self.architecture.read().is_none() {
            return Err(PortalError::ArchitectureMissing);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            self.log.warning("Website builder is already running");
            return Ok(());
        }
        self.build().await
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.log.info("Stopping website builder...");
    }

    async fn build(&self) -> Result<(), PortalError> {
        self.log.info("Building core infrastructure...");
        tokio::time::sleep(self.timings.infrastructure).await;
        self.progress.store(20, Ordering::SeqCst);

        let total = self
            .architecture
            .read()
            .as_ref()
            .map(|a| a.pages.len())
            .ok_or(PortalError::ArchitectureMissing)?;
        self.log.info(format!("Generating {total} pages..."));
        for index in 0..total {
            tokio::time::sleep(self.timings.per_page).await;
            let title = {
                let mut guard = self.architecture.write();
                let page = guard
                    .as_mut()
                    .and_then(|a| a.pages.get_mut(index))
                    .ok_or(PortalError::ArchitectureMissing)?;
                page.status = PublishStatus::Published;
                page.updated_at = Utc::now();
                page.title.clone()
            };
            self.log.debug(format!("Generated page: {title}"));
            // Linear from 20 to 60 across the page phase
            let pct = 20 + (index + 1) * 40 / total;
            self.progress
                .store(u8::try_from(pct).unwrap_or(60), Ordering::SeqCst);
        }
        self.progress.store(60, Ordering::SeqCst);

        self.log.info("Developing reusable components...");
        tokio::time::sleep(self.timings.components).await;
        self.progress.store(80, Ordering::SeqCst);

        self.log.info("Integrating components and testing...");
        tokio::time::sleep(self.timings.integration).await;
        self.progress.store(100, Ordering::SeqCst);

        self.log
            .success(format!("Website construction completed: {total} pages built"));
        Ok(())
    }

    /// Build progress in percent
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    /// # Errors
    /// `PortalError::ArchitectureMissing` before `initialize`.
    pub fn architecture(&self) -> Result<WebsiteArchitecture, PortalError> {
        self.architecture
            .read()
            .clone()
            .ok_or(PortalError::ArchitectureMissing)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.architecture.read().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebsiteAgentConfig {
    /// `None` disables the background cycle
    pub interval: Option<Duration>,
    pub deploy_delay: Duration,
}

impl WebsiteAgentConfig {
    #[must_use]
    pub fn from_settings(settings: &tms_kernel::PortalSettings) -> Self {
        Self {
            interval: (settings.website_interval_ms > 0)
                .then(|| Duration::from_millis(settings.website_interval_ms)),
            deploy_delay: Duration::from_millis(settings.deploy_delay_ms),
        }
    }
}

impl Default for WebsiteAgentConfig {
    fn default() -> Self {
        Self::from_settings(&tms_kernel::PortalSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteAgentStatus {
    pub is_running: bool,
    pub total_pages: usize,
    pub published_pages: usize,
    pub draft_pages: usize,
    pub backlog: usize,
}

pub struct WebsiteDevelopmentAgent {
    config: WebsiteAgentConfig,
    backlog: Mutex<VecDeque<WebsitePage>>,
    pages: RwLock<Vec<WebsitePage>>,
    running: AtomicBool,
    cycle: Mutex<Option<TaskHandle>>,
    log: LogScope,
}

impl std::fmt::Debug for WebsiteDevelopmentAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebsiteDevelopmentAgent")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl WebsiteDevelopmentAgent {
    /// Agent whose backlog is the full site page list
    #[must_use]
    pub fn new(log: &Arc<LogManager>, config: WebsiteAgentConfig) -> Self {
        Self {
            config,
            backlog: Mutex::new(site_architecture().pages.into()),
            pages: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            cycle: Mutex::new(None),
            log: log.scope("website-agent"),
        }
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            self.log.warning("Website development agent is already running");
            return;
        }
        if let Some(period) = self.config.interval {
            let handle = self.spawn_cycle(period);
            if let Some(previous) = self.cycle.lock().replace(handle) {
                previous.abort();
            }
        }
        self.log.success("Website development agent started");
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let cycle = self.cycle.lock().take();
        if let Some(handle) = cycle {
            if let Err(e) = handle.cancel().await {
                self.log.warning(format!("Website cycle ended abnormally: {e}"));
            }
        }
        self.log.success("Website development agent stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Take the next backlog page, add it as draft, then publish it
    ///
    /// Returns the published page, or `None` once the backlog is empty.
    pub async fn run_cycle(&self) -> Option<WebsitePage> {
        let Some(mut page) = self.backlog.lock().pop_front() else {
            self.log.debug("Website backlog is empty");
            return None;
        };
        page.status = PublishStatus::Draft;
        page.updated_at = Utc::now();
        let index = {
            let mut pages = self.pages.write();
            pages.push(page.clone());
            pages.len() - 1
        };
        self.log.info(format!("Created page draft: {}", page.title));

        tokio::time::sleep(self.config.deploy_delay).await;

        let mut pages = self.pages.write();
        let stored = pages.get_mut(index)?;
        stored.status = PublishStatus::Published;
        stored.updated_at = Utc::now();
        let published = stored.clone();
        drop(pages);
        self.log
            .success(format!("Published page: {} ({})", published.title, published.path));
        Some(published)
    }

    #[must_use]
    pub fn pages(&self) -> Vec<WebsitePage> {
        self.pages.read().clone()
    }

    #[must_use]
    pub fn status(&self) -> WebsiteAgentStatus {
        let pages = self.pages.read();
        WebsiteAgentStatus {
            is_running: self.is_running(),
            total_pages: pages.len(),
            published_pages: pages
                .iter()
                .filter(|p| p.status == PublishStatus::Published)
                .count(),
            draft_pages: pages
                .iter()
                .filter(|p| p.status == PublishStatus::Draft)
                .count(),
            backlog: self.backlog.lock().len(),
        }
    }

    fn spawn_cycle(self: &Arc<Self>, period: Duration) -> TaskHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        PeriodicTask::new("website-development", period).spawn(move || {
            let weak = weak.clone();
            async move {
                let Some(agent) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                agent.run_cycle().await;
                ControlFlow::Continue(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn architecture_shape() {
        let arch = site_architecture();
        assert_eq!(arch.pages.len(), 54);
        assert_eq!(arch.routes.len(), 54);
        assert_eq!(arch.components.len(), 20);
        assert_eq!(arch.features.len(), 20);

        let routes: HashSet<_> = arch.routes.iter().collect();
        assert_eq!(routes.len(), 54);

        let home = &arch.pages[0];
        assert_eq!(home.id, "home");
        assert_eq!(home.component, "HomePage");
        assert_eq!(home.metadata.priority, 1);
        let predictive = arch.pages.iter().find(|p| p.path == "/ai/predictive-analytics").unwrap();
        assert_eq!(predictive.component, "PredictiveAnalyticsPage");
        assert!(arch.pages.iter().all(|p| p.status == PublishStatus::Draft));
    }

    #[tokio::test(start_paused = true)]
    async fn build_requires_architecture() {
        let builder = WebsiteBuilder::new(&LogManager::shared(100), BuildTimings::default());
        assert!(matches!(builder.start().await, Err(PortalError::ArchitectureMissing)));
        assert!(matches!(builder.architecture(), Err(PortalError::ArchitectureMissing)));
        assert!(!builder.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn build_phases_advance_progress() {
        let builder = Arc::new(WebsiteBuilder::new(
            &LogManager::shared(1000),
            BuildTimings::default(),
        ));
        builder.initialize();

        let task = tokio::spawn({
            let builder = Arc::clone(&builder);
            async move { builder.start().await }
        });

        tokio::time::sleep(Duration::from_millis(3_050)).await;
        assert_eq!(builder.progress(), 20);

        // 54 pages at 100 ms each
        tokio::time::sleep(Duration::from_millis(5_400)).await;
        assert_eq!(builder.progress(), 60);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(builder.progress(), 80);

        task.await.unwrap().unwrap();
        assert_eq!(builder.progress(), 100);
        assert!(builder.is_ready());
        let arch = builder.architecture().unwrap();
        assert!(arch.pages.iter().all(|p| p.status == PublishStatus::Published));
    }

    #[tokio::test(start_paused = true)]
    async fn agent_publishes_backlog_one_page_per_cycle() {
        let agent = WebsiteDevelopmentAgent::new(
            &LogManager::shared(1000),
            WebsiteAgentConfig { interval: None, deploy_delay: Duration::from_secs(3) },
        );
        assert_eq!(agent.status().backlog, 54);

        let first = agent.run_cycle().await.unwrap();
        assert_eq!(first.path, "/");
        assert_eq!(first.status, PublishStatus::Published);
        agent.run_cycle().await.unwrap();

        let status = agent.status();
        assert_eq!(status.total_pages, 2);
        assert_eq!(status.published_pages, 2);
        assert_eq!(status.backlog, 52);
    }

    #[tokio::test(start_paused = true)]
    async fn background_cycle_runs_on_interval() {
        let agent = Arc::new(WebsiteDevelopmentAgent::new(
            &LogManager::shared(1000),
            WebsiteAgentConfig {
                interval: Some(Duration::from_secs(120)),
                deploy_delay: Duration::from_secs(3),
            },
        ));
        agent.start();
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(agent.status().draft_pages, 1);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(agent.status().published_pages, 1);
        agent.stop().await;
        assert!(!agent.is_running());
    }
}
