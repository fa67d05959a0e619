//! Headless browser session management.
//!
//! One [`ChromiumSession`] owns a Chromium process, its CDP handler task and a
//! single page. Pipelines open it before any extraction work and call
//! [`BrowserSession::close`] on every exit path.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::datetime::format_execution_time;
use crate::Config;

/// Poll interval for selector waits.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Quiet window used to decide that the network went idle after a load.
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

const NETWORK_PROBE: &str = "JSON.stringify([document.readyState, performance.getEntriesByType('resource').length])";

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),
}

/// Launch options for [`ChromiumSession::open`].
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub user_agent: String,
    pub chrome_path: Option<PathBuf>,
}

impl BrowserOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            headless: config.headless,
            user_agent: config.user_agent.clone(),
            chrome_path: config.chrome_path.as_ref().map(PathBuf::from),
        }
    }

    /// Hardening flags passed to Chromium.
    ///
    /// The sandbox is disabled for containerised runs; the remaining flags
    /// soften the automation fingerprint.
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            "--no-sandbox".to_string(),
            "--disable-setuid-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-infobars".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            format!("--user-agent={}", self.user_agent),
        ]
    }
}

/// Page operations the pipelines rely on.
///
/// All calls are bounded: `navigate` fails after its timeout, while
/// `wait_for_selector` reports a missing selector as `false` so callers can
/// treat an unexpected page shape as a soft condition.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` and block until the network is idle or `timeout` elapses.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Block until `selector` matches or `timeout` elapses.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool;

    /// Evaluate a JS expression in the page, awaiting a returned promise.
    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    /// Release the browser. Only the first call has an effect.
    async fn close(&mut self);
}

/// Re-evaluate `probe` until two consecutive reads match or `bound` elapses.
///
/// Returns `true` when the page settled, `false` when the bound was reached.
pub async fn wait_until_stable<S>(
    session: &S,
    probe: &str,
    interval: Duration,
    bound: Duration,
) -> Result<bool, BrowserError>
where
    S: BrowserSession + ?Sized,
{
    let started = Instant::now();
    let mut previous = session.evaluate(probe).await?;

    loop {
        if started.elapsed() >= bound {
            debug!(?bound, "Page did not settle within bound");
            return Ok(false);
        }
        tokio::time::sleep(interval.min(bound.saturating_sub(started.elapsed()))).await;

        let current = session.evaluate(probe).await?;
        if current == previous {
            return Ok(true);
        }
        previous = current;
    }
}

/// Chromium driven over CDP.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: Option<JoinHandle<()>>,
    opened_at: Instant,
    closed: bool,
}

impl ChromiumSession {
    /// Launch Chromium with stealth settings and open a blank page.
    pub async fn open(options: &BrowserOptions) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder().window_size(1366, 768);
        for arg in options.launch_args() {
            builder = builder.arg(arg);
        }
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler event error");
                }
            }
        });

        let page = match Self::prepare_page(&browser, &options.user_agent).await {
            Ok(page) => page,
            Err(e) => {
                browser.close().await.ok();
                handler.abort();
                return Err(e);
            }
        };

        info!(headless = options.headless, "Browser started");

        Ok(Self {
            browser,
            page,
            handler: Some(handler),
            opened_at: Instant::now(),
            closed: false,
        })
    }

    async fn prepare_page(browser: &Browser, user_agent: &str) -> Result<Page, BrowserError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(format!("Failed to create page: {e}")))?;
        page.enable_stealth_mode_with_agent(user_agent)
            .await
            .map_err(|e| BrowserError::Launch(format!("Failed to enable stealth mode: {e}")))?;
        Ok(page)
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        debug!(url, "Navigating");
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BrowserError::NavigationTimeout {
                    url: url.to_string(),
                    timeout,
                })
            }
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        if !wait_until_stable(self, NETWORK_PROBE, NETWORK_IDLE_WINDOW, remaining).await? {
            return Err(BrowserError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            });
        }
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool {
        let script = match serde_json::to_string(selector) {
            Ok(quoted) => format!("document.querySelector({quoted}) !== null"),
            Err(_) => return false,
        };
        let started = Instant::now();

        loop {
            // Evaluation errors while a page is still swapping in are retried.
            if let Ok(Value::Bool(true)) = self.evaluate(&script).await {
                return true;
            }
            if started.elapsed() >= timeout {
                warn!(selector, ?timeout, "Timeout waiting for selector");
                return false;
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::Evaluation)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn close(&mut self) {
        if self.closed {
            warn!("Browser session already closed");
            return;
        }
        self.closed = true;

        info!(
            execution_time = %format_execution_time(self.opened_at.elapsed()),
            peak_memory_mb = ?peak_memory_mb(),
            "Closing browser session"
        );

        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser did not acknowledge close");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Failed waiting for browser process to exit");
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Browser session dropped without close");
        }
    }
}

/// Peak resident set size of this process in MB (Linux only).
pub fn peak_memory_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_hwm(&status)
}

fn parse_vm_hwm(status: &str) -> Option<f64> {
    let line = status.lines().find(|l| l.starts_with("VmHWM:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some((kb / 1024.0 * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> BrowserOptions {
        BrowserOptions {
            headless: true,
            user_agent: "TestAgent/1.0".to_string(),
            chrome_path: None,
        }
    }

    #[test]
    fn test_launch_args_include_hardening_flags() {
        let args = options().launch_args();
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--disable-setuid-sandbox".to_string()));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(args.contains(&"--user-agent=TestAgent/1.0".to_string()));
    }

    #[test]
    fn test_parse_vm_hwm() {
        let status = "Name:\tscrape-odds\nVmPeak:\t  300000 kB\nVmHWM:\t  204800 kB\n";
        assert_eq!(parse_vm_hwm(status), Some(200.0));
        assert_eq!(parse_vm_hwm("Name:\tx\n"), None);
    }

    #[tokio::test]
    async fn test_wait_until_stable_returns_on_matching_reads() {
        let mut session = MockBrowserSession::new();
        let mut reads = vec![json!(3), json!(5), json!(5)].into_iter();
        session
            .expect_evaluate()
            .times(3)
            .returning(move |_| Ok(reads.next().unwrap_or(Value::Null)));

        let settled = wait_until_stable(
            &session,
            "probe",
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(settled);
    }

    #[tokio::test]
    async fn test_wait_until_stable_gives_up_at_bound() {
        let mut session = MockBrowserSession::new();
        let mut counter = 0;
        session.expect_evaluate().returning(move |_| {
            counter += 1;
            Ok(json!(counter))
        });

        let settled = wait_until_stable(
            &session,
            "probe",
            Duration::from_millis(5),
            Duration::from_millis(30),
        )
        .await
        .unwrap();
        assert!(!settled);
    }

    #[tokio::test]
    async fn test_wait_until_stable_propagates_evaluation_error() {
        let mut session = MockBrowserSession::new();
        session
            .expect_evaluate()
            .returning(|_| Err(BrowserError::Evaluation("page crashed".to_string())));

        let result = wait_until_stable(
            &session,
            "probe",
            Duration::from_millis(1),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(BrowserError::Evaluation(_))));
    }
}
