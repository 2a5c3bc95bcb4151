//! Scripted in-memory engine for exercising the capture pipeline without
//! a browser.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trace_runtime::capture::intercept::{InterceptionPolicy, Verdict};
use trace_runtime::capture::lifecycle::{EngineManager, LifecycleMode};
use trace_runtime::capture::orchestrator::CaptureService;
use trace_runtime::capture::race::{RaceCoordinator, RaceSettings};
use trace_runtime::capture::Signature;
use trace_runtime::error::NavigationError;
use trace_runtime::renderer::{
    CapturePage, Engine, EngineLauncher, ObservedResponse, ResourceKind, ResponseStream,
};

/// One response the scripted page will produce.
#[derive(Clone, Debug)]
pub struct ScriptedResponse {
    pub after: Duration,
    pub url: String,
    pub body: Result<String, String>,
}

impl ScriptedResponse {
    pub fn json(after_ms: u64, url: &str, body: &str) -> Self {
        Self {
            after: Duration::from_millis(after_ms),
            url: url.to_string(),
            body: Ok(body.to_string()),
        }
    }

    pub fn unreadable(after_ms: u64, url: &str) -> Self {
        Self {
            after: Duration::from_millis(after_ms),
            url: url.to_string(),
            body: Err("No resource with given identifier found".to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Navigation {
    Commit,
    Fail(String),
    Hang,
    Panic,
}

/// What every page opened by a [`ScriptedLauncher`] does.
#[derive(Clone, Debug)]
pub struct PageScript {
    pub responses: Vec<ScriptedResponse>,
    pub navigation: Navigation,
    /// Outbound requests pushed through the installed policy.
    pub requests: Vec<(ResourceKind, String)>,
}

impl PageScript {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses,
            navigation: Navigation::Commit,
            requests: Vec::new(),
        }
    }

    pub fn navigation(mut self, navigation: Navigation) -> Self {
        self.navigation = navigation;
        self
    }
}

/// Everything the scripted engine did, for assertions.
#[derive(Default)]
pub struct Journal {
    pub launches: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub engine_shutdowns: AtomicUsize,
    pub scripts: Mutex<Vec<String>>,
    pub steps: Mutex<Vec<&'static str>>,
    pub verdicts: Mutex<Vec<(ResourceKind, String, Verdict)>>,
}

impl Journal {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }
    pub fn pages_closed(&self) -> usize {
        self.pages_closed.load(Ordering::SeqCst)
    }
    pub fn engine_shutdowns(&self) -> usize {
        self.engine_shutdowns.load(Ordering::SeqCst)
    }
    pub fn steps(&self) -> Vec<&'static str> {
        self.steps.lock().unwrap().clone()
    }
    fn step(&self, name: &'static str) {
        self.steps.lock().unwrap().push(name);
    }
}

pub struct ScriptedLauncher {
    script: PageScript,
    journal: Arc<Journal>,
    fail_launch: bool,
    fail_open: bool,
    shutdown_delay: Duration,
}

impl ScriptedLauncher {
    pub fn new(script: PageScript) -> Self {
        Self {
            script,
            journal: Arc::new(Journal::default()),
            fail_launch: false,
            fail_open: false,
            shutdown_delay: Duration::ZERO,
        }
    }

    /// Engines take `delay` to shut down, like a browser flushing its profile.
    pub fn slow_shutdown(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new(PageScript::new(Vec::new()))
        }
    }

    pub fn failing_pages(script: PageScript) -> Self {
        Self {
            fail_open: true,
            ..Self::new(script)
        }
    }

    pub fn journal(&self) -> Arc<Journal> {
        Arc::clone(&self.journal)
    }
}

#[async_trait]
impl EngineLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>> {
        if self.fail_launch {
            bail!("No such file or directory: /usr/bin/google-chrome");
        }
        self.journal.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedEngine {
            script: self.script.clone(),
            journal: Arc::clone(&self.journal),
            fail_open: self.fail_open,
            shutdown_delay: self.shutdown_delay,
            shut_down: AtomicBool::new(false),
            open: Arc::new(AtomicUsize::new(0)),
        }))
    }
}

pub struct ScriptedEngine {
    script: PageScript,
    journal: Arc<Journal>,
    fail_open: bool,
    shutdown_delay: Duration,
    shut_down: AtomicBool,
    open: Arc<AtomicUsize>,
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn open_page(&self) -> Result<Box<dyn CapturePage>> {
        if self.fail_open || self.shut_down.load(Ordering::SeqCst) {
            bail!("target closed");
        }
        self.journal.pages_opened.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedPage {
            script: self.script.clone(),
            journal: Arc::clone(&self.journal),
            open: Arc::clone(&self.open),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        tokio::time::sleep(self.shutdown_delay).await;
        self.shut_down.store(true, Ordering::SeqCst);
        self.journal.engine_shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn active_pages(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

pub struct ScriptedPage {
    script: PageScript,
    journal: Arc<Journal>,
    open: Arc<AtomicUsize>,
}

#[async_trait]
impl CapturePage for ScriptedPage {
    async fn intercept(&self, policy: Arc<InterceptionPolicy>) -> Result<()> {
        self.journal.step("intercept");
        let mut verdicts = self.journal.verdicts.lock().unwrap();
        for (kind, url) in &self.script.requests {
            verdicts.push((*kind, url.clone(), policy.classify(*kind, url)));
        }
        Ok(())
    }

    async fn responses(&self) -> Result<ResponseStream> {
        self.journal.step("arm");
        let responses = self.script.responses.clone();
        let stream = async_stream::stream! {
            let start = tokio::time::Instant::now();
            for response in responses {
                tokio::time::sleep_until(start + response.after).await;
                let body = response.body.clone();
                yield ObservedResponse::new(response.url, async move {
                    body.map_err(anyhow::Error::msg)
                });
            }
        };
        Ok(stream.boxed())
    }

    async fn navigate(&self, _url: &str) -> Result<(), NavigationError> {
        self.journal.step("navigate");
        match &self.script.navigation {
            Navigation::Commit => Ok(()),
            Navigation::Fail(reason) => Err(NavigationError::Rejected(reason.clone())),
            Navigation::Hang => std::future::pending().await,
            Navigation::Panic => panic!("renderer crashed"),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<()> {
        self.journal.scripts.lock().unwrap().push(script.to_string());
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.open.fetch_sub(1, Ordering::SeqCst);
        self.journal.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Race settings scaled down for tests.
pub fn fast_settings(deadline_ms: u64) -> RaceSettings {
    RaceSettings {
        deadline: Duration::from_millis(deadline_ms),
        navigation_timeout: Duration::from_millis(200),
        scroll_offset: 800,
        scroll_delay: Duration::from_millis(10),
    }
}

pub fn service(
    launcher: Arc<dyn EngineLauncher>,
    mode: LifecycleMode,
    settings: RaceSettings,
) -> CaptureService {
    CaptureService::new(
        Arc::new(EngineManager::new(mode, launcher)),
        Arc::new(InterceptionPolicy::default()),
        RaceCoordinator::new(settings),
        Signature::default(),
    )
}

pub const TARGET: &str = "https://video.example.com/watch/42";
pub const API: &str = "https://api.example.com/v2/fetch-video?id=42";
